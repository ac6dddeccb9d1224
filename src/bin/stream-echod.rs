use std::net::SocketAddr;
use std::process::ExitCode;

use stream_echo_suite::{
    configuration::{Parser, PeerConfiguration},
    peer::EchoPeer,
};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let conf = PeerConfiguration::parse();
    let addr = SocketAddr::new(conf.local_addr, conf.local_port);

    let peer = match EchoPeer::bind(addr, conf.max_size).await {
        Ok(peer) => peer,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("Echo peer listening on {}", addr);

    let stats = peer
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Cannot listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    stats.print(conf.output_format);
    ExitCode::SUCCESS
}
