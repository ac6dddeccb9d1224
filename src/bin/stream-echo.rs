use std::process::ExitCode;

use stream_echo_suite::{
    configuration::{Configuration, Parser},
    stats::TestReport,
    tester::run_test,
    transport::tcp::TcpTransport,
};

fn main() -> ExitCode {
    env_logger::init();

    let conf = match Configuration::try_parse() {
        Ok(conf) => conf,
        Err(e) => {
            // Help and version go to stdout and are not failures.
            let failed = e.use_stderr();
            let _ = e.print();
            return if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = conf.validate() {
        eprintln!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    log::info!("Configuration valid. Starting up...");

    let transport = TcpTransport::new(conf.port).with_connect_timeout(conf.connect_timeout());
    let result = match run_test(&transport, &conf.to_request()) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    TestReport::from(&result).print(conf.output_format);

    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        eprintln!("Command not accepted by {}", result.peer_id);
        ExitCode::FAILURE
    }
}
