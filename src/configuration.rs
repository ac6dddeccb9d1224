use std::net::IpAddr;
use std::time::Duration;

pub use clap::Parser;
use thiserror::Error;

use crate::{
    echo_mode::EchoMode,
    runner::DEFAULT_CHUNK_SIZE,
    stats::OutputFormat,
    tester::TestRequest,
    transport::{tcp::DEFAULT_PORT, Credentials},
};

/// Largest accepted write chunk.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;
/// Largest payload the peer generates unless configured otherwise (1 GiB).
pub const DEFAULT_MAX_SIZE: u64 = 1 << 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Device id must not be empty")]
    EmptyDeviceId,
    #[error("Chunk size {0} is outside 1..={MAX_CHUNK_SIZE}")]
    InvalidChunkSize(usize),
    #[error("Connect timeout must be at least one second")]
    InvalidConnectTimeout,
}

/// Echo stream tester: measures connection setup and stream throughput.
#[derive(Parser, Debug, Clone)]
#[command(author = "Piotr Olszewski", version, about, long_about = None)]
pub struct Configuration {
    /// Identifier of the remote device (host or host:port)
    pub device_id: String,
    /// Payload size in bytes
    pub data_size: u64,
    /// Which side produces the payload
    #[arg(short, long, value_enum, default_value_t = EchoMode::Bidirectional)]
    pub mode: EchoMode,
    /// Port used when the device id carries none
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Bytes offered per write attempt
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Session login
    #[arg(short, long, default_value = "guest")]
    pub user: String,
    /// Session password
    #[arg(long, default_value = "")]
    pub password: String,
    /// Seconds to wait for the stream to connect
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u64,
    /// Only measure connection establishment, skip the echo exchange
    #[arg(long)]
    pub connect_only: bool,
    /// Output format for the final report
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigurationError::EmptyDeviceId);
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigurationError::InvalidChunkSize(self.chunk_size));
        }
        if self.connect_timeout == 0 {
            return Err(ConfigurationError::InvalidConnectTimeout);
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Builds the test request described by this configuration.
    pub fn to_request(&self) -> TestRequest {
        TestRequest {
            peer_id: self.device_id.clone(),
            data_size: self.data_size,
            mode: self.mode,
            chunk_size: self.chunk_size,
            credentials: Credentials::new(self.user.as_str(), self.password.as_str()),
            connect_only: self.connect_only,
        }
    }
}

/// Echo peer answering stream-echo tests.
#[derive(Parser, Debug, Clone)]
#[command(author = "Piotr Olszewski", version, about, long_about = None)]
pub struct PeerConfiguration {
    /// Local address to bind for
    #[arg(short, long, default_value = "0.0.0.0")]
    pub local_addr: IpAddr,
    /// TCP port number for incoming streams
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub local_port: u16,
    /// Largest payload a client may request in remote mode
    #[arg(short, long, default_value_t = DEFAULT_MAX_SIZE)]
    pub max_size: u64,
    /// Output format for the shutdown summary
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,
}
