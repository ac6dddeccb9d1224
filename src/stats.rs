//! Report rendering for the tester and the echo peer.
//!
//! Both summaries can be printed as human-readable text, a single JSON
//! object or a CSV header plus data row.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::{
    echo_mode::EchoMode,
    metrics::{as_millis_f64, Throughput},
    tester::TestResult,
    transport::ConnectionType,
};

/// Output format for statistics reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for machine consumption.
    Json,
    /// CSV output for spreadsheet import.
    Csv,
}

/// Serializable summary of one test run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TestReport {
    pub peer_id: String,
    pub mode: EchoMode,
    pub started_at: DateTime<Utc>,
    pub accepted: bool,
    pub connect_only: bool,
    pub connection_type: Option<ConnectionType>,
    pub data_size: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub total_ms: Option<f64>,
    pub connection_ms: Option<f64>,
    pub setup_ms: Option<f64>,
    pub echo_ms: Option<f64>,
    pub throughput_kbps: f64,
    pub throughput_mbps: f64,
}

impl From<&TestResult> for TestReport {
    fn from(result: &TestResult) -> Self {
        let Throughput {
            kbytes_per_sec,
            mbits_per_sec,
        } = result.throughput;
        TestReport {
            peer_id: result.peer_id.clone(),
            mode: result.mode,
            started_at: result.started_at,
            accepted: result.accepted,
            connect_only: result.connect_only,
            connection_type: result.connection_type,
            data_size: result.data_size,
            bytes_written: result.exchange.written,
            bytes_read: result.exchange.read,
            total_ms: result.durations.total.map(as_millis_f64),
            connection_ms: result.durations.connection.map(as_millis_f64),
            setup_ms: result.durations.setup.map(as_millis_f64),
            echo_ms: result.durations.echo.map(as_millis_f64),
            throughput_kbps: kbytes_per_sec,
            throughput_mbps: mbits_per_sec,
        }
    }
}

impl TestReport {
    /// Prints the summary in the given format.
    pub fn print(&self, format: OutputFormat) {
        print!("{}", self.render(format));
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => self.render_text(),
            OutputFormat::Json => self.render_json(),
            OutputFormat::Csv => self.render_csv(),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Test results:");
        let _ = writeln!(out, "  peer:                   {}", self.peer_id);
        let _ = writeln!(
            out,
            "  started:                {}",
            self.started_at.to_rfc3339()
        );
        if let Some(ct) = self.connection_type {
            let _ = writeln!(out, "  connection type:        {}", ct);
        }
        if !self.accepted {
            let _ = writeln!(out, "  command:                not accepted");
        }
        let _ = writeln!(out, "  duration (total):       {} ms", fmt_ms(self.total_ms));
        let _ = writeln!(
            out,
            "  duration (connection):  {} ms",
            fmt_ms(self.connection_ms)
        );
        let _ = writeln!(out, "  duration (setup):       {} ms", fmt_ms(self.setup_ms));
        if self.connect_only {
            return out;
        }
        let _ = writeln!(out, "  duration (stream only): {} ms", fmt_ms(self.echo_ms));
        let _ = writeln!(out, "  wrote: {} bytes", self.bytes_written);
        let _ = writeln!(
            out,
            "  read: {} bytes - throughput: {:.2} kBps / {:.2} Mbps",
            self.bytes_read, self.throughput_kbps, self.throughput_mbps
        );
        out
    }

    fn render_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("{}\n", json),
            Err(e) => {
                log::error!("Cannot serialize report: {}", e);
                String::new()
            }
        }
    }

    fn render_csv(&self) -> String {
        format!(
            "peer_id,mode,started_at,accepted,connection_type,data_size,\
             bytes_written,bytes_read,total_ms,connection_ms,setup_ms,echo_ms,\
             throughput_kbps,throughput_mbps\n\
             {},{},{},{},{},{},{},{},{},{},{},{},{:.3},{:.3}\n",
            self.peer_id,
            self.mode,
            self.started_at.to_rfc3339(),
            self.accepted,
            self.connection_type
                .map_or_else(String::new, |ct| ct.to_string()),
            self.data_size,
            self.bytes_written,
            self.bytes_read,
            fmt_opt(self.total_ms),
            fmt_opt(self.connection_ms),
            fmt_opt(self.setup_ms),
            fmt_opt(self.echo_ms),
            self.throughput_kbps,
            self.throughput_mbps,
        )
    }
}

fn fmt_ms(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{:.0}", x))
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(String::new, |x| format!("{:.3}", x))
}

/// Serializable echo peer summary.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PeerStats {
    pub sessions_accepted: u64,
    pub sessions_rejected: u64,
    pub bytes_echoed: u64,
    pub bytes_generated: u64,
    pub uptime_seconds: f64,
}

impl PeerStats {
    /// Prints the peer summary in the given format.
    pub fn print(&self, format: OutputFormat) {
        match format {
            OutputFormat::Text => self.print_text(),
            OutputFormat::Json => self.print_json(),
            OutputFormat::Csv => self.print_csv(),
        }
    }

    fn print_text(&self) {
        println!("\n--- Echo Peer Statistics ---");
        println!("Uptime: {:.1} seconds", self.uptime_seconds);
        println!("Sessions accepted: {}", self.sessions_accepted);
        println!("Sessions rejected: {}", self.sessions_rejected);
        println!("Bytes echoed: {}", self.bytes_echoed);
        println!("Bytes generated: {}", self.bytes_generated);
    }

    fn print_json(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    fn print_csv(&self) {
        println!("sessions_accepted,sessions_rejected,bytes_echoed,bytes_generated,uptime_seconds");
        println!(
            "{},{},{},{},{:.1}",
            self.sessions_accepted,
            self.sessions_rejected,
            self.bytes_echoed,
            self.bytes_generated,
            self.uptime_seconds,
        );
    }
}
