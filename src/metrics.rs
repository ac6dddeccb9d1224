//! Monotonic checkpoints of a test run and the figures derived from them.

use std::time::{Duration, Instant};

/// Points in a run at which a timestamp is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    SessionOpened,
    StreamOpened,
    /// Handshake accepted, exchange about to start.
    ExchangeStart,
    ExchangeEnd,
    StreamClosed,
    End,
}

/// Collects checkpoint timestamps for a single run.
#[derive(Debug, Clone)]
pub struct RunTimer {
    start: Instant,
    session_opened: Option<Instant>,
    stream_opened: Option<Instant>,
    exchange_start: Option<Instant>,
    exchange_end: Option<Instant>,
    stream_closed: Option<Instant>,
    end: Option<Instant>,
}

impl RunTimer {
    pub fn start() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        RunTimer {
            start,
            session_opened: None,
            stream_opened: None,
            exchange_start: None,
            exchange_end: None,
            stream_closed: None,
            end: None,
        }
    }

    pub fn mark(&mut self, checkpoint: Checkpoint) {
        self.mark_at(checkpoint, Instant::now());
    }

    pub fn mark_at(&mut self, checkpoint: Checkpoint, at: Instant) {
        let slot = match checkpoint {
            Checkpoint::SessionOpened => &mut self.session_opened,
            Checkpoint::StreamOpened => &mut self.stream_opened,
            Checkpoint::ExchangeStart => &mut self.exchange_start,
            Checkpoint::ExchangeEnd => &mut self.exchange_end,
            Checkpoint::StreamClosed => &mut self.stream_closed,
            Checkpoint::End => &mut self.end,
        };
        *slot = Some(at);
    }

    /// Durations between the checkpoints marked so far.
    pub fn durations(&self) -> Durations {
        Durations {
            total: between(Some(self.start), self.end),
            connection: between(self.session_opened, self.stream_closed),
            setup: between(self.session_opened, self.stream_opened),
            echo: between(self.exchange_start, self.exchange_end),
        }
    }
}

fn between(from: Option<Instant>, to: Option<Instant>) -> Option<Duration> {
    Some(to?.saturating_duration_since(from?))
}

/// Elapsed times of a run. `None` means a checkpoint was never reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Durations {
    /// Run start to run end.
    pub total: Option<Duration>,
    /// Session opened to stream closed.
    pub connection: Option<Duration>,
    /// Session opened to stream opened.
    pub setup: Option<Duration>,
    /// Exchange start to exchange end (stream only).
    pub echo: Option<Duration>,
}

/// Receive throughput over the exchange window.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct Throughput {
    pub kbytes_per_sec: f64,
    pub mbits_per_sec: f64,
}

impl Throughput {
    /// Throughput of `bytes` over `elapsed`; zero when nothing was timed.
    pub fn from_bytes(bytes: u64, elapsed: Option<Duration>) -> Self {
        let elapsed_ms = elapsed.map_or(0.0, as_millis_f64);
        if elapsed_ms <= 0.0 {
            return Throughput::default();
        }
        let kbytes_per_sec = (bytes as f64 * 1000.0 / elapsed_ms) / 1024.0;
        Throughput {
            kbytes_per_sec,
            mbits_per_sec: kbytes_per_sec * 8.0 / 1024.0,
        }
    }
}

pub fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
