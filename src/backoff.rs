use std::thread;
use std::time::Duration;

const SPIN_LIMIT: u32 = 64;
const YIELD_LIMIT: u32 = 128;
const MAX_SLEEP: Duration = Duration::from_millis(1);

/// Bounded wait between polls of a non-blocking transport.
///
/// Spins first, then yields the thread, then sleeps with a doubling delay
/// capped at one millisecond. Any progress should call [`Backoff::reset`].
#[derive(Debug, Default)]
pub struct Backoff {
    idle: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Backoff { idle: 0 }
    }

    pub fn reset(&mut self) {
        self.idle = 0;
    }

    pub fn wait(&mut self) {
        if self.idle < SPIN_LIMIT {
            std::hint::spin_loop();
        } else if self.idle < YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(self.sleep_time());
        }
        self.idle = self.idle.saturating_add(1);
    }

    fn sleep_time(&self) -> Duration {
        let exp = (self.idle.saturating_sub(YIELD_LIMIT)).min(10);
        Duration::from_micros(1u64 << exp).min(MAX_SLEEP)
    }
}
