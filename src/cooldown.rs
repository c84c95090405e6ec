//! Sign-in cooldown driven by upstream rate-limit responses.
//!
//! The deadline is an absolute Unix time in milliseconds so it survives a
//! restart unchanged; the countdown is always derived from it and "now".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const FALLBACK_WAIT_SECS: u64 = 60;
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

static SECONDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:seconds?|secs?)\b").expect("seconds pattern is valid")
});
static MINUTES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:minutes?|mins?)\b").expect("minutes pattern is valid")
});

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Wait duration announced in a rate-limit message, in seconds.
pub fn parse_wait_seconds(message: &str) -> u64 {
    if let Some(secs) = capture_number(&SECONDS_RE, message) {
        return secs;
    }
    if let Some(mins) = capture_number(&MINUTES_RE, message) {
        return mins.saturating_mul(60);
    }
    FALLBACK_WAIT_SECS
}

fn capture_number(re: &Regex, message: &str) -> Option<u64> {
    re.captures(message)?.get(1)?.as_str().parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Idle,
    Waiting { until_ms: i64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownTimer {
    until_ms: i64,
}

impl CooldownTimer {
    pub fn from_deadline(until_ms: i64) -> Self {
        Self {
            until_ms: until_ms.max(0),
        }
    }

    pub fn until_ms(&self) -> i64 {
        self.until_ms
    }

    pub fn state(&self, now_ms: i64) -> CooldownState {
        if now_ms >= self.until_ms {
            CooldownState::Idle
        } else {
            CooldownState::Waiting {
                until_ms: self.until_ms,
            }
        }
    }

    /// `max(0, ceil((until - now) / 1000))`.
    pub fn remaining_secs(&self, now_ms: i64) -> u64 {
        let diff = self.until_ms.saturating_sub(now_ms);
        if diff <= 0 {
            return 0;
        }
        (diff as u64).div_ceil(1000)
    }

    pub fn can_request(&self, now_ms: i64) -> bool {
        self.remaining_secs(now_ms) == 0
    }

    /// Overwrites the deadline from a rate-limit message (last write wins).
    /// Returns the wait in seconds.
    pub fn on_rate_limited(&mut self, message: &str, now_ms: i64) -> u64 {
        let wait = parse_wait_seconds(message);
        let wait_ms = i64::try_from(wait.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.until_ms = now_ms.max(0).saturating_add(wait_ms);
        wait
    }
}

/// Handle to the periodic countdown refresh. Stops on `cancel` or drop.
pub struct CooldownTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CooldownTicker {
    /// Calls `on_tick(now_ms)` every `period` until cancelled or the callback returns false.
    pub fn start<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut(i64) -> bool + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                thread::sleep(period);
                if flag.load(Ordering::Relaxed) {
                    break;
                }
                if !on_tick(now_ms()) {
                    break;
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn cancel(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Detach: the thread exits after its current sleep.
        self.handle.take();
    }
}

impl Drop for CooldownTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn minutes_pattern_only_after_seconds_miss() {
        assert_eq!(parse_wait_seconds("wait 2 minutes or 10 seconds"), 10);
        assert_eq!(parse_wait_seconds("wait 2 mins"), 120);
        assert_eq!(parse_wait_seconds("wait 5s"), FALLBACK_WAIT_SECS);
    }

    #[test]
    fn remaining_rounds_up_partial_seconds() {
        let timer = CooldownTimer::from_deadline(10_500);
        assert_eq!(timer.remaining_secs(10_000), 1);
        assert_eq!(timer.remaining_secs(9_499), 2);
        assert_eq!(timer.remaining_secs(10_500), 0);
        assert_eq!(timer.remaining_secs(20_000), 0);
    }

    #[test]
    fn negative_deadline_is_clamped() {
        assert_eq!(CooldownTimer::from_deadline(-5).until_ms(), 0);
    }

    #[test]
    fn ticker_stops_when_callback_declines() {
        let (tx, rx) = mpsc::channel();
        let ticker = CooldownTicker::start(Duration::from_millis(5), move |now| {
            let _ = tx.send(now);
            false
        });
        let first = rx.recv_timeout(Duration::from_secs(2)).expect("one tick");
        assert!(first > 0);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(ticker);
    }
}
