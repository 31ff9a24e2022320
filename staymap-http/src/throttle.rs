use reqwest::StatusCode;
use staymap_config::AutoThrottleConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Adaptive per-host request pacing.
///
/// Semantics:
/// - Each host gets a slot whose delay starts at `start_delay`.
/// - Requests to the same host are spaced by the slot's current delay; the
///   first request to a host goes out immediately.
/// - After every fresh response the delay moves halfway towards
///   `latency / target_concurrency`, never below that target, clamped to
///   `[min_delay, max_delay]`. Non-success responses may only raise it.
#[derive(Clone, Copy, Debug)]
pub struct ThrottleSettings {
    pub start_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub target_concurrency: f64,
}

impl From<&AutoThrottleConfig> for ThrottleSettings {
    fn from(cfg: &AutoThrottleConfig) -> Self {
        Self {
            start_delay: cfg.start_delay(),
            min_delay: cfg.min_delay(),
            max_delay: cfg.max_delay(),
            target_concurrency: cfg.target_concurrency,
        }
    }
}

#[derive(Debug)]
struct Slot {
    delay: Duration,
    next_at: Instant,
}

pub struct AutoThrottle {
    settings: ThrottleSettings,
    slots: Mutex<HashMap<String, Slot>>,
}

impl AutoThrottle {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            settings,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// `None` when pacing is switched off.
    pub fn from_config(cfg: &AutoThrottleConfig) -> Option<Self> {
        cfg.enabled.then(|| Self::new(ThrottleSettings::from(cfg)))
    }

    fn initial_delay(&self) -> Duration {
        self.settings.start_delay.max(self.settings.min_delay)
    }

    /// Wait until a request to `host` may be sent.
    pub async fn acquire(&self, host: &str) {
        let wait = self.reserve(host, Instant::now());
        if !wait.is_zero() {
            tracing::debug!(
                target: "throttle",
                host,
                wait_ms = wait.as_millis() as u64,
                "throttle.waiting"
            );
            sleep(wait).await;
        }
    }

    /// Book the next send slot for `host` and return how long to wait for it.
    fn reserve(&self, host: &str, now: Instant) -> Duration {
        let initial = self.initial_delay();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(host.to_string()).or_insert_with(|| Slot {
            delay: initial,
            next_at: now,
        });
        let send_at = slot.next_at.max(now);
        // Reserve the slot so concurrent callers queue up behind us
        slot.next_at = send_at + slot.delay;
        send_at.saturating_duration_since(now)
    }

    /// Feed back the latency of a fresh (non-cached) response.
    pub fn observe(&self, host: &str, latency: Duration, status: StatusCode) {
        let initial = self.initial_delay();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(host.to_string()).or_insert_with(|| Slot {
            delay: initial,
            next_at: Instant::now(),
        });
        let old = slot.delay;
        slot.delay = adjust_delay(&self.settings, old, latency, status.is_success());
        if slot.delay != old {
            tracing::debug!(
                target: "throttle",
                host,
                %status,
                latency_ms = latency.as_millis() as u64,
                old_delay_ms = old.as_millis() as u64,
                new_delay_ms = slot.delay.as_millis() as u64,
                "throttle.adjusted"
            );
        }
    }

    /// Current delay for `host`, or the start delay if it was never contacted.
    pub fn current_delay(&self, host: &str) -> Duration {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(host)
            .map(|s| s.delay)
            .unwrap_or_else(|| self.initial_delay())
    }
}

fn adjust_delay(
    settings: &ThrottleSettings,
    current: Duration,
    latency: Duration,
    success: bool,
) -> Duration {
    let target = latency.div_f64(settings.target_concurrency);
    let averaged = (current + target) / 2;
    let proposed = averaged
        .max(target)
        .max(settings.min_delay)
        .min(settings.max_delay);

    if !success && proposed <= current {
        return current;
    }
    proposed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ThrottleSettings {
        ThrottleSettings {
            start_delay: Duration::from_secs(5),
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_secs(60),
            target_concurrency: 1.0,
        }
    }

    #[test]
    fn delay_moves_halfway_towards_latency() {
        let next = adjust_delay(
            &settings(),
            Duration::from_secs(5),
            Duration::from_secs(1),
            true,
        );
        assert_eq!(next, Duration::from_secs(3));
    }

    #[test]
    fn delay_never_drops_below_latency_target() {
        let mut s = settings();
        s.target_concurrency = 0.5;
        // target = 2s / 0.5 = 4s, average of 1s and 4s = 2.5s
        let next = adjust_delay(&s, Duration::from_secs(1), Duration::from_secs(2), true);
        assert_eq!(next, Duration::from_secs(4));
    }

    #[test]
    fn delay_is_clamped_to_bounds() {
        let mut s = settings();
        s.max_delay = Duration::from_secs(10);
        let next = adjust_delay(&s, Duration::from_secs(8), Duration::from_secs(30), true);
        assert_eq!(next, Duration::from_secs(10));

        s.min_delay = Duration::from_secs(2);
        let next = adjust_delay(&s, Duration::from_secs(2), Duration::from_millis(10), true);
        assert_eq!(next, Duration::from_secs(2));
    }

    #[test]
    fn failures_cannot_speed_things_up() {
        let next = adjust_delay(
            &settings(),
            Duration::from_secs(5),
            Duration::from_millis(100),
            false,
        );
        assert_eq!(next, Duration::from_secs(5));

        let slower = adjust_delay(
            &settings(),
            Duration::from_secs(5),
            Duration::from_secs(20),
            false,
        );
        assert!(slower > Duration::from_secs(5));
    }

    #[test]
    fn first_request_is_immediate_then_spaced() {
        let throttle = AutoThrottle::new(settings());
        let now = Instant::now();
        assert_eq!(throttle.reserve("www.booking.com", now), Duration::ZERO);
        assert_eq!(
            throttle.reserve("www.booking.com", now),
            Duration::from_secs(5)
        );
        assert_eq!(
            throttle.reserve("www.booking.com", now),
            Duration::from_secs(10)
        );
        // other hosts have their own slot
        assert_eq!(throttle.reserve("example.com", now), Duration::ZERO);
    }

    #[test]
    fn observed_latency_updates_the_slot() {
        let throttle = AutoThrottle::new(settings());
        throttle.observe("www.booking.com", Duration::from_secs(1), StatusCode::OK);
        assert_eq!(
            throttle.current_delay("www.booking.com"),
            Duration::from_secs(3)
        );
        assert_eq!(throttle.current_delay("other"), Duration::from_secs(5));
    }

    #[test]
    fn disabled_config_yields_no_throttle() {
        let cfg = AutoThrottleConfig {
            enabled: false,
            ..AutoThrottleConfig::default()
        };
        assert!(AutoThrottle::from_config(&cfg).is_none());
    }
}
