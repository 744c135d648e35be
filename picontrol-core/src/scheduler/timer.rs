//! Named interval timers

use crate::config::HubSettings;

/// Milliseconds from `since` to `now` on a wrapping clock
#[inline]
pub const fn elapsed(now_ms: u32, since_ms: u32) -> u32 {
    now_ms.wrapping_sub(since_ms)
}

/// Interval timer; an unarmed timer is due immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timer {
    interval_ms: u32,
    last_ms: Option<u32>,
}

impl Timer {
    pub const fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// Whether the interval has passed since the last rearm
    pub fn due(&self, now_ms: u32) -> bool {
        match self.last_ms {
            None => true,
            Some(last) => elapsed(now_ms, last) >= self.interval_ms,
        }
    }

    /// Start a new interval at `now_ms`
    pub fn rearm(&mut self, now_ms: u32) {
        self.last_ms = Some(now_ms);
    }

    /// Forget the last rearm so the timer is due again
    pub fn reset(&mut self) {
        self.last_ms = None;
    }

    /// Rearm and return true if due
    pub fn fire(&mut self, now_ms: u32) -> bool {
        if self.due(now_ms) {
            self.rearm(now_ms);
            true
        } else {
            false
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }
}

/// Timers kept per slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    /// Minimum spacing between detection samples
    Detect,
    /// GetProperties retry spacing
    PropertiesRetry,
    /// Keep-alive ping to ready modules
    Ping,
    /// Round-robin parameter polling
    Poll,
}

impl TimerId {
    const COUNT: usize = 4;

    const fn index(self) -> usize {
        match self {
            TimerId::Detect => 0,
            TimerId::PropertiesRetry => 1,
            TimerId::Ping => 2,
            TimerId::Poll => 3,
        }
    }
}

/// The set of named timers owned by one slot
#[derive(Debug, Clone)]
pub struct Scheduler {
    timers: [Timer; TimerId::COUNT],
}

impl Scheduler {
    pub fn new(settings: &HubSettings) -> Self {
        let mut timers = [Timer::new(0); TimerId::COUNT];
        timers[TimerId::Detect.index()] = Timer::new(settings.detect_debounce_ms);
        timers[TimerId::PropertiesRetry.index()] = Timer::new(settings.properties_retry_ms);
        timers[TimerId::Ping.index()] = Timer::new(settings.ping_interval_ms);
        timers[TimerId::Poll.index()] = Timer::new(settings.poll_interval_ms);
        Self { timers }
    }

    pub fn due(&self, id: TimerId, now_ms: u32) -> bool {
        self.timers[id.index()].due(now_ms)
    }

    pub fn rearm(&mut self, id: TimerId, now_ms: u32) {
        self.timers[id.index()].rearm(now_ms);
    }

    pub fn fire(&mut self, id: TimerId, now_ms: u32) -> bool {
        self.timers[id.index()].fire(now_ms)
    }

    pub fn reset(&mut self, id: TimerId) {
        self.timers[id.index()].reset();
    }

    /// Reset every timer, as after a removal
    pub fn reset_all(&mut self) {
        for timer in &mut self.timers {
            timer.reset();
        }
    }
}
