pub const SAMPLE_INTERVAL_US: u64 = 1_000;

/// A link is reported offline only after being not-ready for longer than this.
pub const OFFLINE_AFTER_US: u64 = 50_000;

/// Debounces the ready state of a HID interface.
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    last_sample_us: Option<u64>,
    not_ready_since: Option<u64>,
    online: bool,
}

impl LinkMonitor {
    pub fn new() -> Self {
        Self {
            last_sample_us: None,
            not_ready_since: None,
            online: true,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Returns `true` when the link just came back online.
    pub fn sample(&mut self, now_us: u64, ready: bool) -> bool {
        if let Some(last) = self.last_sample_us {
            if now_us.saturating_sub(last) < SAMPLE_INTERVAL_US {
                return false;
            }
        }
        self.last_sample_us = Some(now_us);

        if ready {
            self.not_ready_since = None;
            let recovered = !self.online;
            self.online = true;
            return recovered;
        }

        let since = *self.not_ready_since.get_or_insert(now_us);
        if now_us - since > OFFLINE_AFTER_US {
            self.online = false;
        }
        false
    }
}

impl Default for LinkMonitor {
    fn default() -> Self {
        Self::new()
    }
}
