/// Trailing-edge debounce for expensive snapshot refreshes.
///
/// Requests inside the debounce window collapse into one fire. A request that
/// lands while a refresh is in flight is queued and fires once after
/// [`RefreshCoalescer::complete`].
#[derive(Debug, Clone)]
pub struct RefreshCoalescer {
    debounce_ms: i64,
    due_at: Option<i64>,
    in_flight: bool,
    queued: bool,
}

impl RefreshCoalescer {
    pub fn new(debounce_ms: i64) -> Self {
        Self {
            debounce_ms: debounce_ms.max(0),
            due_at: None,
            in_flight: false,
            queued: false,
        }
    }

    pub fn request(&mut self, now_ms: i64) {
        if self.in_flight {
            self.queued = true;
        } else {
            self.due_at = Some(now_ms + self.debounce_ms);
        }
    }

    /// True exactly when the caller should start a refresh now.
    pub fn poll(&mut self, now_ms: i64) -> bool {
        match self.due_at {
            Some(due) if !self.in_flight && now_ms >= due => {
                self.due_at = None;
                self.in_flight = true;
                true
            }
            _ => false,
        }
    }

    pub fn complete(&mut self, now_ms: i64) {
        self.in_flight = false;
        if std::mem::take(&mut self.queued) {
            self.due_at = Some(now_ms + self.debounce_ms);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some() || self.queued
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_fires_once_after_quiet_period() {
        let mut c = RefreshCoalescer::new(150);
        for t in (0..1_000).step_by(50) {
            c.request(t);
            assert!(!c.poll(t));
        }
        assert!(!c.poll(1_000));
        assert!(c.poll(1_100));
        assert!(!c.poll(1_200));
        c.complete(1_250);
        assert!(!c.is_pending());
        assert!(!c.poll(5_000));
    }

    #[test]
    fn request_during_flight_fires_a_trailing_refresh() {
        let mut c = RefreshCoalescer::new(100);
        c.request(0);
        assert!(c.poll(100));
        c.request(120);
        c.request(130);
        assert!(!c.poll(400));
        c.complete(500);
        assert!(c.is_pending());
        assert!(!c.poll(550));
        assert!(c.poll(600));
        c.complete(650);
        assert!(!c.is_pending());
    }
}
