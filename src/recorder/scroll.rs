//! Quiet-window coalescing of scroll bursts.

use std::time::Duration;
use tokio::time::Instant;

/// Last observed position of a scroll burst on one target
#[derive(Debug, Clone, PartialEq)]
pub struct SettledScroll {
    pub target: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
struct PendingScroll {
    settled: SettledScroll,
    deadline: Instant,
}

/// Holds at most one pending position per target. A target settles once no
/// scroll has been observed on it for the quiet window.
#[derive(Debug, Clone)]
pub struct ScrollCoalescer {
    quiet_window: Duration,
    pending: Vec<PendingScroll>,
}

impl ScrollCoalescer {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            quiet_window,
            pending: Vec::new(),
        }
    }

    pub fn observe(&mut self, target: &str, x: f64, y: f64, now: Instant) {
        let deadline = now + self.quiet_window;
        self.pending.retain(|p| p.settled.target != target);
        self.pending.push(PendingScroll {
            settled: SettledScroll {
                target: target.to_string(),
                x,
                y,
            },
            deadline,
        });
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.deadline).min()
    }

    /// Settled bursts whose deadline is at or before `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<SettledScroll> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.deadline <= now);
        self.pending = rest;
        due.sort_by_key(|p| p.deadline);
        due.into_iter().map(|p| p.settled).collect()
    }

    /// Every pending burst regardless of deadline, earliest first
    pub fn take_all(&mut self) -> Vec<SettledScroll> {
        let mut all: Vec<_> = self.pending.drain(..).collect();
        all.sort_by_key(|p| p.deadline);
        all.into_iter().map(|p| p.settled).collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_collapses_to_last_position() {
        let start = Instant::now();
        let mut c = ScrollCoalescer::new(Duration::from_millis(300));
        c.observe("html", 0.0, 10.0, start);
        c.observe("html", 0.0, 50.0, start + Duration::from_millis(100));
        c.observe("html", 0.0, 90.0, start + Duration::from_millis(250));

        assert!(c.take_due(start + Duration::from_millis(500)).is_empty());
        let due = c.take_due(start + Duration::from_millis(550));
        assert_eq!(
            due,
            vec![SettledScroll {
                target: "html".to_string(),
                x: 0.0,
                y: 90.0
            }]
        );
        assert!(c.is_empty());
    }

    #[test]
    fn test_targets_settle_independently() {
        let start = Instant::now();
        let mut c = ScrollCoalescer::new(Duration::from_millis(300));
        c.observe("#feed", 0.0, 100.0, start);
        c.observe("html", 0.0, 20.0, start + Duration::from_millis(200));
        assert_eq!(c.next_deadline(), Some(start + Duration::from_millis(300)));

        let first = c.take_due(start + Duration::from_millis(300));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].target, "#feed");

        let rest = c.take_all();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].target, "html");
        assert_eq!(c.next_deadline(), None);
    }
}
