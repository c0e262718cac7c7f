use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

/// Lifecycle event kinds recorded by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEventKind {
    /// Server was registered with the fleet
    Registered,
    /// Server was removed from the fleet
    Deregistered,
    /// Server was started
    Started,
    /// Server was stopped
    Stopped,
    /// Server process failed unexpectedly
    Failed,
    /// Server was restarted (operator or automatic)
    Restarted,
    /// Server entered maintenance
    MaintenanceEntered,
    /// Server left maintenance
    MaintenanceCleared,
    /// Server status changed for another reason (probe escalation etc.)
    StatusChanged,
}

/// One recorded lifecycle event
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    /// Event id
    pub event_id: Uuid,
    /// Server the event concerns
    pub server_id: String,
    /// Event kind
    pub kind: LifecycleEventKind,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event details
    pub details: Option<String>,
}

/// Bounded in-memory log of fleet lifecycle events.
///
/// Newest events evict the oldest once the cap is reached. This is a
/// debugging aid, not durable history.
pub struct EventLog {
    events: Mutex<VecDeque<LifecycleEvent>>,
    capacity: usize,
}

impl EventLog {
    /// Create a log holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Record an event.
    pub fn record(&self, server_id: &str, kind: LifecycleEventKind, details: Option<String>) {
        let event = LifecycleEvent {
            event_id: Uuid::new_v4(),
            server_id: server_id.to_string(),
            kind,
            timestamp: Utc::now(),
            details,
        };

        let mut events = self.events.lock().expect("event log lock poisoned");
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Recent events for one server, newest first.
    pub fn server_events(&self, server_id: &str, limit: Option<usize>) -> Vec<LifecycleEvent> {
        let events = self.events.lock().expect("event log lock poisoned");
        let mut out: Vec<LifecycleEvent> = events
            .iter()
            .filter(|e| e.server_id == server_id)
            .cloned()
            .collect();
        out.reverse();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        out
    }

    /// All recent events, newest first.
    pub fn all_events(&self, limit: Option<usize>) -> Vec<LifecycleEvent> {
        let events = self.events.lock().expect("event log lock poisoned");
        let mut out: Vec<LifecycleEvent> = events.iter().cloned().collect();
        out.reverse();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        out
    }

    /// Clear the log.
    pub fn clear(&self) {
        self.events.lock().expect("event log lock poisoned").clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bounded_and_newest_first() {
        let log = EventLog::new(3);
        for i in 0..5 {
            log.record("a", LifecycleEventKind::StatusChanged, Some(format!("{}", i)));
        }
        let events = log.all_events(None);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].details.as_deref(), Some("4"));
        assert_eq!(events[2].details.as_deref(), Some("2"));
    }

    #[test]
    fn server_filter_and_limit() {
        let log = EventLog::default();
        log.record("a", LifecycleEventKind::Started, None);
        log.record("b", LifecycleEventKind::Started, None);
        log.record("a", LifecycleEventKind::Stopped, None);

        let events = log.server_events("a", Some(1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, LifecycleEventKind::Stopped);
    }
}
