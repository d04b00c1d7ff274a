use std::collections::HashSet;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::models::{DedupKey, TimelineEvent};

/// What happened to one pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub appended: bool,
    /// The event's action is in the watch set; the caller should re-read the
    /// agent snapshot.
    pub refresh_required: bool,
}

/// Sole writer of the displayed timeline.
///
/// The timeline is the fetched history followed by pushed events in arrival
/// order. Entries are never reordered or removed.
pub struct TimelineReconciler {
    timeline: watch::Sender<Vec<TimelineEvent>>,
    deduplicate: bool,
    /// Keys of everything in the timeline. Only tracked with `deduplicate`.
    seen: HashSet<DedupKey>,
}

impl TimelineReconciler {
    pub fn new(history: Vec<TimelineEvent>, deduplicate: bool) -> Self {
        let seen = if deduplicate {
            history.iter().map(TimelineEvent::dedup_key).collect()
        } else {
            HashSet::new()
        };
        let (timeline, _rx) = watch::channel(history);
        Self {
            timeline,
            deduplicate,
            seen,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<TimelineEvent>> {
        self.timeline.subscribe()
    }

    pub fn len(&self) -> usize {
        self.timeline.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ingest(&mut self, event: TimelineEvent) -> IngestOutcome {
        let refresh_required = event.requires_snapshot_refresh();

        if self.deduplicate && !self.seen.insert(event.dedup_key()) {
            debug!(
                action = %event.action,
                step = event.step,
                timestamp = %event.timestamp,
                "Dropping redelivered event"
            );
            return IngestOutcome {
                appended: false,
                refresh_required: false,
            };
        }

        trace!(action = %event.action, step = event.step, "Appending pushed event");
        self.timeline.send_modify(|timeline| timeline.push(event));

        IngestOutcome {
            appended: true,
            refresh_required,
        }
    }

    /// Appends events from a re-fetched history that this view has not seen
    /// yet, keeping their server order. Returns how many were added.
    pub fn merge_history(&mut self, history: Vec<TimelineEvent>) -> usize {
        if !self.deduplicate {
            self.seen = self
                .timeline
                .borrow()
                .iter()
                .map(TimelineEvent::dedup_key)
                .collect();
        }

        let fresh: Vec<TimelineEvent> = history
            .into_iter()
            .filter(|event| self.seen.insert(event.dedup_key()))
            .collect();

        let added = fresh.len();
        if added > 0 {
            self.timeline.send_modify(|timeline| timeline.extend(fresh));
        }
        if !self.deduplicate {
            self.seen = HashSet::new();
        }
        debug!(added, total = self.len(), "Merged re-fetched history");
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentStatus;

    fn event(ts: &str, action: &str, step: u64) -> TimelineEvent {
        TimelineEvent::new(ts, action, AgentStatus::Running, step)
    }

    #[test]
    fn test_history_then_pushes_in_arrival_order() {
        let history = vec![event("t1", "agent_created", 0), event("t2", "agent_started", 0)];
        let mut reconciler = TimelineReconciler::new(history, false);
        let rx = reconciler.subscribe();

        reconciler.ingest(event("t3", "llm_call", 1));
        reconciler.ingest(event("t4", "tool_use", 2));

        let actions: Vec<String> = rx.borrow().iter().map(|e| e.action.clone()).collect();
        assert_eq!(actions, ["agent_created", "agent_started", "llm_call", "tool_use"]);
    }

    #[test]
    fn test_refresh_required_only_for_watch_set() {
        let mut reconciler = TimelineReconciler::new(Vec::new(), false);

        let outcome = reconciler.ingest(event("t1", "llm_call", 1));
        assert!(outcome.appended);
        assert!(!outcome.refresh_required);

        let outcome = reconciler.ingest(event("t2", "agent_failed", 1));
        assert!(outcome.appended);
        assert!(outcome.refresh_required);
    }

    #[test]
    fn test_duplicates_kept_without_dedup() {
        let mut reconciler = TimelineReconciler::new(vec![event("t1", "llm_call", 1)], false);
        let outcome = reconciler.ingest(event("t1", "llm_call", 1));
        assert!(outcome.appended);
        assert_eq!(reconciler.len(), 2);
        assert!(reconciler.seen.is_empty());
    }

    #[test]
    fn test_duplicates_dropped_with_dedup() {
        let mut reconciler = TimelineReconciler::new(vec![event("t1", "agent_completed", 3)], true);
        let outcome = reconciler.ingest(event("t1", "agent_completed", 3));
        assert!(!outcome.appended);
        assert!(!outcome.refresh_required);
        assert_eq!(reconciler.len(), 1);

        // Same action at another step is a different event.
        assert!(reconciler.ingest(event("t1", "agent_completed", 4)).appended);
    }

    #[test]
    fn test_merge_history_appends_only_unseen() {
        let mut reconciler =
            TimelineReconciler::new(vec![event("t1", "agent_started", 0)], false);
        reconciler.ingest(event("t2", "llm_call", 1));

        let added = reconciler.merge_history(vec![
            event("t1", "agent_started", 0),
            event("t2", "llm_call", 1),
            event("t3", "tool_use", 2),
            event("t4", "llm_call", 3),
        ]);

        assert_eq!(added, 2);
        let rx = reconciler.subscribe();
        let steps: Vec<u64> = rx.borrow().iter().map(|e| e.step).collect();
        assert_eq!(steps, [0, 1, 2, 3]);
        assert!(reconciler.seen.is_empty());
    }

    #[test]
    fn test_merge_history_with_dedup_keeps_keys() {
        let mut reconciler = TimelineReconciler::new(vec![event("t1", "agent_started", 0)], true);
        assert_eq!(reconciler.merge_history(vec![event("t2", "llm_call", 1)]), 1);

        // A late push of an event the resync already delivered is dropped.
        assert!(!reconciler.ingest(event("t2", "llm_call", 1)).appended);
        assert_eq!(reconciler.len(), 2);
    }
}
