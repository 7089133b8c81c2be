use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// What fired: a repeating timer or a one-shot alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiredKind {
    Timer,
    Alert,
}

/// One timer or alert firing, returned in the order it fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub kind: FiredKind,
}

pub(crate) enum ScheduleKind {
    Timer { interval: Duration },
    Alert,
}

pub(crate) struct ScheduledEntry {
    pub(crate) next_trigger: DateTime<Utc>,
    pub(crate) kind: ScheduleKind,
    pub(crate) seq: u64,
    pub(crate) callback: Box<dyn FnMut() + Send>,
}

/// Fire every registered entry whose `next_trigger` is `<= target`, in ascending
/// `(next_trigger, seq)` order (seq breaks ties by registration order), repeatedly until none
/// remain due. Timers are rescheduled to `next_trigger + interval` and kept registered; alerts
/// fire once and are removed. Returns the ordered list of what fired.
pub(crate) fn fire_due(
    entries: &mut HashMap<String, ScheduledEntry>,
    target: DateTime<Utc>,
) -> Vec<FiredEvent> {
    let mut fired = Vec::new();

    loop {
        let next_name = entries
            .iter()
            .filter(|(_, entry)| entry.next_trigger <= target)
            .min_by_key(|(_, entry)| (entry.next_trigger, entry.seq))
            .map(|(name, _)| name.clone());

        let Some(name) = next_name else {
            break;
        };

        let mut entry = entries.remove(&name).expect("name just observed in map");
        let fired_at = entry.next_trigger;
        (entry.callback)();

        let kind_tag = match &entry.kind {
            ScheduleKind::Timer { .. } => FiredKind::Timer,
            ScheduleKind::Alert => FiredKind::Alert,
        };
        fired.push(FiredEvent {
            name: name.clone(),
            timestamp: fired_at,
            kind: kind_tag,
        });

        let reschedule_interval = match &entry.kind {
            ScheduleKind::Timer { interval } => Some(*interval),
            ScheduleKind::Alert => None,
        };
        if let Some(interval) = reschedule_interval {
            entry.next_trigger = fired_at + interval;
            entries.insert(name, entry);
        }
    }

    fired
}
