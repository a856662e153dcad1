//! Append-only trade history log.
//!
//! JSONL, one event per line, flushed on append. Events are never mutated
//! or deleted; audit views rebuild a trade's timeline by replaying the file
//! in timestamp order. Decisions never read this log; the trade's status
//! column is the decision surface.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Proposed,
    Accepted,
    Declined,
    Countered,
    CounterDeclined,
    CounterAccepted,
    RiskAssessed,
    RiskApproved,
    RiskDenied,
    HandoffConfirmed,
    Completed,
    Disputed,
    Cancelled,
    ModeratorResolved,
    ProofSubmitted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub ts: u64,
    pub trade_id: i64,
    pub action: HistoryAction,
    pub actor_id: Option<i64>,
    /// Set when the acting identity held moderator privilege.
    #[serde(default)]
    pub moderator: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct HistoryLog {
    file: Mutex<File>,
}

impl HistoryLog {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    pub fn append(&self, event: &HistoryEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
        let mut file = self.file.lock().expect("history lock poisoned");
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()
    }

    /// Read every event back, skipping lines that no longer parse.
    pub fn replay(path: &str) -> std::io::Result<Vec<HistoryEvent>> {
        if !Path::new(path).exists() {
            return Ok(vec![]);
        }
        let reader = BufReader::new(OpenOptions::new().read(true).open(path)?);
        Ok(reader
            .lines()
            .flatten()
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect())
    }

    /// A single trade's timeline in timestamp order.
    pub fn timeline(path: &str, trade_id: i64) -> std::io::Result<Vec<HistoryEvent>> {
        let mut events: Vec<HistoryEvent> = Self::replay(path)?
            .into_iter()
            .filter(|e| e.trade_id == trade_id)
            .collect();
        events.sort_by_key(|e| e.ts);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(trade_id: i64, ts: u64, action: HistoryAction) -> HistoryEvent {
        HistoryEvent {
            ts,
            trade_id,
            action,
            actor_id: Some(1),
            moderator: false,
            details: None,
        }
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let path = path.to_str().unwrap();

        let log = HistoryLog::open(path).unwrap();
        log.append(&event(1, 10, HistoryAction::Proposed)).unwrap();
        log.append(&event(2, 11, HistoryAction::Proposed)).unwrap();
        log.append(&event(1, 12, HistoryAction::Accepted)).unwrap();

        let all = HistoryLog::replay(path).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_timeline_filters_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let path = path.to_str().unwrap();

        let log = HistoryLog::open(path).unwrap();
        // out-of-order appends still replay as a sorted timeline
        log.append(&event(1, 20, HistoryAction::Accepted)).unwrap();
        log.append(&event(1, 10, HistoryAction::Proposed)).unwrap();
        log.append(&event(9, 15, HistoryAction::Proposed)).unwrap();

        let timeline = HistoryLog::timeline(path, 1).unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].action, HistoryAction::Proposed);
        assert_eq!(timeline[1].action, HistoryAction::Accepted);
    }

    #[test]
    fn test_missing_file_replays_empty() {
        assert!(HistoryLog::replay("/tmp/does-not-exist.history").unwrap().is_empty());
    }

    #[test]
    fn test_moderator_marker_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let path = path.to_str().unwrap();

        let log = HistoryLog::open(path).unwrap();
        let mut e = event(3, 30, HistoryAction::ModeratorResolved);
        e.moderator = true;
        e.details = Some("forced completion".to_string());
        log.append(&e).unwrap();

        let back = HistoryLog::replay(path).unwrap();
        assert!(back[0].moderator);
        assert_eq!(back[0].details.as_deref(), Some("forced completion"));
    }
}
