//! `SessionArtifactStore`: one instance per live session directory.
//!
//! Grounded on three teacher pieces: `sa_sessions::store::SessionStore`
//! (the read-modify-atomic-write-json shape), `sa_sessions::transcript::
//! TranscriptWriter` (append-only JSONL, one record per line,
//! `OpenOptions::new().append(true)`), and `sa_gateway::cli::pid::
//! write_pid_file` (the `fs2` `try_lock_exclusive()` single-writer lock,
//! including its "already running" error and its `tempfile::tempdir()`
//! test style). The temp-path-then-rename atomic write for `state.json`
//! has no teacher counterpart — added per §4.7.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use gambit_domain::error::{Error, Result};
use gambit_domain::trace::{TraceEvent, TraceSink};
use gambit_engine::SavedState;

const EVENTS_FILE: &str = "events.jsonl";
const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = ".lock";

/// A single session's on-disk artifacts: the event log, the latest state
/// snapshot, and the exclusive lock that marks it as live.
pub struct SessionArtifactStore {
    session_id: String,
    dir: PathBuf,
    state_path: PathBuf,
    events_path: PathBuf,
    lock_path: PathBuf,
    /// Held for the store's lifetime — dropping it releases the advisory
    /// lock even if `finalize` is never called.
    _lock: File,
    /// The state loaded at `acquire` time, if any (continuation only).
    initial_state: Option<SavedState>,
    /// Highest offset written so far; -1 means no events yet.
    highest_offset: Mutex<i64>,
    /// The most recent `onStateUpdate` snapshot, paired with the highest
    /// offset at the moment it was recorded — `persist_latest` never
    /// advances `lastAppliedOffset` past an offset written after the
    /// state it's about to persist was captured.
    pending: Mutex<Option<(SavedState, i64)>>,
}

impl SessionArtifactStore {
    /// Acquire a session directory for writing (§4.7 "Acquire"/"Open for
    /// continuation"). `in_memory_state`, when given, takes precedence
    /// over a persisted `state.json` on continuation.
    pub fn acquire(
        root_dir: &Path,
        session_id: &str,
        continue_session: bool,
        in_memory_state: Option<SavedState>,
    ) -> Result<Self> {
        let dir = root_dir.join(session_id);
        fs::create_dir_all(&dir)?;

        let state_path = dir.join(STATE_FILE);
        let events_path = dir.join(EVENTS_FILE);
        let lock_path = dir.join(LOCK_FILE);

        if !continue_session && (state_path.exists() || events_path.exists()) {
            return Err(Error::Artifact(format!(
                "session \"{session_id}\" already exists; pass continueSession=true to resume it"
            )));
        }

        let lock_file = OpenOptions::new().create(true).truncate(true).write(true).read(true).open(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(|_| {
            Error::Artifact(format!("session \"{session_id}\" is already active (lock held at {})", lock_path.display()))
        })?;
        {
            let mut f = &lock_file;
            writeln!(f, "{}", std::process::id())?;
            f.flush()?;
        }

        let mut highest: i64 = -1;
        if continue_session && events_path.exists() {
            highest = Self::validate_and_count(&events_path)?;
        }

        let initial_state = if !continue_session {
            None
        } else if in_memory_state.is_some() {
            in_memory_state
        } else if highest < 0 {
            None
        } else if state_path.exists() {
            let raw = fs::read_to_string(&state_path)?;
            Some(serde_json::from_str(&raw)?)
        } else {
            // Recovery (§4.7): continuing, state missing, events present.
            // Archive the log so the next run resumes cleanly from offset 0.
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
            let orphan_path = dir.join(format!("events.orphaned.{stamp}.jsonl"));
            fs::rename(&events_path, &orphan_path)?;
            tracing::warn!(
                session_id,
                archived = %orphan_path.display(),
                "state.json missing for a continued session with existing events; archived and reset the log"
            );
            highest = -1;
            None
        };

        Ok(SessionArtifactStore {
            session_id: session_id.to_string(),
            dir,
            state_path,
            events_path,
            lock_path,
            _lock: lock_file,
            initial_state,
            highest_offset: Mutex::new(highest),
            pending: Mutex::new(None),
        })
    }

    /// Read `events.jsonl` and confirm every line's `offset` is zero-based
    /// and dense; returns the highest offset found (-1 if empty).
    fn validate_and_count(events_path: &Path) -> Result<i64> {
        let raw = fs::read_to_string(events_path)?;
        let mut expected: i64 = 0;
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)?;
            let offset = value
                .get("offset")
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::Artifact(format!("events.jsonl line {} has no integer offset", lineno + 1)))?;
            if offset != expected {
                return Err(Error::Artifact(format!(
                    "events.jsonl offsets are not zero-based and dense: expected {expected}, found {offset} at line {}",
                    lineno + 1
                )));
            }
            expected += 1;
        }
        Ok(expected - 1)
    }

    /// The state a continued session should resume from, if any.
    pub fn initial_state(&self) -> Option<SavedState> {
        self.initial_state.clone()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one trace event (§4.7 "Append"). Assigns the next dense
    /// offset, stamps `createdAt`, and normalizes `type` into the
    /// `gambit.*` namespace (saving the original under
    /// `_gambit.source_type` when it wasn't already namespaced).
    pub fn append_event(&self, event: TraceEvent) -> Result<()> {
        let mut highest = self.highest_offset.lock();
        let offset = *highest + 1;

        let mut obj = match serde_json::to_value(&event)? {
            Value::Object(m) => m,
            other => {
                let mut m = Map::new();
                m.insert("value".to_string(), other);
                m
            }
        };

        let original_type = obj.get("event").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let normalized = if original_type.starts_with("gambit.") { original_type.clone() } else { format!("gambit.{original_type}") };
        obj.insert("event".to_string(), Value::String(normalized));
        obj.insert("_gambit.source_type".to_string(), Value::String(original_type));
        obj.insert("offset".to_string(), Value::from(offset));
        obj.insert("createdAt".to_string(), Value::String(Utc::now().to_rfc3339()));

        let line = serde_json::to_string(&Value::Object(obj))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.events_path)?;
        writeln!(file, "{line}")?;

        *highest = offset;
        Ok(())
    }

    /// Record a state snapshot for a later `persist_latest` (§4.6.4,
    /// §4.7 "Append" — `onStateUpdate` records but doesn't write).
    pub fn record_state(&self, state: &SavedState) {
        let offset = *self.highest_offset.lock();
        *self.pending.lock() = Some((state.clone(), offset));
    }

    /// Write `state.json` atomically: serialize to `.tmp-state.json-<nonce>`
    /// and rename over the real path (§4.7 "Persist snapshot"). A no-op if
    /// `record_state` was never called since the last persist.
    pub fn persist_latest(&self) -> Result<()> {
        let pending = self.pending.lock().take();
        let Some((mut state, offset)) = pending else {
            return Ok(());
        };

        state.meta.insert("sessionId".to_string(), Value::String(self.session_id.clone()));
        state.meta.insert("sessionDir".to_string(), Value::String(self.dir.display().to_string()));
        state.meta.insert("sessionStatePath".to_string(), Value::String(self.state_path.display().to_string()));
        state.meta.insert("sessionEventsPath".to_string(), Value::String(self.events_path.display().to_string()));
        state.meta.insert("lastAppliedOffset".to_string(), Value::from(offset));
        state.meta.insert("lastAppliedEventSeq".to_string(), Value::from(offset));

        let bytes = serde_json::to_vec_pretty(&state)?;
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let tmp_path = self.dir.join(format!(".tmp-state.json-{nonce}"));
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &self.state_path)?;
        Ok(())
    }

    /// Remove `.lock` (ignore missing) — §4.7 "Finalize". The advisory
    /// lock itself is released when `self` drops regardless.
    pub fn finalize(&self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(session_id = %self.session_id, error = %e, "failed to remove session lock file");
            }
        }
    }
}

/// Delivery is best-effort and must never propagate back into a run
/// (`TraceSink`'s contract) — I/O failures are logged and swallowed.
impl TraceSink for SessionArtifactStore {
    fn emit(&self, event: TraceEvent) {
        if let Err(e) = self.append_event(event) {
            tracing::error!(session_id = %self.session_id, error = %e, "failed to append trace event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_domain::tool::Message;

    fn state_with(run_id: &str, text: &str) -> SavedState {
        let mut s = SavedState::new(run_id);
        s.messages.push(Message::user(text.to_string()));
        s
    }

    #[test]
    fn acquire_rejects_existing_session_without_continue() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionArtifactStore::acquire(dir.path(), "s1", false, None).unwrap();
        store.append_event(TraceEvent::RunStart { run_id: "s1".into(), deck_path: "/root.md".into() }).unwrap();
        drop(store);

        let err = SessionArtifactStore::acquire(dir.path(), "s1", false, None).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn second_acquire_without_dropping_the_first_fails_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let _first = SessionArtifactStore::acquire(dir.path(), "s1", false, None).unwrap();
        let err = SessionArtifactStore::acquire(dir.path(), "s1", true, None).unwrap_err();
        assert!(err.to_string().contains("already active"));
    }

    #[test]
    fn offsets_are_dense_and_zero_based() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionArtifactStore::acquire(dir.path(), "s1", false, None).unwrap();
        store.append_event(TraceEvent::RunStart { run_id: "s1".into(), deck_path: "/root.md".into() }).unwrap();
        store
            .append_event(TraceEvent::RunEnd { run_id: "s1".into(), ok: true, error: None })
            .unwrap();

        let raw = fs::read_to_string(dir.path().join("s1").join(EVENTS_FILE)).unwrap();
        let lines: Vec<Value> = raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines[0]["offset"], 0);
        assert_eq!(lines[1]["offset"], 1);
        assert_eq!(lines[0]["event"], "gambit.run.start");
        assert_eq!(lines[0]["_gambit.source_type"], "run.start");
    }

    #[test]
    fn persist_latest_writes_meta_and_never_exceeds_highest_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionArtifactStore::acquire(dir.path(), "s1", false, None).unwrap();
        store.append_event(TraceEvent::RunStart { run_id: "s1".into(), deck_path: "/root.md".into() }).unwrap();
        store.record_state(&state_with("s1", "hi"));
        store.append_event(TraceEvent::RunEnd { run_id: "s1".into(), ok: true, error: None }).unwrap();
        store.persist_latest().unwrap();

        let raw = fs::read_to_string(dir.path().join("s1").join(STATE_FILE)).unwrap();
        let saved: SavedState = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved.meta["lastAppliedOffset"], 0);
        assert_eq!(saved.meta["sessionId"], "s1");
    }

    #[test]
    fn persist_latest_is_a_no_op_without_a_pending_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionArtifactStore::acquire(dir.path(), "s1", false, None).unwrap();
        store.persist_latest().unwrap();
        assert!(!dir.path().join("s1").join(STATE_FILE).exists());
    }

    #[test]
    fn continuation_recovers_when_state_is_missing_but_events_exist() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionArtifactStore::acquire(dir.path(), "s1", false, None).unwrap();
            store.append_event(TraceEvent::RunStart { run_id: "s1".into(), deck_path: "/root.md".into() }).unwrap();
        }

        let store = SessionArtifactStore::acquire(dir.path(), "s1", true, None).unwrap();
        assert!(store.initial_state().is_none());
        assert!(!dir.path().join("s1").join(EVENTS_FILE).exists());
        let orphaned = fs::read_dir(dir.path().join("s1"))
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("events.orphaned."));
        assert!(orphaned);
    }

    #[test]
    fn continuation_rejects_non_dense_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let session_dir = dir.path().join("s1");
        fs::create_dir_all(&session_dir).unwrap();
        fs::write(session_dir.join(EVENTS_FILE), "{\"offset\":0,\"event\":\"x\"}\n{\"offset\":2,\"event\":\"y\"}\n").unwrap();

        let err = SessionArtifactStore::acquire(dir.path(), "s1", true, None).unwrap_err();
        assert!(err.to_string().contains("not zero-based and dense"));
    }

    #[test]
    fn in_memory_state_wins_over_persisted_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionArtifactStore::acquire(dir.path(), "s1", false, None).unwrap();
            store.append_event(TraceEvent::RunStart { run_id: "s1".into(), deck_path: "/root.md".into() }).unwrap();
            store.record_state(&state_with("s1", "from disk"));
            store.persist_latest().unwrap();
        }

        let supplied = state_with("s1", "from memory");
        let store = SessionArtifactStore::acquire(dir.path(), "s1", true, Some(supplied)).unwrap();
        let resumed = store.initial_state().unwrap();
        match &resumed.messages[0] {
            Message::User { content } => assert_eq!(content, "from memory"),
            _ => panic!("expected user message"),
        }
    }

    #[test]
    fn finalize_removes_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionArtifactStore::acquire(dir.path(), "s1", false, None).unwrap();
        let lock_path = dir.path().join("s1").join(LOCK_FILE);
        assert!(lock_path.exists());
        store.finalize();
        assert!(!lock_path.exists());
    }
}
