//! Durable goal store.
//!
//! Goals live in an in-memory map; the persisted file (a JSON array at
//! `<data_dir>/goals.json`) is the source of truth across restarts. Mutations
//! mark the store dirty and schedule a coalesced flush; writes go through a
//! locked temp file that is atomically renamed onto the live file, so a crash
//! mid-write never corrupts previously committed data.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;

use super::{Goal, GoalStatus, GoalUpdate, NewGoal};

const GOALS_FILE: &str = "goals.json";
const LOCK_ATTEMPTS: u32 = 5;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("could not acquire file lock after {LOCK_ATTEMPTS} attempts: {0}")]
    LockUnavailable(std::io::Error),
    #[error("batch create aborted at item {index}: {reason}")]
    Batch { index: usize, reason: String },
}

struct State {
    goals: HashMap<Uuid, Goal>,
    dirty: bool,
    pending_flush: Option<JoinHandle<()>>,
}

struct Inner {
    data_dir: PathBuf,
    goals_file: PathBuf,
    save_delay: Duration,
    state: Mutex<State>,
}

/// Handle to the goal store. Cheap to clone; all clones share one map and one
/// flush schedule.
#[derive(Clone)]
pub struct GoalStore {
    inner: Arc<Inner>,
}

impl GoalStore {
    /// Open the store, loading any previously persisted goals. A record that
    /// fails to parse is skipped with a warning; it never fails the load.
    pub fn open(data_dir: impl Into<PathBuf>, save_delay: Duration) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        let goals_file = data_dir.join(GOALS_FILE);
        let goals = load_goals(&goals_file)?;
        if !goals.is_empty() {
            info!(count = goals.len(), "Loaded goals from disk");
        }
        Ok(Self {
            inner: Arc::new(Inner {
                data_dir,
                goals_file,
                save_delay,
                state: Mutex::new(State {
                    goals,
                    dirty: false,
                    pending_flush: None,
                }),
            }),
        })
    }

    /// Create a single goal; persisted by the next coalesced flush.
    pub async fn create(&self, draft: NewGoal) -> Goal {
        let goal = Goal::create(draft);
        let mut state = self.inner.state.lock().await;
        state.goals.insert(goal.goal_id, goal.clone());
        self.schedule_flush(&mut state);
        debug!(goal_id = %goal.goal_id, name = %goal.name, "Created goal");
        goal
    }

    /// Create a batch of goals with one immediate flush. All-or-nothing: if
    /// validation or the flush fails, every goal inserted by this batch is
    /// removed from memory before the error is returned.
    pub async fn create_batch(&self, drafts: Vec<NewGoal>) -> Result<Vec<Goal>, StoreError> {
        for (index, draft) in drafts.iter().enumerate() {
            if draft.name.trim().is_empty() {
                return Err(StoreError::Batch {
                    index,
                    reason: "empty goal name".to_string(),
                });
            }
        }

        let mut state = self.inner.state.lock().await;
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let goal = Goal::create(draft);
            state.goals.insert(goal.goal_id, goal.clone());
            created.push(goal);
        }

        if let Err(e) = self.flush_locked(&mut state).await {
            warn!(count = created.len(), "Batch flush failed, rolling back inserts");
            for goal in &created {
                state.goals.remove(&goal.goal_id);
            }
            return Err(e);
        }

        info!(count = created.len(), "Created goal batch");
        Ok(created)
    }

    pub async fn get(&self, goal_id: Uuid) -> Option<Goal> {
        self.inner.state.lock().await.goals.get(&goal_id).cloned()
    }

    /// All goals, optionally filtered by scope and/or status.
    pub async fn list(&self, chat_id: Option<&str>, status: Option<GoalStatus>) -> Vec<Goal> {
        let state = self.inner.state.lock().await;
        state
            .goals
            .values()
            .filter(|g| chat_id.map_or(true, |c| g.chat_id == c))
            .filter(|g| status.map_or(true, |s| g.status == s))
            .cloned()
            .collect()
    }

    pub async fn active(&self, chat_id: Option<&str>) -> Vec<Goal> {
        self.list(chat_id, Some(GoalStatus::Active)).await
    }

    /// Active goals that are due to run now (interval elapsed, deadline not
    /// passed).
    pub async fn executable(&self) -> Vec<Goal> {
        let state = self.inner.state.lock().await;
        state
            .goals
            .values()
            .filter(|g| g.should_execute_now())
            .cloned()
            .collect()
    }

    /// Apply typed partial updates to a goal. Returns false when the goal does
    /// not exist.
    pub async fn update(&self, goal_id: Uuid, updates: &[GoalUpdate]) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(goal) = state.goals.get_mut(&goal_id) else {
            return false;
        };
        for update in updates {
            goal.apply(update);
        }
        self.schedule_flush(&mut state);
        debug!(goal_id = %goal_id, "Updated goal");
        true
    }

    pub async fn complete(&self, goal_id: Uuid) -> bool {
        self.update(
            goal_id,
            &[GoalUpdate::Status(GoalStatus::Completed), GoalUpdate::Progress(100)],
        )
        .await
    }

    pub async fn pause(&self, goal_id: Uuid) -> bool {
        self.update(goal_id, &[GoalUpdate::Status(GoalStatus::Paused)]).await
    }

    pub async fn resume(&self, goal_id: Uuid) -> bool {
        self.update(goal_id, &[GoalUpdate::Status(GoalStatus::Active)]).await
    }

    pub async fn cancel(&self, goal_id: Uuid) -> bool {
        self.update(goal_id, &[GoalUpdate::Status(GoalStatus::Cancelled)]).await
    }

    pub async fn delete(&self, goal_id: Uuid) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.goals.remove(&goal_id).is_some() {
            self.schedule_flush(&mut state);
            debug!(goal_id = %goal_id, "Deleted goal");
            true
        } else {
            false
        }
    }

    /// Stamp a goal as executed (bumps execution count).
    pub async fn mark_executed(&self, goal_id: Uuid) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(goal) = state.goals.get_mut(&goal_id) else {
            return false;
        };
        goal.mark_executed();
        self.schedule_flush(&mut state);
        true
    }

    /// Remove completed/cancelled goals created more than `days` ago. Goals in
    /// any other status are never removed by age.
    pub async fn cleanup_old(&self, days: i64) -> usize {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        let mut state = self.inner.state.lock().await;
        let before = state.goals.len();
        state.goals.retain(|_, g| {
            !(matches!(g.status, GoalStatus::Completed | GoalStatus::Cancelled)
                && g.created_at < cutoff)
        });
        let removed = before - state.goals.len();
        if removed > 0 {
            if let Err(e) = self.flush_locked(&mut state).await {
                error!("Flush after retention cleanup failed: {e}");
            }
            info!(removed, days, "Cleaned up old goals");
        }
        removed
    }

    /// Remove active schedule entries (goals carrying a time window) created
    /// before today. Intended to run more often than the days-based cleanup.
    pub async fn cleanup_expired_schedules(&self, clock: &Clock) -> usize {
        let today = clock.today();
        let mut state = self.inner.state.lock().await;
        let before = state.goals.len();
        state.goals.retain(|_, g| {
            !(g.status == GoalStatus::Active
                && g.time_window().is_some()
                && clock.date_of(g.created_at) < today)
        });
        let removed = before - state.goals.len();
        if removed > 0 {
            if let Err(e) = self.flush_locked(&mut state).await {
                error!("Flush after schedule cleanup failed: {e}");
            }
            info!(removed, "Cleaned up expired schedule entries");
        }
        removed
    }

    /// Grouped human-readable overview of all goals in a scope.
    pub async fn goals_summary(&self, chat_id: Option<&str>) -> String {
        let goals = self.list(chat_id, None).await;
        if goals.is_empty() {
            return "No goals yet".to_string();
        }
        let active: Vec<_> = goals.iter().filter(|g| g.status == GoalStatus::Active).collect();
        let paused: Vec<_> = goals.iter().filter(|g| g.status == GoalStatus::Paused).collect();
        let completed = goals.iter().filter(|g| g.status == GoalStatus::Completed).count();

        let mut lines = vec![format!("Goals ({} total)", goals.len())];
        if !active.is_empty() {
            lines.push(format!("Active ({}):", active.len()));
            for goal in &active {
                lines.push(goal.summary());
            }
        }
        if !paused.is_empty() {
            lines.push(format!("Paused ({}):", paused.len()));
            for goal in paused.iter().take(3) {
                lines.push(format!("  - {}", goal.name));
            }
        }
        if completed > 0 {
            lines.push(format!("Completed ({})", completed));
        }
        lines.join("\n")
    }

    /// Force any pending state to disk now.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock().await;
        self.flush_locked(&mut state).await
    }

    /// Cancel the pending coalesced flush and write synchronously if there is
    /// anything to write. Call on process termination.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(handle) = state.pending_flush.take() {
            handle.abort();
        }
        if state.dirty || !state.goals.is_empty() {
            if let Err(e) = self.flush_locked(&mut state).await {
                error!("Final flush on shutdown failed: {e}");
            } else {
                info!("Final flush on shutdown complete");
            }
        }
    }

    /// Mark dirty and (re)arm the delayed flush. Called with the state lock
    /// held; an earlier pending flush is cancelled so a mutation burst
    /// produces one write.
    fn schedule_flush(&self, state: &mut State) {
        state.dirty = true;
        if let Some(handle) = state.pending_flush.take() {
            handle.abort();
        }
        let store = self.clone();
        let delay = self.inner.save_delay;
        state.pending_flush = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = store.flush().await {
                error!("Coalesced flush failed: {e}");
            }
        }));
    }

    async fn flush_locked(&self, state: &mut State) -> Result<(), StoreError> {
        let goals: Vec<&Goal> = state.goals.values().collect();
        let payload = serde_json::to_vec_pretty(&goals)?;
        let data_dir = self.inner.data_dir.clone();
        let goals_file = self.inner.goals_file.clone();

        let result = tokio::task::spawn_blocking(move || {
            write_atomic(&data_dir, &goals_file, &payload)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;

        result?;
        state.dirty = false;
        debug!(count = state.goals.len(), "Persisted goals");
        Ok(())
    }
}

/// Write the payload to a temp file in `data_dir` under an exclusive advisory
/// lock, then atomically rename it onto `target`. The temp file is removed on
/// any failure; the previously committed file is never touched until the
/// rename.
fn write_atomic(data_dir: &Path, target: &Path, payload: &[u8]) -> Result<(), StoreError> {
    std::fs::create_dir_all(data_dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".goals_tmp_")
        .suffix(".json")
        .tempfile_in(data_dir)?;

    let mut attempt = 0;
    loop {
        match tmp.as_file().try_lock_exclusive() {
            Ok(()) => break,
            Err(e) => {
                attempt += 1;
                if attempt >= LOCK_ATTEMPTS {
                    return Err(StoreError::LockUnavailable(e));
                }
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
        }
    }

    let result = tmp
        .write_all(payload)
        .and_then(|_| tmp.as_file().sync_all());
    let _ = fs2::FileExt::unlock(tmp.as_file());
    result?;

    tmp.persist(target).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Load the goal file, skipping (and logging) records that fail to parse.
fn load_goals(path: &Path) -> anyhow::Result<HashMap<Uuid, Goal>> {
    let mut goals = HashMap::new();
    if !path.exists() {
        return Ok(goals);
    }
    let content = std::fs::read_to_string(path)?;
    let records: Vec<serde_json::Value> = serde_json::from_str(&content)?;
    for record in records {
        match serde_json::from_value::<Goal>(record) {
            Ok(goal) => {
                goals.insert(goal.goal_id, goal);
            }
            Err(e) => warn!("Skipping unparsable goal record: {e}"),
        }
    }
    Ok(goals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::GLOBAL_SCOPE;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, GoalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::open(dir.path(), Duration::from_millis(50)).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let (_dir, store) = temp_store();
        let goal = store.create(NewGoal::new("read", "study")).await;
        assert_eq!(store.get(goal.goal_id).await.unwrap().name, "read");
        assert!(store.delete(goal.goal_id).await);
        assert!(store.get(goal.goal_id).await.is_none());
        assert!(!store.delete(goal.goal_id).await);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (_dir, store) = temp_store();
        let mut draft = NewGoal::new("a", "study");
        draft.chat_id = "chat1".to_string();
        store.create(draft).await;
        store.create(NewGoal::new("b", "meal")).await;

        assert_eq!(store.list(Some("chat1"), None).await.len(), 1);
        assert_eq!(store.list(Some(GLOBAL_SCOPE), None).await.len(), 1);
        assert_eq!(store.list(None, Some(GoalStatus::Active)).await.len(), 2);
        assert_eq!(store.list(None, Some(GoalStatus::Paused)).await.len(), 0);
    }

    #[tokio::test]
    async fn test_update_and_status_helpers() {
        let (_dir, store) = temp_store();
        let goal = store.create(NewGoal::new("read", "study")).await;

        assert!(store.update(goal.goal_id, &[GoalUpdate::Progress(40)]).await);
        assert_eq!(store.get(goal.goal_id).await.unwrap().progress, 40);

        assert!(store.complete(goal.goal_id).await);
        let done = store.get(goal.goal_id).await.unwrap();
        assert_eq!(done.status, GoalStatus::Completed);
        assert_eq!(done.progress, 100);

        assert!(!store.update(Uuid::new_v4(), &[GoalUpdate::Progress(1)]).await);
    }

    #[tokio::test]
    async fn test_coalesced_flush_writes_once_then_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::open(dir.path(), Duration::from_millis(20)).unwrap();
        for i in 0..5 {
            store.create(NewGoal::new(format!("g{i}"), "custom")).await;
        }
        // Burst is inside the delay window; wait for the single coalesced write
        tokio::time::sleep(Duration::from_millis(120)).await;
        let content = std::fs::read_to_string(dir.path().join(GOALS_FILE)).unwrap();
        let records: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
        assert_eq!(records.len(), 5);
    }

    #[tokio::test]
    async fn test_reload_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
            let goal = store.create(NewGoal::new("persisted", "study")).await;
            store.shutdown().await;
            goal.goal_id
        };
        // Shutdown must have flushed despite the 60s coalescing delay
        let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        assert_eq!(store.get(id).await.unwrap().name, "persisted");
    }

    #[tokio::test]
    async fn test_batch_rollback_on_invalid_draft() {
        let (_dir, store) = temp_store();
        let drafts = vec![NewGoal::new("ok", "study"), NewGoal::new("  ", "study")];
        let err = store.create_batch(drafts).await.unwrap_err();
        assert!(matches!(err, StoreError::Batch { index: 1, .. }));
        assert!(store.list(None, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_flushes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        let created = store
            .create_batch(vec![NewGoal::new("a", "study"), NewGoal::new("b", "meal")])
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        // No waiting on the coalescing delay: the file is already there
        let content = std::fs::read_to_string(dir.path().join(GOALS_FILE)).unwrap();
        let records: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_old_respects_status_and_age() {
        let (_dir, store) = temp_store();
        let old_done = store.create(NewGoal::new("old done", "study")).await;
        let fresh_done = store.create(NewGoal::new("fresh done", "study")).await;
        let old_active = store.create(NewGoal::new("old active", "study")).await;
        store.complete(old_done.goal_id).await;
        store.complete(fresh_done.goal_id).await;

        // Backdate creation timestamps directly in the map
        {
            let mut state = store.inner.state.lock().await;
            state.goals.get_mut(&old_done.goal_id).unwrap().created_at =
                Utc::now() - ChronoDuration::days(31);
            state.goals.get_mut(&fresh_done.goal_id).unwrap().created_at =
                Utc::now() - ChronoDuration::days(29);
            state.goals.get_mut(&old_active.goal_id).unwrap().created_at =
                Utc::now() - ChronoDuration::days(100);
        }

        assert_eq!(store.cleanup_old(30).await, 1);
        assert!(store.get(old_done.goal_id).await.is_none());
        assert!(store.get(fresh_done.goal_id).await.is_some());
        assert!(store.get(old_active.goal_id).await.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_expired_schedules_only_past_days() {
        let (_dir, store) = temp_store();
        let clock = Clock::system();

        let mut draft = NewGoal::new("yesterday slot", "study");
        draft.parameters.insert("time_window".into(), json!([540, 660]));
        let stale = store.create(draft).await;

        let mut draft = NewGoal::new("today slot", "study");
        draft.parameters.insert("time_window".into(), json!([540, 660]));
        let current = store.create(draft).await;

        // Plain goal from yesterday without a window: not a schedule entry
        let plain = store.create(NewGoal::new("objective", "custom")).await;

        {
            let mut state = store.inner.state.lock().await;
            state.goals.get_mut(&stale.goal_id).unwrap().created_at =
                Utc::now() - ChronoDuration::days(1);
            state.goals.get_mut(&plain.goal_id).unwrap().created_at =
                Utc::now() - ChronoDuration::days(1);
        }

        assert_eq!(store.cleanup_expired_schedules(&clock).await, 1);
        assert!(store.get(stale.goal_id).await.is_none());
        assert!(store.get(current.goal_id).await.is_some());
        assert!(store.get(plain.goal_id).await.is_some());
    }

    #[tokio::test]
    async fn test_load_skips_bad_record() {
        let dir = tempfile::tempdir().unwrap();
        let goal = Goal::create(NewGoal::new("good", "study"));
        let payload = serde_json::to_string(&vec![
            serde_json::to_value(&goal).unwrap(),
            json!({"goal_id": "not-a-uuid", "name": 7}),
        ])
        .unwrap();
        std::fs::write(dir.path().join(GOALS_FILE), payload).unwrap();

        let store = GoalStore::open(dir.path(), Duration::from_millis(50)).unwrap();
        let goals = store.list(None, None).await;
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].name, "good");
    }

    #[tokio::test]
    async fn test_stale_temp_file_does_not_break_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
            store.create(NewGoal::new("committed", "study")).await;
            store.flush().await.unwrap();
        }
        // Simulate a crash that left a half-written temp file behind
        std::fs::write(dir.path().join(".goals_tmp_crash.json"), b"[{\"trunc").unwrap();

        let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        assert_eq!(store.list(None, None).await.len(), 1);
    }
}
