//! Schedule resolution with a read-through cache.
//!
//! Answers "what is the bot doing right now, and what comes next" from the
//! goal store. Results are cached per scope, day and 15-minute bucket: fine
//! enough that a window change is picked up promptly, coarse enough that a
//! message burst hits the cache. Empty answers are cached too, so a scope
//! with no schedule does not re-scan the store on every message.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::Clock;
use crate::goals::{GoalStore, GLOBAL_SCOPE};
use crate::timewindow;

const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentActivity {
    pub name: String,
    pub description: String,
    pub activity_type: String,
    /// Canonical window bounds, minutes of day.
    pub start_minutes: u32,
    pub end_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingActivity {
    pub start_minutes: u32,
    /// Start time rendered as "HH:MM".
    pub start: String,
    pub name: String,
}

/// What the agenda says about this moment: the activity in progress (if any)
/// plus everything still ahead of now, ordered by start time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    pub current: Option<CurrentActivity>,
    pub upcoming: Vec<UpcomingActivity>,
}

impl ScheduleSnapshot {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.upcoming.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    scope: String,
    day: u32,
    bucket: u32,
}

struct CacheEntry {
    snapshot: ScheduleSnapshot,
    cached_at: Instant,
}

struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    // Insertion/refresh order for LRU eviction
    order: Vec<CacheKey>,
    last_sweep: Instant,
}

pub struct ScheduleResolver {
    store: GoalStore,
    clock: Clock,
    ttl: Duration,
    max_size: usize,
    cache: Mutex<CacheState>,
}

impl ScheduleResolver {
    pub fn new(store: GoalStore, clock: Clock, ttl: Duration, max_size: usize) -> Self {
        Self {
            store,
            clock,
            ttl,
            max_size: max_size.max(1),
            cache: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: Vec::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Resolve the snapshot for a scope, serving from cache when fresh.
    pub async fn resolve(&self, scope: &str) -> ScheduleSnapshot {
        let key = CacheKey {
            scope: scope.to_string(),
            day: self.clock.day_key(),
            bucket: self.clock.minute_of_day() / 15,
        };

        if let Some(snapshot) = self.lookup(&key) {
            return snapshot;
        }

        let snapshot = self.build_snapshot(scope).await;
        self.insert(key, snapshot.clone());
        snapshot
    }

    /// Drop all cached snapshots. Called after schedule generation so the new
    /// entries are visible immediately.
    pub fn invalidate(&self) {
        let mut state = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
        state.order.clear();
    }

    fn lookup(&self, key: &CacheKey) -> Option<ScheduleSnapshot> {
        let mut state = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if state.last_sweep.elapsed() > SWEEP_INTERVAL {
            let ttl = self.ttl;
            state.entries.retain(|_, e| e.cached_at.elapsed() <= ttl);
            let live: Vec<CacheKey> = state
                .order
                .iter()
                .filter(|k| state.entries.contains_key(*k))
                .cloned()
                .collect();
            state.order = live;
            state.last_sweep = Instant::now();
        }

        let entry = state.entries.get(key)?;
        if entry.cached_at.elapsed() > self.ttl {
            state.entries.remove(key);
            state.order.retain(|k| k != key);
            return None;
        }
        let snapshot = entry.snapshot.clone();
        // Refresh LRU position
        state.order.retain(|k| k != key);
        state.order.push(key.clone());
        Some(snapshot)
    }

    fn insert(&self, key: CacheKey, snapshot: ScheduleSnapshot) {
        let mut state = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        while state.order.len() >= self.max_size {
            let oldest = state.order.remove(0);
            state.entries.remove(&oldest);
        }
        state.order.retain(|k| k != &key);
        state.order.push(key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                snapshot,
                cached_at: Instant::now(),
            },
        );
    }

    /// Query the store and compute the snapshot for this moment.
    ///
    /// Global goals take precedence: only when the global scope has no active
    /// goals is the chat-local scope consulted. The current activity must come
    /// from a window created today (newest creation wins on overlap); upcoming
    /// entries are any windows starting later than now.
    async fn build_snapshot(&self, scope: &str) -> ScheduleSnapshot {
        let mut goals = self.store.active(Some(GLOBAL_SCOPE)).await;
        if goals.is_empty() && scope != GLOBAL_SCOPE {
            goals = self.store.active(Some(scope)).await;
        }
        if goals.is_empty() {
            return ScheduleSnapshot::default();
        }

        let now = self.clock.minute_of_day();
        let today = self.clock.today();

        let mut windows: Vec<(u32, u32, bool, &crate::goals::Goal)> = Vec::new();
        for goal in &goals {
            let Some(raw) = goal.time_window() else {
                continue;
            };
            let Some((start, end)) = timewindow::resolve(&raw) else {
                continue;
            };
            let is_today = self.clock.date_of(goal.created_at) == today;
            windows.push((start, end, is_today, goal));
        }
        if windows.is_empty() {
            return ScheduleSnapshot::default();
        }
        windows.sort_by_key(|(start, _, _, _)| *start);

        let mut current: Option<(u32, u32, &crate::goals::Goal)> = None;
        for (start, end, is_today, goal) in &windows {
            if !is_today || !timewindow::contains(*start, *end, now) {
                continue;
            }
            // Newest creation wins when windows overlap
            match current {
                Some((_, _, existing)) if existing.created_at >= goal.created_at => {}
                _ => current = Some((*start, *end, goal)),
            }
        }

        let upcoming = windows
            .iter()
            .filter(|(start, _, _, _)| *start > now)
            .map(|(start, _, _, goal)| UpcomingActivity {
                start_minutes: *start,
                start: timewindow::format_minutes(*start),
                name: goal.name.clone(),
            })
            .collect();

        let snapshot = ScheduleSnapshot {
            current: current.map(|(start, end, goal)| CurrentActivity {
                name: goal.name.clone(),
                description: goal.description.clone(),
                activity_type: goal.goal_type.clone(),
                start_minutes: start,
                end_minutes: end,
            }),
            upcoming,
        };
        debug!(
            scope,
            current = snapshot.current.as_ref().map(|c| c.name.as_str()),
            upcoming = snapshot.upcoming.len(),
            "Resolved schedule snapshot"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::NewGoal;
    use serde_json::json;

    fn schedule_draft(name: &str, window: [i64; 2]) -> NewGoal {
        let mut draft = NewGoal::new(name, "study");
        draft.parameters.insert("time_window".into(), json!(window));
        draft
    }

    async fn resolver_with(drafts: Vec<NewGoal>) -> (tempfile::TempDir, ScheduleResolver) {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::open(dir.path(), Duration::from_millis(50)).unwrap();
        for draft in drafts {
            store.create(draft).await;
        }
        let resolver =
            ScheduleResolver::new(store, Clock::system(), Duration::from_secs(300), 100);
        (dir, resolver)
    }

    #[tokio::test]
    async fn test_all_day_window_is_current() {
        let (_dir, resolver) = resolver_with(vec![schedule_draft("on duty", [0, 1440])]).await;
        let snapshot = resolver.resolve(GLOBAL_SCOPE).await;
        assert_eq!(snapshot.current.unwrap().name, "on duty");
    }

    #[tokio::test]
    async fn test_empty_scope_cached_negatively() {
        let (_dir, resolver) = resolver_with(vec![]).await;
        let first = resolver.resolve("chat9").await;
        assert!(first.is_empty());
        // Second resolve comes from cache; same result
        let second = resolver.resolve("chat9").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_upcoming_sorted_by_start() {
        let now = Clock::system().minute_of_day() as i64;
        // Only meaningful when two future slots fit in the day
        if now >= 1380 {
            return;
        }
        let (_dir, resolver) = resolver_with(vec![
            schedule_draft("later", [now + 40, now + 50]),
            schedule_draft("sooner", [now + 10, now + 20]),
        ])
        .await;
        let snapshot = resolver.resolve(GLOBAL_SCOPE).await;
        let names: Vec<&str> = snapshot.upcoming.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["sooner", "later"]);
    }

    #[tokio::test]
    async fn test_stale_creation_date_not_current() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = GoalStore::open(dir.path(), Duration::from_millis(50)).unwrap();
            store.create(schedule_draft("yesterday task", [0, 1440])).await;
            store.shutdown().await;
        }
        // Backdate the record on disk, then reopen
        let path = dir.path().join("goals.json");
        let content = std::fs::read_to_string(&path).unwrap();
        let yesterday = chrono::Utc::now() - chrono::Duration::days(1);
        let mut records: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
        records[0]["created_at"] = json!(yesterday.to_rfc3339());
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let store = GoalStore::open(dir.path(), Duration::from_millis(50)).unwrap();
        let resolver =
            ScheduleResolver::new(store, Clock::system(), Duration::from_secs(300), 100);
        let snapshot = resolver.resolve(GLOBAL_SCOPE).await;
        assert!(snapshot.current.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_picks_up_new_goals() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::open(dir.path(), Duration::from_millis(50)).unwrap();
        let resolver = ScheduleResolver::new(
            store.clone(),
            Clock::system(),
            Duration::from_secs(300),
            100,
        );

        assert!(resolver.resolve(GLOBAL_SCOPE).await.is_empty());
        store.create(schedule_draft("new slot", [0, 1440])).await;
        // Still the cached empty answer
        assert!(resolver.resolve(GLOBAL_SCOPE).await.is_empty());
        resolver.invalidate();
        assert_eq!(
            resolver.resolve(GLOBAL_SCOPE).await.current.unwrap().name,
            "new slot"
        );
    }

    #[tokio::test]
    async fn test_ttl_expiry_rereads_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::open(dir.path(), Duration::from_millis(50)).unwrap();
        let resolver = ScheduleResolver::new(
            store.clone(),
            Clock::system(),
            Duration::from_millis(100),
            100,
        );

        assert!(resolver.resolve(GLOBAL_SCOPE).await.is_empty());
        store.create(schedule_draft("fresh slot", [0, 1440])).await;
        // Within the TTL the cached empty answer still wins
        assert!(resolver.resolve(GLOBAL_SCOPE).await.is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            resolver.resolve(GLOBAL_SCOPE).await.current.unwrap().name,
            "fresh slot"
        );
    }

    #[tokio::test]
    async fn test_lru_eviction_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::open(dir.path(), Duration::from_millis(50)).unwrap();
        let resolver =
            ScheduleResolver::new(store, Clock::system(), Duration::from_secs(300), 3);
        for i in 0..10 {
            resolver.resolve(&format!("chat{i}")).await;
        }
        let state = resolver.cache.lock().unwrap();
        assert!(state.entries.len() <= 3);
        assert_eq!(state.entries.len(), state.order.len());
    }
}
