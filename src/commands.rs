//! Local goal-management commands.
//!
//! Lines starting with `/goal` or `/goals` are handled here instead of going
//! through the injection pipeline. Goals are addressed by any unambiguous
//! id prefix.

use uuid::Uuid;

use crate::goals::{GoalStore, GoalUpdate, NewGoal};

pub struct CommandHandler {
    store: GoalStore,
}

impl CommandHandler {
    pub fn new(store: GoalStore) -> Self {
        Self { store }
    }

    /// Handle a command line; `None` means "not a command, keep routing".
    pub async fn handle(&self, line: &str) -> Option<String> {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        match parts.next()? {
            "/goals" => Some(self.store.goals_summary(None).await),
            "/due" => Some(self.due().await),
            "/goal" => Some(self.goal_command(parts.collect()).await),
            _ => None,
        }
    }

    async fn goal_command(&self, args: Vec<&str>) -> String {
        let Some((&action, rest)) = args.split_first() else {
            return usage();
        };
        match action {
            "add" => self.add(rest).await,
            "done" | "pause" | "resume" | "cancel" | "delete" | "exec" => {
                let Some(goal) = self.resolve(rest.first().copied()).await else {
                    return "No unique goal matches that id".to_string();
                };
                let id = goal.goal_id;
                let ok = match action {
                    "done" => self.store.complete(id).await,
                    "pause" => self.store.pause(id).await,
                    "resume" => self.store.resume(id).await,
                    "cancel" => self.store.cancel(id).await,
                    "delete" => self.store.delete(id).await,
                    "exec" => self.store.mark_executed(id).await,
                    _ => unreachable!(),
                };
                if ok {
                    format!("{} {}", action, goal.name)
                } else {
                    "Goal disappeared mid-command".to_string()
                }
            }
            "progress" => {
                let Some(goal) = self.resolve(rest.first().copied()).await else {
                    return "No unique goal matches that id".to_string();
                };
                let Some(pct) = rest.get(1).and_then(|v| v.parse::<u8>().ok()) else {
                    return "Usage: /goal progress <id> <0-100>".to_string();
                };
                self.store.update(goal.goal_id, &[GoalUpdate::Progress(pct)]).await;
                format!("progress {} -> {}%", goal.name, pct.min(100))
            }
            "show" => match self.resolve(rest.first().copied()).await {
                Some(goal) => goal.summary(),
                None => "No unique goal matches that id".to_string(),
            },
            _ => usage(),
        }
    }

    async fn add(&self, rest: &[&str]) -> String {
        if rest.is_empty() {
            return "Usage: /goal add <name...> [--type <category>]".to_string();
        }
        let mut goal_type = "custom".to_string();
        let mut name_parts = Vec::new();
        let mut iter = rest.iter();
        while let Some(part) = iter.next() {
            if *part == "--type" {
                if let Some(t) = iter.next() {
                    goal_type = (*t).to_string();
                }
            } else {
                name_parts.push(*part);
            }
        }
        let name = name_parts.join(" ");
        if name.is_empty() {
            return "Goal name must not be empty".to_string();
        }
        let goal = self.store.create(NewGoal::new(name, goal_type)).await;
        format!("created {} ({})", goal.name, &goal.goal_id.to_string()[..8])
    }

    async fn due(&self) -> String {
        let due = self.store.executable().await;
        if due.is_empty() {
            return "Nothing due right now".to_string();
        }
        due.iter()
            .map(|g| format!("- {}", g.name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Resolve a goal by id prefix; ambiguous or missing prefixes resolve to
    /// nothing.
    async fn resolve(&self, prefix: Option<&str>) -> Option<crate::goals::Goal> {
        let prefix = prefix?;
        if let Ok(id) = prefix.parse::<Uuid>() {
            return self.store.get(id).await;
        }
        let goals = self.store.list(None, None).await;
        let mut matches = goals
            .into_iter()
            .filter(|g| g.goal_id.to_string().starts_with(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }
}

fn usage() -> String {
    [
        "Usage:",
        "  /goals                         list all goals",
        "  /due                           goals due to run now",
        "  /goal add <name> [--type <t>]  create a goal",
        "  /goal show <id>                goal details",
        "  /goal progress <id> <0-100>    set progress",
        "  /goal done|pause|resume|cancel|delete|exec <id>",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn handler() -> (tempfile::TempDir, CommandHandler, GoalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::open(dir.path(), Duration::from_millis(50)).unwrap();
        (dir, CommandHandler::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_non_commands_pass_through() {
        let (_dir, handler, _) = handler().await;
        assert!(handler.handle("what are you doing?").await.is_none());
        assert!(handler.handle("").await.is_none());
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let (_dir, handler, store) = handler().await;
        let reply = handler.handle("/goal add finish the report --type study").await.unwrap();
        assert!(reply.starts_with("created finish the report"));

        let goals = store.list(None, None).await;
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].goal_type, "study");

        let summary = handler.handle("/goals").await.unwrap();
        assert!(summary.contains("finish the report"));
    }

    #[tokio::test]
    async fn test_lifecycle_by_id_prefix() {
        let (_dir, handler, store) = handler().await;
        let goal = store.create(NewGoal::new("workout", "exercise")).await;
        let prefix = &goal.goal_id.to_string()[..8];

        let reply = handler.handle(&format!("/goal done {prefix}")).await.unwrap();
        assert_eq!(reply, "done workout");
        let stored = store.get(goal.goal_id).await.unwrap();
        assert_eq!(stored.progress, 100);
    }

    #[tokio::test]
    async fn test_progress_and_exec() {
        let (_dir, handler, store) = handler().await;
        let goal = store.create(NewGoal::new("essay", "study")).await;
        let id = goal.goal_id.to_string();

        handler.handle(&format!("/goal progress {id} 60")).await.unwrap();
        assert_eq!(store.get(goal.goal_id).await.unwrap().progress, 60);

        handler.handle(&format!("/goal exec {id}")).await.unwrap();
        assert_eq!(store.get(goal.goal_id).await.unwrap().execution_count, 1);
    }

    #[tokio::test]
    async fn test_due_lists_executable_goals() {
        let (_dir, handler, store) = handler().await;
        store.create(NewGoal::new("standing task", "custom")).await;
        let reply = handler.handle("/due").await.unwrap();
        assert!(reply.contains("standing task"));
    }

    #[tokio::test]
    async fn test_unknown_subcommand_prints_usage() {
        let (_dir, handler, _) = handler().await;
        let reply = handler.handle("/goal frobnicate").await.unwrap();
        assert!(reply.starts_with("Usage:"));
    }
}
