//! Cross-module tests exercising the store and pipeline together.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::config::{AppConfig, InjectMode};
use crate::generator::NullGenerator;
use crate::goals::{GoalStore, NewGoal, GLOBAL_SCOPE};
use crate::message::MessageEnvelope;
use crate::pipeline::InjectPipeline;

fn test_config(mode: InjectMode) -> AppConfig {
    let mut config = AppConfig::default();
    config.inject.mode = mode;
    config.inject.casual_inject_probability = 1.0;
    config.schedule.auto_generate = false;
    config.schedule.timezone = "UTC".to_string();
    config
}

fn windowed_draft(name: &str, window: [i64; 2]) -> NewGoal {
    let mut draft = NewGoal::new(name, "study");
    draft.parameters.insert("time_window".into(), json!(window));
    draft
}

fn envelope(user: &str, message: &str) -> MessageEnvelope {
    MessageEnvelope {
        prompt: "base prompt".into(),
        base_message: Some(message.into()),
        stream_id: Some("chat1".into()),
        user_id: Some(user.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_agenda_survives_restart_and_feeds_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        store.create(windowed_draft("deep reading", [0, 1440])).await;
        store.shutdown().await;
    }

    let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
    let pipeline =
        InjectPipeline::new(test_config(InjectMode::Rule), store, Arc::new(NullGenerator));

    let mut env = envelope("u1", "what are you doing right now?");
    assert!(pipeline.handle_message(&mut env).await);
    assert!(env.prompt.contains("deep reading"));
}

#[tokio::test]
async fn test_crash_leftovers_do_not_corrupt_the_agenda() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        store.create(windowed_draft("deep reading", [0, 1440])).await;
        store.shutdown().await;
    }
    // A crash mid-write leaves a half-written temp file next to the live one
    std::fs::write(dir.path().join(".goals_tmp_dead.json"), b"[{\"goal_id\":").unwrap();

    let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
    assert_eq!(store.active(Some(GLOBAL_SCOPE)).await.len(), 1);
}

#[tokio::test]
async fn test_denied_injection_leaves_prompt_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
    store.create(windowed_draft("deep reading", [0, 1440])).await;

    let pipeline =
        InjectPipeline::new(test_config(InjectMode::Rule), store, Arc::new(NullGenerator));
    let mut env = envelope("u1", "/restart --force");
    assert!(!pipeline.handle_message(&mut env).await);
    assert_eq!(env.prompt, "base prompt");
}

#[tokio::test]
async fn test_distinct_users_gate_independently() {
    let dir = tempfile::tempdir().unwrap();
    let store = GoalStore::open(dir.path(), Duration::from_secs(60)).unwrap();
    store.create(windowed_draft("deep reading", [0, 1440])).await;
    let pipeline =
        InjectPipeline::new(test_config(InjectMode::Rule), store, Arc::new(NullGenerator));

    for user in ["u1", "u2", "u3"] {
        let mut env = envelope(user, "what are you doing right now?");
        assert!(pipeline.handle_message(&mut env).await, "user {user} should inject");
    }
}
