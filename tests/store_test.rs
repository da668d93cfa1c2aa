// Tests for the state containers

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use agent_console::api::{RecordId, Role, SessionConfig, SessionStatus};
use agent_console::session::{LiveUpdateCoordinator, SessionBackend, UpdateStrategy};
use agent_console::store::{
    MessagesStore, RecordingStatus, SessionsStore, StoreError, Task, TaskStatus, TasksStore,
    Workspace, WorkspaceStore,
};
use chrono::Utc;
use common::{message, session, session_at, FakeBackend};

fn messages_store(backend: &Arc<FakeBackend>) -> MessagesStore {
    let backend: Arc<dyn SessionBackend> = backend.clone();
    let coordinator = Arc::new(LiveUpdateCoordinator::new(backend.clone()));
    MessagesStore::new(coordinator, backend)
}

#[tokio::test]
async fn test_sorted_sessions_newest_first() {
    let backend = FakeBackend::new(session("s1", SessionStatus::Queued));
    backend.set_listed(vec![
        session_at("old", 1),
        session("undated", SessionStatus::Running),
        session_at("new", 20),
        session_at("mid", 10),
    ]);
    let store = SessionsStore::new(backend.clone());

    store.refresh_sessions().await.unwrap();
    assert_eq!(store.session_count(), 4);

    let ids: Vec<String> = store
        .sorted_sessions()
        .iter()
        .map(|s| s.id.to_string())
        .collect();
    assert_eq!(ids, vec!["new", "mid", "old", "undated"]);
    assert!(!store.is_loading());
    assert!(store.error().is_none());
}

#[tokio::test]
async fn test_create_session_goes_to_front() {
    let backend = FakeBackend::new(session("fresh", SessionStatus::Queued));
    backend.set_listed(vec![session_at("a", 1), session_at("b", 2)]);
    let store = SessionsStore::new(backend.clone());
    store.fetch_sessions(0, 10).await.unwrap();

    let created = store.create_session("open firefox", "bedrock").await.unwrap();
    assert_eq!(created.initial_prompt, "open firefox");

    let sessions = store.sessions();
    assert_eq!(sessions.len(), 3);
    assert_eq!(sessions[0].id.as_str(), "fresh");
    assert_eq!(
        store.current_session().map(|s| s.id),
        Some(RecordId::new("fresh"))
    );
}

#[tokio::test]
async fn test_sessions_error_slot() {
    let backend = FakeBackend::new(session("s1", SessionStatus::Queued));
    backend.fail_list.store(true, Ordering::SeqCst);
    let store = SessionsStore::new(backend.clone());

    assert!(store.refresh_sessions().await.is_err());
    assert!(store.error().is_some());
    assert!(!store.is_loading());

    // Cleared by the next successful attempt
    backend.fail_list.store(false, Ordering::SeqCst);
    store.refresh_sessions().await.unwrap();
    assert!(store.error().is_none());

    store.set_current_session(Some(session("x", SessionStatus::Running)));
    assert!(store.current_session().is_some());
    store.set_current_session(None);
    assert!(store.current_session().is_none());
}

#[tokio::test]
async fn test_message_views() {
    let backend = FakeBackend::new(session("s1", SessionStatus::Completed));
    let mut screenshot = message("3", Role::Tool, "took screenshot");
    screenshot.base64_image = Some("iVBORw0KGgo=".to_string());
    backend.push_messages(vec![
        message("1", Role::User, "open firefox"),
        message("2", Role::Assistant, "Opening it"),
        screenshot,
        message("4", Role::Assistant, "Done"),
    ]);
    let store = messages_store(&backend);

    assert!(!store.has_messages());
    store
        .load_existing_session(&"s1".into(), UpdateStrategy::Poll)
        .await
        .unwrap();

    assert!(store.has_messages());
    assert_eq!(store.messages().len(), 4);
    assert_eq!(store.assistant_messages().len(), 2);
    assert_eq!(store.user_messages().len(), 1);
    assert_eq!(store.tool_messages().len(), 1);
    assert_eq!(store.last_message().unwrap().content.as_text(), "Done");
    assert!(store.has_screenshots());
    assert_eq!(store.latest_screenshot().unwrap().id.as_str(), "3");
    assert!(!store.is_session_active());
    assert!(!store.is_polling());
    assert_eq!(
        store.session_status().map(|s| s.status),
        Some(SessionStatus::Completed)
    );
}

#[tokio::test]
async fn test_send_message_appends() {
    let backend = FakeBackend::new(session("s1", SessionStatus::Completed));
    backend.push_messages(vec![message("1", Role::User, "hello")]);
    let store = messages_store(&backend);

    assert!(matches!(
        store.send_message("too early").await,
        Err(StoreError::NoSession)
    ));
    assert!(store.error().is_some());

    store
        .load_existing_session(&"s1".into(), UpdateStrategy::Poll)
        .await
        .unwrap();
    let sent = store.send_message("and now?").await.unwrap();

    assert_eq!(sent.role, Role::User);
    assert!(store.error().is_none());
    assert_eq!(store.messages().len(), 2);
    assert!(store.has_new_messages());

    let posted = backend.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].session_id.as_str(), "s1");
    assert_eq!(posted[0].content.as_text(), "and now?");
}

#[tokio::test]
async fn test_refresh_failure_lands_in_error_slot() {
    let backend = FakeBackend::new(session("s1", SessionStatus::Completed));
    backend.push_messages(vec![message("1", Role::User, "hello")]);
    let store = messages_store(&backend);
    store
        .load_existing_session(&"s1".into(), UpdateStrategy::Poll)
        .await
        .unwrap();

    backend.push_messages_error();
    store.refresh_messages().await;
    assert!(store.error().is_some());

    store.refresh_messages().await;
    assert!(store.error().is_none());
}

#[tokio::test]
async fn test_start_and_clear_session() {
    let backend = FakeBackend::new(session("s1", SessionStatus::Queued));
    let store = messages_store(&backend);

    store
        .start_new_session("hi", "bedrock", SessionConfig::default(), UpdateStrategy::Stream)
        .await
        .unwrap();
    assert!(store.is_streaming());
    assert_eq!(store.user_messages().len(), 1);
    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);

    store.clear_session();
    assert!(!store.is_streaming());
    assert!(store.current_session().is_none());
    assert!(!store.has_messages());
}

#[test]
fn test_tasks_store() {
    let mut store = TasksStore::new();
    let first = store.add(Task::new("Book flight")).id.clone();
    let second = store.add(Task::new("Summarize inbox")).id.clone();
    assert_eq!(store.tasks().len(), 2);

    store.set_status(&first, TaskStatus::Active).unwrap();
    store.mark_executing(&second).unwrap();
    assert_eq!(store.active_tasks().len(), 1);

    store.set_status(&second, TaskStatus::Failed).unwrap();
    store.set_status(&first, TaskStatus::Completed).unwrap();
    assert_eq!(store.completed_tasks().len(), 1);
    assert_eq!(store.task_history().len(), 2);

    store.set_current(Some(first.clone()));
    assert_eq!(store.current_task().unwrap().title, "Book flight");

    let mut edited = store.current_task().unwrap().clone();
    edited.description = Some("Window seat".to_string());
    store.update(edited).unwrap();
    assert_eq!(
        store.current_task().unwrap().description.as_deref(),
        Some("Window seat")
    );

    store.remove(&first).unwrap();
    assert!(store.current_task().is_none());
    assert_eq!(store.tasks().len(), 1);
}

#[test]
fn test_tasks_store_missing_task() {
    let mut store = TasksStore::new();
    let missing = RecordId::new("nope");

    let err = store.set_status(&missing, TaskStatus::Active).unwrap_err();
    assert_eq!(err.to_string(), "Task not found: nope");
    assert_eq!(store.error(), Some("Task not found: nope"));
    assert!(store.remove(&missing).is_err());

    store.clear_error();
    assert!(store.error().is_none());
}

fn workspace(id: u64, name: &str) -> Workspace {
    Workspace {
        id,
        name: name.to_string(),
        status: "ready".to_string(),
        created_at: Utc::now(),
    }
}

#[test]
fn test_workspace_selection() {
    let mut store = WorkspaceStore::new();
    store.set_workspaces(vec![workspace(1, "Research"), workspace(2, "Travel")]);
    assert_eq!(store.workspace_count(), 2);

    assert!(store.set_current_workspace(Some(2)));
    assert_eq!(store.current_workspace().unwrap().name, "Travel");
    assert!(!store.set_current_workspace(Some(9)));
    assert_eq!(store.current_workspace().unwrap().id, 2);

    // Selection dropped when the workspace disappears
    store.set_workspaces(vec![workspace(1, "Research")]);
    assert!(store.current_workspace().is_none());

    assert!(store.set_current_workspace(None));
}

#[test]
fn test_recording_toggle() {
    let mut store = WorkspaceStore::new();
    assert_eq!(store.recording_status(), RecordingStatus::Idle);

    assert!(store.start_recording());
    assert!(!store.start_recording());
    assert!(store.is_recording());

    assert!(store.stop_recording());
    assert!(!store.stop_recording());
    assert_eq!(store.recording_status(), RecordingStatus::Idle);
}
