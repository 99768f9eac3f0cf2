use afaire::client::TaskClient;
use afaire::model::{Priority, TaskDraft};
use afaire::store::TaskStore;
use mockito::{Server, ServerGuard};
use serde_json::json;

fn task_json(id: i64, title: &str, priority: &str, completed: bool) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "description": null,
        "due_date": null,
        "priority": priority,
        "completed": completed,
    })
}

fn store_for(server: &ServerGuard) -> TaskStore {
    let client = TaskClient::new(&format!("{}/api", server.url())).unwrap();
    TaskStore::new(client)
}

/// Seeds the store through a normal fetch so every test starts from a
/// server-shaped state.
async fn seeded_store(
    server: &mut ServerGuard,
    tasks: serde_json::Value,
    stats: serde_json::Value,
) -> TaskStore {
    let tasks_mock = server
        .mock("GET", "/api/tasks")
        .with_body(tasks.to_string())
        .create_async()
        .await;
    let stats_mock = server
        .mock("GET", "/api/stats")
        .with_body(stats.to_string())
        .create_async()
        .await;

    let store = store_for(server);
    store.fetch_tasks().await;
    tasks_mock.assert_async().await;
    stats_mock.assert_async().await;
    store
}

#[tokio::test]
async fn create_prepends_task_and_bumps_counters() {
    let mut server = Server::new_async().await;

    let create_mock = server
        .mock("POST", "/api/tasks")
        .match_body(mockito::Matcher::PartialJson(json!({
            "title": "Buy milk",
            "priority": "high",
        })))
        .with_status(201)
        .with_body(task_json(10, "Buy milk", "high", false).to_string())
        .create_async()
        .await;

    let store = store_for(&server);
    let mut draft = TaskDraft::new("Buy milk");
    draft.priority = Some(Priority::High);

    let created = store.create_task(draft).await.unwrap();

    assert_eq!(created.id, 10);
    let tasks = store.tasks();
    assert_eq!(tasks[0].title, "Buy milk");
    assert_eq!(store.stats().total, 1);
    assert_eq!(store.stats().pending, 1);
    assert_eq!(store.error(), None);

    create_mock.assert_async().await;
}

#[tokio::test]
async fn create_failure_reraises_and_leaves_state_alone() {
    let mut server = Server::new_async().await;

    let create_mock = server
        .mock("POST", "/api/tasks")
        .with_status(400)
        .with_body(json!({"error": "Title is required"}).to_string())
        .create_async()
        .await;

    let store = store_for(&server);
    let result = store.create_task(TaskDraft::new("")).await;

    let err = result.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(400));
    assert!(store.tasks().is_empty());
    assert_eq!(store.stats().total, 0);
    assert_eq!(store.error().as_deref(), Some("Failed to create task"));

    create_mock.assert_async().await;
}

#[tokio::test]
async fn update_moves_counter_when_completion_changes() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([task_json(1, "Buy milk", "medium", false)]),
        json!({"total": 1, "completed": 0, "pending": 1}),
    )
    .await;

    let update_mock = server
        .mock("PUT", "/api/tasks/1")
        .with_body(task_json(1, "Buy oat milk", "medium", true).to_string())
        .create_async()
        .await;

    let mut draft = TaskDraft::new("Buy oat milk");
    draft.completed = Some(true);
    let updated = store.update_task(1, draft).await.unwrap();

    assert!(updated.completed);
    assert_eq!(store.tasks()[0].title, "Buy oat milk");
    assert_eq!(store.stats().completed, 1);
    assert_eq!(store.stats().pending, 0);
    assert!(store.stats().is_consistent());

    update_mock.assert_async().await;
}

#[tokio::test]
async fn update_failure_reraises_and_leaves_state_alone() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([task_json(1, "Buy milk", "medium", false)]),
        json!({"total": 1, "completed": 0, "pending": 1}),
    )
    .await;

    let update_mock = server
        .mock("PUT", "/api/tasks/1")
        .with_status(404)
        .with_body(json!({"error": "Task not found"}).to_string())
        .create_async()
        .await;

    let before_tasks = store.tasks();
    let before_stats = store.stats();

    let result = store.update_task(1, TaskDraft::new("Buy oat milk")).await;

    assert!(result.is_err());
    assert_eq!(store.tasks(), before_tasks);
    assert_eq!(store.stats(), before_stats);
    assert_eq!(store.error().as_deref(), Some("Failed to update task"));

    update_mock.assert_async().await;
}

#[tokio::test]
async fn toggle_commits_the_authoritative_response() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([task_json(1, "Buy milk", "medium", false)]),
        json!({"total": 1, "completed": 0, "pending": 1}),
    )
    .await;

    // The server also edited the title; the local copy must take the
    // authoritative version, not just the flipped flag.
    let toggle_mock = server
        .mock("PATCH", "/api/tasks/1/toggle")
        .with_body(task_json(1, "Buy milk (restocked)", "medium", true).to_string())
        .create_async()
        .await;

    store.toggle_task(1).await.unwrap();

    let task = store.task_by_id(1).unwrap();
    assert!(task.completed);
    assert_eq!(task.title, "Buy milk (restocked)");
    assert_eq!(store.stats().completed, 1);
    assert_eq!(store.stats().pending, 0);

    toggle_mock.assert_async().await;
}

#[tokio::test]
async fn toggle_rollback_restores_the_exact_snapshot() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([
            task_json(2, "Water plants", "low", true),
            task_json(1, "Buy milk", "high", false),
        ]),
        json!({"total": 2, "completed": 1, "pending": 1}),
    )
    .await;

    let toggle_mock = server
        .mock("PATCH", "/api/tasks/1/toggle")
        .with_status(500)
        .with_body(json!({"error": "write failed"}).to_string())
        .create_async()
        .await;

    let before_tasks = store.tasks();
    let before_stats = store.stats();

    let result = store.toggle_task(1).await;

    assert!(result.is_err());
    assert_eq!(store.tasks(), before_tasks, "rollback is bit-identical");
    assert_eq!(store.stats(), before_stats);
    assert_eq!(store.error().as_deref(), Some("Failed to toggle task"));

    toggle_mock.assert_async().await;
}

#[tokio::test]
async fn toggle_twice_returns_to_the_original_state() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([task_json(1, "Buy milk", "medium", false)]),
        json!({"total": 1, "completed": 0, "pending": 1}),
    )
    .await;

    let first = server
        .mock("PATCH", "/api/tasks/1/toggle")
        .with_body(task_json(1, "Buy milk", "medium", true).to_string())
        .create_async()
        .await;
    store.toggle_task(1).await.unwrap();
    assert!(store.task_by_id(1).unwrap().completed);
    first.assert_async().await;

    // Same route, opposite response for the second flip.
    server.reset_async().await;
    let second = server
        .mock("PATCH", "/api/tasks/1/toggle")
        .with_body(task_json(1, "Buy milk", "medium", false).to_string())
        .create_async()
        .await;
    store.toggle_task(1).await.unwrap();
    second.assert_async().await;

    assert!(!store.task_by_id(1).unwrap().completed);
    assert_eq!(store.stats().completed, 0);
    assert_eq!(store.stats().pending, 1);
    assert!(store.stats().is_consistent());
}

#[tokio::test]
async fn toggle_unknown_id_is_a_noop() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([task_json(1, "Buy milk", "medium", false)]),
        json!({"total": 1, "completed": 0, "pending": 1}),
    )
    .await;

    let toggle_mock = server
        .mock("PATCH", "/api/tasks/99/toggle")
        .expect(0)
        .create_async()
        .await;

    store.toggle_task(99).await.unwrap();

    assert_eq!(store.stats().pending, 1);
    toggle_mock.assert_async().await;
}

#[tokio::test]
async fn delete_completed_task_decrements_counters() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([
            task_json(2, "Water plants", "low", true),
            task_json(1, "Buy milk", "high", false),
        ]),
        json!({"total": 2, "completed": 1, "pending": 1}),
    )
    .await;

    let delete_mock = server
        .mock("DELETE", "/api/tasks/2")
        .with_body(json!({"message": "Task deleted"}).to_string())
        .create_async()
        .await;

    store.delete_task(2).await.unwrap();

    assert!(store.task_by_id(2).is_none());
    assert_eq!(store.stats().total, 1);
    assert_eq!(store.stats().completed, 0);
    assert_eq!(store.stats().pending, 1);

    delete_mock.assert_async().await;
}

#[tokio::test]
async fn delete_rollback_reinserts_at_the_original_index() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([
            task_json(3, "Water plants", "low", false),
            task_json(2, "Buy milk", "high", true),
            task_json(1, "Call the bank", "medium", false),
        ]),
        json!({"total": 3, "completed": 1, "pending": 2}),
    )
    .await;

    let delete_mock = server
        .mock("DELETE", "/api/tasks/2")
        .with_status(404)
        .with_body(json!({"error": "Task not found"}).to_string())
        .create_async()
        .await;

    let before_tasks = store.tasks();
    let before_stats = store.stats();

    let result = store.delete_task(2).await;

    assert!(result.is_err());
    assert_eq!(store.tasks(), before_tasks, "middle position restored");
    assert_eq!(store.stats(), before_stats);
    assert_eq!(store.error().as_deref(), Some("Failed to delete task"));

    delete_mock.assert_async().await;
}

#[tokio::test]
async fn delete_unknown_id_is_a_noop() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([task_json(1, "Buy milk", "medium", false)]),
        json!({"total": 1, "completed": 0, "pending": 1}),
    )
    .await;

    let delete_mock = server
        .mock("DELETE", "/api/tasks/99")
        .expect(0)
        .create_async()
        .await;

    store.delete_task(99).await.unwrap();

    assert_eq!(store.tasks().len(), 1);
    delete_mock.assert_async().await;
}

#[tokio::test]
async fn mark_all_completed_flips_every_pending_task() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([
            task_json(3, "Water plants", "low", false),
            task_json(2, "Buy milk", "high", false),
            task_json(1, "Call the bank", "medium", false),
        ]),
        json!({"total": 3, "completed": 0, "pending": 3}),
    )
    .await;

    let toggles = [
        server
            .mock("PATCH", "/api/tasks/3/toggle")
            .with_body(task_json(3, "Water plants", "low", true).to_string())
            .create_async()
            .await,
        server
            .mock("PATCH", "/api/tasks/2/toggle")
            .with_body(task_json(2, "Buy milk", "high", true).to_string())
            .create_async()
            .await,
        server
            .mock("PATCH", "/api/tasks/1/toggle")
            .with_body(task_json(1, "Call the bank", "medium", true).to_string())
            .create_async()
            .await,
    ];

    store.mark_all_completed().await.unwrap();

    assert!(store.tasks().iter().all(|task| task.completed));
    assert_eq!(store.stats().pending, 0);
    assert_eq!(store.stats().completed, store.stats().total);
    assert_eq!(store.error(), None);

    for toggle in &toggles {
        toggle.assert_async().await;
    }
}

#[tokio::test]
async fn mark_all_completed_with_nothing_pending_is_a_noop() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([task_json(1, "Buy milk", "medium", true)]),
        json!({"total": 1, "completed": 1, "pending": 0}),
    )
    .await;

    let toggle_mock = server
        .mock("PATCH", "/api/tasks/1/toggle")
        .expect(0)
        .create_async()
        .await;

    store.mark_all_completed().await.unwrap();
    toggle_mock.assert_async().await;
}

#[tokio::test]
async fn mark_all_completed_partial_failure_reconciles_by_refetch() {
    let mut server = Server::new_async().await;
    let store = seeded_store(
        &mut server,
        json!([
            task_json(3, "Water plants", "low", false),
            task_json(2, "Buy milk", "high", false),
            task_json(1, "Call the bank", "medium", false),
        ]),
        json!({"total": 3, "completed": 0, "pending": 3}),
    )
    .await;

    // Two toggles land server-side, one fails. The reconciling refetch
    // must see the server's truth, so the seed mocks are cleared first.
    server.reset_async().await;
    let reload_tasks = server
        .mock("GET", "/api/tasks")
        .with_body(
            json!([
                task_json(3, "Water plants", "low", true),
                task_json(2, "Buy milk", "high", false),
                task_json(1, "Call the bank", "medium", true),
            ])
            .to_string(),
        )
        .create_async()
        .await;
    let reload_stats = server
        .mock("GET", "/api/stats")
        .with_body(json!({"total": 3, "completed": 2, "pending": 1}).to_string())
        .create_async()
        .await;

    let _ok_3 = server
        .mock("PATCH", "/api/tasks/3/toggle")
        .with_body(task_json(3, "Water plants", "low", true).to_string())
        .create_async()
        .await;
    let _failed_2 = server
        .mock("PATCH", "/api/tasks/2/toggle")
        .with_status(500)
        .with_body(json!({"error": "write failed"}).to_string())
        .create_async()
        .await;
    let _ok_1 = server
        .mock("PATCH", "/api/tasks/1/toggle")
        .with_body(task_json(1, "Call the bank", "medium", true).to_string())
        .create_async()
        .await;

    let result = store.mark_all_completed().await;
    assert!(result.is_err());

    // Final state is the server's truth, not the optimistic all-done view.
    let tasks = store.tasks();
    assert!(tasks.iter().find(|t| t.id == 3).unwrap().completed);
    assert!(!tasks.iter().find(|t| t.id == 2).unwrap().completed);
    assert!(tasks.iter().find(|t| t.id == 1).unwrap().completed);
    assert_eq!(store.stats().completed, 2);
    assert_eq!(store.stats().pending, 1);
    assert!(store.stats().is_consistent());
    assert_eq!(store.error().as_deref(), Some("Bulk update failed"));

    reload_tasks.assert_async().await;
    reload_stats.assert_async().await;
}
