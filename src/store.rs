// Reactive task store: an in-memory mirror of the remote task service.
//
// Every mutation goes through a named action. Actions that mutate
// server state either wait for the authoritative response (create,
// update) or apply optimistically and roll back on failure (toggle,
// delete, bulk complete). Derived views are recomputed on read, so they
// are always consistent with the base state.
use crate::client::{ApiError, TaskClient};
use crate::model::{Priority, SortKey, Stats, Task, TaskDraft};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long an error message stays visible before it clears itself.
const ERROR_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct State {
    tasks: Vec<Task>,
    /// Number of network actions currently in flight. The public
    /// `loading()` projection is `inflight > 0`, so overlapping actions
    /// cannot clear the flag for one another.
    inflight: u32,
    error: Option<String>,
    search_query: String,
    stats: Stats,
}

struct Inner {
    state: Mutex<State>,
    changed: watch::Sender<u64>,
    /// Pending auto-clear timer for `error`. A newer error, an explicit
    /// clear, or a reset aborts it so a stale timer can never erase a
    /// newer message.
    error_timer: Mutex<Option<JoinHandle<()>>>,
}

fn lock_state(inner: &Inner) -> MutexGuard<'_, State> {
    // Mutations never panic while holding the lock; a poisoned guard
    // still wraps coherent state.
    inner.state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn notify(inner: &Inner) {
    inner.changed.send_modify(|version| *version = version.wrapping_add(1));
}

/// Undo closure captured before an optimistic mutation.
type Undo = Box<dyn FnOnce(&mut State) + Send>;

/// Scoped in-flight marker: increments on acquire, decrements on drop,
/// so the counter is released on every exit path.
struct LoadingGuard {
    inner: Arc<Inner>,
}

impl LoadingGuard {
    fn acquire(store: &TaskStore) -> Self {
        lock_state(&store.inner).inflight += 1;
        notify(&store.inner);
        Self {
            inner: Arc::clone(&store.inner),
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        {
            let mut state = lock_state(&self.inner);
            // Saturating: a reset may have zeroed the counter while this
            // action was still in flight.
            state.inflight = state.inflight.saturating_sub(1);
        }
        notify(&self.inner);
    }
}

/// Tasks grouped by recognized priority. Tasks whose priority the store
/// does not recognize appear in no bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityBuckets {
    pub high: Vec<Task>,
    pub medium: Vec<Task>,
    pub low: Vec<Task>,
}

/// Session-local task store.
///
/// Holds the cached task list, the aggregate counters and the current
/// client-side filter, and exposes read-only projections plus the
/// actions that talk to the service. Cloning shares the same state.
#[derive(Clone)]
pub struct TaskStore {
    client: TaskClient,
    inner: Arc<Inner>,
}

impl TaskStore {
    pub fn new(client: TaskClient) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            client,
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                changed,
                error_timer: Mutex::new(None),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock_state(&self.inner)
    }

    fn touch(&self) {
        notify(&self.inner);
    }

    // --- Projections ---------------------------------------------------

    /// Snapshot of the cached task list, in its current order.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    /// True while at least one network action from this store is in
    /// flight.
    pub fn loading(&self) -> bool {
        self.lock().inflight > 0
    }

    /// Current error message, if one is showing.
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn search_query(&self) -> String {
        self.lock().search_query.clone()
    }

    pub fn stats(&self) -> Stats {
        self.lock().stats
    }

    /// Tasks matching the client-side filter; the whole list when the
    /// filter is empty.
    pub fn filtered_tasks(&self) -> Vec<Task> {
        let state = self.lock();
        if state.search_query.is_empty() {
            return state.tasks.clone();
        }
        let query = state.search_query.to_lowercase();
        state
            .tasks
            .iter()
            .filter(|task| task.matches(&query))
            .cloned()
            .collect()
    }

    pub fn completed_tasks(&self) -> Vec<Task> {
        let state = self.lock();
        state
            .tasks
            .iter()
            .filter(|task| task.completed)
            .cloned()
            .collect()
    }

    pub fn pending_tasks(&self) -> Vec<Task> {
        let state = self.lock();
        state
            .tasks
            .iter()
            .filter(|task| !task.completed)
            .cloned()
            .collect()
    }

    pub fn tasks_by_priority(&self) -> PriorityBuckets {
        let state = self.lock();
        let mut buckets = PriorityBuckets::default();
        for task in &state.tasks {
            match task.priority {
                Priority::High => buckets.high.push(task.clone()),
                Priority::Medium => buckets.medium.push(task.clone()),
                Priority::Low => buckets.low.push(task.clone()),
                Priority::Unknown => {}
            }
        }
        buckets
    }

    pub fn task_by_id(&self, id: i64) -> Option<Task> {
        self.lock().tasks.iter().find(|task| task.id == id).cloned()
    }

    /// Receiver bumped after every state mutation; a presentation layer
    /// re-renders on change instead of polling.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    // --- Error handling ------------------------------------------------

    fn set_error(&self, message: &str) {
        self.lock().error = Some(message.to_string());
        self.touch();

        let inner = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ERROR_TTL).await;
            lock_state(&inner).error = None;
            notify(&inner);
        });
        self.replace_error_timer(Some(timer));
    }

    pub fn clear_error(&self) {
        self.replace_error_timer(None);
        self.lock().error = None;
        self.touch();
    }

    fn replace_error_timer(&self, timer: Option<JoinHandle<()>>) {
        let mut slot = self
            .inner
            .error_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *slot, timer) {
            previous.abort();
        }
    }

    // --- Actions -------------------------------------------------------

    /// Reloads the full task list, then refreshes the counters.
    ///
    /// On failure the current list is kept (stale but available) and
    /// `error` is set; the failure is not propagated. A failed stats
    /// refresh is reported the same way without undoing the task load.
    pub async fn fetch_tasks(&self) {
        let _loading = LoadingGuard::acquire(self);
        self.clear_error();

        match self.client.list_tasks().await {
            Ok(tasks) => {
                debug!(count = tasks.len(), "task list loaded");
                self.lock().tasks = tasks;
                self.touch();
                self.fetch_stats().await;
            }
            Err(err) => {
                warn!(%err, "task list fetch failed");
                self.set_error("Failed to load tasks");
            }
        }
    }

    /// Refreshes the aggregate counters. Best effort: a failure sets
    /// `error` but never propagates to the caller.
    pub async fn fetch_stats(&self) {
        match self.client.get_stats().await {
            Ok(stats) => {
                self.lock().stats = stats;
                self.touch();
            }
            Err(err) => {
                warn!(%err, "stats fetch failed");
                self.set_error("Failed to load stats");
            }
        }
    }

    /// Creates a task and prepends the authoritative response to the
    /// list. Nothing is inserted before the server confirms.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, ApiError> {
        let _loading = LoadingGuard::acquire(self);
        self.clear_error();

        match self.client.create_task(&draft).await {
            Ok(task) => {
                {
                    let mut state = self.lock();
                    state.tasks.insert(0, task.clone());
                    state.stats.total += 1;
                    state.stats.pending += 1;
                }
                self.touch();
                Ok(task)
            }
            Err(err) => {
                self.set_error("Failed to create task");
                Err(err)
            }
        }
    }

    /// Full replacement of one task. Local state changes only after the
    /// server confirms; a change of the completed flag moves one unit
    /// between the completed and pending counters.
    pub async fn update_task(&self, id: i64, draft: TaskDraft) -> Result<Task, ApiError> {
        let _loading = LoadingGuard::acquire(self);
        self.clear_error();

        match self.client.update_task(id, &draft).await {
            Ok(updated) => {
                {
                    let mut state = self.lock();
                    if let Some(index) = state.tasks.iter().position(|task| task.id == id) {
                        let was_completed = state.tasks[index].completed;
                        if was_completed != updated.completed {
                            if updated.completed {
                                state.stats.completed += 1;
                                state.stats.pending -= 1;
                            } else {
                                state.stats.completed -= 1;
                                state.stats.pending += 1;
                            }
                        }
                        state.tasks[index] = updated.clone();
                    }
                }
                self.touch();
                Ok(updated)
            }
            Err(err) => {
                self.set_error("Failed to update task");
                Err(err)
            }
        }
    }

    /// Flips a task's completed flag optimistically: the list and the
    /// counters change before the request is sent, and the exact
    /// pre-toggle snapshot is restored if it fails. Unknown identifiers
    /// are a no-op. No in-flight marker, matching the instant flip.
    pub async fn toggle_task(&self, id: i64) -> Result<(), ApiError> {
        self.clear_error();

        self.optimistic(
            |state| {
                let index = state.tasks.iter().position(|task| task.id == id)?;
                let snapshot = state.tasks[index].clone();
                let was_completed = snapshot.completed;

                state.tasks[index].completed = !was_completed;
                shift_completion(&mut state.stats, !was_completed);

                Some(Box::new(move |state: &mut State| {
                    if let Some(slot) = state.tasks.iter_mut().find(|task| task.id == id) {
                        *slot = snapshot;
                    }
                    shift_completion(&mut state.stats, was_completed);
                }) as Undo)
            },
            self.client.toggle_task(id),
            // The server may have changed other fields; take its word.
            |state, updated: &Task| {
                if let Some(slot) = state.tasks.iter_mut().find(|task| task.id == updated.id) {
                    *slot = updated.clone();
                }
            },
            "Failed to toggle task",
        )
        .await
        .map(|_| ())
    }

    /// Removes a task optimistically and reinserts it at its original
    /// index if the server refuses. Unknown identifiers are a no-op.
    pub async fn delete_task(&self, id: i64) -> Result<(), ApiError> {
        let _loading = LoadingGuard::acquire(self);
        self.clear_error();

        self.optimistic(
            |state| {
                let index = state.tasks.iter().position(|task| task.id == id)?;
                let removed = state.tasks.remove(index);
                state.stats.total -= 1;
                if removed.completed {
                    state.stats.completed -= 1;
                } else {
                    state.stats.pending -= 1;
                }

                Some(Box::new(move |state: &mut State| {
                    state.stats.total += 1;
                    if removed.completed {
                        state.stats.completed += 1;
                    } else {
                        state.stats.pending += 1;
                    }
                    // The list may have shrunk while the request was out.
                    let index = index.min(state.tasks.len());
                    state.tasks.insert(index, removed);
                }) as Undo)
            },
            self.client.delete_task(id),
            |_state, _confirmed: &()| {},
            "Failed to delete task",
        )
        .await
        .map(|_| ())
    }

    /// Server-side search. A blank query reloads the full list instead
    /// (which also refreshes the counters). On success the result
    /// replaces the list wholesale; the counters keep describing the
    /// whole table, not the search view.
    pub async fn search_tasks(&self, query: &str) {
        if query.trim().is_empty() {
            self.fetch_tasks().await;
            return;
        }

        let _loading = LoadingGuard::acquire(self);
        self.clear_error();

        match self.client.search_tasks(query).await {
            Ok(results) => {
                debug!(count = results.len(), "search results loaded");
                self.lock().tasks = results;
                self.touch();
            }
            Err(err) => {
                warn!(%err, "search failed");
                self.set_error("Search failed");
            }
        }
    }

    /// Sets the client-side filter consumed by `filtered_tasks`. Purely
    /// local, independent of the server-side search.
    pub fn set_search_query(&self, query: &str) {
        self.lock().search_query = query.to_string();
        self.touch();
    }

    /// In-place reorder of the cached list. No network call, no effect
    /// on the counters.
    pub fn sort_tasks(&self, key: SortKey) {
        self.lock().tasks.sort_by(|a, b| key.compare(a, b));
        self.touch();
    }

    /// Marks every pending task completed optimistically, then fires one
    /// toggle request per task, all in flight together. If any of them
    /// fails the optimistic state is discarded via a full reload; some
    /// toggles may have landed server-side, and the reload is the only
    /// reconciliation.
    pub async fn mark_all_completed(&self) -> Result<(), ApiError> {
        let pending_ids: Vec<i64> = {
            let state = self.lock();
            state
                .tasks
                .iter()
                .filter(|task| !task.completed)
                .map(|task| task.id)
                .collect()
        };
        if pending_ids.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.lock();
            for task in &mut state.tasks {
                task.completed = true;
            }
            state.stats.completed = state.stats.total;
            state.stats.pending = 0;
        }
        self.touch();

        let requests = pending_ids.iter().map(|&id| self.client.toggle_task(id));
        let results = futures::future::join_all(requests).await;

        if let Some(failure) = results.into_iter().find_map(Result::err) {
            warn!(%failure, "bulk completion failed, reloading");
            self.fetch_tasks().await;
            self.set_error("Bulk update failed");
            return Err(failure);
        }
        Ok(())
    }

    /// Drops all session state back to its initial value.
    pub fn reset(&self) {
        self.replace_error_timer(None);
        *self.lock() = State::default();
        self.touch();
    }

    // --- Optimistic helper ---------------------------------------------

    /// Snapshot-before-mutate: `apply` performs the local mutation and
    /// returns the undo closure (or `None` for a no-op), then the
    /// request runs without the lock held. Success hands the
    /// authoritative value to `commit`; failure runs the undo, records
    /// `message` and re-raises.
    async fn optimistic<T>(
        &self,
        apply: impl FnOnce(&mut State) -> Option<Undo>,
        request: impl Future<Output = Result<T, ApiError>>,
        commit: impl FnOnce(&mut State, &T),
        message: &'static str,
    ) -> Result<Option<T>, ApiError> {
        let undo = {
            let mut state = self.lock();
            match apply(&mut state) {
                Some(undo) => undo,
                None => return Ok(None),
            }
        };
        self.touch();

        match request.await {
            Ok(value) => {
                {
                    let mut state = self.lock();
                    commit(&mut state, &value);
                }
                self.touch();
                Ok(Some(value))
            }
            Err(err) => {
                {
                    let mut state = self.lock();
                    undo(&mut state);
                }
                self.touch();
                self.set_error(message);
                Err(err)
            }
        }
    }
}

/// Moves one unit between the completed and pending counters.
fn shift_completion(stats: &mut Stats, now_completed: bool) {
    if now_completed {
        stats.completed += 1;
        stats.pending -= 1;
    } else {
        stats.completed -= 1;
        stats.pending += 1;
    }
}
