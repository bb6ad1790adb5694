// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The task engine: bounded queue, fixed worker pool, durable state machine.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use drover_server_callback::{CallbackClient, CallbackConfig, CallbackPayload};

use crate::error::{EngineError, Result};
use crate::executor::{ApprovalSink, CompletionNotifier, ExecutionContext, ExecutorError, TaskExecutor};
use crate::store::TaskStore;
use crate::types::{
	EngineStats, SubmitRequest, TaskFilter, TaskRecord, TaskSnapshot, TaskStatus,
};

/// Error marker written onto tasks found in `running` at startup.
pub const STUCK_ON_STARTUP: &str = "stuck_on_startup";

const DEFAULT_TASK_TYPES: &[&str] = &[
	"noop",
	"slack.send-message",
	"github.create-pr",
	"github.comment",
	"jira.create-issue",
	"jira.update-issue",
	"deploy.service",
	"logs.fetch",
];

#[derive(Debug, Clone)]
pub struct EngineConfig {
	pub queue_capacity: usize,
	pub workers: usize,
	/// Applied when a task carries no TTL.
	pub default_timeout: Duration,
	/// Budget for the fire-and-forget callback dispatch after a terminal
	/// transition.
	pub callback_timeout: Duration,
	/// Re-enqueue tasks found in `pending` in the store at startup.
	pub requeue_pending_on_start: bool,
	/// The closed set of accepted task types.
	pub allowed_types: Vec<String>,
	pub callback: CallbackConfig,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			queue_capacity: 1000,
			workers: 4,
			default_timeout: Duration::from_secs(300),
			callback_timeout: Duration::from_secs(30),
			requeue_pending_on_start: false,
			allowed_types: DEFAULT_TASK_TYPES.iter().map(|s| s.to_string()).collect(),
			callback: CallbackConfig::default(),
		}
	}
}

struct EngineInner {
	config: EngineConfig,
	tasks: RwLock<HashMap<String, Arc<TaskRecord>>>,
	/// Creation-ordered records, iterated newest-first by list().
	order: RwLock<Vec<Arc<TaskRecord>>>,
	queue_tx: mpsc::Sender<Arc<TaskRecord>>,
	queue_rx: StdMutex<Option<mpsc::Receiver<Arc<TaskRecord>>>>,
	executor: StdRwLock<Option<Arc<dyn TaskExecutor>>>,
	notifier: StdRwLock<Option<Arc<dyn CompletionNotifier>>>,
	approvals: StdRwLock<Option<Arc<dyn ApprovalSink>>>,
	store: StdRwLock<Option<Arc<dyn TaskStore>>>,
	callbacks: CallbackClient,
	running: AtomicBool,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineInner {
	fn executor_slot(&self) -> Option<Arc<dyn TaskExecutor>> {
		self.executor.read().expect("executor slot poisoned").clone()
	}

	fn notifier_slot(&self) -> Option<Arc<dyn CompletionNotifier>> {
		self.notifier.read().expect("notifier slot poisoned").clone()
	}

	fn approvals_slot(&self) -> Option<Arc<dyn ApprovalSink>> {
		self.approvals.read().expect("approvals slot poisoned").clone()
	}

	fn store_slot(&self) -> Option<Arc<dyn TaskStore>> {
		self.store.read().expect("store slot poisoned").clone()
	}

	/// Best-effort write-through; the in-memory record stays authoritative.
	async fn persist(&self, task: &TaskRecord) {
		let Some(store) = self.store_slot() else {
			return;
		};
		let snapshot = task.snapshot().await;
		if let Err(e) = store.persist(&snapshot).await {
			warn!(
				task_id = %task.id,
				error = %e,
				"task persistence failed; in-memory state remains authoritative"
			);
		}
	}
}

/// Cheaply cloneable handle to the engine.
#[derive(Clone)]
pub struct TaskEngine {
	inner: Arc<EngineInner>,
}

impl TaskEngine {
	pub fn new(config: EngineConfig) -> Self {
		let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
		let (shutdown_tx, _) = broadcast::channel(1);
		let callbacks = CallbackClient::new(config.callback.clone());
		Self {
			inner: Arc::new(EngineInner {
				config,
				tasks: RwLock::new(HashMap::new()),
				order: RwLock::new(Vec::new()),
				queue_tx,
				queue_rx: StdMutex::new(Some(queue_rx)),
				executor: StdRwLock::new(None),
				notifier: StdRwLock::new(None),
				approvals: StdRwLock::new(None),
				store: StdRwLock::new(None),
				callbacks,
				running: AtomicBool::new(false),
				shutdown_tx,
				handles: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Collaborators are wired before `start`; setting them later is legal
	/// but racing executions may observe the previous value.
	pub fn set_executor(&self, executor: Arc<dyn TaskExecutor>) {
		*self.inner.executor.write().expect("executor slot poisoned") = Some(executor);
	}

	pub fn set_notifier(&self, notifier: Arc<dyn CompletionNotifier>) {
		*self.inner.notifier.write().expect("notifier slot poisoned") = Some(notifier);
	}

	pub fn set_approval_sink(&self, sink: Arc<dyn ApprovalSink>) {
		*self.inner.approvals.write().expect("approvals slot poisoned") = Some(sink);
	}

	pub fn set_store(&self, store: Arc<dyn TaskStore>) {
		*self.inner.store.write().expect("store slot poisoned") = Some(store);
	}

	pub fn allowed_types(&self) -> &[String] {
		&self.inner.config.allowed_types
	}

	pub fn worker_count(&self) -> usize {
		self.inner.config.workers
	}

	pub fn is_running(&self) -> bool {
		self.inner.running.load(Ordering::SeqCst)
	}

	/// Tasks currently waiting in the queue.
	pub fn queue_depth(&self) -> usize {
		self.inner.config.queue_capacity.max(1) - self.inner.queue_tx.capacity()
	}

	/// Accept a task. The record is indexed and persisted (best-effort)
	/// before the queue offer; a full queue fails the task immediately —
	/// the engine's single backpressure mechanism.
	#[instrument(skip(self, request), fields(task_type = %request.task_type))]
	pub async fn submit(&self, request: SubmitRequest) -> Result<TaskSnapshot> {
		if !self
			.inner
			.config
			.allowed_types
			.iter()
			.any(|t| t == &request.task_type)
		{
			return Err(EngineError::InvalidTaskType(request.task_type));
		}

		let id = Uuid::new_v4().to_string();
		let record = Arc::new(TaskRecord::new(id.clone(), request));

		self.inner
			.tasks
			.write()
			.await
			.insert(id.clone(), Arc::clone(&record));
		self.inner.order.write().await.push(Arc::clone(&record));
		self.inner.persist(&record).await;

		if self.inner.queue_tx.try_send(Arc::clone(&record)).is_err() {
			{
				let mut state = record.state.write().await;
				state.status = TaskStatus::Failed;
				state.error = Some("task queue is full".to_string());
				state.completed_at = Some(Utc::now());
			}
			self.inner.persist(&record).await;
			warn!(task_id = %id, "task queue is full; submission rejected");
			return Err(EngineError::QueueFull);
		}

		debug!(task_id = %id, "task accepted");
		Ok(record.snapshot().await)
	}

	pub async fn get(&self, id: &str) -> Option<TaskSnapshot> {
		let record = self.inner.tasks.read().await.get(id).cloned()?;
		Some(record.snapshot().await)
	}

	/// Cancel a task that has not been picked up yet.
	#[instrument(skip(self))]
	pub async fn cancel(&self, id: &str) -> Result<TaskSnapshot> {
		let record = self
			.inner
			.tasks
			.read()
			.await
			.get(id)
			.cloned()
			.ok_or_else(|| EngineError::NotFound(id.to_string()))?;

		{
			let mut state = record.state.write().await;
			if state.status != TaskStatus::Pending {
				drop(state);
				return Err(EngineError::conflict(
					"cancel requires pending",
					record.snapshot().await,
				));
			}
			state.status = TaskStatus::Cancelled;
			state.completed_at = Some(Utc::now());
		}
		self.inner.persist(&record).await;
		info!(task_id = %id, "task cancelled");
		Ok(record.snapshot().await)
	}

	/// Put an awaiting-approval task back on the queue.
	#[instrument(skip(self))]
	pub async fn requeue(&self, id: &str) -> Result<TaskSnapshot> {
		let record = self
			.inner
			.tasks
			.read()
			.await
			.get(id)
			.cloned()
			.ok_or_else(|| EngineError::NotFound(id.to_string()))?;

		{
			let mut state = record.state.write().await;
			if state.status != TaskStatus::AwaitingApproval {
				drop(state);
				return Err(EngineError::conflict(
					"requeue requires awaiting_approval",
					record.snapshot().await,
				));
			}
			state.status = TaskStatus::Pending;
			state.error = None;
			state.completed_at = None;
		}
		self.inner.persist(&record).await;

		if self.inner.queue_tx.try_send(Arc::clone(&record)).is_err() {
			{
				let mut state = record.state.write().await;
				state.status = TaskStatus::Failed;
				state.error = Some("task queue is full (requeue)".to_string());
				state.completed_at = Some(Utc::now());
			}
			self.inner.persist(&record).await;
			return Err(EngineError::QueueFull);
		}

		info!(task_id = %id, "task requeued");
		Ok(record.snapshot().await)
	}

	/// Fail a parked task (the approval-denied path). Only legal in
	/// awaiting_approval.
	#[instrument(skip(self))]
	pub async fn fail(&self, id: &str, error: &str) -> Result<TaskSnapshot> {
		let record = self
			.inner
			.tasks
			.read()
			.await
			.get(id)
			.cloned()
			.ok_or_else(|| EngineError::NotFound(id.to_string()))?;

		{
			let mut state = record.state.write().await;
			if state.status != TaskStatus::AwaitingApproval {
				drop(state);
				return Err(EngineError::conflict(
					"fail requires awaiting_approval",
					record.snapshot().await,
				));
			}
			state.status = TaskStatus::Failed;
			state.error = Some(error.to_string());
			state.completed_at = Some(Utc::now());
		}
		self.inner.persist(&record).await;
		info!(task_id = %id, error, "parked task failed");
		Ok(record.snapshot().await)
	}

	/// Snapshots in reverse creation order (newest first).
	pub async fn list(&self, filter: &TaskFilter) -> (Vec<TaskSnapshot>, usize) {
		let records: Vec<Arc<TaskRecord>> = {
			let order = self.inner.order.read().await;
			order.iter().rev().cloned().collect()
		};

		let mut matched = Vec::new();
		for record in records {
			let snapshot = record.snapshot().await;
			if let Some(status) = filter.status {
				if snapshot.status != status {
					continue;
				}
			}
			if let Some(ref task_type) = filter.task_type {
				if &snapshot.task_type != task_type {
					continue;
				}
			}
			if let Some(ref caller_id) = filter.caller_id {
				if snapshot.caller_id.as_deref() != Some(caller_id.as_str()) {
					continue;
				}
			}
			matched.push(snapshot);
		}

		let total = matched.len();
		let limit = if filter.limit == 0 {
			50
		} else {
			filter.limit.clamp(1, 100)
		};
		let page = matched
			.into_iter()
			.skip(filter.offset)
			.take(limit)
			.collect();
		(page, total)
	}

	pub async fn stats(&self) -> EngineStats {
		let records: Vec<Arc<TaskRecord>> = {
			let order = self.inner.order.read().await;
			order.iter().cloned().collect()
		};

		let mut stats = EngineStats {
			total: records.len(),
			..Default::default()
		};
		let mut completed_durations_ms: Vec<i64> = Vec::new();

		for record in records {
			let snapshot = record.snapshot().await;
			*stats
				.by_status
				.entry(snapshot.status.as_str().to_string())
				.or_default() += 1;
			*stats.by_type.entry(snapshot.task_type.clone()).or_default() += 1;

			if snapshot.status == TaskStatus::Completed {
				if let (Some(started), Some(completed)) = (snapshot.started_at, snapshot.completed_at)
				{
					completed_durations_ms.push((completed - started).num_milliseconds());
				}
			}
		}

		if !completed_durations_ms.is_empty() {
			stats.avg_duration_ms = completed_durations_ms.iter().sum::<i64>() as f64
				/ completed_durations_ms.len() as f64;
		}
		stats
	}

	/// Drop terminal tasks from the in-memory index, mirroring the store's
	/// retention horizon so long uptimes do not grow without bound.
	pub async fn evict_completed_before(&self, cutoff: chrono::DateTime<Utc>) -> usize {
		let mut evict_ids = Vec::new();
		{
			let order = self.inner.order.read().await;
			for record in order.iter() {
				let state = record.state.read().await;
				if state.status.is_terminal()
					&& state.completed_at.map(|t| t < cutoff).unwrap_or(false)
				{
					evict_ids.push(record.id.clone());
				}
			}
		}
		if evict_ids.is_empty() {
			return 0;
		}

		let mut tasks = self.inner.tasks.write().await;
		let mut order = self.inner.order.write().await;
		for id in &evict_ids {
			tasks.remove(id);
		}
		order.retain(|r| !evict_ids.contains(&r.id));
		debug!(evicted = evict_ids.len(), "evicted terminal tasks from memory");
		evict_ids.len()
	}

	/// Start the worker pool. Idempotent while running; an engine that has
	/// been stopped cannot be restarted (the queue receiver is consumed).
	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		if self
			.inner
			.running
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return Ok(());
		}

		if let Some(store) = self.inner.store_slot() {
			match store.fail_stuck_running(STUCK_ON_STARTUP).await {
				Ok(0) => {}
				Ok(n) => warn!(count = n, "failed tasks stuck in running from previous run"),
				Err(e) => warn!(error = %e, "crash-recovery sweep failed"),
			}

			if self.inner.config.requeue_pending_on_start {
				match store.pending_tasks().await {
					Ok(tasks) => {
						for snapshot in tasks {
							self.adopt_pending(snapshot).await;
						}
					}
					Err(e) => warn!(error = %e, "could not load pending tasks for re-enqueue"),
				}
			}
		}

		let receiver = self
			.inner
			.queue_rx
			.lock()
			.expect("queue receiver slot poisoned")
			.take()
			.ok_or(EngineError::NotRunning)?;
		let receiver = Arc::new(Mutex::new(receiver));

		let mut handles = self.inner.handles.lock().await;
		for worker_id in 0..self.inner.config.workers.max(1) {
			let inner = Arc::clone(&self.inner);
			let receiver = Arc::clone(&receiver);
			let mut shutdown = self.inner.shutdown_tx.subscribe();

			handles.push(tokio::spawn(async move {
				loop {
					let task = {
						let mut rx = receiver.lock().await;
						tokio::select! {
							maybe = rx.recv() => match maybe {
								Some(task) => task,
								None => break,
							},
							_ = shutdown.recv() => break,
						}
					};
					run_task(&inner, task).await;
				}
				debug!(worker_id, "worker exited");
			}));
		}

		info!(
			workers = self.inner.config.workers,
			queue_capacity = self.inner.config.queue_capacity,
			"task engine started"
		);
		Ok(())
	}

	/// Stop the pool: workers drain their current task, then exit. Blocks
	/// until every worker has returned.
	#[instrument(skip(self))]
	pub async fn stop(&self) {
		if self
			.inner
			.running
			.compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return;
		}

		let _ = self.inner.shutdown_tx.send(());
		let mut handles = self.inner.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}
		info!("task engine stopped");
	}

	async fn adopt_pending(&self, snapshot: TaskSnapshot) {
		let request = SubmitRequest {
			task_type: snapshot.task_type,
			params: snapshot.params,
			caller_id: snapshot.caller_id,
			callback_url: snapshot.callback_url,
			response_channel: snapshot.response_channel,
			response_thread: snapshot.response_thread,
			project_id: snapshot.project_id,
			session_key: snapshot.session_key,
			ttl: snapshot
				.ttl_ms
				.filter(|ms| *ms > 0)
				.map(|ms| Duration::from_millis(ms as u64)),
		};
		let record = Arc::new(TaskRecord::new(snapshot.id.clone(), request));

		self.inner
			.tasks
			.write()
			.await
			.insert(record.id.clone(), Arc::clone(&record));
		self.inner.order.write().await.push(Arc::clone(&record));

		if self.inner.queue_tx.try_send(Arc::clone(&record)).is_err() {
			let mut state = record.state.write().await;
			state.status = TaskStatus::Failed;
			state.error = Some("task queue is full".to_string());
			state.completed_at = Some(Utc::now());
			drop(state);
			self.inner.persist(&record).await;
			return;
		}
		debug!(task_id = %record.id, "re-enqueued pending task from store");
	}
}

async fn run_task(inner: &Arc<EngineInner>, task: Arc<TaskRecord>) {
	{
		let state = task.state.read().await;
		if state.status == TaskStatus::Cancelled {
			return;
		}
	}

	{
		let mut state = task.state.write().await;
		state.status = TaskStatus::Running;
		state.started_at = Some(Utc::now());
	}
	inner.persist(&task).await;

	let deadline = task
		.ttl
		.filter(|d| !d.is_zero())
		.unwrap_or(inner.config.default_timeout);

	let outcome = match inner.executor_slot() {
		None => Err(ExecutorError::new("no executor configured")),
		Some(executor) => {
			let ctx = ExecutionContext {
				task_id: task.id.clone(),
				session_key: task.session_key.clone(),
				project_id: task.project_id.clone(),
				deadline,
			};
			let task_type = task.task_type.clone();
			let params = task.params.clone();

			// Spawned so a panicking executor is contained as a JoinError
			// instead of taking the worker down.
			let mut handle =
				tokio::spawn(async move { executor.execute(ctx, &task_type, &params).await });

			tokio::select! {
				joined = &mut handle => match joined {
					Ok(result) => result,
					Err(e) if e.is_panic() => {
						Err(ExecutorError::new(format!("executor panicked: {e}")))
					}
					Err(e) => Err(ExecutorError::new(format!("executor aborted: {e}"))),
				},
				_ = tokio::time::sleep(deadline) => {
					handle.abort();
					Err(ExecutorError::new(format!(
						"task deadline exceeded after {}ms",
						deadline.as_millis()
					)))
				}
			}
		}
	};

	let approval_reason = match &outcome {
		Err(e) if e.is_awaiting_approval() => e.approval_reason().map(str::to_string),
		_ => None,
	};

	{
		let mut state = task.state.write().await;
		match &outcome {
			Ok(result) => {
				state.status = TaskStatus::Completed;
				state.result = Some(result.clone());
				state.error = None;
				state.completed_at = Some(Utc::now());
			}
			Err(e) if e.is_awaiting_approval() => {
				state.status = TaskStatus::AwaitingApproval;
				state.error = Some(e.message.clone());
				state.completed_at = None;
			}
			Err(e) => {
				state.status = TaskStatus::Failed;
				state.error = Some(e.message.clone());
				state.completed_at = Some(Utc::now());
			}
		}
	}
	inner.persist(&task).await;

	let snapshot = task.snapshot().await;
	debug!(task_id = %snapshot.id, status = %snapshot.status, "task transitioned");

	// Parked tasks notify nobody; an external actor will requeue.
	if let Some(reason) = approval_reason {
		if let Some(sink) = inner.approvals_slot() {
			let parked = snapshot.clone();
			tokio::spawn(async move {
				sink.record_awaiting_approval(&parked, &reason).await;
			});
		}
		return;
	}

	if let Some(url) = snapshot.callback_url.clone().filter(|u| !u.is_empty()) {
		let callbacks = inner.callbacks.clone();
		let budget = inner.config.callback_timeout;
		let payload = CallbackPayload {
			task_id: snapshot.id.clone(),
			task_type: snapshot.task_type.clone(),
			status: snapshot.status.as_str().to_string(),
			result: snapshot.result.clone(),
			error: snapshot.error.clone(),
			completed_at: snapshot.completed_at,
		};
		tokio::spawn(async move {
			match tokio::time::timeout(budget, callbacks.deliver(&url, &payload)).await {
				Ok(Ok(())) => {}
				Ok(Err(e)) => warn!(url, error = %e, "callback delivery failed"),
				Err(_) => warn!(url, "callback delivery exceeded its budget"),
			}
		});
	}

	if matches!(snapshot.status, TaskStatus::Completed | TaskStatus::Failed) {
		if let Some(channel) = snapshot.response_channel.clone().filter(|c| !c.is_empty()) {
			if let Some(notifier) = inner.notifier_slot() {
				let notified = snapshot.clone();
				tokio::spawn(async move {
					notifier
						.notify_task_completion(
							&channel,
							notified.response_thread.as_deref(),
							&notified.id,
							&notified.task_type,
							notified.status,
							notified.result.as_ref(),
							notified.error.as_deref(),
						)
						.await;
				});
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::sync::atomic::AtomicU32;

	struct EchoExecutor;

	#[async_trait]
	impl TaskExecutor for EchoExecutor {
		async fn execute(
			&self,
			_ctx: ExecutionContext,
			task_type: &str,
			_params: &serde_json::Value,
		) -> std::result::Result<serde_json::Value, ExecutorError> {
			Ok(serde_json::json!({
				"status": "completed",
				"message": format!("Task type {task_type} executed (no-op)"),
			}))
		}
	}

	struct SleepyExecutor(Duration);

	#[async_trait]
	impl TaskExecutor for SleepyExecutor {
		async fn execute(
			&self,
			_ctx: ExecutionContext,
			_task_type: &str,
			_params: &serde_json::Value,
		) -> std::result::Result<serde_json::Value, ExecutorError> {
			tokio::time::sleep(self.0).await;
			Ok(serde_json::json!({"slept": true}))
		}
	}

	struct ApproveOnSecondTry {
		calls: AtomicU32,
	}

	#[async_trait]
	impl TaskExecutor for ApproveOnSecondTry {
		async fn execute(
			&self,
			_ctx: ExecutionContext,
			_task_type: &str,
			_params: &serde_json::Value,
		) -> std::result::Result<serde_json::Value, ExecutorError> {
			if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
				Err(ExecutorError::awaiting_approval("deploy to prod"))
			} else {
				Ok(serde_json::json!({"deployed": true}))
			}
		}
	}

	struct PanickingExecutor;

	#[async_trait]
	impl TaskExecutor for PanickingExecutor {
		async fn execute(
			&self,
			_ctx: ExecutionContext,
			_task_type: &str,
			_params: &serde_json::Value,
		) -> std::result::Result<serde_json::Value, ExecutorError> {
			panic!("executor blew up");
		}
	}

	fn request(task_type: &str) -> SubmitRequest {
		SubmitRequest {
			task_type: task_type.to_string(),
			params: serde_json::json!({"x": 1}),
			..Default::default()
		}
	}

	async fn wait_for_status(engine: &TaskEngine, id: &str, status: TaskStatus) -> TaskSnapshot {
		for _ in 0..200 {
			if let Some(snapshot) = engine.get(id).await {
				if snapshot.status == status {
					return snapshot;
				}
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("task {id} never reached {status}");
	}

	#[tokio::test]
	async fn test_simple_task_completes() {
		let engine = TaskEngine::new(EngineConfig::default());
		engine.set_executor(Arc::new(EchoExecutor));
		engine.start().await.unwrap();

		let accepted = engine.submit(request("noop")).await.unwrap();
		assert_eq!(accepted.status, TaskStatus::Pending);

		let done = wait_for_status(&engine, &accepted.id, TaskStatus::Completed).await;
		assert_eq!(
			done.result,
			Some(serde_json::json!({
				"status": "completed",
				"message": "Task type noop executed (no-op)",
			}))
		);
		assert!(done.error.is_none());
		assert!(done.started_at.is_some());
		assert!(done.completed_at.is_some());

		engine.stop().await;
	}

	#[tokio::test]
	async fn test_unknown_type_rejected() {
		let engine = TaskEngine::new(EngineConfig::default());
		let err = engine.submit(request("bogus.type")).await.unwrap_err();
		assert!(matches!(err, EngineError::InvalidTaskType(t) if t == "bogus.type"));
	}

	#[tokio::test]
	async fn test_ttl_expiry_fails_task() {
		let engine = TaskEngine::new(EngineConfig::default());
		engine.set_executor(Arc::new(SleepyExecutor(Duration::from_secs(5))));
		engine.start().await.unwrap();

		let accepted = engine
			.submit(SubmitRequest {
				ttl: Some(Duration::from_millis(50)),
				..request("noop")
			})
			.await
			.unwrap();

		let failed = wait_for_status(&engine, &accepted.id, TaskStatus::Failed).await;
		assert!(failed.error.unwrap().contains("deadline"));
		engine.stop().await;
	}

	#[tokio::test]
	async fn test_approval_round_trip() {
		let engine = TaskEngine::new(EngineConfig::default());
		engine.set_executor(Arc::new(ApproveOnSecondTry {
			calls: AtomicU32::new(0),
		}));
		engine.start().await.unwrap();

		let accepted = engine.submit(request("deploy.service")).await.unwrap();
		let parked = wait_for_status(&engine, &accepted.id, TaskStatus::AwaitingApproval).await;
		assert_eq!(parked.error.as_deref(), Some("awaiting_approval:deploy to prod"));
		assert!(parked.completed_at.is_none());

		engine.requeue(&accepted.id).await.unwrap();
		let done = wait_for_status(&engine, &accepted.id, TaskStatus::Completed).await;
		assert_eq!(done.result, Some(serde_json::json!({"deployed": true})));
		assert!(done.error.is_none());

		engine.stop().await;
	}

	#[tokio::test]
	async fn test_requeue_requires_awaiting_approval() {
		let engine = TaskEngine::new(EngineConfig::default());
		let accepted = engine.submit(request("noop")).await.unwrap();

		let err = engine.requeue(&accepted.id).await.unwrap_err();
		match err {
			EngineError::Conflict { snapshot, .. } => {
				assert_eq!(snapshot.status, TaskStatus::Pending);
			}
			other => panic!("expected Conflict, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_cancel_pending_then_conflict() {
		// Engine not started: the task stays pending in the queue.
		let engine = TaskEngine::new(EngineConfig::default());
		let accepted = engine.submit(request("noop")).await.unwrap();

		let cancelled = engine.cancel(&accepted.id).await.unwrap();
		assert_eq!(cancelled.status, TaskStatus::Cancelled);
		assert!(cancelled.completed_at.is_some());

		let err = engine.cancel(&accepted.id).await.unwrap_err();
		match err {
			EngineError::Conflict { snapshot, .. } => {
				assert_eq!(snapshot.status, TaskStatus::Cancelled);
			}
			other => panic!("expected Conflict, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_cancelled_task_is_skipped_by_workers() {
		let engine = TaskEngine::new(EngineConfig::default());
		engine.set_executor(Arc::new(EchoExecutor));

		let accepted = engine.submit(request("noop")).await.unwrap();
		engine.cancel(&accepted.id).await.unwrap();

		engine.start().await.unwrap();
		tokio::time::sleep(Duration::from_millis(100)).await;

		let snapshot = engine.get(&accepted.id).await.unwrap();
		assert_eq!(snapshot.status, TaskStatus::Cancelled);
		engine.stop().await;
	}

	#[tokio::test]
	async fn test_queue_full_fails_submission() {
		let engine = TaskEngine::new(EngineConfig {
			queue_capacity: 1,
			..EngineConfig::default()
		});

		let first = engine.submit(request("noop")).await.unwrap();
		assert_eq!(first.status, TaskStatus::Pending);

		let err = engine.submit(request("noop")).await.unwrap_err();
		assert!(matches!(err, EngineError::QueueFull));

		// The rejected task exists, failed, with the well-known error.
		let (tasks, total) = engine.list(&TaskFilter::default()).await;
		assert_eq!(total, 2);
		let failed = tasks
			.iter()
			.find(|t| t.status == TaskStatus::Failed)
			.unwrap();
		assert_eq!(failed.error.as_deref(), Some("task queue is full"));
	}

	#[tokio::test]
	async fn test_panicking_executor_fails_task() {
		let engine = TaskEngine::new(EngineConfig::default());
		engine.set_executor(Arc::new(PanickingExecutor));
		engine.start().await.unwrap();

		let accepted = engine.submit(request("noop")).await.unwrap();
		let failed = wait_for_status(&engine, &accepted.id, TaskStatus::Failed).await;
		assert!(failed.error.unwrap().contains("panicked"));

		// The worker survived the panic and still serves new tasks.
		engine.set_executor(Arc::new(EchoExecutor));
		let second = engine.submit(request("noop")).await.unwrap();
		wait_for_status(&engine, &second.id, TaskStatus::Completed).await;

		engine.stop().await;
	}

	#[tokio::test]
	async fn test_list_filters_and_pagination() {
		let engine = TaskEngine::new(EngineConfig::default());
		for _ in 0..5 {
			engine.submit(request("noop")).await.unwrap();
		}
		engine
			.submit(SubmitRequest {
				caller_id: Some("alice".to_string()),
				..request("logs.fetch")
			})
			.await
			.unwrap();

		let (all, total) = engine.list(&TaskFilter::default()).await;
		assert_eq!(total, 6);
		// Newest first.
		assert_eq!(all[0].task_type, "logs.fetch");

		let (typed, typed_total) = engine
			.list(&TaskFilter {
				task_type: Some("logs.fetch".to_string()),
				..Default::default()
			})
			.await;
		assert_eq!(typed_total, 1);
		assert_eq!(typed[0].caller_id.as_deref(), Some("alice"));

		let (page, page_total) = engine
			.list(&TaskFilter {
				offset: 4,
				limit: 10,
				..Default::default()
			})
			.await;
		assert_eq!(page_total, 6);
		assert_eq!(page.len(), 2);

		let (beyond, beyond_total) = engine
			.list(&TaskFilter {
				offset: 100,
				..Default::default()
			})
			.await;
		assert_eq!(beyond_total, 6);
		assert!(beyond.is_empty());
	}

	#[tokio::test]
	async fn test_stats_counts_and_avg_duration() {
		let engine = TaskEngine::new(EngineConfig::default());
		engine.set_executor(Arc::new(EchoExecutor));
		engine.start().await.unwrap();

		let a = engine.submit(request("noop")).await.unwrap();
		let b = engine.submit(request("logs.fetch")).await.unwrap();
		wait_for_status(&engine, &a.id, TaskStatus::Completed).await;
		wait_for_status(&engine, &b.id, TaskStatus::Completed).await;

		let stats = engine.stats().await;
		assert_eq!(stats.total, 2);
		assert_eq!(stats.by_status.get("completed"), Some(&2));
		assert_eq!(stats.by_type.get("noop"), Some(&1));
		assert!(stats.avg_duration_ms >= 0.0);

		engine.stop().await;
	}

	#[tokio::test]
	async fn test_store_writeback_and_recovery() {
		use drover_server_db::testing::create_test_pool;
		use drover_server_db::{TaskRepository, TaskRow};

		let pool = create_test_pool().await;
		let repo = Arc::new(TaskRepository::new(pool.clone()));

		// A task left running by a "previous process".
		repo.upsert_task(&TaskRow {
			id: "stale".to_string(),
			task_type: "noop".to_string(),
			params: serde_json::json!({}),
			caller_id: None,
			callback_url: None,
			response_channel: None,
			response_thread: None,
			project_id: None,
			session_key: None,
			ttl_ms: None,
			status: "running".to_string(),
			result: None,
			error: None,
			created_at: Utc::now(),
			started_at: Some(Utc::now()),
			completed_at: None,
		})
		.await
		.unwrap();

		let engine = TaskEngine::new(EngineConfig::default());
		engine.set_executor(Arc::new(EchoExecutor));
		engine.set_store(repo.clone());
		engine.start().await.unwrap();

		let stale = repo.get_task("stale").await.unwrap().unwrap();
		assert_eq!(stale.status, "failed");
		assert_eq!(stale.error.as_deref(), Some(STUCK_ON_STARTUP));

		let accepted = engine.submit(request("noop")).await.unwrap();
		wait_for_status(&engine, &accepted.id, TaskStatus::Completed).await;

		// Write-through reached the store.
		for _ in 0..100 {
			let row = repo.get_task(&accepted.id).await.unwrap().unwrap();
			if row.status == "completed" {
				engine.stop().await;
				return;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("store never observed the completed transition");
	}

	#[tokio::test]
	async fn test_evict_completed_before() {
		let engine = TaskEngine::new(EngineConfig::default());
		engine.set_executor(Arc::new(EchoExecutor));
		engine.start().await.unwrap();

		let accepted = engine.submit(request("noop")).await.unwrap();
		wait_for_status(&engine, &accepted.id, TaskStatus::Completed).await;
		let open = engine.submit(request("noop")).await.unwrap();
		wait_for_status(&engine, &open.id, TaskStatus::Completed).await;
		engine.stop().await;

		let evicted = engine
			.evict_completed_before(Utc::now() + chrono::Duration::seconds(1))
			.await;
		assert_eq!(evicted, 2);
		assert!(engine.get(&accepted.id).await.is_none());
		let (_, total) = engine.list(&TaskFilter::default()).await;
		assert_eq!(total, 0);
	}

	#[tokio::test]
	async fn test_start_stop_idempotent() {
		let engine = TaskEngine::new(EngineConfig::default());
		engine.set_executor(Arc::new(EchoExecutor));
		engine.start().await.unwrap();
		engine.start().await.unwrap();
		engine.stop().await;
		engine.stop().await;
	}
}
