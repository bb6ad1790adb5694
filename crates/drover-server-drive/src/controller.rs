// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use drover_server_chat::{prompts, ChatError, DriveControl, Forwarder, Responder};
use drover_server_projects::{Project, ProjectRepository, ProjectStatus};

use crate::error::{DriveError, Result};

/// The synthetic user drive messages are attributed to.
const DRIVE_ACTOR: &str = "auto-drive";

struct DriveHandle {
	shutdown: broadcast::Sender<()>,
	busy: Arc<AtomicBool>,
	join: JoinHandle<()>,
}

struct ControllerInner {
	projects: ProjectRepository,
	forwarder: Arc<dyn Forwarder>,
	responder: Arc<dyn Responder>,
	handles: Mutex<HashMap<String, DriveHandle>>,
}

#[derive(Clone)]
pub struct DriveController {
	inner: Arc<ControllerInner>,
}

impl DriveController {
	pub fn new(
		projects: ProjectRepository,
		forwarder: Arc<dyn Forwarder>,
		responder: Arc<dyn Responder>,
	) -> Self {
		Self {
			inner: Arc::new(ControllerInner {
				projects,
				forwarder,
				responder,
				handles: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Start (or restart) the drive loop for a project.
	#[tracing::instrument(skip(self, project), fields(slug = %project.slug))]
	pub async fn start(&self, project: &Project) -> Result<()> {
		if project.drive_interval_ms <= 0 {
			return Err(DriveError::NoInterval(project.slug.clone()));
		}

		self.stop(&project.id).await;

		let (shutdown, _) = broadcast::channel(1);
		let busy = Arc::new(AtomicBool::new(false));
		let join = spawn_drive_loop(
			Arc::clone(&self.inner),
			project.id.clone(),
			Duration::from_millis(project.drive_interval_ms as u64),
			(project.report_interval_ms > 0)
				.then(|| Duration::from_millis(project.report_interval_ms as u64)),
			shutdown.subscribe(),
			Arc::clone(&busy),
		);

		self.inner.handles.lock().await.insert(
			project.id.clone(),
			DriveHandle {
				shutdown,
				busy,
				join,
			},
		);

		info!(
			slug = %project.slug,
			drive_interval_ms = project.drive_interval_ms,
			report_interval_ms = project.report_interval_ms,
			"auto-drive started"
		);
		Ok(())
	}

	/// Stop and remove the controller for a project. Returns true if one
	/// was running.
	pub async fn stop(&self, project_id: &str) -> bool {
		let handle = self.inner.handles.lock().await.remove(project_id);
		match handle {
			Some(handle) => {
				let _ = handle.shutdown.send(());
				handle.join.abort();
				debug!(project_id, "auto-drive controller stopped");
				true
			}
			None => false,
		}
	}

	pub async fn running(&self, project_id: &str) -> bool {
		self.inner.handles.lock().await.contains_key(project_id)
	}

	pub async fn running_count(&self) -> usize {
		self.inner.handles.lock().await.len()
	}

	/// Reconstruct controllers from the store at startup, disabling
	/// auto-drive on projects whose window already expired.
	#[tracing::instrument(skip(self))]
	pub async fn restore_driving(&self) -> Result<usize> {
		let projects = self.inner.projects.list_auto_drive_projects().await?;
		let mut restored = 0;

		for project in projects {
			if is_expired(&project) {
				info!(slug = %project.slug, "auto-drive window expired while down; disabling");
				disable_auto_drive(&self.inner, &project).await;
				continue;
			}
			if let Err(e) = self.start(&project).await {
				warn!(slug = %project.slug, error = %e, "could not restore auto-drive");
				continue;
			}
			restored += 1;
		}

		info!(restored, "auto-drive controllers restored");
		Ok(restored)
	}

	/// Independent expiry sweep: stops expired controllers and posts a
	/// notice on the project's report channel. The per-tick check already
	/// handles the common case; this catches loops wedged on a slow
	/// forwarder.
	#[tracing::instrument(skip(self))]
	pub async fn sweep_expired(&self) -> Result<usize> {
		let projects = self.inner.projects.list_auto_drive_projects().await?;
		let mut swept = 0;

		for project in projects {
			if !is_expired(&project) {
				continue;
			}
			disable_auto_drive(&self.inner, &project).await;
			self.stop(&project.id).await;
			swept += 1;

			if !project.report_channel.is_empty() {
				let notice = format!(
					"Auto-drive window for `{}` has ended; the project keeps its state and can be driven again with `drive {}`.",
					project.slug, project.slug
				);
				if let Err(e) = self
					.inner
					.responder
					.post_message(
						&project.report_channel,
						none_if_empty(&project.report_thread),
						&notice,
					)
					.await
				{
					warn!(slug = %project.slug, error = %e, "expiry notice post failed");
				}
			}
		}

		Ok(swept)
	}

	/// Stop every controller; used during graceful shutdown.
	pub async fn stop_all(&self) {
		let handles: Vec<(String, DriveHandle)> =
			self.inner.handles.lock().await.drain().collect();
		for (project_id, handle) in handles {
			let _ = handle.shutdown.send(());
			handle.join.abort();
			debug!(project_id, "auto-drive controller stopped at shutdown");
		}
	}
}

#[async_trait]
impl DriveControl for DriveController {
	async fn start_driving(&self, project: &Project) -> drover_server_chat::Result<()> {
		self.start(project)
			.await
			.map_err(|e| ChatError::Drive(e.to_string()))
	}

	async fn stop_driving(&self, project_id: &str) -> bool {
		self.stop(project_id).await
	}

	async fn is_driving(&self, project_id: &str) -> bool {
		self.running(project_id).await
	}
}

fn is_expired(project: &Project) -> bool {
	project
		.auto_drive_until
		.map(|until| Utc::now() > until)
		.unwrap_or(false)
}

fn none_if_empty(value: &str) -> Option<&str> {
	if value.is_empty() {
		None
	} else {
		Some(value)
	}
}

async fn disable_auto_drive(inner: &ControllerInner, project: &Project) {
	let mut settings = drover_server_projects::AutoDriveSettings {
		enabled: false,
		drive_interval_ms: project.drive_interval_ms,
		report_interval_ms: project.report_interval_ms,
		phases: project.phases.clone(),
		current_phase: project.current_phase.clone(),
		auto_drive_until: project.auto_drive_until,
		report_channel: project.report_channel.clone(),
		report_thread: project.report_thread.clone(),
		phase_models: project.phase_models.clone(),
	};
	settings.auto_drive_until = None;

	if let Err(e) = inner
		.projects
		.update_auto_drive(&project.slug, &settings)
		.await
	{
		warn!(slug = %project.slug, error = %e, "could not disable auto-drive");
	}
	if let Err(e) = inner
		.projects
		.add_event(
			&project.id,
			"auto_drive_expired",
			DRIVE_ACTOR,
			"Auto-drive window ended",
			None,
		)
		.await
	{
		warn!(slug = %project.slug, error = %e, "could not record expiry event");
	}
}

fn spawn_drive_loop(
	inner: Arc<ControllerInner>,
	project_id: String,
	drive_period: Duration,
	report_period: Option<Duration>,
	mut shutdown: broadcast::Receiver<()>,
	busy: Arc<AtomicBool>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut drive_ticker = tokio::time::interval(drive_period);
		drive_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		drive_ticker.tick().await; // consume the immediate first tick

		let mut report_ticker = report_period.map(|period| {
			let mut ticker = tokio::time::interval(period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			ticker
		});
		if let Some(ticker) = report_ticker.as_mut() {
			ticker.tick().await;
		}

		loop {
			let keep_going = tokio::select! {
				_ = drive_ticker.tick() => tick(&inner, &project_id, &busy, TickKind::Drive).await,
				_ = async {
					match report_ticker.as_mut() {
						Some(ticker) => { ticker.tick().await; }
						None => std::future::pending::<()>().await,
					}
				} => tick(&inner, &project_id, &busy, TickKind::Report).await,
				_ = shutdown.recv() => false,
			};

			if !keep_going {
				break;
			}
		}

		// A loop that ends on its own (expiry, archive, delete) removes
		// its handle; explicit stops already removed it.
		inner.handles.lock().await.remove(&project_id);
		debug!(project_id, "auto-drive loop exited");
	})
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickKind {
	Drive,
	Report,
}

/// One tick: single-flight per project, revalidate, act. Returns false to
/// stop the loop.
async fn tick(
	inner: &Arc<ControllerInner>,
	project_id: &str,
	busy: &Arc<AtomicBool>,
	kind: TickKind,
) -> bool {
	if busy
		.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
		.is_err()
	{
		debug!(project_id, ?kind, "tick skipped; previous tick still running");
		return true;
	}

	let keep_going = run_tick(inner, project_id, kind).await;
	busy.store(false, Ordering::SeqCst);
	keep_going
}

async fn run_tick(inner: &Arc<ControllerInner>, project_id: &str, kind: TickKind) -> bool {
	let project = match inner.projects.get_project_by_id(project_id).await {
		Ok(Some(project)) => project,
		Ok(None) => {
			debug!(project_id, "project vanished; stopping auto-drive");
			return false;
		}
		Err(e) => {
			warn!(project_id, error = %e, "project reload failed; keeping the loop");
			return true;
		}
	};

	if !project.auto_drive || project.status != ProjectStatus::Active {
		debug!(slug = %project.slug, "project no longer driving; stopping");
		return false;
	}

	if is_expired(&project) {
		info!(slug = %project.slug, "auto-drive window expired; disabling");
		disable_auto_drive(inner, &project).await;
		return false;
	}

	match kind {
		TickKind::Drive => drive_tick(inner, &project).await,
		TickKind::Report => report_tick(inner, &project).await,
	}

	true
}

async fn drive_tick(inner: &Arc<ControllerInner>, project: &Project) {
	let channel = &project.report_channel;
	let thread = none_if_empty(&project.report_thread);

	// A phase with a model hint gets a model-selection control message
	// ahead of the nudge.
	if let Some(model) = project.current_phase_model() {
		if let Err(e) = inner
			.forwarder
			.handle_message_with_session(
				channel,
				DRIVE_ACTOR,
				&prompts::model_command(model),
				thread,
				"",
				&project.active_session,
			)
			.await
		{
			warn!(slug = %project.slug, error = %e, "model hint send failed");
		}
	}

	let nudge = prompts::drive_prompt(project);
	if let Err(e) = inner
		.forwarder
		.handle_message_with_session(
			channel,
			DRIVE_ACTOR,
			&nudge,
			thread,
			"",
			&project.active_session,
		)
		.await
	{
		warn!(slug = %project.slug, error = %e, "drive nudge send failed");
		return;
	}

	if let Err(e) = inner.projects.touch_project(&project.slug).await {
		warn!(slug = %project.slug, error = %e, "touch after drive tick failed");
	}
}

async fn report_tick(inner: &Arc<ControllerInner>, project: &Project) {
	let prompt = prompts::report_prompt(project);
	if let Err(e) = inner
		.forwarder
		.handle_message_with_session(
			&project.report_channel,
			DRIVE_ACTOR,
			&prompt,
			none_if_empty(&project.report_thread),
			"",
			&project.active_session,
		)
		.await
	{
		warn!(slug = %project.slug, error = %e, "report request send failed");
		return;
	}

	if let Err(e) = inner
		.projects
		.add_event(
			&project.id,
			"status_report",
			DRIVE_ACTOR,
			"Status report requested",
			None,
		)
		.await
	{
		warn!(slug = %project.slug, error = %e, "status report event failed");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use drover_server_chat::Result as ChatResult;
	use drover_server_db::testing::create_test_pool;
	use drover_server_projects::AutoDriveSettings;
	use std::sync::atomic::AtomicUsize;

	#[derive(Default)]
	struct CountingForwarder {
		drives: AtomicUsize,
		reports: AtomicUsize,
		model_hints: AtomicUsize,
		in_flight: AtomicUsize,
		max_in_flight: AtomicUsize,
		delay: Option<Duration>,
	}

	#[async_trait]
	impl Forwarder for CountingForwarder {
		async fn handle_message(
			&self,
			_channel: &str,
			_user: &str,
			_text: &str,
			_thread_ts: Option<&str>,
			_message_ts: &str,
		) -> ChatResult<()> {
			Ok(())
		}

		async fn handle_message_with_session(
			&self,
			_channel: &str,
			_user: &str,
			text: &str,
			_thread_ts: Option<&str>,
			_message_ts: &str,
			_session_key: &str,
		) -> ChatResult<()> {
			let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
			self.max_in_flight.fetch_max(current, Ordering::SeqCst);

			if text.starts_with("/model") {
				self.model_hints.fetch_add(1, Ordering::SeqCst);
			} else if text.contains("status report") {
				self.reports.fetch_add(1, Ordering::SeqCst);
			} else {
				self.drives.fetch_add(1, Ordering::SeqCst);
			}

			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}
			self.in_flight.fetch_sub(1, Ordering::SeqCst);
			Ok(())
		}

		async fn is_active_thread(&self, _channel: &str, _thread_ts: &str) -> bool {
			false
		}
	}

	struct NullResponder;

	#[async_trait]
	impl Responder for NullResponder {
		async fn post_message(
			&self,
			_channel: &str,
			_thread_ts: Option<&str>,
			_text: &str,
		) -> ChatResult<()> {
			Ok(())
		}

		async fn post_blocks(
			&self,
			_channel: &str,
			_thread_ts: Option<&str>,
			_fallback: &str,
			_blocks: &[serde_json::Value],
		) -> ChatResult<()> {
			Ok(())
		}
	}

	async fn driving_project(
		repo: &ProjectRepository,
		name: &str,
		drive_ms: i64,
		report_ms: i64,
		duration_ms: Option<i64>,
	) -> Project {
		let project = repo.create_project(name, "", "", "").await.unwrap();
		repo.update_auto_drive(
			&project.slug,
			&AutoDriveSettings {
				enabled: true,
				drive_interval_ms: drive_ms,
				report_interval_ms: report_ms,
				auto_drive_until: duration_ms
					.map(|ms| Utc::now() + chrono::Duration::milliseconds(ms)),
				report_channel: "C1".to_string(),
				..Default::default()
			},
		)
		.await
		.unwrap()
	}

	#[tokio::test]
	async fn test_drive_and_report_fire_then_expire() {
		let pool = create_test_pool().await;
		let repo = ProjectRepository::new(pool);
		let forwarder = Arc::new(CountingForwarder::default());
		let controller =
			DriveController::new(repo.clone(), forwarder.clone(), Arc::new(NullResponder));

		let project = driving_project(&repo, "Demo", 50, 100, Some(500)).await;
		controller.start(&project).await.unwrap();

		tokio::time::sleep(Duration::from_millis(700)).await;

		assert!(forwarder.drives.load(Ordering::SeqCst) >= 5);
		assert!(forwarder.reports.load(Ordering::SeqCst) >= 3);

		// The window ended: controller gone, auto_drive persisted off.
		assert!(!controller.running(&project.id).await);
		let stored = repo.get_project("demo").await.unwrap().unwrap();
		assert!(!stored.auto_drive);

		// And it stays quiet afterwards.
		let drives_after = forwarder.drives.load(Ordering::SeqCst);
		tokio::time::sleep(Duration::from_millis(150)).await;
		assert_eq!(forwarder.drives.load(Ordering::SeqCst), drives_after);
	}

	#[tokio::test]
	async fn test_archived_project_stops_by_next_tick() {
		let pool = create_test_pool().await;
		let repo = ProjectRepository::new(pool);
		let forwarder = Arc::new(CountingForwarder::default());
		let controller =
			DriveController::new(repo.clone(), forwarder.clone(), Arc::new(NullResponder));

		let project = driving_project(&repo, "Demo", 40, 0, None).await;
		controller.start(&project).await.unwrap();

		tokio::time::sleep(Duration::from_millis(100)).await;
		repo.archive_project("demo").await.unwrap();
		tokio::time::sleep(Duration::from_millis(150)).await;

		assert!(!controller.running(&project.id).await);
		let fired = forwarder.drives.load(Ordering::SeqCst);
		tokio::time::sleep(Duration::from_millis(150)).await;
		assert_eq!(forwarder.drives.load(Ordering::SeqCst), fired);
	}

	#[tokio::test]
	async fn test_ticks_are_single_flight() {
		let pool = create_test_pool().await;
		let repo = ProjectRepository::new(pool);
		let forwarder = Arc::new(CountingForwarder {
			delay: Some(Duration::from_millis(120)),
			..Default::default()
		});
		let controller =
			DriveController::new(repo.clone(), forwarder.clone(), Arc::new(NullResponder));

		let project = driving_project(&repo, "Demo", 30, 35, None).await;
		controller.start(&project).await.unwrap();

		tokio::time::sleep(Duration::from_millis(400)).await;
		controller.stop(&project.id).await;

		assert!(forwarder.max_in_flight.load(Ordering::SeqCst) <= 1);
	}

	#[tokio::test]
	async fn test_model_hint_precedes_nudge() {
		let pool = create_test_pool().await;
		let repo = ProjectRepository::new(pool);
		let forwarder = Arc::new(CountingForwarder::default());
		let controller =
			DriveController::new(repo.clone(), forwarder.clone(), Arc::new(NullResponder));

		let project = repo.create_project("Demo", "", "", "").await.unwrap();
		let mut models = std::collections::HashMap::new();
		models.insert("Analysis".to_string(), "opus".to_string());
		let project = repo
			.update_auto_drive(
				&project.slug,
				&AutoDriveSettings {
					enabled: true,
					drive_interval_ms: 50,
					phases: "Analysis".to_string(),
					current_phase: "Analysis".to_string(),
					report_channel: "C1".to_string(),
					phase_models: models,
					..Default::default()
				},
			)
			.await
			.unwrap();

		controller.start(&project).await.unwrap();
		tokio::time::sleep(Duration::from_millis(180)).await;
		controller.stop(&project.id).await;

		let hints = forwarder.model_hints.load(Ordering::SeqCst);
		let drives = forwarder.drives.load(Ordering::SeqCst);
		assert!(hints >= 1);
		assert!(drives >= 1);
		assert_eq!(hints, drives);
	}

	#[tokio::test]
	async fn test_restore_driving_skips_expired() {
		let pool = create_test_pool().await;
		let repo = ProjectRepository::new(pool);
		let forwarder = Arc::new(CountingForwarder::default());
		let controller =
			DriveController::new(repo.clone(), forwarder.clone(), Arc::new(NullResponder));

		let live = driving_project(&repo, "Live", 60_000, 0, Some(3_600_000)).await;
		let expired = driving_project(&repo, "Stale", 60_000, 0, Some(-1_000)).await;

		let restored = controller.restore_driving().await.unwrap();
		assert_eq!(restored, 1);
		assert!(controller.running(&live.id).await);
		assert!(!controller.running(&expired.id).await);

		let stale = repo.get_project("stale").await.unwrap().unwrap();
		assert!(!stale.auto_drive);

		controller.stop_all().await;
		assert_eq!(controller.running_count().await, 0);
	}

	#[tokio::test]
	async fn test_sweep_expired_posts_notice() {
		let pool = create_test_pool().await;
		let repo = ProjectRepository::new(pool);
		let forwarder = Arc::new(CountingForwarder::default());
		let controller =
			DriveController::new(repo.clone(), forwarder.clone(), Arc::new(NullResponder));

		driving_project(&repo, "Stale", 60_000, 0, Some(-1_000)).await;

		let swept = controller.sweep_expired().await.unwrap();
		assert_eq!(swept, 1);
		assert!(repo.list_auto_drive_projects().await.unwrap().is_empty());
	}
}
