// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Inbound chat routing.
//!
//! Messages on a bound thread go straight to the project's session; loose
//! messages are parsed as commands; anything unrecognized passes through to
//! the plain forwarder.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use drover_server_db::ApprovalRepository;
use drover_server_engine::TaskEngine;
use drover_server_projects::{
	generate_slug, parse_session_key, AutoDriveSettings, Project, ProjectError, ProjectManager,
	ProjectRepository, ProjectStatus,
};
use drover_server_sessions::{SessionContext, SessionContextStore};

use crate::blocks;
use crate::command::{parse_command, parse_duration_ms, strip_mention, Command, PhasesSpec};
use crate::error::Result;
use crate::prompts;
use crate::traits::{DriveControl, Forwarder, Responder};

pub const DEFAULT_DRIVE_INTERVAL_MS: i64 = 600_000; // 10 minutes

/// Parameters resolved when enabling auto-drive from chat.
struct DriveRequest<'a> {
	slug: &'a str,
	interval: Option<&'a str>,
	report: Option<&'a str>,
	phases: Option<&'a PhasesSpec>,
	duration: Option<&'a str>,
	channel: &'a str,
	user: &'a str,
	thread_ts: Option<&'a str>,
	message_ts: &'a str,
}

pub struct MessageRouter {
	projects: ProjectRepository,
	manager: ProjectManager,
	sessions: Arc<SessionContextStore>,
	engine: TaskEngine,
	approvals: ApprovalRepository,
	forwarder: Arc<dyn Forwarder>,
	responder: Arc<dyn Responder>,
	drive: Arc<dyn DriveControl>,
}

impl MessageRouter {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		projects: ProjectRepository,
		manager: ProjectManager,
		sessions: Arc<SessionContextStore>,
		engine: TaskEngine,
		approvals: ApprovalRepository,
		forwarder: Arc<dyn Forwarder>,
		responder: Arc<dyn Responder>,
		drive: Arc<dyn DriveControl>,
	) -> Self {
		Self {
			projects,
			manager,
			sessions,
			engine,
			approvals,
			forwarder,
			responder,
			drive,
		}
	}

	/// Route one inbound chat message.
	#[tracing::instrument(skip(self, text), fields(channel, user))]
	pub async fn handle_message(
		&self,
		channel: &str,
		user: &str,
		text: &str,
		thread_ts: Option<&str>,
		message_ts: &str,
	) -> Result<()> {
		// Remember where this caller can be reached, for async replies.
		let mut ctx = SessionContext::new(format!("chat-{channel}"), channel);
		ctx.thread_ts = Some(thread_ts.unwrap_or(message_ts).to_string());
		self.sessions.set(ctx).await;

		// Bound threads route directly to their project session.
		if let Some(thread) = thread_ts.filter(|t| !t.is_empty()) {
			if let Some(project) = self.projects.get_project_by_thread(channel, thread).await? {
				if project.status == ProjectStatus::Archived {
					self.responder
						.post_message(
							channel,
							Some(thread),
							&format!(
								"Project `{}` is archived. Run `resume {}` to pick it back up.",
								project.slug, project.slug
							),
						)
						.await?;
					return Ok(());
				}
				self.projects.touch_project(&project.slug).await?;
				self.projects.touch_thread(channel, thread).await?;
				debug!(slug = %project.slug, "thread-bound message forwarded to session");
				return self
					.forwarder
					.handle_message_with_session(
						channel,
						user,
						text,
						Some(thread),
						message_ts,
						&project.active_session,
					)
					.await;
			}
		}

		let cleaned = strip_mention(text);
		let Some(command) = parse_command(&cleaned) else {
			return Ok(());
		};

		match command {
			Command::ListProjects => self.handle_list(channel, thread_ts).await,
			Command::NewProject {
				name,
				repo,
				auto_drive,
				report,
				phases,
				duration,
			} => {
				self.handle_new(
					channel, user, thread_ts, message_ts, &name, repo, auto_drive, report, phases,
					duration,
				)
				.await
			}
			Command::Decide { slug, text } => {
				self.handle_memory(channel, thread_ts, &slug, &text, true).await
			}
			Command::Blocker { slug, text } => {
				self.handle_memory(channel, thread_ts, &slug, &text, false).await
			}
			Command::Archive { slug } => self.handle_archive(channel, thread_ts, &slug).await,
			Command::Resume { slug } => self.handle_resume(channel, thread_ts, &slug, user).await,
			Command::Drive {
				slug,
				interval,
				report,
				phases,
				duration,
			} => {
				self.handle_drive(DriveRequest {
					slug: &slug,
					interval: interval.as_deref(),
					report: report.as_deref(),
					phases: phases.as_ref(),
					duration: duration.as_deref(),
					channel,
					user,
					thread_ts,
					message_ts,
				})
				.await
			}
			Command::Pause { slug } => self.handle_pause(channel, thread_ts, &slug).await,
			Command::Phase { slug, phase } => {
				self.handle_phase(channel, user, thread_ts, message_ts, &slug, &phase)
					.await
			}
			Command::Report { slug, interval } => {
				self.handle_report(channel, user, thread_ts, message_ts, &slug, interval.as_deref())
					.await
			}
			Command::PhaseModel { slug, phase, model } => {
				self.handle_phase_model(channel, thread_ts, &slug, &phase, &model)
					.await
			}
			Command::Help => {
				self.responder
					.post_message(channel, thread_ts, HELP_TEXT)
					.await
			}
			Command::ContinueProject { slug } => {
				match self.lookup(&slug).await? {
					Some(project) => {
						self.continue_project(&project, channel, user, thread_ts, message_ts)
							.await
					}
					// Unknown slug: plain pass-through.
					None => {
						self.forwarder
							.handle_message(channel, user, text, thread_ts, message_ts)
							.await
					}
				}
			}
			Command::MessageProject { slug, text: body } => {
				match self.lookup(&slug).await? {
					Some(project) => {
						if project.status == ProjectStatus::Archived {
							return self
								.responder
								.post_message(
									channel,
									thread_ts,
									&format!(
										"Project `{}` is archived. Run `resume {}` first.",
										project.slug, project.slug
									),
								)
								.await;
						}
						self.projects.touch_project(&project.slug).await?;
						self.forwarder
							.handle_message_with_session(
								channel,
								user,
								&body,
								thread_ts,
								message_ts,
								&project.active_session,
							)
							.await
					}
					None => {
						self.forwarder
							.handle_message(channel, user, text, thread_ts, message_ts)
							.await
					}
				}
			}
		}
	}

	/// True iff a project is bound to the thread; otherwise the inner
	/// forwarder decides.
	pub async fn is_active_thread(&self, channel: &str, thread_ts: &str) -> bool {
		match self.projects.get_project_by_thread(channel, thread_ts).await {
			Ok(Some(_)) => true,
			Ok(None) => self.forwarder.is_active_thread(channel, thread_ts).await,
			Err(e) => {
				warn!(channel, thread_ts, error = %e, "thread binding lookup failed");
				self.forwarder.is_active_thread(channel, thread_ts).await
			}
		}
	}

	/// Demux an interactive button callback by its action id prefix.
	#[tracing::instrument(skip(self))]
	pub async fn handle_action(
		&self,
		action_id: &str,
		user: &str,
		channel: &str,
		thread_ts: Option<&str>,
		message_ts: &str,
	) -> Result<()> {
		if let Some(request_id) = action_id.strip_prefix("approve_") {
			return self.decide_approval(request_id, user, channel, thread_ts, true).await;
		}
		if let Some(request_id) = action_id.strip_prefix("deny_") {
			return self
				.decide_approval(request_id, user, channel, thread_ts, false)
				.await;
		}
		if let Some(slug) = action_id.strip_prefix("project_continue_") {
			return self.on_project_continue(slug, channel, user, thread_ts, message_ts).await;
		}
		if let Some(slug) = action_id.strip_prefix("project_archive_") {
			return self.handle_archive(channel, thread_ts, slug).await;
		}
		if let Some(slug) = action_id.strip_prefix("project_start_") {
			return self
				.handle_drive(DriveRequest {
					slug,
					interval: None,
					report: None,
					phases: None,
					duration: None,
					channel,
					user,
					thread_ts,
					message_ts,
				})
				.await;
		}
		if let Some(session_key) = action_id.strip_prefix("session_keep_") {
			return self.keep_session(session_key, channel, thread_ts).await;
		}
		if let Some(session_key) = action_id.strip_prefix("session_close_") {
			return self.close_session(session_key, user, channel, thread_ts).await;
		}

		warn!(action_id, "unrecognized interactive action");
		Ok(())
	}

	/// Chat button: re-open a project conversation.
	pub async fn on_project_continue(
		&self,
		slug: &str,
		channel: &str,
		user: &str,
		thread_ts: Option<&str>,
		message_ts: &str,
	) -> Result<()> {
		match self.lookup(slug).await? {
			Some(project) => {
				self.continue_project(&project, channel, user, thread_ts, message_ts)
					.await
			}
			None => {
				self.responder
					.post_message(channel, thread_ts, &format!("Project `{slug}` not found."))
					.await
			}
		}
	}

	async fn lookup(&self, slug: &str) -> Result<Option<Project>> {
		Ok(self.projects.get_project(&generate_slug(slug)).await?)
	}

	/// Resolve-or-reply helper: posts a not-found notice and returns None.
	async fn resolve(
		&self,
		channel: &str,
		thread_ts: Option<&str>,
		slug: &str,
	) -> Result<Option<Project>> {
		match self.lookup(slug).await? {
			Some(project) => Ok(Some(project)),
			None => {
				self.responder
					.post_message(channel, thread_ts, &format!("Project `{slug}` not found."))
					.await?;
				Ok(None)
			}
		}
	}

	async fn handle_list(&self, channel: &str, thread_ts: Option<&str>) -> Result<()> {
		let projects = self
			.projects
			.list_projects(Some(ProjectStatus::Active), None)
			.await?;

		if projects.is_empty() {
			return self
				.responder
				.post_message(
					channel,
					thread_ts,
					"No active projects. Start one with `new project \"<name>\"`.",
				)
				.await;
		}

		let mut rendered = vec![blocks::header("Active projects")];
		for project in &projects {
			let stats = self.projects.get_project_stats(&project.id).await?;
			let mut line = format!(
				"*{}* (`{}`) — {}",
				project.name, project.slug, project.status
			);
			if !project.current_phase.is_empty() {
				line.push_str(&format!(", phase {}", project.current_phase));
			}
			if project.auto_drive {
				line.push_str(&format!(
					", auto-drive every {}",
					fmt_interval(project.drive_interval_ms)
				));
			}
			line.push_str(&format!(
				"\n{} decisions · {} blockers · {} tasks",
				stats.decisions, stats.blockers, stats.tasks
			));
			rendered.push(blocks::section(&line));

			let events = self.projects.list_events(&project.id, 3).await?;
			if !events.is_empty() {
				let recent = events
					.iter()
					.map(|e| format!("• {}", e.summary))
					.collect::<Vec<_>>()
					.join("\n");
				rendered.push(blocks::context(&recent));
			}
			rendered.push(blocks::divider());
		}

		self.responder
			.post_blocks(channel, thread_ts, "Active projects", &rendered)
			.await
	}

	#[allow(clippy::too_many_arguments)]
	async fn handle_new(
		&self,
		channel: &str,
		user: &str,
		thread_ts: Option<&str>,
		message_ts: &str,
		name: &str,
		repo: Option<String>,
		auto_drive: Option<String>,
		report: Option<String>,
		phases: Option<PhasesSpec>,
		duration: Option<String>,
	) -> Result<()> {
		let created = match self
			.projects
			.create_project(name, "", repo.as_deref().unwrap_or(""), user)
			.await
		{
			Ok(project) => project,
			Err(
				e @ (ProjectError::AlreadyExists(_)
				| ProjectError::ReservedSlug(_)
				| ProjectError::InvalidName(_)),
			) => {
				return self
					.responder
					.post_message(channel, thread_ts, &format!("Cannot create project: {e}"))
					.await;
			}
			Err(e) => return Err(e.into()),
		};

		self.projects
			.add_event(
				&created.id,
				"project_created",
				user,
				&format!("Project `{}` created", created.slug),
				None,
			)
			.await?;

		if auto_drive.is_some() {
			return self
				.handle_drive(DriveRequest {
					slug: &created.slug,
					interval: auto_drive.as_deref().filter(|s| !s.is_empty()),
					report: report.as_deref(),
					phases: phases.as_ref(),
					duration: duration.as_deref(),
					channel,
					user,
					thread_ts,
					message_ts,
				})
				.await;
		}

		let rendered = vec![
			blocks::section(&format!(
				"Project *{}* created as `{}`.\nSession: `{}`",
				created.name, created.slug, created.active_session
			)),
			blocks::actions(vec![blocks::styled_button(
				&format!("project_start_{}", created.slug),
				"Start driving",
				"primary",
			)]),
		];
		self.responder
			.post_blocks(
				channel,
				thread_ts,
				&format!("Project {} created", created.slug),
				&rendered,
			)
			.await
	}

	async fn handle_memory(
		&self,
		channel: &str,
		thread_ts: Option<&str>,
		slug: &str,
		text: &str,
		is_decision: bool,
	) -> Result<()> {
		use drover_server_projects::MemoryKind;

		let Some(project) = self.resolve(channel, thread_ts, slug).await? else {
			return Ok(());
		};

		let kind = if is_decision {
			MemoryKind::Decision
		} else {
			MemoryKind::Blocker
		};
		self.projects
			.add_memory(&project.id, kind, text, Some(&project.active_session))
			.await?;
		let count = self.projects.list_memory(&project.id, Some(kind)).await?.len();

		let noun = if is_decision { "Decision" } else { "Blocker" };
		self.responder
			.post_message(
				channel,
				thread_ts,
				&format!("{noun} #{count} recorded for `{}`.", project.slug),
			)
			.await
	}

	async fn handle_archive(
		&self,
		channel: &str,
		thread_ts: Option<&str>,
		slug: &str,
	) -> Result<()> {
		let Some(project) = self.resolve(channel, thread_ts, slug).await? else {
			return Ok(());
		};

		if self.drive.stop_driving(&project.id).await {
			info!(slug = %project.slug, "auto-drive stopped for archive");
		}
		let archived = self.projects.archive_project(&project.slug).await?;
		self.projects
			.add_event(
				&archived.id,
				"project_archived",
				"router",
				&format!("Project `{}` archived", archived.slug),
				None,
			)
			.await?;

		self.responder
			.post_message(
				channel,
				thread_ts,
				&format!(
					"Project `{}` archived. `resume {}` brings it back with a fresh session.",
					archived.slug, archived.slug
				),
			)
			.await
	}

	async fn handle_resume(
		&self,
		channel: &str,
		thread_ts: Option<&str>,
		slug: &str,
		user: &str,
	) -> Result<()> {
		let Some(project) = self.resolve(channel, thread_ts, slug).await? else {
			return Ok(());
		};

		match self.manager.resume_project(&project.slug, user).await {
			Ok(resumed) => {
				self.responder
					.post_message(
						channel,
						thread_ts,
						&format!(
							"Project `{}` resumed at session v{} (`{}`).",
							resumed.slug, resumed.session_version, resumed.active_session
						),
					)
					.await
			}
			Err(ProjectError::NotArchived(_)) => {
				self.responder
					.post_message(
						channel,
						thread_ts,
						&format!("Project `{}` is not archived.", project.slug),
					)
					.await
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn handle_drive(&self, request: DriveRequest<'_>) -> Result<()> {
		let Some(project) = self
			.resolve(request.channel, request.thread_ts, request.slug)
			.await?
		else {
			return Ok(());
		};

		if project.status == ProjectStatus::Archived {
			return self
				.responder
				.post_message(
					request.channel,
					request.thread_ts,
					&format!("Project `{}` is archived; resume it first.", project.slug),
				)
				.await;
		}

		// Bind the conversation thread so follow-ups route to the session,
		// seeding the session with the project preamble on first binding.
		let thread_key = request.thread_ts.unwrap_or(request.message_ts);
		if self
			.projects
			.get_thread_binding(request.channel, thread_key)
			.await?
			.is_none()
		{
			self.projects
				.bind_thread(
					request.channel,
					thread_key,
					&project.active_session,
					Some(&project.id),
				)
				.await?;
			let preamble = self.manager.build_context_preamble(&project).await?;
			self.forwarder
				.handle_message_with_session(
					request.channel,
					request.user,
					&preamble,
					Some(thread_key),
					request.message_ts,
					&project.active_session,
				)
				.await?;
		}

		let drive_interval_ms = match request.interval {
			Some(value) => parse_duration_ms(value)?,
			None if project.drive_interval_ms > 0 => project.drive_interval_ms,
			None => DEFAULT_DRIVE_INTERVAL_MS,
		};
		let report_interval_ms = match request.report {
			Some(value) => parse_duration_ms(value)?,
			None => project.report_interval_ms,
		};
		let (phases, phase_models) = match request.phases {
			Some(spec) => (spec.phases.clone(), spec.models.clone()),
			None => (project.phases.clone(), project.phase_models.clone()),
		};
		let current_phase = if !project.current_phase.is_empty() {
			project.current_phase.clone()
		} else {
			phases.split(',').next().unwrap_or("").trim().to_string()
		};
		let auto_drive_until = match request.duration {
			Some(value) => Some(Utc::now() + chrono::Duration::milliseconds(parse_duration_ms(value)?)),
			None => project.auto_drive_until,
		};
		let report_channel = if !project.report_channel.is_empty() {
			project.report_channel.clone()
		} else {
			request.channel.to_string()
		};
		let report_thread = if !project.report_thread.is_empty() {
			project.report_thread.clone()
		} else {
			thread_key.to_string()
		};

		let updated = self
			.projects
			.update_auto_drive(
				&project.slug,
				&AutoDriveSettings {
					enabled: true,
					drive_interval_ms,
					report_interval_ms,
					phases,
					current_phase,
					auto_drive_until,
					report_channel,
					report_thread,
					phase_models,
				},
			)
			.await?;

		self.drive.start_driving(&updated).await?;

		let mut summary = format!(
			"Auto-drive enabled for `{}`: nudging every {}",
			updated.slug,
			fmt_interval(updated.drive_interval_ms)
		);
		if updated.report_interval_ms > 0 {
			summary.push_str(&format!(
				", reporting every {}",
				fmt_interval(updated.report_interval_ms)
			));
		}
		if let Some(until) = updated.auto_drive_until {
			summary.push_str(&format!(", until {}", until.format("%Y-%m-%d %H:%M UTC")));
		}
		if !updated.current_phase.is_empty() {
			summary.push_str(&format!(". Current phase: {}", updated.current_phase));
		}
		self.responder
			.post_message(request.channel, request.thread_ts, &summary)
			.await?;

		self.projects
			.add_event(
				&updated.id,
				"auto_drive_started",
				request.user,
				&format!(
					"Auto-drive started (every {})",
					fmt_interval(updated.drive_interval_ms)
				),
				Some(serde_json::json!({
					"drive_interval_ms": updated.drive_interval_ms,
					"report_interval_ms": updated.report_interval_ms,
				})),
			)
			.await?;
		Ok(())
	}

	async fn handle_pause(&self, channel: &str, thread_ts: Option<&str>, slug: &str) -> Result<()> {
		let Some(project) = self.resolve(channel, thread_ts, slug).await? else {
			return Ok(());
		};

		self.drive.stop_driving(&project.id).await;
		self.projects
			.update_auto_drive(&project.slug, &settings_preserving(&project, false))
			.await?;

		self.responder
			.post_message(
				channel,
				thread_ts,
				&format!("Auto-drive paused for `{}`.", project.slug),
			)
			.await
	}

	async fn handle_phase(
		&self,
		channel: &str,
		user: &str,
		thread_ts: Option<&str>,
		message_ts: &str,
		slug: &str,
		phase: &str,
	) -> Result<()> {
		let Some(project) = self.resolve(channel, thread_ts, slug).await? else {
			return Ok(());
		};

		let updated = self.projects.update_phase(&project.slug, phase).await?;

		if updated.auto_drive && self.drive.is_driving(&updated.id).await {
			let prompt = prompts::phase_transition_prompt(&updated, phase);
			self.forwarder
				.handle_message_with_session(
					channel,
					user,
					&prompt,
					thread_ts,
					message_ts,
					&updated.active_session,
				)
				.await?;
		}

		self.responder
			.post_message(
				channel,
				thread_ts,
				&format!("`{}` is now in phase {phase}.", updated.slug),
			)
			.await
	}

	async fn handle_report(
		&self,
		channel: &str,
		user: &str,
		thread_ts: Option<&str>,
		message_ts: &str,
		slug: &str,
		interval: Option<&str>,
	) -> Result<()> {
		let Some(project) = self.resolve(channel, thread_ts, slug).await? else {
			return Ok(());
		};

		if let Some(value) = interval {
			let report_interval_ms = parse_duration_ms(value)?;
			let mut settings = settings_preserving(&project, project.auto_drive);
			settings.report_interval_ms = report_interval_ms;
			let updated = self.projects.update_auto_drive(&project.slug, &settings).await?;

			if self.drive.is_driving(&updated.id).await {
				self.drive.start_driving(&updated).await?;
			}
			return self
				.responder
				.post_message(
					channel,
					thread_ts,
					&format!(
						"Status reports for `{}` every {}.",
						updated.slug,
						fmt_interval(report_interval_ms)
					),
				)
				.await;
		}

		if project.auto_drive && self.drive.is_driving(&project.id).await {
			let prompt = prompts::report_prompt(&project);
			self.forwarder
				.handle_message_with_session(
					channel,
					user,
					&prompt,
					thread_ts,
					message_ts,
					&project.active_session,
				)
				.await?;
			return self
				.responder
				.post_message(
					channel,
					thread_ts,
					&format!("Status report requested from `{}`.", project.slug),
				)
				.await;
		}

		self.responder
			.post_message(
				channel,
				thread_ts,
				&format!("`{}` is not auto-driving; nothing to report.", project.slug),
			)
			.await
	}

	async fn handle_phase_model(
		&self,
		channel: &str,
		thread_ts: Option<&str>,
		slug: &str,
		phase: &str,
		model: &str,
	) -> Result<()> {
		let Some(project) = self.resolve(channel, thread_ts, slug).await? else {
			return Ok(());
		};

		let mut models = project.phase_models.clone();
		models.insert(phase.to_string(), model.to_string());
		self.projects.update_phase_models(&project.slug, models).await?;

		self.responder
			.post_message(
				channel,
				thread_ts,
				&format!("`{}` will use `{model}` during {phase}.", project.slug),
			)
			.await
	}

	async fn continue_project(
		&self,
		project: &Project,
		channel: &str,
		user: &str,
		thread_ts: Option<&str>,
		message_ts: &str,
	) -> Result<()> {
		if project.status == ProjectStatus::Archived {
			return self
				.responder
				.post_message(
					channel,
					thread_ts,
					&format!(
						"Project `{}` is archived. Run `resume {}` to pick it back up.",
						project.slug, project.slug
					),
				)
				.await;
		}

		let thread_key = thread_ts.unwrap_or(message_ts);
		self.projects
			.bind_thread(channel, thread_key, &project.active_session, Some(&project.id))
			.await?;
		self.projects.touch_project(&project.slug).await?;

		let preamble = self.manager.build_context_preamble(project).await?;
		self.forwarder
			.handle_message_with_session(
				channel,
				user,
				&preamble,
				Some(thread_key),
				message_ts,
				&project.active_session,
			)
			.await
	}

	async fn decide_approval(
		&self,
		request_id: &str,
		user: &str,
		channel: &str,
		thread_ts: Option<&str>,
		approve: bool,
	) -> Result<()> {
		let Some(approval) = self.approvals.get(request_id).await? else {
			return self
				.responder
				.post_message(channel, thread_ts, "That approval request has expired.")
				.await;
		};

		let reply_channel = approval.channel.as_deref().unwrap_or(channel);
		let reply_thread = approval.thread_ts.as_deref().or(thread_ts);

		let outcome = if approve {
			self.engine.requeue(&approval.task_id).await.map(|_| "approved")
		} else {
			self.engine
				.fail(&approval.task_id, "approval denied")
				.await
				.map(|_| "denied")
		};

		match outcome {
			Ok(verdict) => {
				self.approvals.delete(request_id).await?;
				self.responder
					.post_message(
						reply_channel,
						reply_thread,
						&format!(
							"Task `{}` {verdict} by <@{user}> ({}).",
							approval.task_id, approval.permission
						),
					)
					.await
			}
			Err(e) => {
				warn!(request_id, error = %e, "approval decision could not be applied");
				self.approvals.delete(request_id).await?;
				self.responder
					.post_message(
						reply_channel,
						reply_thread,
						&format!("Task `{}` is no longer awaiting approval.", approval.task_id),
					)
					.await
			}
		}
	}

	async fn keep_session(
		&self,
		session_key: &str,
		channel: &str,
		thread_ts: Option<&str>,
	) -> Result<()> {
		if let Some((slug, _)) = parse_session_key(session_key) {
			self.projects.touch_project(&slug).await?;
		}
		self.responder
			.post_message(channel, thread_ts, "Session kept alive.")
			.await
	}

	async fn close_session(
		&self,
		session_key: &str,
		user: &str,
		channel: &str,
		thread_ts: Option<&str>,
	) -> Result<()> {
		let Some((slug, _)) = parse_session_key(session_key) else {
			return self
				.responder
				.post_message(channel, thread_ts, "Unknown session key.")
				.await;
		};

		let rotated = self.manager.rotate_session(&slug, "", "session_close").await?;
		self.responder
			.post_message(
				channel,
				thread_ts,
				&format!(
					"Session closed by <@{user}>. `{}` continues at v{}.",
					rotated.slug, rotated.session_version
				),
			)
			.await
	}
}

/// Current auto-drive knobs re-persisted with a different enabled bit.
fn settings_preserving(project: &Project, enabled: bool) -> AutoDriveSettings {
	AutoDriveSettings {
		enabled,
		drive_interval_ms: project.drive_interval_ms,
		report_interval_ms: project.report_interval_ms,
		phases: project.phases.clone(),
		current_phase: project.current_phase.clone(),
		auto_drive_until: project.auto_drive_until,
		report_channel: project.report_channel.clone(),
		report_thread: project.report_thread.clone(),
		phase_models: project.phase_models.clone(),
	}
}

fn fmt_interval(ms: i64) -> String {
	if ms <= 0 {
		return "0s".to_string();
	}
	if ms % 3_600_000 == 0 {
		format!("{}h", ms / 3_600_000)
	} else if ms % 60_000 == 0 {
		format!("{}m", ms / 60_000)
	} else if ms % 1_000 == 0 {
		format!("{}s", ms / 1_000)
	} else {
		format!("{ms}ms")
	}
}

const HELP_TEXT: &str = "Project commands:\n\
	• `projects` — dashboard of active projects\n\
	• `new project \"<name>\" [--repo URL] [--auto-drive [interval]] [--report interval] [--phases A:model,B] [--duration D]`\n\
	• `decide <slug> <text>` / `blocker <slug> <text>` — record memory\n\
	• `drive <slug> [interval] [--report I] [--phases …] [--duration D]` — enable auto-drive\n\
	• `pause <slug>` / `report <slug> [interval]` / `phase <slug> <name>` / `phase-model <slug> <phase> <model>`\n\
	• `archive <slug>` / `resume <slug>`\n\
	• `<slug>` — continue a project; `<slug> <message>` — message its session";
