// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Chat surface: command parsing, message routing, completion notification.
//!
//! The router sits between the chat transport and the external
//! conversational worker. The worker, the chat poster, and the auto-drive
//! controller are reached through the narrow capability traits in
//! [`traits`], injected at wiring time.

pub mod approvals;
pub mod blocks;
pub mod command;
pub mod error;
pub mod notify;
pub mod prompts;
pub mod router;
pub mod traits;

pub use approvals::ApprovalPrompter;
pub use command::{parse_command, parse_duration_ms, parse_phases, strip_mention, Command, PhasesSpec};
pub use error::{ChatError, Result};
pub use notify::ChatCompletionNotifier;
pub use router::{MessageRouter, DEFAULT_DRIVE_INTERVAL_MS};
pub use traits::{DriveControl, Forwarder, Responder};
