// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Per-project auto-drive controller.
//!
//! Each auto-driving project owns one loop with up to two tickers: the
//! drive nudge and the optional status report. Ticks are single-flight per
//! project, revalidate the project from the store before acting, and stop
//! the loop the moment the project leaves the driving state.

pub mod controller;
pub mod error;

pub use controller::DriveController;
pub use error::{DriveError, Result};
