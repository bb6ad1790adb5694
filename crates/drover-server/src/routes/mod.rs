// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

pub mod approvals;
pub mod chat;
pub mod config;
pub mod context;
pub mod health;
pub mod projects;
pub mod tasks;
