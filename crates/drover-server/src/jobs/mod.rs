// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

pub mod dead_letter_retry;
pub mod drive_expiry;
pub mod retention;

pub use dead_letter_retry::DeadLetterRetryJob;
pub use drive_expiry::DriveExpiryJob;
pub use retention::RetentionJob;
