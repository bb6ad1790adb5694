// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Block-kit JSON composition helpers.

use serde_json::{json, Value};

pub fn header(text: &str) -> Value {
	json!({
		"type": "header",
		"text": { "type": "plain_text", "text": text, "emoji": true }
	})
}

pub fn section(markdown: &str) -> Value {
	json!({
		"type": "section",
		"text": { "type": "mrkdwn", "text": markdown }
	})
}

pub fn context(markdown: &str) -> Value {
	json!({
		"type": "context",
		"elements": [{ "type": "mrkdwn", "text": markdown }]
	})
}

pub fn divider() -> Value {
	json!({ "type": "divider" })
}

pub fn button(action_id: &str, label: &str) -> Value {
	json!({
		"type": "button",
		"action_id": action_id,
		"text": { "type": "plain_text", "text": label, "emoji": true }
	})
}

pub fn styled_button(action_id: &str, label: &str, style: &str) -> Value {
	json!({
		"type": "button",
		"action_id": action_id,
		"style": style,
		"text": { "type": "plain_text", "text": label, "emoji": true }
	})
}

pub fn actions(buttons: Vec<Value>) -> Value {
	json!({ "type": "actions", "elements": buttons })
}
