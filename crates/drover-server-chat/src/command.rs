// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Text → typed command.
//!
//! The first whitespace token (case-insensitive) selects the command;
//! anything unrecognized is treated as a project slug: alone it means
//! "continue that project", with trailing words it means "send this message
//! into that project's session".

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{ChatError, Result};

static MENTION_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^<@[A-Za-z0-9]+>\s*").expect("mention regex"));

static QUOTED_NAME_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("quoted name regex"));

static DURATION_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^(\d+)(ms|s|m|h|d)$").expect("duration regex"));

/// Phase list with optional per-phase model hints, e.g.
/// `Analysis:opus,Design:sonnet,Implement`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhasesSpec {
	/// Canonical comma-joined phase names.
	pub phases: String,
	pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	ListProjects,
	NewProject {
		name: String,
		repo: Option<String>,
		/// `Some("")` means the flag was given without an interval.
		auto_drive: Option<String>,
		report: Option<String>,
		phases: Option<PhasesSpec>,
		duration: Option<String>,
	},
	Decide {
		slug: String,
		text: String,
	},
	Blocker {
		slug: String,
		text: String,
	},
	Archive {
		slug: String,
	},
	Resume {
		slug: String,
	},
	Drive {
		slug: String,
		interval: Option<String>,
		report: Option<String>,
		phases: Option<PhasesSpec>,
		duration: Option<String>,
	},
	Pause {
		slug: String,
	},
	Phase {
		slug: String,
		phase: String,
	},
	Report {
		slug: String,
		interval: Option<String>,
	},
	PhaseModel {
		slug: String,
		phase: String,
		model: String,
	},
	Help,
	ContinueProject {
		slug: String,
	},
	MessageProject {
		slug: String,
		text: String,
	},
}

/// Strip one leading bot mention token and trim.
pub fn strip_mention(text: &str) -> String {
	MENTION_REGEX.replace(text.trim(), "").trim().to_string()
}

/// Split `Analysis:opus,Design,Build` into canonical phases and a
/// phase → model map for the annotated entries.
pub fn parse_phases(spec: &str) -> PhasesSpec {
	let mut phases = Vec::new();
	let mut models = HashMap::new();

	for part in spec.split(',') {
		let part = part.trim();
		if part.is_empty() {
			continue;
		}
		match part.split_once(':') {
			Some((phase, model)) => {
				let phase = phase.trim();
				let model = model.trim();
				if !phase.is_empty() {
					phases.push(phase.to_string());
					if !model.is_empty() {
						models.insert(phase.to_string(), model.to_string());
					}
				}
			}
			None => phases.push(part.to_string()),
		}
	}

	PhasesSpec {
		phases: phases.join(","),
		models,
	}
}

/// `500ms`, `45s`, `10m`, `24h`, `7d` → milliseconds.
pub fn parse_duration_ms(value: &str) -> Result<i64> {
	let captures = DURATION_REGEX
		.captures(value)
		.ok_or_else(|| ChatError::InvalidDuration(value.to_string()))?;
	let amount: i64 = captures[1]
		.parse()
		.map_err(|_| ChatError::InvalidDuration(value.to_string()))?;
	let unit_ms = match &captures[2] {
		"ms" => 1,
		"s" => 1_000,
		"m" => 60_000,
		"h" => 3_600_000,
		"d" => 86_400_000,
		_ => return Err(ChatError::InvalidDuration(value.to_string())),
	};
	Ok(amount * unit_ms)
}

/// Separate `--flag [value]` pairs from positional tokens. A flag followed
/// by another flag (or end of input) keeps an empty value.
fn take_flags(tokens: &[&str]) -> (HashMap<String, String>, Vec<String>) {
	let mut flags = HashMap::new();
	let mut positional = Vec::new();
	let mut i = 0;

	while i < tokens.len() {
		let token = tokens[i];
		if let Some(name) = token.strip_prefix("--") {
			let value = match tokens.get(i + 1) {
				Some(next) if !next.starts_with("--") => {
					i += 1;
					(*next).to_string()
				}
				_ => String::new(),
			};
			flags.insert(name.to_lowercase(), value);
		} else {
			positional.push(token.to_string());
		}
		i += 1;
	}

	(flags, positional)
}

/// Parse cleaned (mention-stripped) text into a command.
pub fn parse_command(text: &str) -> Option<Command> {
	let text = text.trim();
	if text.is_empty() {
		return None;
	}

	let tokens: Vec<&str> = text.split_whitespace().collect();
	let verb = tokens[0].to_lowercase();
	let rest = &tokens[1..];

	let command = match verb.as_str() {
		"projects" | "projeler" => Command::ListProjects,
		"help" => Command::Help,
		"new" => parse_new(text, rest)?,
		"decide" | "blocker" => {
			let slug = rest.first()?.to_string();
			let body = rest[1..].join(" ");
			if body.is_empty() {
				return None;
			}
			if verb == "decide" {
				Command::Decide { slug, text: body }
			} else {
				Command::Blocker { slug, text: body }
			}
		}
		"archive" => Command::Archive {
			slug: rest.first()?.to_string(),
		},
		"resume" => Command::Resume {
			slug: rest.first()?.to_string(),
		},
		"pause" => Command::Pause {
			slug: rest.first()?.to_string(),
		},
		"drive" => {
			let (flags, positional) = take_flags(rest);
			let slug = positional.first()?.clone();
			Command::Drive {
				slug,
				interval: positional.get(1).cloned(),
				report: flags.get("report").cloned(),
				phases: flags.get("phases").map(|p| parse_phases(p)),
				duration: flags.get("duration").cloned(),
			}
		}
		"phase" => {
			let slug = rest.first()?.to_string();
			let phase = rest[1..].join(" ");
			if phase.is_empty() {
				return None;
			}
			Command::Phase { slug, phase }
		}
		"report" => Command::Report {
			slug: rest.first()?.to_string(),
			interval: rest.get(1).map(|s| s.to_string()),
		},
		"phase-model" => {
			let slug = rest.first()?.to_string();
			let phase = rest.get(1)?.to_string();
			let model = rest.get(2)?.to_string();
			Command::PhaseModel { slug, phase, model }
		}
		_ => {
			// Anything else is a slug reference.
			if rest.is_empty() {
				Command::ContinueProject {
					slug: tokens[0].to_string(),
				}
			} else {
				Command::MessageProject {
					slug: tokens[0].to_string(),
					text: rest.join(" "),
				}
			}
		}
	};

	Some(command)
}

fn parse_new(text: &str, rest: &[&str]) -> Option<Command> {
	// `new project "<name>" --flags…`; tolerate a missing "project" keyword.
	let rest: Vec<&str> = match rest.first() {
		Some(t) if t.eq_ignore_ascii_case("project") => rest[1..].to_vec(),
		_ => rest.to_vec(),
	};

	if let Some(captures) = QUOTED_NAME_REGEX.captures(text) {
		let name = captures[1].to_string();
		// Re-tokenize with the quoted span removed so flags parse cleanly.
		let stripped = QUOTED_NAME_REGEX.replace(text, " ");
		let mut tokens: Vec<&str> = stripped.split_whitespace().skip(1).collect();
		if tokens.first().map(|t| t.eq_ignore_ascii_case("project")) == Some(true) {
			tokens.remove(0);
		}
		return Some(build_new(name, &tokens));
	}

	let (_, positional) = take_flags(&rest);
	let name = positional.first()?.clone();
	Some(build_new(name, &rest))
}

fn build_new(name: String, tokens: &[&str]) -> Command {
	let (flags, _) = take_flags(tokens);
	Command::NewProject {
		name,
		repo: flags.get("repo").cloned(),
		auto_drive: flags.get("auto-drive").cloned(),
		report: flags.get("report").cloned(),
		phases: flags.get("phases").map(|p| parse_phases(p)),
		duration: flags.get("duration").cloned(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_strip_mention() {
		assert_eq!(strip_mention("<@UBOT> projects"), "projects");
		assert_eq!(strip_mention("projects"), "projects");
		assert_eq!(strip_mention("  <@U123ABC>   drive x  "), "drive x");
		// Only one leading mention is stripped.
		assert_eq!(strip_mention("<@U1> <@U2> hi"), "<@U2> hi");
	}

	#[test]
	fn test_list_and_help() {
		assert_eq!(parse_command("projects"), Some(Command::ListProjects));
		assert_eq!(parse_command("Projeler"), Some(Command::ListProjects));
		assert_eq!(parse_command("HELP"), Some(Command::Help));
	}

	#[test]
	fn test_new_project_full() {
		let parsed = parse_command(
			r#"new project "Leader Election" --repo https://x --auto-drive 10m --phases Analysis:opus,Design,Build --duration 24h"#,
		)
		.unwrap();

		match parsed {
			Command::NewProject {
				name,
				repo,
				auto_drive,
				phases,
				duration,
				..
			} => {
				assert_eq!(name, "Leader Election");
				assert_eq!(repo.as_deref(), Some("https://x"));
				assert_eq!(auto_drive.as_deref(), Some("10m"));
				let phases = phases.unwrap();
				assert_eq!(phases.phases, "Analysis,Design,Build");
				assert_eq!(phases.models.len(), 1);
				assert_eq!(phases.models.get("Analysis").unwrap(), "opus");
				assert_eq!(duration.as_deref(), Some("24h"));
			}
			other => panic!("expected NewProject, got {other:?}"),
		}
	}

	#[test]
	fn test_new_project_unquoted_and_bare_flag() {
		let parsed = parse_command("new project Demo --auto-drive").unwrap();
		match parsed {
			Command::NewProject {
				name, auto_drive, ..
			} => {
				assert_eq!(name, "Demo");
				assert_eq!(auto_drive.as_deref(), Some(""));
			}
			other => panic!("expected NewProject, got {other:?}"),
		}
	}

	#[test]
	fn test_decide_and_blocker() {
		assert_eq!(
			parse_command("decide alpha use sqlite with WAL"),
			Some(Command::Decide {
				slug: "alpha".to_string(),
				text: "use sqlite with WAL".to_string(),
			})
		);
		assert_eq!(
			parse_command("blocker alpha waiting on prod creds"),
			Some(Command::Blocker {
				slug: "alpha".to_string(),
				text: "waiting on prod creds".to_string(),
			})
		);
		assert_eq!(parse_command("decide alpha"), None);
	}

	#[test]
	fn test_drive_with_positional_interval() {
		let parsed =
			parse_command("drive alpha 5m --report 1h --phases Build,Ship --duration 12h").unwrap();
		match parsed {
			Command::Drive {
				slug,
				interval,
				report,
				phases,
				duration,
			} => {
				assert_eq!(slug, "alpha");
				assert_eq!(interval.as_deref(), Some("5m"));
				assert_eq!(report.as_deref(), Some("1h"));
				assert_eq!(phases.unwrap().phases, "Build,Ship");
				assert_eq!(duration.as_deref(), Some("12h"));
			}
			other => panic!("expected Drive, got {other:?}"),
		}
	}

	#[test]
	fn test_slug_fallthrough() {
		assert_eq!(
			parse_command("alpha"),
			Some(Command::ContinueProject {
				slug: "alpha".to_string()
			})
		);
		assert_eq!(
			parse_command("alpha please look at the failing CI"),
			Some(Command::MessageProject {
				slug: "alpha".to_string(),
				text: "please look at the failing CI".to_string(),
			})
		);
		assert_eq!(parse_command("   "), None);
	}

	#[test]
	fn test_phase_and_phase_model() {
		assert_eq!(
			parse_command("phase alpha Design"),
			Some(Command::Phase {
				slug: "alpha".to_string(),
				phase: "Design".to_string(),
			})
		);
		assert_eq!(
			parse_command("phase-model alpha Design sonnet"),
			Some(Command::PhaseModel {
				slug: "alpha".to_string(),
				phase: "Design".to_string(),
				model: "sonnet".to_string(),
			})
		);
	}

	#[test]
	fn test_report_with_and_without_interval() {
		assert_eq!(
			parse_command("report alpha 30m"),
			Some(Command::Report {
				slug: "alpha".to_string(),
				interval: Some("30m".to_string()),
			})
		);
		assert_eq!(
			parse_command("report alpha"),
			Some(Command::Report {
				slug: "alpha".to_string(),
				interval: None,
			})
		);
	}

	#[test]
	fn test_parse_phases_shapes() {
		let spec = parse_phases("Analysis:opus,Design:sonnet,Implement");
		assert_eq!(spec.phases, "Analysis,Design,Implement");
		assert_eq!(spec.models.get("Analysis").unwrap(), "opus");
		assert_eq!(spec.models.get("Design").unwrap(), "sonnet");
		assert!(!spec.models.contains_key("Implement"));

		let spec = parse_phases(" A , ,B: ");
		assert_eq!(spec.phases, "A,B");
		assert!(spec.models.is_empty());
	}

	#[test]
	fn test_parse_duration_ms() {
		assert_eq!(parse_duration_ms("500ms").unwrap(), 500);
		assert_eq!(parse_duration_ms("45s").unwrap(), 45_000);
		assert_eq!(parse_duration_ms("10m").unwrap(), 600_000);
		assert_eq!(parse_duration_ms("24h").unwrap(), 86_400_000);
		assert_eq!(parse_duration_ms("7d").unwrap(), 604_800_000);
		assert!(parse_duration_ms("").is_err());
		assert!(parse_duration_ms("10").is_err());
		assert!(parse_duration_ms("soon").is_err());
	}

	proptest! {
		#[test]
		fn prop_parser_never_panics(text in ".{0,200}") {
			let _ = parse_command(&strip_mention(&text));
		}
	}
}
