// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Slug derivation and the reserved-word check.

/// Command verbs a project slug must not shadow.
pub const RESERVED_WORDS: &[&str] = &[
	"projects",
	"projeler",
	"new",
	"decide",
	"blocker",
	"archive",
	"resume",
	"help",
	"drive",
	"pause",
	"phase",
	"phase-model",
	"report",
	"continue",
	"status",
];

const MAX_SLUG_LEN: usize = 50;

/// Derive a URL-safe slug from a display name.
///
/// Lowercase, spaces to hyphens, strip anything outside `[a-z0-9-]`,
/// collapse hyphen runs, trim edge hyphens, clamp to 50 characters.
/// Idempotent: `generate_slug(generate_slug(x)) == generate_slug(x)`.
pub fn generate_slug(name: &str) -> String {
	let mut slug = String::with_capacity(name.len());
	let mut last_hyphen = true; // suppress a leading hyphen

	for ch in name.to_lowercase().chars() {
		let mapped = match ch {
			' ' => Some('-'),
			'a'..='z' | '0'..='9' => Some(ch),
			'-' => Some('-'),
			_ => None,
		};
		match mapped {
			Some('-') => {
				if !last_hyphen {
					slug.push('-');
					last_hyphen = true;
				}
			}
			Some(c) => {
				slug.push(c);
				last_hyphen = false;
			}
			None => {}
		}
	}

	let slug = slug.trim_end_matches('-');
	let mut slug = slug.to_string();
	slug.truncate(MAX_SLUG_LEN);
	slug.trim_end_matches('-').to_string()
}

pub fn is_reserved(slug: &str) -> bool {
	RESERVED_WORDS.contains(&slug)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_basic_derivation() {
		assert_eq!(generate_slug("Leader Election"), "leader-election");
		assert_eq!(generate_slug("Projects!"), "projects");
		assert_eq!(generate_slug("  spaced   out  "), "spaced-out");
		assert_eq!(generate_slug("already-a-slug"), "already-a-slug");
		assert_eq!(generate_slug("Émile's Demo"), "miles-demo");
	}

	#[test]
	fn test_clamped_to_fifty() {
		let long = "x".repeat(80);
		assert_eq!(generate_slug(&long).len(), 50);
	}

	#[test]
	fn test_reserved_words() {
		assert!(is_reserved("drive"));
		assert!(is_reserved("projects"));
		assert!(!is_reserved("leader-election"));
	}

	proptest! {
		#[test]
		fn prop_generate_slug_is_idempotent(name in ".{0,120}") {
			let once = generate_slug(&name);
			prop_assert_eq!(generate_slug(&once), once.clone());
		}

		#[test]
		fn prop_slug_alphabet(name in ".{0,120}") {
			let slug = generate_slug(&name);
			prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
			prop_assert!(!slug.starts_with('-'));
			prop_assert!(!slug.ends_with('-'));
			prop_assert!(slug.len() <= 50);
		}
	}
}
