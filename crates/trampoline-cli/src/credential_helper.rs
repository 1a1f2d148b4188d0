// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Git credential-helper mode.
//!
//! Git calls the helper with a single `get` operation and feeds
//! `key=value` lines on stdin. Anything the helper cannot or should not
//! service — a different operation, a non-https protocol, a repository no
//! rule matches — ends as a silent exit so git can fall through to the
//! next configured helper.

use std::io::{self, Read, Write};

use tracing::{debug, info};

use trampoline_helper::{HelperError, RuleSet, TokenBroker};
use trampoline_logger::{fingerprint, LogGate};

use crate::args::Args;

/// Parsed credential request from git.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CredentialInput {
	pub protocol: Option<String>,
	pub host: Option<String>,
	pub path: Option<String>,
}

impl CredentialInput {
	/// Parse `key=value` lines. A trailing `.git` on the path is
	/// stripped; malformed lines are ignored.
	pub fn parse(input: &str) -> Self {
		let mut parsed = Self::default();
		for line in input.lines() {
			let Some((key, value)) = line.split_once('=') else {
				continue;
			};
			match key {
				"protocol" => parsed.protocol = Some(value.to_string()),
				"host" => parsed.host = Some(value.to_string()),
				"path" => {
					parsed.path = Some(value.strip_suffix(".git").unwrap_or(value).to_string())
				}
				_ => {}
			}
		}
		parsed
	}

	pub fn is_https(&self) -> bool {
		self.protocol.as_deref() == Some("https")
	}

	/// The effective repository path: `<host>/<path>`.
	pub fn repository_path(&self) -> String {
		format!(
			"{}/{}",
			self.host.as_deref().unwrap_or_default(),
			self.path.as_deref().unwrap_or_default()
		)
	}
}

pub async fn run(
	args: &Args,
	broker: &TokenBroker,
	rules: &RuleSet,
	gate: &LogGate,
) -> anyhow::Result<()> {
	debug!("git credential helper mode enabled");

	if args.operation.len() != 1 || args.operation[0] != "get" {
		debug!(operation = ?args.operation, "expecting the single argument 'get', nothing to do");
		return Err(HelperError::silent("expecting the single argument 'get'").into());
	}

	let mut input = String::new();
	io::stdin().read_to_string(&mut input)?;
	let request = CredentialInput::parse(&input);
	debug!(?request, "credential request from git");

	if !request.is_https() {
		debug!(protocol = ?request.protocol, "expecting protocol 'https', nothing to do");
		return Err(HelperError::silent("expecting protocol 'https'").into());
	}

	let repo = request.repository_path();
	let mut rule = rules.match_repo(&repo)?;
	let token = broker.get_token(&mut rule, Some(&repo)).await?;

	if args.token_fingerprint {
		info!(repo = %repo, token_fp = %fingerprint(&token), "token correlation");
	}
	gate.filef(&format!("returning token in helper format: {token:?}"));
	gate.stderrf("returning token in helper format: [redacted]");

	let mut stdout = io::stdout().lock();
	writeln!(stdout, "username=x-access-token")?;
	writeln!(stdout, "password={token}")?;
	stdout.flush()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_basic_request() {
		let input = "protocol=https\nhost=github.com\npath=acme/widgets.git\n";
		let parsed = CredentialInput::parse(input);
		assert_eq!(parsed.protocol.as_deref(), Some("https"));
		assert_eq!(parsed.host.as_deref(), Some("github.com"));
		assert_eq!(parsed.path.as_deref(), Some("acme/widgets"));
		assert_eq!(parsed.repository_path(), "github.com/acme/widgets");
	}

	#[test]
	fn test_parse_keeps_non_git_suffix() {
		let parsed = CredentialInput::parse("path=acme/widgets\n");
		assert_eq!(parsed.path.as_deref(), Some("acme/widgets"));
	}

	#[test]
	fn test_parse_strips_only_one_git_suffix() {
		let parsed = CredentialInput::parse("path=acme/widgets.git.git\n");
		assert_eq!(parsed.path.as_deref(), Some("acme/widgets.git"));
	}

	#[test]
	fn test_parse_ignores_malformed_and_unknown_lines() {
		let input = "protocol=https\nnot a pair\nusername=whoever\nhost=github.com\n";
		let parsed = CredentialInput::parse(input);
		assert_eq!(parsed.protocol.as_deref(), Some("https"));
		assert_eq!(parsed.host.as_deref(), Some("github.com"));
		assert_eq!(parsed.path, None);
	}

	#[test]
	fn test_parse_value_may_contain_equals() {
		let parsed = CredentialInput::parse("path=acme/widg=ts\n");
		assert_eq!(parsed.path.as_deref(), Some("acme/widg=ts"));
	}

	#[test]
	fn test_parse_empty_input() {
		assert_eq!(CredentialInput::parse(""), CredentialInput::default());
	}

	#[test]
	fn test_non_https_protocols_are_rejected() {
		let parsed = CredentialInput::parse("protocol=ssh\nhost=github.com\n");
		assert!(!parsed.is_https());
		let parsed = CredentialInput::parse("host=github.com\n");
		assert!(!parsed.is_https());
	}
}
