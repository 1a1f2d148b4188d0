// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration rules and the repository-path matcher.

use std::collections::HashMap;
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::debug;

use crate::error::HelperError;

pub const DEFAULT_SERVER: &str = "github.com";

/// One configured matching rule: which App identity to use and how to
/// scope the requested token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rule {
	/// GitHub server host; `github.com` unless set.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub server: Option<String>,

	/// GitHub API base URL; inferred from `server` unless set.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api: Option<String>,

	/// Path to the App's RSA private key file.
	#[serde(rename = "key", default)]
	pub private_key: PathBuf,

	/// GitHub App ID.
	#[serde(rename = "app", default)]
	pub app_id: u64,

	/// Narrow the token to the repository being accessed. Overrides
	/// `repositories` and `repository_ids`.
	#[serde(rename = "current_repo", default, skip_serializing_if = "Option::is_none")]
	pub current_repo_only: Option<bool>,

	/// Widen the token to every repository of the installation owner.
	/// Conflicts with `current_repo`.
	#[serde(rename = "current_owner", default, skip_serializing_if = "Option::is_none")]
	pub current_owner_only: Option<bool>,

	/// Repositories to request access to; all repositories of the
	/// installation when neither this nor `repository_ids` is set.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub repositories: Option<Vec<String>>,

	/// Repository IDs to request access to.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub repository_ids: Option<Vec<u64>>,

	/// Requested token permissions. The set of permission keys is open,
	/// so this stays an opaque JSON object until the request is built.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub permissions: Option<Box<RawValue>>,

	/// Path naming the installation owner, e.g. `github.com/acme`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub installation: Option<String>,

	/// Installation ID, when known up front.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub installation_id: Option<u64>,

	/// Owner login derived at runtime for cache keys; never serialized.
	#[serde(skip)]
	pub resolved_owner: String,
}

impl Rule {
	/// Fill the server/API defaults and enforce the invariants a usable
	/// rule must satisfy. Also sorts the repository lists so the request
	/// body and the token cache key are insensitive to configuration
	/// order.
	pub fn validate(&mut self) -> Result<(), HelperError> {
		if self.server.is_none() {
			debug!("server was not set, assuming {DEFAULT_SERVER}");
			self.server = Some(DEFAULT_SERVER.to_string());
		}

		if self.api.is_none() {
			let server = self.server.as_deref().unwrap_or(DEFAULT_SERVER);
			let api = if server == DEFAULT_SERVER {
				format!("https://api.{server}")
			} else {
				format!("https://{server}/api/v3")
			};
			debug!(api = %api, "API URL inferred from server");
			self.api = Some(api);
		}

		if self.private_key.as_os_str().is_empty() {
			return Err(HelperError::Config("private key was not set".to_string()));
		}

		if self.app_id == 0 {
			return Err(HelperError::Config("GitHub App ID was not set".to_string()));
		}

		if self.current_owner_only.unwrap_or(false) && self.current_repo_only.unwrap_or(false) {
			return Err(HelperError::Config(
				"current_owner conflicts with current_repo".to_string(),
			));
		}

		if let Some(repositories) = &mut self.repositories {
			repositories.sort();
		}
		if let Some(ids) = &mut self.repository_ids {
			ids.sort_unstable();
		}

		Ok(())
	}

	/// Apply the current-repository scoping switches for helper mode.
	pub fn apply_repo_scope(&mut self, current_repo: &str) {
		if self.current_owner_only.unwrap_or(false) {
			debug!("enabled: current_owner");
			self.repositories = None;
			self.repository_ids = None;
		} else if self.current_repo_only.unwrap_or(false) {
			debug!("enabled: current_repo");
			self.repository_ids = None;
			let leaf = current_repo
				.rsplit('/')
				.next()
				.unwrap_or(current_repo)
				.to_string();
			debug!(repository = %leaf, "current_repo narrows repositories");
			self.repositories = Some(vec![leaf]);
		}
	}

	/// The API base URL. Empty before [`Rule::validate`] runs.
	pub fn api(&self) -> &str {
		self.api.as_deref().unwrap_or_default()
	}
}

/// The parsed configuration document: regex patterns over repository
/// paths mapped to rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
	rules: HashMap<String, Rule>,
}

impl RuleSet {
	pub fn parse(document: &str) -> Result<Self, HelperError> {
		let rules: HashMap<String, Rule> = serde_json::from_str(document)?;
		Ok(Self { rules })
	}

	pub fn len(&self) -> usize {
		self.rules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}

	/// Select the rule for a repository path and apply its scoping
	/// switches. Patterns are tried longest first, ties broken
	/// lexicographically, so the winner is independent of map order.
	/// A non-match is a silent error: the request is not ours.
	pub fn match_repo(&self, repo: &str) -> Result<Rule, HelperError> {
		let mut patterns: Vec<&String> = self.rules.keys().collect();
		patterns.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

		for pattern in patterns {
			let matcher = Regex::new(pattern).map_err(|e| {
				HelperError::Config(format!("invalid pattern {pattern:?}: {e}"))
			})?;
			if matcher.is_match(repo) {
				debug!(repo, pattern = %pattern, "matched repository");
				let mut rule = self.rules[pattern].clone();
				rule.apply_repo_scope(repo);
				return Ok(rule);
			}
		}

		debug!(repo, "no rule matches repository");
		Err(HelperError::silent(format!(
			"can't match {repo} with any configured rule"
		)))
	}

	/// The single rule direct-CLI mode requires. Misconfiguration here is
	/// loud: silent exits are reserved for the credential-helper path.
	pub fn single_rule(&self) -> Result<Rule, HelperError> {
		if self.rules.len() != 1 {
			return Err(HelperError::Config(format!(
				"in CLI mode expected exactly 1 rule, got: {}",
				self.rules.len()
			)));
		}
		let rule = self
			.rules
			.values()
			.next()
			.cloned()
			.expect("length checked above");

		if rule.current_repo_only.unwrap_or(false) {
			return Err(HelperError::Config(
				"can't infer current repository in CLI mode".to_string(),
			));
		}
		if rule.installation.is_none() && rule.installation_id.is_none() {
			return Err(HelperError::Config(
				"either installation or installation ID must be specified in CLI mode".to_string(),
			));
		}

		Ok(rule)
	}
}
