// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration-document loading.
//!
//! Priority: `--config <file>`, then the `GITHUB_APPS_TRAMPOLINE`
//! environment variable carrying the document inline, then a single-rule
//! document synthesized from the individual flags.

use std::collections::HashMap;

use anyhow::{anyhow, Context};
use serde_json::value::RawValue;
use tracing::debug;

use trampoline_helper::Rule;

use crate::args::Args;

pub const CONFIG_ENV: &str = "GITHUB_APPS_TRAMPOLINE";

pub fn load(args: &Args) -> anyhow::Result<String> {
	if let Some(path) = &args.config {
		debug!(path = %path.display(), "reading configuration document from file");
		return std::fs::read_to_string(path)
			.with_context(|| format!("reading config file {}", path.display()));
	}
	if let Ok(inline) = std::env::var(CONFIG_ENV) {
		if !inline.is_empty() {
			debug!("reading configuration document from the environment");
			return Ok(inline);
		}
	}
	debug!("no configuration document, synthesizing a single rule from flags");
	synthesize(args)
}

/// Build a one-rule document from the individual flags, the way an
/// ad-hoc `git config credential.helper` line would use this tool.
pub fn synthesize(args: &Args) -> anyhow::Result<String> {
	let key = args.key.clone().ok_or_else(|| {
		anyhow!("if no config was provided, the private key must be set via --key or GITHUB_APPS_TRAMPOLINE_KEY")
	})?;
	let app_id = args.app.ok_or_else(|| {
		anyhow!("if no config was provided, the app ID must be set via --app or GITHUB_APPS_TRAMPOLINE_APP")
	})?;
	let filter = args.filter.clone().unwrap_or_else(|| {
		debug!("filter was not set, assuming '.*'");
		".*".to_string()
	});

	let mut rule = Rule {
		private_key: key,
		app_id,
		server: args.server.clone(),
		api: args.api.clone(),
		installation: args.installation.clone(),
		installation_id: args.installation_id,
		..Rule::default()
	};
	if args.current_repo {
		rule.current_repo_only = Some(true);
	}
	if args.current_owner {
		rule.current_owner_only = Some(true);
	}
	if let Some(repositories) = &args.repositories {
		rule.repositories = Some(repositories.split(',').map(str::to_string).collect());
	}
	if let Some(ids) = &args.repository_ids {
		let ids = ids
			.split(',')
			.map(|id| {
				id.trim()
					.parse::<u64>()
					.with_context(|| format!("invalid repository ID {id:?}"))
			})
			.collect::<anyhow::Result<Vec<_>>>()?;
		rule.repository_ids = Some(ids);
	}
	if let Some(permissions) = &args.permissions {
		rule.permissions = Some(
			RawValue::from_string(permissions.clone()).context("invalid permissions JSON")?,
		);
	}

	let mut document = HashMap::new();
	document.insert(filter, rule);
	Ok(serde_json::to_string_pretty(&document)?)
}
