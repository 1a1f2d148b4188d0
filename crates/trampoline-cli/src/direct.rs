// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Standalone CLI mode: print the credentials as JSON for scripts.

use serde::Serialize;
use tracing::debug;

use trampoline_helper::{RuleSet, TokenBroker};
use trampoline_logger::LogGate;

#[derive(Debug, Serialize)]
struct CredentialOutput {
	username: String,
	password: String,
}

pub async fn run(broker: &TokenBroker, rules: &RuleSet, gate: &LogGate) -> anyhow::Result<()> {
	debug!("standalone CLI mode enabled");

	let mut rule = rules.single_rule()?;
	let token = broker.get_token(&mut rule, None).await?;

	gate.filef(&format!("returning token in JSON format: {token:?}"));
	gate.stderrf("returning token in JSON format: [redacted]");

	let output = CredentialOutput {
		username: "x-access-token".to_string(),
		password: token,
	};
	println!("{}", to_json_pretty4(&output)?);
	Ok(())
}

/// Render with four-space indentation (`serde_json` defaults to two).
fn to_json_pretty4<T: Serialize>(value: &T) -> serde_json::Result<String> {
	let mut out = Vec::new();
	let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
	let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
	value.serialize(&mut serializer)?;
	Ok(String::from_utf8(out).expect("serde_json emits UTF-8"))
}
