// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `github-apps-trampoline` binary.
//!
//! A short-lived credential broker: exchanges a GitHub App's RSA identity
//! for a scoped installation access token, either as a git credential
//! helper (default) or as a standalone CLI (`--cli`). Silent-exit
//! conditions terminate with status 0 and no output so git can chain
//! helpers; real failures exit non-zero.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trampoline_cache::CacheStore;
use trampoline_github::GithubClient;
use trampoline_helper::{HelperError, RuleSet, TokenBroker};
use trampoline_logger::LogGate;

mod args;
mod config_doc;
mod credential_helper;
mod direct;

use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();
	match run(args).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) if is_silent(&err) => {
			tracing::debug!(error = %err, "silently exiting, nothing to do");
			ExitCode::SUCCESS
		}
		Err(err) => {
			eprintln!("github-apps-trampoline: {err:#}");
			ExitCode::FAILURE
		}
	}
}

async fn run(args: Args) -> anyhow::Result<()> {
	let gate = Arc::new(LogGate::new(&args.log_config())?);
	init_tracing(&args, &gate);

	let document = config_doc::load(&args)?;
	tracing::debug!(config = %document, "effective configuration document");
	let rules = RuleSet::parse(&document)?;

	let store = CacheStore::new(args.cache_config(), Arc::clone(&gate));
	let github = Arc::new(GithubClient::new(Arc::clone(&gate))?);
	let broker = TokenBroker::new(store, github);

	if args.cli {
		direct::run(&broker, &rules, &gate).await
	} else {
		credential_helper::run(&args, &broker, &rules, &gate).await
	}
}

fn init_tracing(args: &Args, gate: &LogGate) {
	let default_level = if args.verbose { "debug" } else { "info" };
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	let file_layer = gate.file_make_writer().map(|writer| {
		tracing_subscriber::fmt::layer()
			.with_ansi(false)
			.with_writer(writer)
	});
	let stderr_layer = (args.verbose || args.log_tee_stderr)
		.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

	tracing_subscriber::registry()
		.with(filter)
		.with(file_layer)
		.with(stderr_layer)
		.init();
}

/// Silent errors may sit anywhere in an anyhow chain.
fn is_silent(err: &anyhow::Error) -> bool {
	err.chain().any(|cause| {
		matches!(cause.downcast_ref::<HelperError>(), Some(helper) if helper.is_silent())
	})
}
