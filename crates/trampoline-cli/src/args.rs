// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Command-line arguments.
//!
//! Every flag can also be supplied through a `GITHUB_APPS_TRAMPOLINE_`
//! prefixed environment variable, which matters because git invokes
//! credential helpers with an argument vector the user does not control.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use trampoline_cache::CacheConfig;
use trampoline_logger::LogConfig;

/// A GIT_ASKPASS trampoline for GitHub Apps.
#[derive(Parser, Debug)]
#[command(
	name = "github-apps-trampoline",
	about = "A GIT_ASKPASS trampoline for GitHub Apps",
	version
)]
pub struct Args {
	/// Credential-helper operation; git passes `get`.
	#[arg(value_name = "OPERATION")]
	pub operation: Vec<String>,

	/// Configuration document file.
	#[arg(short, long, env = "GITHUB_APPS_TRAMPOLINE_CONFIG")]
	pub config: Option<PathBuf>,

	/// Verbose output on stderr.
	#[arg(short, long, env = "GITHUB_APPS_TRAMPOLINE_VERBOSE")]
	pub verbose: bool,

	/// Standalone CLI mode: print the token as JSON instead of speaking
	/// the credential-helper protocol.
	#[arg(long, env = "GITHUB_APPS_TRAMPOLINE_CLI")]
	pub cli: bool,

	/// GitHub server.
	#[arg(short, long, env = "GITHUB_APPS_TRAMPOLINE_SERVER")]
	pub server: Option<String>,

	/// GitHub API URL.
	#[arg(long, env = "GITHUB_APPS_TRAMPOLINE_API")]
	pub api: Option<String>,

	/// Path to the App's private key.
	#[arg(short, long, env = "GITHUB_APPS_TRAMPOLINE_KEY")]
	pub key: Option<PathBuf>,

	/// GitHub App ID.
	#[arg(short, long, env = "GITHUB_APPS_TRAMPOLINE_APP")]
	pub app: Option<u64>,

	/// Repository-path pattern for the rule synthesized from flags.
	#[arg(short, long, env = "GITHUB_APPS_TRAMPOLINE_FILTER")]
	pub filter: Option<String>,

	/// Request access for the current repository only.
	#[arg(long = "current-repo", env = "GITHUB_APPS_TRAMPOLINE_CURRENT_REPO")]
	pub current_repo: bool,

	/// Request access for every repository of the current owner.
	#[arg(long = "current-owner", env = "GITHUB_APPS_TRAMPOLINE_CURRENT_OWNER")]
	pub current_owner: bool,

	/// Comma-separated repositories to request access to.
	#[arg(short, long, env = "GITHUB_APPS_TRAMPOLINE_REPOSITORIES")]
	pub repositories: Option<String>,

	/// Comma-separated repository IDs to request access to.
	#[arg(long = "repository-ids", env = "GITHUB_APPS_TRAMPOLINE_REPOSITORY_IDS")]
	pub repository_ids: Option<String>,

	/// Requested permissions as a JSON object.
	#[arg(short, long, env = "GITHUB_APPS_TRAMPOLINE_PERMISSIONS")]
	pub permissions: Option<String>,

	/// Path naming the installation owner.
	#[arg(short, long, env = "GITHUB_APPS_TRAMPOLINE_INSTALLATION")]
	pub installation: Option<String>,

	/// Installation ID.
	#[arg(long = "installation-id", env = "GITHUB_APPS_TRAMPOLINE_INSTALLATION_ID")]
	pub installation_id: Option<u64>,

	/// Log file; the file sink may record sensitive values.
	#[arg(long = "log-file", env = "GITHUB_APPS_TRAMPOLINE_LOG_FILE")]
	pub log_file: Option<PathBuf>,

	/// Tee logs to stderr even when a log file is set.
	#[arg(long = "log-tee-stderr", env = "GITHUB_APPS_TRAMPOLINE_LOG_TEE_STDERR")]
	pub log_tee_stderr: bool,

	/// Log a token-fingerprint correlation line after a successful fetch.
	#[arg(long = "token-fingerprint", env = "GITHUB_APPS_TRAMPOLINE_TOKEN_FINGERPRINT")]
	pub token_fingerprint: bool,

	/// Disable the filesystem cache.
	#[arg(long = "no-cache", env = "GITHUB_APPS_TRAMPOLINE_NO_CACHE")]
	pub no_cache: bool,

	/// Cache directory; defaults to the platform user-cache directory.
	#[arg(long = "cache-dir", env = "GITHUB_APPS_TRAMPOLINE_CACHE_DIR")]
	pub cache_dir: Option<PathBuf>,

	/// TTL for the cached installations list, in seconds.
	#[arg(
		long = "cache-ttl-installations-secs",
		env = "GITHUB_APPS_TRAMPOLINE_CACHE_TTL_INSTALLATIONS_SECS"
	)]
	pub cache_ttl_installations_secs: Option<u64>,

	/// TTL for cached owner→installation mappings, in seconds.
	#[arg(
		long = "cache-ttl-owner-map-secs",
		env = "GITHUB_APPS_TRAMPOLINE_CACHE_TTL_OWNER_MAP_SECS"
	)]
	pub cache_ttl_owner_map_secs: Option<u64>,

	/// TTL for cached tokens, in seconds.
	#[arg(
		long = "cache-ttl-token-secs",
		env = "GITHUB_APPS_TRAMPOLINE_CACHE_TTL_TOKEN_SECS"
	)]
	pub cache_ttl_token_secs: Option<u64>,

	/// Cross-process lock timeout, in seconds.
	#[arg(
		long = "cache-lock-timeout-secs",
		env = "GITHUB_APPS_TRAMPOLINE_CACHE_LOCK_TIMEOUT_SECS"
	)]
	pub cache_lock_timeout_secs: Option<u64>,

	/// Lock poll interval, in milliseconds.
	#[arg(
		long = "cache-lock-poll-millis",
		env = "GITHUB_APPS_TRAMPOLINE_CACHE_LOCK_POLL_MILLIS"
	)]
	pub cache_lock_poll_millis: Option<u64>,
}

impl Args {
	pub fn cache_config(&self) -> CacheConfig {
		let mut config = CacheConfig {
			enabled: !self.no_cache,
			..CacheConfig::default()
		};
		if let Some(dir) = &self.cache_dir {
			config.dir = dir.clone();
		}
		if let Some(secs) = self.cache_ttl_installations_secs {
			config.ttl_installations = Duration::from_secs(secs);
		}
		if let Some(secs) = self.cache_ttl_owner_map_secs {
			config.ttl_owner_mapping = Duration::from_secs(secs);
		}
		if let Some(secs) = self.cache_ttl_token_secs {
			config.ttl_token = Duration::from_secs(secs);
		}
		if let Some(secs) = self.cache_lock_timeout_secs {
			config.lock_timeout = Duration::from_secs(secs);
		}
		if let Some(millis) = self.cache_lock_poll_millis {
			config.lock_poll_interval = Duration::from_millis(millis);
		}
		config
	}

	pub fn log_config(&self) -> LogConfig {
		LogConfig {
			file: self.log_file.clone(),
			verbose: self.verbose,
			tee_stderr: self.log_tee_stderr,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let args = Args::parse_from(["github-apps-trampoline", "get"]);
		assert_eq!(args.operation, vec!["get"]);
		assert!(!args.cli);
		assert!(!args.no_cache);
		assert!(args.cache_config().enabled);
	}

	#[test]
	fn test_cache_flags_override_defaults() {
		let args = Args::parse_from([
			"github-apps-trampoline",
			"--no-cache",
			"--cache-dir",
			"/tmp/x",
			"--cache-ttl-token-secs",
			"120",
			"--cache-lock-timeout-secs",
			"5",
			"--cache-lock-poll-millis",
			"50",
		]);
		let config = args.cache_config();
		assert!(!config.enabled);
		assert_eq!(config.dir, PathBuf::from("/tmp/x"));
		assert_eq!(config.ttl_token, Duration::from_secs(120));
		assert_eq!(config.lock_timeout, Duration::from_secs(5));
		assert_eq!(config.lock_poll_interval, Duration::from_millis(50));
	}

	#[test]
	fn test_log_config_mirrors_flags() {
		let args = Args::parse_from([
			"github-apps-trampoline",
			"--log-file",
			"/tmp/trampoline.log",
			"--log-tee-stderr",
		]);
		let config = args.log_config();
		assert_eq!(config.file, Some(PathBuf::from("/tmp/trampoline.log")));
		assert!(config.tee_stderr);
		assert!(!config.verbose);
	}

	#[test]
	fn test_short_flags() {
		let args = Args::parse_from([
			"github-apps-trampoline",
			"-k",
			"./k.pem",
			"-a",
			"42",
			"-f",
			"^acme/.*$",
			"-r",
			"one,two",
			"-p",
			r#"{"contents":"read"}"#,
			"-i",
			"github.com/acme",
		]);
		assert_eq!(args.key, Some(PathBuf::from("./k.pem")));
		assert_eq!(args.app, Some(42));
		assert_eq!(args.filter.as_deref(), Some("^acme/.*$"));
		assert_eq!(args.repositories.as_deref(), Some("one,two"));
		assert_eq!(args.installation.as_deref(), Some("github.com/acme"));
	}
}
