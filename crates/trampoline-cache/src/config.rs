// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Cache tunables.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the filesystem cache.
///
/// One instance is assembled per invocation and passed to
/// [`CacheStore::new`](crate::CacheStore::new); there is no global cache
/// state, which keeps tests free to point fresh stores at isolated roots.
#[derive(Debug, Clone)]
pub struct CacheConfig {
	/// Master switch. A disabled cache misses on every read and turns
	/// locking into a plain call-through.
	pub enabled: bool,

	/// Root directory. Entries live in per-kind subdirectories below it.
	pub dir: PathBuf,

	/// TTL for the cached installations list.
	pub ttl_installations: Duration,

	/// TTL for cached owner→installation mappings.
	pub ttl_owner_mapping: Duration,

	/// TTL for cached access tokens. GitHub issues tokens valid for an
	/// hour; ten minutes leaves a wide margin for in-flight use.
	pub ttl_token: Duration,

	/// Age after which another process's lock file is treated as
	/// abandoned, and the ceiling on how long a waiter polls.
	pub lock_timeout: Duration,

	/// Sleep between lock acquisition attempts.
	pub lock_poll_interval: Duration,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			dir: default_cache_dir(),
			ttl_installations: Duration::from_secs(5 * 60),
			ttl_owner_mapping: Duration::from_secs(5 * 60),
			ttl_token: Duration::from_secs(10 * 60),
			lock_timeout: Duration::from_secs(30),
			lock_poll_interval: Duration::from_millis(200),
		}
	}
}

/// Platform user-cache directory for the trampoline, with a temp-dir
/// fallback for environments without one.
pub fn default_cache_dir() -> PathBuf {
	dirs::cache_dir()
		.map(|dir| dir.join("github-apps-trampoline"))
		.unwrap_or_else(|| std::env::temp_dir().join("github-apps-trampoline-cache"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = CacheConfig::default();
		assert!(config.enabled);
		assert_eq!(config.ttl_installations, Duration::from_secs(300));
		assert_eq!(config.ttl_owner_mapping, Duration::from_secs(300));
		assert_eq!(config.ttl_token, Duration::from_secs(600));
		assert_eq!(config.lock_timeout, Duration::from_secs(30));
		assert_eq!(config.lock_poll_interval, Duration::from_millis(200));
	}

	#[test]
	fn test_default_cache_dir_is_named_after_the_tool() {
		let dir = default_cache_dir();
		assert!(dir.to_string_lossy().contains("github-apps-trampoline"));
	}
}
