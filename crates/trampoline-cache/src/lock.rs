// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Cross-process, per-key mutual exclusion.
//!
//! Locks are plain files created with exclusive-create semantics next to
//! the entry they guard, holding the acquisition timestamp. Contenders
//! poll; a lock whose mtime is older than the configured timeout is
//! treated as abandoned by a crashed process and reclaimed. Polling is
//! deliberate: the cache directory may live on a network filesystem where
//! OS advisory locks are unreliable, so the file-based protocol is the
//! reference semantics.

use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::CacheError;
use crate::store::CacheStore;

/// Removes the lock file on every exit path, including panics.
struct LockGuard {
	path: PathBuf,
}

impl Drop for LockGuard {
	fn drop(&mut self) {
		let _ = std::fs::remove_file(&self.path);
	}
}

impl CacheStore {
	/// Run `work` while holding the lock for `key`.
	///
	/// At most one process at a time runs `work` for a given key; others
	/// poll until the lock frees, reclaim it if the holder looks crashed,
	/// or fail with [`CacheError::LockTimeout`] once the configured
	/// timeout elapses. When the cache is disabled this is a plain
	/// call-through.
	///
	/// Callers MUST read the cache once before calling and again inside
	/// `work`, so a winner's write is observed by waiters without
	/// repeating the fetch.
	pub async fn with_lock<T, E, F, Fut>(&self, key: &str, work: F) -> Result<T, E>
	where
		E: From<CacheError>,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		if !self.enabled() {
			return work().await;
		}
		let (dir, key_hash) = self.dir_for_key(key).await.map_err(E::from)?;
		let lock_path = dir.join(format!("{key_hash}.lock"));
		let start = Instant::now();
		let mut wait_logged = false;
		loop {
			let mut options = fs::OpenOptions::new();
			options.write(true).create_new(true);
			#[cfg(unix)]
			options.mode(0o600);
			match options.open(&lock_path).await {
				Ok(mut file) => {
					let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
					let _ = file.write_all(stamp.as_bytes()).await;
					drop(file);
					self.event("lock_acquired", key, &key_hash, None);
					break;
				}
				Err(err) if err.kind() == ErrorKind::AlreadyExists => {
					if self.lock_is_stale(&lock_path).await {
						let _ = fs::remove_file(&lock_path).await;
						self.event("lock_stale", key, &key_hash, None);
						continue;
					}
					if !wait_logged {
						self.event("lock_wait", key, &key_hash, None);
						wait_logged = true;
					}
					if start.elapsed() > self.config().lock_timeout {
						self.event("lock_timeout", key, &key_hash, None);
						return Err(CacheError::LockTimeout.into());
					}
					tokio::time::sleep(self.config().lock_poll_interval).await;
				}
				Err(err) => return Err(CacheError::from(err).into()),
			}
		}
		let _guard = LockGuard { path: lock_path };
		work().await
	}

	/// A lock whose mtime age exceeds the timeout belongs to a crashed
	/// holder. A lock that vanishes, or whose mtime sits in the future,
	/// is treated as fresh and re-contended.
	async fn lock_is_stale(&self, lock_path: &std::path::Path) -> bool {
		let Ok(metadata) = fs::metadata(lock_path).await else {
			return false;
		};
		let Ok(modified) = metadata.modified() else {
			return false;
		};
		modified
			.elapsed()
			.map(|age| age > self.config().lock_timeout)
			.unwrap_or(false)
	}
}
