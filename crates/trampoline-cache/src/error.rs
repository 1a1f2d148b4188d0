// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for the cache.

use thiserror::Error;

/// Errors that can escape the cache.
///
/// Only unexpected failures surface here; the non-fatal read classes
/// (absent file, corrupt entry, expired entry, decode mismatch) are
/// reported as misses instead.
#[derive(Debug, Error)]
pub enum CacheError {
	/// Filesystem error other than "not found" / "already exists".
	#[error("cache I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// Failed to encode a value into the entry envelope.
	#[error("failed to encode cache entry: {0}")]
	Encode(#[from] serde_json::Error),

	/// Gave up waiting for another process to release a key lock.
	#[error("cache lock timeout")]
	LockTimeout,
}
