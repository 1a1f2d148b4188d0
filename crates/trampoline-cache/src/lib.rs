// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Filesystem-backed cache shared by concurrent trampoline invocations.
//!
//! Every invocation is a short-lived process, so memoization has to live
//! on disk: entries are JSON envelopes with a TTL, written atomically via
//! temp-file + rename, and guarded by per-key lock files so that N
//! concurrent processes asking for the same missing key perform the
//! underlying fetch at most once. Anything suspicious on disk (corrupt
//! JSON, wrong key, expired entry) degrades to a cache miss, never to an
//! error.

pub mod config;
pub mod error;
pub mod lock;
pub mod store;

pub use config::{default_cache_dir, CacheConfig};
pub use error::CacheError;
pub use store::CacheStore;
