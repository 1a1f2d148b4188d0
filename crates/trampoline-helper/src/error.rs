// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for the token pipeline.

use thiserror::Error;

use trampoline_cache::CacheError;
use trampoline_github::GithubError;

/// Errors from rule matching, installation resolution and token
/// acquisition.
#[derive(Debug, Error)]
pub enum HelperError {
	/// Intentional no-op: the invocation is not addressed to this helper
	/// or cannot be satisfied without a user-visible error. The process
	/// boundary translates this into exit 0 with no output, so git can
	/// fall through to the next configured credential helper.
	#[error("{0}")]
	Silent(String),

	/// The configuration cannot produce a token.
	#[error("configuration error: {0}")]
	Config(String),

	#[error(transparent)]
	Cache(#[from] CacheError),

	#[error(transparent)]
	Github(#[from] GithubError),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl HelperError {
	pub fn silent(msg: impl Into<String>) -> Self {
		Self::Silent(msg.into())
	}

	pub fn is_silent(&self) -> bool {
		matches!(self, Self::Silent(_))
	}
}
