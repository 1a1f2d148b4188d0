// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for the GitHub wire layer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from assertion signing and the GitHub App endpoints.
#[derive(Debug, Error)]
pub enum GithubError {
	/// Network-level error during HTTP communication.
	#[error("network error: {0}")]
	Network(#[from] reqwest::Error),

	/// GitHub answered with a non-2xx status.
	#[error("GitHub API error: status={status} body={body}")]
	Api { status: u16, body: String },

	/// Could not read the App's private key file.
	#[error("failed to read private key {path}: {source}")]
	PrivateKey {
		path: PathBuf,
		source: std::io::Error,
	},

	/// Assertion signing/encoding error.
	#[error("JWT error: {0}")]
	Jwt(String),

	/// A 2xx response whose body did not parse.
	#[error("invalid response from GitHub: {0}")]
	InvalidResponse(String),
}

impl GithubError {
	/// Create an API error from status code and (possibly truncated)
	/// response body.
	pub fn api_error(status: u16, body: impl Into<String>) -> Self {
		Self::Api {
			status,
			body: body.into(),
		}
	}

	/// True for the statuses that indicate a locally cached installation
	/// ID may be stale: GitHub answers 404 for an installation that was
	/// reassigned and 401 for an assertion/installation mismatch. These
	/// are the only errors worth an invalidate-and-retry cycle.
	pub fn is_stale_signal(&self) -> bool {
		matches!(self, GithubError::Api { status: 401 | 404, .. })
	}
}
