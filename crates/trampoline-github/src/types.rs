// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Wire types for the GitHub App endpoints.

use serde::{Deserialize, Serialize};

/// Account (user or organization) that owns an installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationAccount {
	pub login: String,
}

/// A tenant of the GitHub App. The installations list is the canonical
/// mapping from owner login to installation ID, so these are cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
	pub id: u64,
	pub account: InstallationAccount,
}

impl Installation {
	pub fn new(id: u64, login: impl Into<String>) -> Self {
		Self {
			id,
			account: InstallationAccount {
				login: login.into(),
			},
		}
	}
}

/// Response body of the installation access-token endpoint. GitHub sends
/// more fields; only the token itself is consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
	pub token: String,
}
