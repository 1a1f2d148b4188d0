// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub App wire layer for the trampoline.
//!
//! This crate owns the two endpoints the token pipeline consumes —
//! listing App installations and minting installation access tokens —
//! plus the RS256 assertion that authenticates the App itself. The
//! pipeline talks to it through the [`GithubApi`] trait so tests can
//! substitute a scripted remote.

pub mod client;
pub mod error;
pub mod jwt;
pub mod types;

pub use client::{GithubApi, GithubClient};
pub use error::GithubError;
pub use jwt::{create_assertion, sign_assertion};
pub use types::{AccessToken, Installation, InstallationAccount};
