// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Installation resolution and token acquisition.
//!
//! The pipeline per invocation: a repository path selects a configured
//! [`Rule`], the rule is validated and normalized, the owning
//! installation is resolved (through the persistent cache where
//! possible), and a scoped access token is requested — memoized under a
//! canonical cache key, and retried once with targeted invalidation when
//! the remote signals that a locally cached installation ID went stale.

pub mod broker;
pub mod error;
pub mod keys;
pub mod rules;

pub use broker::TokenBroker;
pub use error::HelperError;
pub use rules::{Rule, RuleSet};
