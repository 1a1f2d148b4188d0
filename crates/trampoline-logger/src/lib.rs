// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Dual-channel logging for the trampoline.
//!
//! Credential helpers run underneath git, so their diagnostics go to two
//! places with different trust levels: a log file that belongs to the
//! invoking user and may record sensitive values, and stderr, which git
//! surfaces to terminals and CI logs and therefore must only ever see
//! redacted or fingerprinted values. [`LogGate`] is the split point every
//! sensitive emission goes through.

pub mod gate;
pub mod redact;

pub use gate::{FileSink, LogConfig, LogGate};
pub use redact::{fingerprint, redact_token_body};
