// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Redaction and fingerprint helpers for token material.

use sha2::{Digest, Sha256};

/// Replace the value of a `"token":"…"` field in a JSON body with
/// `[redacted]`. Bodies without such a field are returned unchanged.
pub fn redact_token_body(body: &str) -> String {
	const NEEDLE: &str = "\"token\":\"";

	let Some(start) = body.find(NEEDLE) else {
		return body.to_string();
	};
	let start = start + NEEDLE.len();
	let Some(end) = body[start..].find('"') else {
		return body.to_string();
	};
	format!("{}[redacted]{}", &body[..start], &body[start + end..])
}

/// Short correlation fingerprint for a token: the first 12 hex characters
/// of its SHA-256 digest. Safe for the stderr sink.
pub fn fingerprint(token: &str) -> String {
	let digest = Sha256::digest(token.as_bytes());
	hex::encode(digest)[..12].to_string()
}
