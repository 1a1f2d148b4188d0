// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HTTP client for the GitHub App endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use tracing::debug;

use trampoline_logger::{redact_token_body, LogGate};

use crate::error::GithubError;
use crate::types::{AccessToken, Installation};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!("github-apps-trampoline/", env!("CARGO_PKG_VERSION"));

/// Response bodies echoed into logs are capped at this many bytes.
const LOG_BODY_LIMIT: usize = 4096;

/// The two GitHub endpoints the token pipeline consumes.
#[async_trait]
pub trait GithubApi: Send + Sync {
	/// List every installation of the App, following pagination.
	async fn list_installations(
		&self,
		api: &str,
		assertion: &str,
	) -> Result<Vec<Installation>, GithubError>;

	/// Mint a scoped access token for an installation. `body` is the
	/// exact JSON request body to POST.
	async fn create_access_token(
		&self,
		api: &str,
		assertion: &str,
		installation_id: u64,
		body: &str,
	) -> Result<AccessToken, GithubError>;
}

/// Real client backed by `reqwest`.
pub struct GithubClient {
	http: reqwest::Client,
	gate: Arc<LogGate>,
}

impl GithubClient {
	pub fn new(gate: Arc<LogGate>) -> Result<Self, GithubError> {
		let http = reqwest::Client::builder()
			.user_agent(USER_AGENT)
			.timeout(REQUEST_TIMEOUT)
			.build()?;
		Ok(Self { http, gate })
	}
}

#[async_trait]
impl GithubApi for GithubClient {
	async fn list_installations(
		&self,
		api: &str,
		assertion: &str,
	) -> Result<Vec<Installation>, GithubError> {
		debug!(api, "listing app installations");

		let mut installations = Vec::new();
		let mut page = 1u32;
		loop {
			let url = format!("{api}/app/installations?per_page=100&page={page}");
			let response = self
				.http
				.get(&url)
				.header(header::ACCEPT, ACCEPT)
				.bearer_auth(assertion)
				.send()
				.await?;

			let status = response.status();
			let has_next = has_next_page(
				response
					.headers()
					.get(header::LINK)
					.and_then(|value| value.to_str().ok())
					.unwrap_or_default(),
			);
			let body = response.text().await?;
			if !status.is_success() {
				return Err(GithubError::api_error(status.as_u16(), truncate_body(&body)));
			}

			let page_installations: Vec<Installation> = serde_json::from_str(&body)
				.map_err(|e| GithubError::InvalidResponse(format!("JSON parse error: {e}")))?;
			debug!(page, count = page_installations.len(), "fetched installations page");

			let last_page = page_installations.is_empty() || !has_next;
			installations.extend(page_installations);
			if last_page {
				break;
			}
			page += 1;
		}

		debug!(count = installations.len(), "installations listed");
		Ok(installations)
	}

	async fn create_access_token(
		&self,
		api: &str,
		assertion: &str,
		installation_id: u64,
		body: &str,
	) -> Result<AccessToken, GithubError> {
		debug!(api, installation_id, "requesting installation access token");

		let url = format!("{api}/app/installations/{installation_id}/access_tokens");
		let response = self
			.http
			.post(&url)
			.header(header::ACCEPT, ACCEPT)
			.header(header::CONTENT_TYPE, "application/json")
			.bearer_auth(assertion)
			.body(body.to_string())
			.send()
			.await?;

		let status = response.status();
		let text = response.text().await?;
		let body_log = truncate_body(&text);
		if !status.is_success() {
			return Err(GithubError::api_error(status.as_u16(), body_log));
		}

		// The response body carries the token, so only the file sink may
		// see it verbatim.
		self.gate.filef(&format!("token response: {body_log}"));
		self.gate
			.stderrf(&format!("token response: {}", redact_token_body(&body_log)));

		let token: AccessToken = serde_json::from_str(&text)
			.map_err(|e| GithubError::InvalidResponse(format!("JSON parse error: {e}")))?;
		Ok(token)
	}
}

/// Whether a `Link` header advertises another page.
fn has_next_page(link_header: &str) -> bool {
	link_header
		.split(',')
		.any(|part| part.contains(r#"rel="next""#))
}

/// Cap a response body for logging, keeping the cut on a char boundary.
fn truncate_body(body: &str) -> String {
	if body.len() <= LOG_BODY_LIMIT {
		return body.to_string();
	}
	let mut cut = LOG_BODY_LIMIT;
	while !body.is_char_boundary(cut) {
		cut -= 1;
	}
	format!("{}...(truncated)", &body[..cut])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_has_next_page() {
		assert!(has_next_page(
			r#"<https://api.github.com/app/installations?page=2>; rel="next", <https://api.github.com/app/installations?page=5>; rel="last""#
		));
	}

	#[test]
	fn test_has_next_page_last_page() {
		assert!(!has_next_page(
			r#"<https://api.github.com/app/installations?page=4>; rel="prev", <https://api.github.com/app/installations?page=1>; rel="first""#
		));
	}

	#[test]
	fn test_has_next_page_absent_header() {
		assert!(!has_next_page(""));
	}

	#[test]
	fn test_truncate_body_short() {
		assert_eq!(truncate_body("short"), "short");
	}

	#[test]
	fn test_truncate_body_long() {
		let body = "x".repeat(LOG_BODY_LIMIT + 100);
		let truncated = truncate_body(&body);
		assert!(truncated.ends_with("...(truncated)"));
		assert_eq!(truncated.len(), LOG_BODY_LIMIT + "...(truncated)".len());
	}

	#[test]
	fn test_truncate_body_respects_char_boundaries() {
		let body = "é".repeat(LOG_BODY_LIMIT);
		let truncated = truncate_body(&body);
		assert!(truncated.ends_with("...(truncated)"));
	}

	#[test]
	fn test_client_builds() {
		let client = GithubClient::new(Arc::new(LogGate::disabled()));
		assert!(client.is_ok());
	}
}
