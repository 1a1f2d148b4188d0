// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Canonical cache keys for the three cached artifact kinds.
//!
//! Token reuse is only safe if every configuration variant that would
//! produce the same request maps to the same key, so the token key
//! canonicalizes its inputs: repository lists sorted, permissions
//! re-encoded by a stable encoder, and the exact request body appended so
//! the key stays self-describing under future request-shape changes.

use serde_json::value::RawValue;

use crate::rules::Rule;

/// Cache key for the App's installations list.
pub fn installations_key(app_id: u64, api: &str) -> String {
	format!("installations:app={app_id} api={api}")
}

/// Cache key for one owner→installation mapping.
pub fn owner_map_key(app_id: u64, api: &str, owner: &str) -> String {
	format!("owner_map:app={app_id} api={api} owner={owner}")
}

/// Cache key for a scoped token. `request_body` is the exact body that
/// will be POSTed.
pub fn token_key(rule: &Rule, request_body: &str) -> String {
	let repos = match &rule.repositories {
		Some(repositories) => {
			let mut repositories = repositories.clone();
			repositories.sort();
			repositories.join(",")
		}
		None => "all".to_string(),
	};
	let repo_ids = match &rule.repository_ids {
		Some(ids) => {
			let mut ids = ids.clone();
			ids.sort_unstable();
			ids.iter()
				.map(u64::to_string)
				.collect::<Vec<_>>()
				.join(",")
		}
		None => "all".to_string(),
	};
	let permissions = rule
		.permissions
		.as_deref()
		.map(canonical_permissions)
		.unwrap_or_default();

	format!(
		"token:app={} api={} installation={} owner={} repos={} repo_ids={} permissions={} request={}",
		rule.app_id,
		rule.api(),
		rule.installation_id.unwrap_or_default(),
		rule.resolved_owner,
		repos,
		repo_ids,
		permissions,
		request_body,
	)
}

/// Decode and re-encode a permissions object so key equality is
/// insensitive to the author's key order (`serde_json::Map` keeps keys
/// sorted). Input that is not an object is used verbatim.
pub fn canonical_permissions(raw: &RawValue) -> String {
	let decoded: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(raw.get())
	{
		Ok(map) => map,
		Err(_) => return raw.get().to_string(),
	};
	serde_json::to_string(&decoded).unwrap_or_else(|_| raw.get().to_string())
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	pub(crate) fn base_rule() -> Rule {
		Rule {
			private_key: PathBuf::from("./k.pem"),
			app_id: 42,
			api: Some("https://api.github.com".to_string()),
			installation_id: Some(7),
			resolved_owner: "acme".to_string(),
			..Rule::default()
		}
	}

	#[test]
	fn test_installations_key_format() {
		assert_eq!(
			installations_key(42, "https://api.github.com"),
			"installations:app=42 api=https://api.github.com"
		);
	}

	#[test]
	fn test_owner_map_key_format() {
		assert_eq!(
			owner_map_key(42, "https://api.github.com", "acme"),
			"owner_map:app=42 api=https://api.github.com owner=acme"
		);
	}

	#[test]
	fn test_token_key_defaults_to_all() {
		let key = token_key(&base_rule(), "{}");
		assert_eq!(
			key,
			"token:app=42 api=https://api.github.com installation=7 owner=acme \
			 repos=all repo_ids=all permissions= request={}"
		);
	}

	#[test]
	fn test_token_key_sorts_repositories() {
		let mut a = base_rule();
		a.repositories = Some(vec!["zeta".into(), "alpha".into()]);
		let mut b = base_rule();
		b.repositories = Some(vec!["alpha".into(), "zeta".into()]);
		assert_eq!(token_key(&a, "{}"), token_key(&b, "{}"));
		assert!(token_key(&a, "{}").contains("repos=alpha,zeta"));
	}

	#[test]
	fn test_token_key_sorts_repository_ids_numerically() {
		let mut rule = base_rule();
		rule.repository_ids = Some(vec![30, 2, 10]);
		assert!(token_key(&rule, "{}").contains("repo_ids=2,10,30"));
	}

	#[test]
	fn test_token_key_canonicalizes_permission_order() {
		let mut a = base_rule();
		a.permissions = Some(
			RawValue::from_string(r#"{"contents":"read","issues":"write"}"#.to_string()).unwrap(),
		);
		let mut b = base_rule();
		b.permissions = Some(
			RawValue::from_string(r#"{"issues":"write","contents":"read"}"#.to_string()).unwrap(),
		);
		assert_eq!(token_key(&a, "{}"), token_key(&b, "{}"));
	}

	#[test]
	fn test_token_key_empty_owner_stays_empty() {
		let mut rule = base_rule();
		rule.resolved_owner = String::new();
		assert!(token_key(&rule, "{}").contains(" owner= "));
	}

	#[test]
	fn test_token_key_embeds_the_request_body() {
		let body = r#"{"permissions":{"contents":"read"}}"#;
		assert!(token_key(&base_rule(), body).ends_with(&format!("request={body}")));
	}

	#[test]
	fn test_canonical_permissions_passes_non_objects_through() {
		let raw = RawValue::from_string("[1,2]".to_string()).unwrap();
		assert_eq!(canonical_permissions(&raw), "[1,2]");
	}

	#[test]
	fn test_keys_route_to_their_kind_directories() {
		assert!(installations_key(1, "x").starts_with("installations:"));
		assert!(owner_map_key(1, "x", "o").starts_with("owner_map:"));
		assert!(token_key(&base_rule(), "{}").starts_with("token:"));
	}
}
