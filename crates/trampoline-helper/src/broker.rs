// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The token pipeline: installation resolution and token acquisition.

use std::sync::Arc;

use tracing::{debug, info};

use trampoline_cache::CacheStore;
use trampoline_github::{jwt, GithubApi, Installation};

use crate::error::HelperError;
use crate::keys;
use crate::rules::Rule;

/// Orchestrates rule validation, assertion signing, installation
/// resolution and the token request, memoized through the cache store and
/// retried once on cache-staleness signals from the remote.
pub struct TokenBroker {
	store: CacheStore,
	github: Arc<dyn GithubApi>,
}

impl TokenBroker {
	pub fn new(store: CacheStore, github: Arc<dyn GithubApi>) -> Self {
		Self { store, github }
	}

	/// Exchange the App identity for a scoped installation token.
	///
	/// `current_repo` is the effective repository path in helper mode and
	/// `None` in direct-CLI mode. The assertion is minted once and reused
	/// across the staleness retry.
	pub async fn get_token(
		&self,
		rule: &mut Rule,
		current_repo: Option<&str>,
	) -> Result<String, HelperError> {
		rule.validate()?;
		let assertion = jwt::create_assertion(&rule.private_key, rule.app_id).await?;
		self.ensure_installation_id(rule, &assertion, current_repo)
			.await?;

		match self.request_token(rule, &assertion).await {
			Ok(token) => Ok(token),
			Err(err) if self.store.enabled() && is_stale_signal(&err) => {
				// Installation IDs can be reassigned server-side; the
				// local caches are the only place a wrong ID can come
				// from, so invalidate them and resolve again, once.
				info!(error = %err, "token request failed with a staleness signal, invalidating installation caches and retrying");
				self.invalidate_installation_caches(rule).await;
				rule.installation_id = None;
				self.ensure_installation_id(rule, &assertion, current_repo)
					.await?;
				self.request_token(rule, &assertion).await
			}
			Err(err) => Err(err),
		}
	}

	/// Populate `rule.installation_id` (and `resolved_owner`), consulting
	/// the owner-map and installations caches before going to the remote.
	async fn ensure_installation_id(
		&self,
		rule: &mut Rule,
		assertion: &str,
		current_repo: Option<&str>,
	) -> Result<(), HelperError> {
		if rule.installation_id.is_some() {
			return Ok(());
		}
		debug!("installation ID was not provided, resolving automatically");

		let owner = derive_owner(rule, current_repo)?;
		debug!(owner = %owner, "owner determined");
		rule.resolved_owner = owner.clone();

		if self.store.enabled() {
			if let Some(id) = self.cached_installation_id(rule, &owner).await? {
				rule.installation_id = Some(id);
				return Ok(());
			}
		}

		let installations = self.installations_with_cache(rule, assertion).await?;
		let mut found = find_installation(&installations, &owner);

		if found.is_none() && self.store.enabled() {
			// The cached list may predate a fresh installation; refresh
			// it once before giving up.
			debug!(owner = %owner, "owner absent from installations, refreshing the list");
			self.invalidate_installation_caches(rule).await;
			let installations = self.installations_with_cache(rule, assertion).await?;
			found = find_installation(&installations, &owner);
		}

		let id = found.ok_or_else(|| {
			HelperError::silent(format!("can't find an installation for owner {owner}"))
		})?;
		rule.installation_id = Some(id);

		if self.store.enabled() {
			let key = keys::owner_map_key(rule.app_id, rule.api(), &owner);
			let _ = self
				.store
				.set(&key, &id, self.store.config().ttl_owner_mapping)
				.await;
		}
		Ok(())
	}

	/// Owner-map lookup with a cross-check: a hit that contradicts the
	/// cached installations list is stale, so both entries are dropped
	/// and the lookup reports a miss.
	async fn cached_installation_id(
		&self,
		rule: &Rule,
		owner: &str,
	) -> Result<Option<u64>, HelperError> {
		let key = keys::owner_map_key(rule.app_id, rule.api(), owner);
		let cached: Option<u64> = self.store.get(&key).await?;
		let Some(id) = cached.filter(|id| *id != 0) else {
			return Ok(None);
		};

		let list_key = keys::installations_key(rule.app_id, rule.api());
		let cached_list: Option<Vec<Installation>> =
			self.store.get(&list_key).await.ok().flatten();
		if let Some(installations) = cached_list {
			let agrees = installations
				.iter()
				.find(|installation| installation.account.login == owner)
				.map(|installation| installation.id == id)
				.unwrap_or(false);
			if !agrees {
				debug!(owner, id, "cached owner mapping disagrees with the cached installations list");
				self.store.delete(&key).await;
				self.invalidate_installation_caches(rule).await;
				return Ok(None);
			}
		}

		debug!(owner, id, "installation ID served from the owner mapping cache");
		Ok(Some(id))
	}

	/// Installations list through the cache, fetching under the per-key
	/// lock with a double-checked read so concurrent invocations fetch at
	/// most once.
	async fn installations_with_cache(
		&self,
		rule: &Rule,
		assertion: &str,
	) -> Result<Vec<Installation>, HelperError> {
		if !self.store.enabled() {
			return Ok(self.github.list_installations(rule.api(), assertion).await?);
		}

		let key = keys::installations_key(rule.app_id, rule.api());
		if let Some(installations) = self.store.get::<Vec<Installation>>(&key).await? {
			return Ok(installations);
		}
		self.store
			.with_lock(&key, || async {
				if let Some(installations) = self.store.get::<Vec<Installation>>(&key).await? {
					return Ok(installations);
				}
				let fetched = self.github.list_installations(rule.api(), assertion).await?;
				self.store
					.set(&key, &fetched, self.store.config().ttl_installations)
					.await?;
				Ok(fetched)
			})
			.await
	}

	/// POST for a token, memoized under the canonical token key when the
	/// cache is enabled.
	async fn request_token(&self, rule: &Rule, assertion: &str) -> Result<String, HelperError> {
		let body = build_request_body(rule)?;
		let installation_id = rule.installation_id.ok_or_else(|| {
			HelperError::Config("installation ID missing after resolution".to_string())
		})?;

		if !self.store.enabled() {
			let token = self
				.github
				.create_access_token(rule.api(), assertion, installation_id, &body)
				.await?;
			return Ok(token.token);
		}

		let key = keys::token_key(rule, &body);
		if let Some(token) = self.cached_token(&key).await? {
			return Ok(token);
		}
		self.store
			.with_lock(&key, || async {
				if let Some(token) = self.cached_token(&key).await? {
					return Ok(token);
				}
				let fetched = self
					.github
					.create_access_token(rule.api(), assertion, installation_id, &body)
					.await?;
				self.store
					.set(&key, &fetched.token, self.store.config().ttl_token)
					.await?;
				Ok(fetched.token)
			})
			.await
	}

	async fn cached_token(&self, key: &str) -> Result<Option<String>, HelperError> {
		let cached: Option<String> = self.store.get(key).await?;
		Ok(cached.filter(|token| !token.is_empty()))
	}

	/// Targeted invalidation: the installations list, plus the one
	/// owner-map entry consulted this invocation.
	async fn invalidate_installation_caches(&self, rule: &Rule) {
		self.store
			.delete(&keys::installations_key(rule.app_id, rule.api()))
			.await;
		if !rule.resolved_owner.is_empty() {
			self.store
				.delete(&keys::owner_map_key(
					rule.app_id,
					rule.api(),
					&rule.resolved_owner,
				))
				.await;
		}
	}
}

/// Build the access-token request body, including only the scopes the
/// rule sets. `serde_json::Map` keeps object keys ordered, so the body is
/// identical for any equivalent rule.
pub fn build_request_body(rule: &Rule) -> Result<String, HelperError> {
	let mut request = serde_json::Map::new();
	if let Some(repositories) = &rule.repositories {
		debug!("enabled: repositories");
		request.insert("repositories".to_string(), serde_json::json!(repositories));
	}
	if let Some(ids) = &rule.repository_ids {
		debug!("enabled: repository_ids");
		request.insert("repository_ids".to_string(), serde_json::json!(ids));
	}
	if let Some(raw) = &rule.permissions {
		debug!("enabled: permissions");
		let permissions: serde_json::Map<String, serde_json::Value> =
			serde_json::from_str(raw.get())?;
		request.insert(
			"permissions".to_string(),
			serde_json::Value::Object(permissions),
		);
	}
	Ok(serde_json::to_string(&request)?)
}

/// Derive the owner login for installation lookup. An explicit
/// `installation` path wins; otherwise the current repository path is
/// used; with neither, the invocation cannot be resolved and exits
/// silently.
fn derive_owner(rule: &Rule, current_repo: Option<&str>) -> Result<String, HelperError> {
	if let Some(installation) = &rule.installation {
		debug!(installation = %installation, "deriving owner from installation path");
		let parts: Vec<&str> = installation.split('/').collect();
		let owner = match parts.len() {
			len if len > 2 => parts[len - 2],
			2 => parts[1],
			_ => {
				return Err(HelperError::Config(format!(
					"can't derive an owner from installation path {installation:?}"
				)))
			}
		};
		return Ok(owner.to_string());
	}

	if let Some(repo) = current_repo.filter(|repo| !repo.is_empty()) {
		debug!(repo, "deriving owner from current repository");
		let parts: Vec<&str> = repo.split('/').collect();
		if parts.len() < 2 {
			return Err(HelperError::silent(format!(
				"can't derive an owner from repository path {repo:?}"
			)));
		}
		return Ok(parts[parts.len() - 2].to_string());
	}

	Err(HelperError::silent(
		"can't find an owner for automatic installation ID lookup",
	))
}

fn find_installation(installations: &[Installation], owner: &str) -> Option<u64> {
	installations
		.iter()
		.find(|installation| installation.account.login == owner)
		.map(|installation| {
			debug!(owner, id = installation.id, "matched owner with installation");
			installation.id
		})
}

fn is_stale_signal(err: &HelperError) -> bool {
	matches!(err, HelperError::Github(github) if github.is_stale_signal())
}
