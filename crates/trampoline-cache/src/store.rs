// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Key→artifact persistence with TTL expiry and atomic replacement.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use trampoline_logger::LogGate;

use crate::config::CacheConfig;
use crate::error::CacheError;

/// On-disk entry envelope.
///
/// `key` is the full plaintext key so a hash collision (or a file moved
/// by hand) can never serve the wrong value: readers compare it against
/// the key they asked for.
#[derive(Debug, Serialize, Deserialize)]
struct Entry {
	#[serde(default)]
	key: String,
	value: serde_json::Value,
	fetched_at: DateTime<Utc>,
	expires_at: DateTime<Utc>,
}

/// Filesystem-backed cache store.
///
/// Entries are grouped by the kind prefix of their key (the part before
/// the first `:`) into per-kind subdirectories, and stored under a
/// truncated SHA-256 of the full key. Values are written atomically, so
/// readers never observe a partial file under its final name.
#[derive(Clone)]
pub struct CacheStore {
	config: CacheConfig,
	gate: Arc<LogGate>,
}

impl CacheStore {
	pub fn new(config: CacheConfig, gate: Arc<LogGate>) -> Self {
		Self { config, gate }
	}

	/// A store that never hits and never locks.
	pub fn disabled() -> Self {
		Self::new(
			CacheConfig {
				enabled: false,
				..CacheConfig::default()
			},
			Arc::new(LogGate::disabled()),
		)
	}

	pub fn enabled(&self) -> bool {
		self.config.enabled
	}

	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	/// Look up `key`. `Ok(None)` is a miss; every non-fatal problem with
	/// the entry on disk (absent, corrupt, wrong key, expired, value of
	/// the wrong shape) is downgraded to a miss. Only unexpected I/O
	/// errors surface.
	pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
		if !self.config.enabled {
			return Ok(None);
		}
		let (dir, key_hash) = self.dir_for_key(key).await?;
		let path = dir.join(format!("{key_hash}.json"));
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(err) if err.kind() == ErrorKind::NotFound => {
				self.event("miss", key, &key_hash, Some("not_found"));
				return Ok(None);
			}
			Err(err) => return Err(err.into()),
		};
		let entry: Entry = match serde_json::from_slice(&data) {
			Ok(entry) => entry,
			Err(_) => {
				self.event("miss", key, &key_hash, Some("corrupt"));
				return Ok(None);
			}
		};
		if !entry.key.is_empty() && entry.key != key {
			self.event("miss", key, &key_hash, Some("key_mismatch"));
			return Ok(None);
		}
		if Utc::now() > entry.expires_at {
			self.event("miss", key, &key_hash, Some("expired"));
			return Ok(None);
		}
		let value = match serde_json::from_value(entry.value) {
			Ok(value) => value,
			Err(_) => {
				self.event("miss", key, &key_hash, Some("unmarshal_failed"));
				return Ok(None);
			}
		};
		self.event("hit", key, &key_hash, None);
		Ok(Some(value))
	}

	/// Store `value` under `key` for `ttl`. The write is atomic: a temp
	/// file in the target directory is written, fsynced and renamed into
	/// place.
	pub async fn set<T: Serialize>(
		&self,
		key: &str,
		value: &T,
		ttl: Duration,
	) -> Result<(), CacheError> {
		if !self.config.enabled {
			return Ok(());
		}
		let (dir, key_hash) = self.dir_for_key(key).await?;
		let path = dir.join(format!("{key_hash}.json"));
		let fetched_at = Utc::now();
		let delta = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
		let expires_at = fetched_at
			.checked_add_signed(delta)
			.unwrap_or(DateTime::<Utc>::MAX_UTC);
		let entry = Entry {
			key: key.to_string(),
			value: serde_json::to_value(value)?,
			fetched_at,
			expires_at,
		};
		let payload = serde_json::to_vec_pretty(&entry)?;
		write_atomic(&dir, &path, &payload).await?;
		self.event("refresh", key, &key_hash, None);
		Ok(())
	}

	/// Best-effort unlink of the entry for `key`. Never fails upward.
	pub async fn delete(&self, key: &str) {
		if !self.config.enabled {
			return;
		}
		let Ok((dir, key_hash)) = self.dir_for_key(key).await else {
			return;
		};
		let path = dir.join(format!("{key_hash}.json"));
		if fs::remove_file(&path).await.is_ok() {
			self.event("invalidate", key, &key_hash, None);
		}
	}

	/// Kind subdirectory for `key`, created with owner-only permissions,
	/// plus the hashed file stem.
	pub(crate) async fn dir_for_key(&self, key: &str) -> Result<(PathBuf, String), CacheError> {
		let kind = kind_for_key(key);
		let dir = self.config.dir.join(kind);
		fs::create_dir_all(&dir).await?;
		#[cfg(unix)]
		{
			use std::fs::Permissions;
			use std::os::unix::fs::PermissionsExt;

			fs::set_permissions(&self.config.dir, Permissions::from_mode(0o700)).await?;
			fs::set_permissions(&dir, Permissions::from_mode(0o700)).await?;
		}
		Ok((dir, key_hash(key)))
	}

	/// Cache events carry the plaintext key to the file sink and only the
	/// hashed key to stderr.
	pub(crate) fn event(&self, event: &str, key: &str, key_hash: &str, details: Option<&str>) {
		let suffix = details.map(|d| format!(" details={d}")).unwrap_or_default();
		self.gate.filef(&format!("cache {event} key={key}{suffix}"));
		self.gate.stderrf(&format!("cache {event} key={key_hash}{suffix}"));
	}
}

/// Kind prefix of a key: the part before the first `:`, or `misc` when
/// there is none.
fn kind_for_key(key: &str) -> &str {
	match key.split_once(':') {
		Some((kind, _)) if !kind.is_empty() => kind,
		_ => "misc",
	}
}

/// Hashed file stem for a key: hex of the first 12 bytes of its SHA-256.
fn key_hash(key: &str) -> String {
	let digest = Sha256::digest(key.as_bytes());
	hex::encode(&digest[..12])
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

async fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> Result<(), CacheError> {
	let tmp_path = dir.join(format!(
		"tmp-{}-{}",
		std::process::id(),
		TMP_SEQ.fetch_add(1, Ordering::Relaxed)
	));
	let mut options = fs::OpenOptions::new();
	options.write(true).create_new(true);
	#[cfg(unix)]
	options.mode(0o600);
	let mut file = options.open(&tmp_path).await?;
	let written = async {
		file.write_all(data).await?;
		file.sync_all().await
	}
	.await;
	drop(file);
	if let Err(err) = written {
		let _ = fs::remove_file(&tmp_path).await;
		return Err(err.into());
	}
	if let Err(err) = fs::rename(&tmp_path, path).await {
		let _ = fs::remove_file(&tmp_path).await;
		return Err(err.into());
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_store(dir: &Path) -> CacheStore {
		CacheStore::new(
			CacheConfig {
				enabled: true,
				dir: dir.to_path_buf(),
				..CacheConfig::default()
			},
			Arc::new(LogGate::disabled()),
		)
	}

	#[tokio::test]
	async fn test_set_then_get_within_ttl() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		store
			.set("token:a", &"ghs_value".to_string(), Duration::from_secs(60))
			.await
			.unwrap();
		let hit: Option<String> = store.get("token:a").await.unwrap();
		assert_eq!(hit.as_deref(), Some("ghs_value"));
	}

	#[tokio::test]
	async fn test_get_after_ttl_is_a_miss() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		store
			.set("token:a", &"ghs_value".to_string(), Duration::from_millis(20))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(60)).await;
		let hit: Option<String> = store.get("token:a").await.unwrap();
		assert_eq!(hit, None);
	}

	#[tokio::test]
	async fn test_absent_key_is_a_miss() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		let hit: Option<String> = store.get("token:never-set").await.unwrap();
		assert_eq!(hit, None);
	}

	#[tokio::test]
	async fn test_corrupt_entry_is_a_miss_not_an_error() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		let (dir, hash) = store.dir_for_key("token:a").await.unwrap();
		std::fs::write(dir.join(format!("{hash}.json")), b"\x00not json at all").unwrap();

		let hit: Option<String> = store.get("token:a").await.unwrap();
		assert_eq!(hit, None);
	}

	#[tokio::test]
	async fn test_key_mismatch_is_a_miss() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		let (dir, hash) = store.dir_for_key("token:a").await.unwrap();
		let entry = serde_json::json!({
			"key": "token:something-else",
			"value": "ghs_value",
			"fetched_at": Utc::now(),
			"expires_at": Utc::now() + chrono::Duration::hours(1),
		});
		std::fs::write(
			dir.join(format!("{hash}.json")),
			serde_json::to_vec(&entry).unwrap(),
		)
		.unwrap();

		let hit: Option<String> = store.get("token:a").await.unwrap();
		assert_eq!(hit, None);
	}

	#[tokio::test]
	async fn test_entry_without_key_field_is_served() {
		// Entries written before the key field existed are still valid.
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		let (dir, hash) = store.dir_for_key("token:a").await.unwrap();
		let entry = serde_json::json!({
			"value": "ghs_value",
			"fetched_at": Utc::now(),
			"expires_at": Utc::now() + chrono::Duration::hours(1),
		});
		std::fs::write(
			dir.join(format!("{hash}.json")),
			serde_json::to_vec(&entry).unwrap(),
		)
		.unwrap();

		let hit: Option<String> = store.get("token:a").await.unwrap();
		assert_eq!(hit.as_deref(), Some("ghs_value"));
	}

	#[tokio::test]
	async fn test_wrong_value_shape_is_a_miss() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		store
			.set("owner_map:x", &42u64, Duration::from_secs(60))
			.await
			.unwrap();
		let hit: Option<Vec<String>> = store.get("owner_map:x").await.unwrap();
		assert_eq!(hit, None);
	}

	#[tokio::test]
	async fn test_disabled_store_never_hits() {
		let store = CacheStore::disabled();
		store
			.set("token:a", &"ghs_value".to_string(), Duration::from_secs(60))
			.await
			.unwrap();
		let hit: Option<String> = store.get("token:a").await.unwrap();
		assert_eq!(hit, None);
	}

	#[tokio::test]
	async fn test_delete_then_get_is_a_miss() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		store
			.set("token:a", &"ghs_value".to_string(), Duration::from_secs(60))
			.await
			.unwrap();
		store.delete("token:a").await;
		let hit: Option<String> = store.get("token:a").await.unwrap();
		assert_eq!(hit, None);
	}

	#[tokio::test]
	async fn test_delete_of_absent_key_is_silent() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());
		store.delete("token:never-set").await;
	}

	#[tokio::test]
	async fn test_set_overwrites() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		store
			.set("token:a", &"old".to_string(), Duration::from_secs(60))
			.await
			.unwrap();
		store
			.set("token:a", &"new".to_string(), Duration::from_secs(60))
			.await
			.unwrap();
		let hit: Option<String> = store.get("token:a").await.unwrap();
		assert_eq!(hit.as_deref(), Some("new"));
	}

	#[tokio::test]
	async fn test_entries_are_grouped_by_kind() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		store
			.set("installations:app=1", &Vec::<u64>::new(), Duration::from_secs(60))
			.await
			.unwrap();
		store
			.set("no-colon-key", &1u64, Duration::from_secs(60))
			.await
			.unwrap();

		assert!(temp_dir.path().join("installations").is_dir());
		assert!(temp_dir.path().join("misc").is_dir());
	}

	#[tokio::test]
	async fn test_no_temp_files_remain_after_set() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = test_store(temp_dir.path());

		for i in 0..10u32 {
			store
				.set("token:a", &format!("value-{i}"), Duration::from_secs(60))
				.await
				.unwrap();
		}

		let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("token"))
			.unwrap()
			.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
			.filter(|name| name.starts_with("tmp-"))
			.collect();
		assert!(leftovers.is_empty(), "leftover temp files: {leftovers:?}");
	}

	#[tokio::test]
	#[cfg(unix)]
	async fn test_entry_files_and_dirs_are_owner_only() {
		use std::os::unix::fs::PermissionsExt;

		let temp_dir = tempfile::tempdir().unwrap();
		let root = temp_dir.path().join("cache");
		let store = test_store(&root);

		store
			.set("token:a", &"ghs_value".to_string(), Duration::from_secs(60))
			.await
			.unwrap();

		let (dir, hash) = store.dir_for_key("token:a").await.unwrap();
		let dir_mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
		let file_mode = std::fs::metadata(dir.join(format!("{hash}.json")))
			.unwrap()
			.permissions()
			.mode() & 0o777;
		assert_eq!(dir_mode, 0o700);
		assert_eq!(file_mode, 0o600);
	}

	#[tokio::test]
	async fn test_events_reach_the_file_sink_with_the_plaintext_key() {
		let temp_dir = tempfile::tempdir().unwrap();
		let log_path = temp_dir.path().join("trampoline.log");
		let gate = LogGate::new(&trampoline_logger::LogConfig {
			file: Some(log_path.clone()),
			verbose: false,
			tee_stderr: false,
		})
		.unwrap();
		let store = CacheStore::new(
			CacheConfig {
				enabled: true,
				dir: temp_dir.path().join("cache"),
				..CacheConfig::default()
			},
			Arc::new(gate),
		);

		let hit: Option<String> = store.get("token:app=1 api=x").await.unwrap();
		assert_eq!(hit, None);

		let log = std::fs::read_to_string(&log_path).unwrap();
		assert!(log.contains("cache miss key=token:app=1 api=x details=not_found"));
	}

	#[test]
	fn test_kind_for_key() {
		assert_eq!(kind_for_key("installations:app=1"), "installations");
		assert_eq!(kind_for_key("owner_map:app=1"), "owner_map");
		assert_eq!(kind_for_key("token:app=1"), "token");
		assert_eq!(kind_for_key("no-colon"), "misc");
		assert_eq!(kind_for_key(":leading-colon"), "misc");
	}

	#[test]
	fn test_key_hash_is_24_hex_chars() {
		let hash = key_hash("token:app=1");
		assert_eq!(hash.len(), 24);
		assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
		assert_eq!(hash, key_hash("token:app=1"));
		assert_ne!(hash, key_hash("token:app=2"));
	}
}
