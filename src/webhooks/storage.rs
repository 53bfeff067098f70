use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::key::{HookKey, KeyParseError, MapKey, RepositoryInfo};
use super::models::WebHookInfo;
use crate::github::Webhook;

/// Version of the on-disk format. Files with any other version are ignored.
pub const STORAGE_VERSION: u64 = 1;

/// Location of the hooks file relative to the data directory
pub const STORAGE_FILE: &str = "commit-hooks/webhooks.json";

/// Result of reading the hooks file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file yet (first run)
    NoData,
    /// File written by another format version, left untouched
    StaleFormat { found: Option<u64> },
    Loaded { hooks: usize },
}

/// Modification time and size of the hooks file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(meta: &std::fs::Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredHooks {
    version: u64,
    hooks: Vec<WebHookInfo>,
}

/// WebHooksStorage - registry of GitHub webhooks created by the server
///
/// Hooks are grouped by repository ([`MapKey`], case-insensitive). The table is
/// guarded by a single RwLock; file reads and writes are serialized by a
/// separate mutex which is always taken before the table lock.
pub struct WebHooksStorage {
    path: PathBuf,
    hooks: RwLock<HashMap<MapKey, Vec<WebHookInfo>>>,
    // Stamp of the file as last written or read by this storage
    io: Mutex<Option<FileStamp>>,
}

impl WebHooksStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hooks: RwLock::new(HashMap::new()),
            io: Mutex::new(None),
        }
    }

    /// Storage backed by `<data_dir>/commit-hooks/webhooks.json`
    pub fn in_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(STORAGE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the stored record for `created`, registering it first if needed.
    ///
    /// New records start in `WaitingForServerResponse`.
    pub async fn get_or_add(&self, created: &Webhook) -> Result<WebHookInfo, KeyParseError> {
        let key = HookKey::from_hook_url(&created.url)?;
        let map_key = key.to_map_key();

        if let Some(existing) = self.find_same(&map_key, created).await {
            return Ok(existing);
        }

        let mut hooks = self.hooks.write().await;
        let list = hooks.entry(map_key).or_default();

        // Another caller may have added it since the read above
        if let Some(existing) = list.iter().find(|h| h.is_same(created)) {
            return Ok(existing.clone());
        }

        let info = WebHookInfo::created(key, created);
        debug!("Registered webhook {} -> {}", info.key, info.callback_url);
        list.push(info.clone());

        Ok(info)
    }

    async fn find_same(&self, map_key: &MapKey, created: &Webhook) -> Option<WebHookInfo> {
        let hooks = self.hooks.read().await;
        hooks
            .get(map_key)
            .and_then(|list| list.iter().find(|h| h.is_same(created)))
            .cloned()
    }

    /// Remove the record with the same key as `info`.
    ///
    /// Returns false if no such record was stored.
    pub async fn delete(&self, info: &WebHookInfo) -> bool {
        let map_key = info.key.to_map_key();
        let mut hooks = self.hooks.write().await;

        let Some(list) = hooks.get_mut(&map_key) else {
            return false;
        };

        let before = list.len();
        list.retain(|h| !h.is_same_hook(info));
        let removed = list.len() != before;

        if list.is_empty() {
            hooks.remove(&map_key);
        }

        removed
    }

    /// Remove every hook of `repository` matching `predicate`, returning how many were removed
    pub async fn delete_where<F>(&self, repository: &RepositoryInfo, predicate: F) -> usize
    where
        F: Fn(&WebHookInfo) -> bool,
    {
        let map_key = repository.to_map_key();

        {
            let hooks = self.hooks.read().await;
            match hooks.get(&map_key) {
                Some(list) if list.iter().any(|h| predicate(h)) => {}
                _ => return 0,
            }
        }

        let mut hooks = self.hooks.write().await;
        let Some(list) = hooks.get_mut(&map_key) else {
            return 0;
        };

        let before = list.len();
        list.retain(|h| !predicate(h));
        let removed = before - list.len();

        if list.is_empty() {
            hooks.remove(&map_key);
        }

        removed
    }

    /// Apply `mutator` to every hook of `repository`.
    ///
    /// Returns false if the repository has no hooks.
    pub async fn update<F>(&self, repository: &RepositoryInfo, mut mutator: F) -> bool
    where
        F: FnMut(&mut WebHookInfo),
    {
        let mut hooks = self.hooks.write().await;
        match hooks.get_mut(&repository.to_map_key()) {
            Some(list) => {
                list.iter_mut().for_each(|h| mutator(h));
                true
            }
            None => false,
        }
    }

    pub async fn get_hooks(&self, repository: &RepositoryInfo) -> Vec<WebHookInfo> {
        let hooks = self.hooks.read().await;
        hooks.get(&repository.to_map_key()).cloned().unwrap_or_default()
    }

    pub async fn get_all(&self) -> Vec<(RepositoryInfo, WebHookInfo)> {
        let hooks = self.hooks.read().await;
        hooks
            .iter()
            .flat_map(|(key, list)| {
                let info = key.to_info();
                list.iter().map(move |h| (info.clone(), h.clone()))
            })
            .collect()
    }

    /// Hooks whose status is one of the unhealthy ones
    pub async fn get_incorrect_hooks(&self) -> Vec<(RepositoryInfo, WebHookInfo)> {
        self.get_all()
            .await
            .into_iter()
            .filter(|(_, h)| h.status.is_bad())
            .collect()
    }

    /// Total number of stored hooks
    pub async fn len(&self) -> usize {
        let hooks = self.hooks.read().await;
        hooks.values().map(|v| v.len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.hooks.read().await.is_empty()
    }

    /// Write every stored hook to disk
    pub async fn persist(&self) -> Result<()> {
        let mut stamp = self.io.lock().await;

        let hooks = self.snapshot_for_save().await;
        let count = hooks.len();
        let stored = StoredHooks {
            version: STORAGE_VERSION,
            hooks,
        };
        let content = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        match write_then_rename(&tmp, &self.path, &content).await {
            Ok(written) => *stamp = Some(written),
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
        }
        info!("Persisted {} webhook(s) to {}", count, self.path.display());

        Ok(())
    }

    /// Deduplicated records sorted by serialized key
    async fn snapshot_for_save(&self) -> Vec<WebHookInfo> {
        let all: Vec<WebHookInfo> = {
            let hooks = self.hooks.read().await;
            hooks.values().flatten().cloned().collect()
        };

        let mut seen = HashSet::new();
        let mut unique: Vec<WebHookInfo> = all.into_iter().filter(|h| seen.insert(h.clone())).collect();
        unique.sort_by_cached_key(|h| h.key.to_string());
        unique
    }

    /// Replace the in-memory table with the file contents.
    ///
    /// On any error the table is left as it was.
    pub async fn load(&self) -> Result<LoadOutcome> {
        let mut stamp = self.io.lock().await;
        self.load_locked(&mut stamp).await
    }

    /// Reload if the file was changed by someone other than this storage.
    ///
    /// Returns None when the file is unchanged or missing.
    pub async fn reload_if_changed(&self) -> Result<Option<LoadOutcome>> {
        let mut stamp = self.io.lock().await;

        let Some(current) = file_stamp(&self.path).await? else {
            return Ok(None);
        };
        if *stamp == Some(current) {
            return Ok(None);
        }

        info!("Webhooks file {} changed on disk, reloading", self.path.display());
        self.load_locked(&mut stamp).await.map(Some)
    }

    async fn load_locked(&self, stamp: &mut Option<FileStamp>) -> Result<LoadOutcome> {
        let observed = file_stamp(&self.path).await?;

        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No webhooks file at {}, starting empty", self.path.display());
                *stamp = None;
                return Ok(LoadOutcome::NoData);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        // Don't retry the same broken file on every watcher tick
        *stamp = observed;

        let doc: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        let version = doc.get("version").and_then(Value::as_u64);
        if version != Some(STORAGE_VERSION) {
            warn!(
                "Ignoring webhooks file {}: version {:?}, expected {}",
                self.path.display(),
                version,
                STORAGE_VERSION
            );
            return Ok(LoadOutcome::StaleFormat { found: version });
        }

        let stored: StoredHooks = serde_json::from_value(doc)
            .with_context(|| format!("Failed to parse hooks in {}", self.path.display()))?;

        let mut table: HashMap<MapKey, Vec<WebHookInfo>> = HashMap::new();
        let mut count = 0;
        for hook in stored.hooks {
            let list = table.entry(hook.key.to_map_key()).or_default();
            if list.iter().any(|h| h.is_same_hook(&hook)) {
                warn!("Skipping duplicate webhook {} in {}", hook.key, self.path.display());
                continue;
            }
            list.push(hook);
            count += 1;
        }

        {
            let mut hooks = self.hooks.write().await;
            *hooks = table;
        }

        info!("Loaded {} webhook(s) from {}", count, self.path.display());
        Ok(LoadOutcome::Loaded { hooks: count })
    }
}

/// Returns the stamp of the written file, taken before it replaces `target`
async fn write_then_rename(tmp: &Path, target: &Path, content: &str) -> Result<FileStamp> {
    let mut file = fs::File::create(tmp)
        .await
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(content.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("Failed to sync {}", tmp.display()))?;

    // Rename keeps mtime and size
    let written = FileStamp::of(&file.metadata().await?);
    drop(file);

    fs::rename(tmp, target)
        .await
        .with_context(|| format!("Failed to replace {}", target.display()))?;
    Ok(written)
}

async fn file_stamp(path: &Path) -> Result<Option<FileStamp>> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(FileStamp::of(&meta))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::WebhookConfig;
    use crate::webhooks::models::HookStatus;
    use std::sync::Arc;

    fn webhook(owner: &str, repo: &str, id: i64) -> Webhook {
        Webhook {
            id,
            url: format!("https://api.github.com/repos/{}/{}/hooks/{}", owner, repo, id),
            name: "web".to_string(),
            active: true,
            events: vec!["push".to_string()],
            config: WebhookConfig {
                url: format!("https://ci.example.com/app/hooks/github/key{}", id),
                content_type: Some("json".to_string()),
                insecure_ssl: None,
            },
            last_response: None,
        }
    }

    fn repo(owner: &str, name: &str) -> RepositoryInfo {
        RepositoryInfo::new("github.com", owner, name)
    }

    fn temp_storage() -> (tempfile::TempDir, WebHooksStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = WebHooksStorage::in_data_dir(dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_add_same_and_distinct_hooks() {
        let (_dir, storage) = temp_storage();

        let first = storage.get_or_add(&webhook("myowner", "myrepo", 123)).await.unwrap();
        assert_eq!(storage.get_all().await.len(), 1);
        assert_eq!(first.status, HookStatus::WaitingForServerResponse);

        storage.get_or_add(&webhook("myowner", "myrepo", 345)).await.unwrap();
        assert_eq!(storage.get_all().await.len(), 2);

        let again = storage.get_or_add(&webhook("myowner", "myrepo", 123)).await.unwrap();
        assert_eq!(storage.get_all().await.len(), 2);
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn test_get_or_add_groups_case_insensitively() {
        let (_dir, storage) = temp_storage();

        storage.get_or_add(&webhook("MyOwner", "MyRepo", 1)).await.unwrap();
        storage.get_or_add(&webhook("myowner", "myrepo", 1)).await.unwrap();

        assert_eq!(storage.len().await, 1);
        assert_eq!(storage.get_hooks(&repo("MYOWNER", "myrepo")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_add_rejects_malformed_url() {
        let (_dir, storage) = temp_storage();
        let mut hook = webhook("o", "r", 1);
        hook.url = "https://api.github.com/hooks/1".to_string();

        assert!(storage.get_or_add(&hook).await.is_err());
        assert!(storage.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_add_keeps_single_record() {
        let (_dir, storage) = temp_storage();
        let storage = Arc::new(storage);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let storage = storage.clone();
                tokio::spawn(async move { storage.get_or_add(&webhook("o", "r", 7)).await.unwrap() })
            })
            .collect();

        for handle in handles {
            let info = handle.await.unwrap();
            assert_eq!(info.key.id, 7);
        }
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_removes_empty_group() {
        let (_dir, storage) = temp_storage();
        let a = storage.get_or_add(&webhook("o", "r", 1)).await.unwrap();
        let b = storage.get_or_add(&webhook("o", "r", 2)).await.unwrap();

        assert!(storage.delete(&a).await);
        assert!(!storage.delete(&a).await);
        assert_eq!(storage.get_hooks(&repo("o", "r")).await, vec![b.clone()]);

        assert!(storage.delete(&b).await);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_where() {
        let (_dir, storage) = temp_storage();
        for id in 1..=3 {
            storage.get_or_add(&webhook("o", "r", id)).await.unwrap();
        }

        assert_eq!(storage.delete_where(&repo("o", "r"), |h| h.key.id == 42).await, 0);
        assert_eq!(storage.delete_where(&repo("o", "missing"), |_| true).await, 0);

        assert_eq!(storage.delete_where(&repo("o", "r"), |h| h.key.id != 2).await, 2);
        assert_eq!(storage.len().await, 1);

        assert_eq!(storage.delete_where(&repo("O", "R"), |_| true).await, 1);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_and_incorrect_hooks() {
        let (_dir, storage) = temp_storage();
        storage.get_or_add(&webhook("o", "r", 1)).await.unwrap();
        storage.get_or_add(&webhook("o", "other", 2)).await.unwrap();

        assert!(!storage.update(&repo("o", "missing"), |h| h.status = HookStatus::Ok).await);
        assert!(storage.get_incorrect_hooks().await.is_empty());

        assert!(
            storage
                .update(&repo("o", "r"), |h| {
                    h.status = HookStatus::Incorrect;
                    h.correct = false;
                })
                .await
        );

        let incorrect = storage.get_incorrect_hooks().await;
        assert_eq!(incorrect.len(), 1);
        assert_eq!(incorrect[0].0, repo("o", "r"));
        assert!(!incorrect[0].1.correct);
    }

    #[tokio::test]
    async fn test_persist_then_load_roundtrip() {
        let (dir, storage) = temp_storage();
        for (owner, name, id) in [("b", "two", 5), ("a", "one", 9), ("a", "one", 1), ("c", "three", 3)] {
            storage.get_or_add(&webhook(owner, name, id)).await.unwrap();
        }
        storage.update(&repo("a", "one"), |h| h.touch()).await;
        storage.persist().await.unwrap();

        let fresh = WebHooksStorage::in_data_dir(dir.path());
        assert_eq!(fresh.load().await.unwrap(), LoadOutcome::Loaded { hooks: 4 });

        let mut expected = storage.get_all().await;
        let mut actual = fresh.get_all().await;
        expected.sort_by_key(|(_, h)| h.key.to_string());
        actual.sort_by_key(|(_, h)| h.key.to_string());
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_persisted_file_is_versioned_and_sorted() {
        let (_dir, storage) = temp_storage();
        storage.get_or_add(&webhook("zeta", "r", 1)).await.unwrap();
        storage.get_or_add(&webhook("alpha", "r", 2)).await.unwrap();
        storage.persist().await.unwrap();

        let content = std::fs::read_to_string(storage.path()).unwrap();
        let doc: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(doc["version"], 1);
        assert_eq!(doc["hooks"][0]["key"], "github.com/alpha/r/2");
        assert_eq!(doc["hooks"][1]["key"], "github.com/zeta/r/1");
        assert!(!storage.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_file_untouched() {
        let (_dir, storage) = temp_storage();
        storage.get_or_add(&webhook("o", "r", 1)).await.unwrap();
        storage.persist().await.unwrap();
        let before = std::fs::read(storage.path()).unwrap();

        storage.get_or_add(&webhook("o", "r", 2)).await.unwrap();
        std::fs::create_dir(storage.path().with_extension("json.tmp")).unwrap();

        assert!(storage.persist().await.is_err());
        assert_eq!(std::fs::read(storage.path()).unwrap(), before);
        assert_eq!(storage.len().await, 2);
    }

    #[tokio::test]
    async fn test_persist_records_stamp_of_written_file() {
        let (_dir, storage) = temp_storage();
        storage.get_or_add(&webhook("o", "r", 1)).await.unwrap();
        storage.persist().await.unwrap();

        let on_disk = file_stamp(storage.path()).await.unwrap();
        assert!(on_disk.is_some());
        assert_eq!(*storage.io.lock().await, on_disk);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let (_dir, storage) = temp_storage();
        assert_eq!(storage.load().await.unwrap(), LoadOutcome::NoData);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_stale_version_keeps_table() {
        let (_dir, storage) = temp_storage();
        storage.get_or_add(&webhook("o", "r", 1)).await.unwrap();

        std::fs::create_dir_all(storage.path().parent().unwrap()).unwrap();
        std::fs::write(storage.path(), r#"{"version": 0, "hooks": [{"whatever": true}]}"#).unwrap();

        assert_eq!(storage.load().await.unwrap(), LoadOutcome::StaleFormat { found: Some(0) });
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_corrupt_file_keeps_table() {
        let (_dir, storage) = temp_storage();
        storage.get_or_add(&webhook("o", "r", 1)).await.unwrap();

        std::fs::create_dir_all(storage.path().parent().unwrap()).unwrap();
        std::fs::write(storage.path(), "{ not json").unwrap();

        assert!(storage.load().await.is_err());
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_reload_ignores_own_write_and_picks_up_external_one() {
        let (dir, storage) = temp_storage();
        storage.get_or_add(&webhook("o", "r", 1)).await.unwrap();
        storage.persist().await.unwrap();

        assert_eq!(storage.reload_if_changed().await.unwrap(), None);

        // Another node writes two hooks
        let other = WebHooksStorage::in_data_dir(dir.path());
        other.get_or_add(&webhook("o", "r", 1)).await.unwrap();
        other.get_or_add(&webhook("x", "y", 2)).await.unwrap();
        other.persist().await.unwrap();

        assert_eq!(
            storage.reload_if_changed().await.unwrap(),
            Some(LoadOutcome::Loaded { hooks: 2 })
        );
        assert_eq!(storage.len().await, 2);
        assert_eq!(storage.reload_if_changed().await.unwrap(), None);
    }
}
