use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use allbox_core::{DeviceId, DialogId, Language, Theme};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

pub const DEVICE_ID_KEY: &str = "allbox_device_id";
pub const DEVICE_NAME_KEY: &str = "allbox_device_name";
pub const THEME_KEY: &str = "allbox_theme";
pub const LANGUAGE_KEY: &str = "allbox_language";
pub const DIALOGS_KEY: &str = "allbox_dialogs";
pub const ARCHIVED_DIALOGS_KEY: &str = "allbox_archived_dialogs";
pub const PASSWORDS_KEY: &str = "allbox_passwords";

/// Defensive bound: every persisted record is tiny. This prevents
/// pathological reads if a record file is corrupted or replaced.
pub const MAX_RECORD_BYTES: u64 = 64 * 1024;

/// Key-value persistence port. The store depends only on this interface;
/// tests substitute an in-memory map.
pub trait KvStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.records.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.records.insert(key.to_owned(), value.to_owned());
    }

    fn remove(&mut self, key: &str) {
        self.records.remove(key);
    }
}

/// One file per record under a data directory. Reads are best-effort: a
/// missing, unreadable or oversized file reads as absent. Writes go through
/// a temp file and rename, retried with backoff; a write that still fails
/// is logged and dropped, keeping the store API infallible.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let _ = fs::create_dir_all(&dir);
        Self { dir }
    }

    pub fn default_dir() -> PathBuf {
        if let Some(override_dir) = std::env::var_os("ALLBOX_DATA_DIR") {
            return PathBuf::from(override_dir);
        }
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".allbox"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn read_record(path: &Path) -> io::Result<Option<String>> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        if meta.len() > MAX_RECORD_BYTES {
            warn!(
                "ignoring oversized record {} ({} bytes)",
                path.display(),
                meta.len()
            );
            return Ok(None);
        }
        fs::read_to_string(path).map(Some)
    }

    fn write_record(path: &Path, value: &str) -> io::Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value.as_bytes())?;
        if path.exists() {
            let _ = fs::remove_file(path);
        }
        fs::rename(&tmp, path)
    }
}

impl KvStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.record_path(key);
        match Self::read_record(&path) {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to read record {}: {}", path.display(), err);
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        const MAX_ATTEMPTS: u32 = 3;
        const BACKOFF_BASE_MS: u64 = 50;

        let path = self.record_path(key);
        for attempt in 1..=MAX_ATTEMPTS {
            match Self::write_record(&path, value) {
                Ok(()) => return,
                Err(err) => {
                    if attempt >= MAX_ATTEMPTS {
                        warn!("failed to write record {}: {}", path.display(), err);
                        return;
                    }
                    let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                }
            }
        }
    }

    fn remove(&mut self, key: &str) {
        let _ = fs::remove_file(self.record_path(key));
    }
}

/// One dialog this device has joined. `name` mirrors the remote display
/// name and may lag behind it until the next refresh or realtime event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDialog {
    pub dialog_id: DialogId,
    pub device_label: String,
    #[serde(default)]
    pub name: Option<String>,
    pub accessed_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Durable, synchronous, local-only bookkeeping of device identity and
/// dialog memberships. Never performs network I/O; reads never fail:
/// malformed or missing underlying data falls back to empty defaults.
///
/// A single process owns one storage scope. Concurrent writers sharing a
/// data directory race last-write-wins; that is a known limitation, not
/// something this store coordinates.
#[derive(Debug)]
pub struct DeviceStore<S: KvStorage> {
    storage: S,
}

impl DeviceStore<FileStorage> {
    pub fn open_default() -> Self {
        Self::new(FileStorage::new(FileStorage::default_dir()))
    }
}

impl<S: KvStorage> DeviceStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Existing device identifier, or a freshly generated one persisted on
    /// first call. Idempotent within one storage scope.
    pub fn device_id(&mut self) -> DeviceId {
        if let Some(id) = self.storage.get(DEVICE_ID_KEY)
            && !id.trim().is_empty()
        {
            return id;
        }
        let id = Uuid::new_v4().to_string();
        self.storage.set(DEVICE_ID_KEY, &id);
        id
    }

    pub fn device_name(&self) -> Option<String> {
        self.storage.get(DEVICE_NAME_KEY).filter(|n| !n.is_empty())
    }

    /// Persists the name as given; trimming and non-empty validation belong
    /// to the caller.
    pub fn set_device_name(&mut self, name: &str) {
        self.storage.set(DEVICE_NAME_KEY, name);
    }

    pub fn theme(&self) -> Theme {
        self.storage
            .get(THEME_KEY)
            .map(|value| Theme::parse(&value))
            .unwrap_or_default()
    }

    /// Only persists. Applying the visual side effect is the caller's job;
    /// that coupling stays at the boundary on purpose.
    pub fn set_theme(&mut self, theme: Theme) {
        self.storage.set(THEME_KEY, theme.as_str());
    }

    pub fn language(&self) -> Language {
        if let Some(stored) = self.storage.get(LANGUAGE_KEY)
            && let Some(language) = Language::parse(&stored)
        {
            return language;
        }
        Language::detect(&process_locale())
    }

    pub fn set_language(&mut self, language: Language) {
        self.storage.set(LANGUAGE_KEY, language.as_str());
    }

    /// Dialogs currently on the home list, in stored order. Display
    /// ordering is the caller's responsibility.
    pub fn active_dialogs(&self) -> Vec<StoredDialog> {
        self.read_dialogs(DIALOGS_KEY)
    }

    pub fn archived_dialogs(&self) -> Vec<StoredDialog> {
        self.read_dialogs(ARCHIVED_DIALOGS_KEY)
    }

    /// Insert-or-merge a membership record. Omitted `name` and
    /// `last_activity_at` preserve the stored values; `accessed_at` always
    /// refreshes. Joining a dialog that sits in the archive reactivates it.
    pub fn upsert_dialog(
        &mut self,
        dialog_id: &str,
        device_label: &str,
        name: Option<&str>,
        last_activity_at: Option<DateTime<Utc>>,
    ) -> StoredDialog {
        self.take_archived(dialog_id);

        let now = Utc::now();
        let mut dialogs = self.read_dialogs(DIALOGS_KEY);
        let record = match dialogs.iter_mut().find(|d| d.dialog_id == dialog_id) {
            Some(existing) => {
                existing.device_label = device_label.to_owned();
                if let Some(name) = name {
                    existing.name = Some(name.to_owned());
                }
                if let Some(activity) = last_activity_at {
                    existing.last_activity_at = activity;
                }
                existing.accessed_at = now;
                existing.clone()
            }
            None => {
                let record = StoredDialog {
                    dialog_id: dialog_id.to_owned(),
                    device_label: device_label.to_owned(),
                    name: name.map(str::to_owned),
                    accessed_at: now,
                    last_activity_at: last_activity_at.unwrap_or(now),
                };
                dialogs.push(record.clone());
                record
            }
        };
        self.write_dialogs(DIALOGS_KEY, &dialogs);
        record
    }

    pub fn has_access(&self, dialog_id: &str) -> bool {
        self.active_dialogs()
            .iter()
            .any(|d| d.dialog_id == dialog_id)
    }

    pub fn device_label_for(&self, dialog_id: &str) -> Option<String> {
        self.active_dialogs()
            .iter()
            .find(|d| d.dialog_id == dialog_id)
            .map(|d| d.device_label.clone())
    }

    pub fn dialog_name(&self, dialog_id: &str) -> Option<String> {
        self.active_dialogs()
            .iter()
            .find(|d| d.dialog_id == dialog_id)
            .and_then(|d| d.name.clone())
    }

    /// Update the cached display name of an active dialog. Archived dialogs
    /// are not touched by this path.
    pub fn update_dialog_name(&mut self, dialog_id: &str, name: &str) {
        let mut dialogs = self.read_dialogs(DIALOGS_KEY);
        if let Some(dialog) = dialogs.iter_mut().find(|d| d.dialog_id == dialog_id) {
            dialog.name = Some(name.to_owned());
            self.write_dialogs(DIALOGS_KEY, &dialogs);
        }
    }

    pub fn update_dialog_activity(&mut self, dialog_id: &str, at: DateTime<Utc>) {
        let mut dialogs = self.read_dialogs(DIALOGS_KEY);
        if let Some(dialog) = dialogs.iter_mut().find(|d| d.dialog_id == dialog_id) {
            dialog.last_activity_at = at;
            self.write_dialogs(DIALOGS_KEY, &dialogs);
        }
    }

    /// Move a dialog from the home list to the archive. No-op when the
    /// dialog is not an active member.
    pub fn archive_dialog(&mut self, dialog_id: &str) {
        let mut dialogs = self.read_dialogs(DIALOGS_KEY);
        let Some(index) = dialogs.iter().position(|d| d.dialog_id == dialog_id) else {
            return;
        };
        let record = dialogs.remove(index);

        let mut archived = self.read_dialogs(ARCHIVED_DIALOGS_KEY);
        archived.retain(|d| d.dialog_id != dialog_id);
        archived.push(record);

        self.write_dialogs(DIALOGS_KEY, &dialogs);
        self.write_dialogs(ARCHIVED_DIALOGS_KEY, &archived);
    }

    /// Move an archived dialog back to the home list, re-running the upsert
    /// merge. Returns the restored record, or `None` if the dialog is not
    /// archived.
    pub fn restore_dialog(&mut self, dialog_id: &str) -> Option<StoredDialog> {
        let record = self.take_archived(dialog_id)?;
        Some(self.upsert_dialog(
            dialog_id,
            &record.device_label,
            record.name.as_deref(),
            Some(record.last_activity_at),
        ))
    }

    /// Permanently delete an archived entry. Irreversible.
    pub fn remove_from_archive(&mut self, dialog_id: &str) {
        let mut archived = self.read_dialogs(ARCHIVED_DIALOGS_KEY);
        let before = archived.len();
        archived.retain(|d| d.dialog_id != dialog_id);
        if archived.len() != before {
            self.write_dialogs(ARCHIVED_DIALOGS_KEY, &archived);
        }
    }

    /// Permanently delete an active entry without archiving it first (the
    /// "leave completely" path).
    pub fn remove_active_dialog(&mut self, dialog_id: &str) {
        let mut dialogs = self.read_dialogs(DIALOGS_KEY);
        let before = dialogs.len();
        dialogs.retain(|d| d.dialog_id != dialog_id);
        if dialogs.len() != before {
            self.write_dialogs(DIALOGS_KEY, &dialogs);
        }
    }

    /// Best-effort plaintext cache so the device can re-download a password
    /// reminder later without contacting the backend.
    pub fn cache_password(&mut self, dialog_id: &str, password: &str) {
        let mut passwords = self.read_passwords();
        passwords.insert(dialog_id.to_owned(), password.to_owned());
        match serde_json::to_string(&passwords) {
            Ok(payload) => self.storage.set(PASSWORDS_KEY, &payload),
            Err(err) => warn!("failed to serialize password cache: {}", err),
        }
    }

    pub fn cached_password(&self, dialog_id: &str) -> Option<String> {
        self.read_passwords().get(dialog_id).cloned()
    }

    fn take_archived(&mut self, dialog_id: &str) -> Option<StoredDialog> {
        let mut archived = self.read_dialogs(ARCHIVED_DIALOGS_KEY);
        let index = archived.iter().position(|d| d.dialog_id == dialog_id)?;
        let record = archived.remove(index);
        self.write_dialogs(ARCHIVED_DIALOGS_KEY, &archived);
        Some(record)
    }

    fn read_dialogs(&self, key: &str) -> Vec<StoredDialog> {
        self.storage
            .get(key)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn write_dialogs(&mut self, key: &str, dialogs: &[StoredDialog]) {
        match serde_json::to_string(dialogs) {
            Ok(payload) => self.storage.set(key, &payload),
            Err(err) => warn!("failed to serialize {}: {}", key, err),
        }
    }

    fn read_passwords(&self) -> HashMap<String, String> {
        self.storage
            .get(PASSWORDS_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }
}

fn process_locale() -> String {
    for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
        if let Ok(value) = std::env::var(var)
            && !value.trim().is_empty()
        {
            return value;
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DeviceStore<MemoryStorage> {
        DeviceStore::new(MemoryStorage::new())
    }

    #[test]
    fn device_id_is_generated_once() {
        let mut store = store();
        let first = store.device_id();
        let second = store.device_id();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn merge_preserves_unset_name() {
        let mut store = store();
        store.upsert_dialog("d1", "Device 1", Some("Swift Send"), None);
        store.upsert_dialog("d1", "Device 1", None, None);

        let dialogs = store.active_dialogs();
        assert_eq!(dialogs.len(), 1);
        assert_eq!(dialogs[0].name.as_deref(), Some("Swift Send"));
    }

    #[test]
    fn merge_preserves_unset_activity() {
        let mut store = store();
        let activity = Utc::now() - chrono::Duration::hours(2);
        store.upsert_dialog("d1", "Device 1", None, Some(activity));
        store.upsert_dialog("d1", "Device 2", None, None);

        let dialogs = store.active_dialogs();
        assert_eq!(dialogs[0].last_activity_at, activity);
        assert_eq!(dialogs[0].device_label, "Device 2");
    }

    #[test]
    fn upsert_reactivates_archived_dialog() {
        let mut store = store();
        store.upsert_dialog("d1", "Device 1", Some("Swift Send"), None);
        store.archive_dialog("d1");
        assert!(!store.has_access("d1"));

        store.upsert_dialog("d1", "Device 1", None, None);
        assert!(store.has_access("d1"));
        assert!(store.archived_dialogs().is_empty());
    }

    #[test]
    fn archive_is_noop_for_unknown_dialog() {
        let mut store = store();
        store.upsert_dialog("d1", "Device 1", None, None);
        store.archive_dialog("missing");

        assert_eq!(store.active_dialogs().len(), 1);
        assert!(store.archived_dialogs().is_empty());
    }

    #[test]
    fn restore_preserves_cached_fields() {
        let mut store = store();
        store.upsert_dialog("d1", "Device 3", Some("Trust Zone"), None);
        store.archive_dialog("d1");

        let restored = store.restore_dialog("d1").expect("dialog restored");
        assert_eq!(restored.device_label, "Device 3");
        assert_eq!(restored.name.as_deref(), Some("Trust Zone"));
        assert!(store.has_access("d1"));
        assert!(store.archived_dialogs().is_empty());
    }

    #[test]
    fn restore_returns_none_when_not_archived() {
        let mut store = store();
        assert!(store.restore_dialog("d1").is_none());
    }

    #[test]
    fn update_name_skips_archived_dialogs() {
        let mut store = store();
        store.upsert_dialog("d1", "Device 1", Some("Old Name"), None);
        store.archive_dialog("d1");
        store.update_dialog_name("d1", "New Name");

        let archived = store.archived_dialogs();
        assert_eq!(archived[0].name.as_deref(), Some("Old Name"));
    }

    #[test]
    fn lookups_return_none_when_absent() {
        let store = store();
        assert!(!store.has_access("d1"));
        assert!(store.device_label_for("d1").is_none());
        assert!(store.dialog_name("d1").is_none());
        assert!(store.cached_password("d1").is_none());
    }

    #[test]
    fn password_cache_roundtrip() {
        let mut store = store();
        store.cache_password("d1", "4721");
        assert_eq!(store.cached_password("d1").as_deref(), Some("4721"));
        assert!(store.cached_password("d2").is_none());
    }

    #[test]
    fn preference_roundtrips() {
        let mut store = store();
        store.set_device_name("Alice");
        assert_eq!(store.device_name().as_deref(), Some("Alice"));

        store.set_theme(Theme::Light);
        assert_eq!(store.theme(), Theme::Light);

        store.set_language(Language::Ru);
        assert_eq!(store.language(), Language::Ru);
    }

    #[test]
    fn theme_defaults_to_dark() {
        assert_eq!(store().theme(), Theme::Dark);
    }

    #[test]
    fn malformed_collections_read_as_empty() {
        let mut storage = MemoryStorage::new();
        storage.set(DIALOGS_KEY, "{not json");
        storage.set(ARCHIVED_DIALOGS_KEY, "42");
        storage.set(PASSWORDS_KEY, "[]");

        let store = DeviceStore::new(storage);
        assert!(store.active_dialogs().is_empty());
        assert!(store.archived_dialogs().is_empty());
        assert!(store.cached_password("d1").is_none());
    }

    #[test]
    fn remove_active_bypasses_archive() {
        let mut store = store();
        store.upsert_dialog("d1", "Device 1", None, None);
        store.remove_active_dialog("d1");

        assert!(store.active_dialogs().is_empty());
        assert!(store.archived_dialogs().is_empty());
    }
}
