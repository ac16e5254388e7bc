use std::path::Path;

use allbox_core::{
    CoreError, DialogId, Language, MAX_DIALOG_NAME_LEN, MAX_FILE_BYTES, generate_password,
    hash_password, random_dialog_name, reminder_file_contents, reminder_file_name,
    validate_password_format,
};
use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::remote::{ApiError, FileRow, MessageKind, MessageRow, RemoteClient, object_path};
use crate::store::{DeviceStore, KvStorage, StoredDialog};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no access to dialog {0}")]
    AccessDenied(DialogId),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file has no usable name: {0}")]
    InvalidFileName(String),
}

#[derive(Debug, Clone)]
pub struct CreatedDialog {
    pub dialog_id: DialogId,
    pub name: String,
    /// Shown to the user exactly once; afterwards only the local password
    /// cache can reproduce it.
    pub password: String,
    pub device_label: String,
}

#[derive(Debug, Clone)]
pub struct EnteredDialog {
    pub dialog_id: DialogId,
    pub name: String,
    pub device_label: String,
}

#[derive(Debug)]
pub struct DialogOverview {
    pub dialog_id: DialogId,
    pub name: Option<String>,
    pub device_label: Option<String>,
    pub device_count: usize,
    pub files: Vec<FileRow>,
    pub messages: Vec<MessageRow>,
}

/// Ties the local device store to the remote collaborators and implements
/// the user-visible flows. Local writes are optimistic; the remote database
/// stays the source of truth and is folded back in on open and via the
/// realtime feed.
pub struct Session<S: KvStorage> {
    store: DeviceStore<S>,
    remote: RemoteClient,
}

impl<S: KvStorage> Session<S> {
    pub fn new(store: DeviceStore<S>, remote: RemoteClient) -> Self {
        Self { store, remote }
    }

    pub fn store(&self) -> &DeviceStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DeviceStore<S> {
        &mut self.store
    }

    pub fn language(&self) -> Language {
        self.store.language()
    }

    /// Create a new dialog: random password and name, remote insert, first
    /// device label, local membership, password cached for the reminder.
    pub async fn create_dialog(
        &mut self,
        password_digits: usize,
    ) -> Result<CreatedDialog, SessionError> {
        let password = generate_password(password_digits)?;
        let password_hash = hash_password(&password);
        let name = random_dialog_name(self.store.language());

        let dialog = self.remote.create_dialog(name, &password_hash).await?;
        let device_id = self.store.device_id();

        let device_count = self.remote.count_devices(&dialog.id).await?;
        let device_label = numbered_device_label(device_count);
        self.remote
            .register_device(&dialog.id, &device_id, &device_label)
            .await?;

        self.store
            .upsert_dialog(&dialog.id, &device_label, Some(name), dialog.last_activity_at);
        self.store.cache_password(&dialog.id, &password);

        info!("created dialog {} as {}", dialog.id, device_label);
        Ok(CreatedDialog {
            dialog_id: dialog.id,
            name: name.to_owned(),
            password,
            device_label,
        })
    }

    /// Join a dialog by password. A password that matches nothing is
    /// `Ok(None)`, not an error; the backend does not distinguish "wrong
    /// password" from "no such dialog".
    pub async fn enter_dialog(
        &mut self,
        password: &str,
    ) -> Result<Option<EnteredDialog>, SessionError> {
        if validate_password_format(password).is_err() {
            return Ok(None);
        }

        let password_hash = hash_password(password.trim());
        let Some(dialog) = self
            .remote
            .find_dialog_by_password_hash(&password_hash)
            .await?
        else {
            return Ok(None);
        };

        let device_id = self.store.device_id();
        let device_label = match self.remote.find_membership(&dialog.id, &device_id).await? {
            Some(membership) => membership.device_label,
            None => {
                let device_count = self.remote.count_devices(&dialog.id).await?;
                let label = numbered_device_label(device_count);
                self.remote
                    .register_device(&dialog.id, &device_id, &label)
                    .await?;
                label
            }
        };

        self.store.upsert_dialog(
            &dialog.id,
            &device_label,
            Some(&dialog.name),
            dialog.last_activity_at,
        );
        self.store.cache_password(&dialog.id, password.trim());

        info!("entered dialog {} as {}", dialog.id, device_label);
        Ok(Some(EnteredDialog {
            dialog_id: dialog.id,
            name: dialog.name,
            device_label,
        }))
    }

    /// Load a dialog's content. Access is gated on local membership; a
    /// device without it is denied, never silently enrolled.
    pub async fn open_dialog(&mut self, dialog_id: &str) -> Result<DialogOverview, SessionError> {
        if !self.store.has_access(dialog_id) {
            return Err(SessionError::AccessDenied(dialog_id.to_owned()));
        }

        // Refresh the local mirror from ground truth while we are here.
        if let Some(dialog) = self.remote.fetch_dialog(dialog_id).await? {
            self.store.update_dialog_name(dialog_id, &dialog.name);
            if let Some(at) = dialog.last_activity_at {
                self.store.update_dialog_activity(dialog_id, at);
            }
        }

        let files = self.remote.list_files(dialog_id).await?;
        let messages = self.remote.list_messages(dialog_id).await?;
        let device_count = self.remote.count_devices(dialog_id).await?;

        Ok(DialogOverview {
            dialog_id: dialog_id.to_owned(),
            name: self.store.dialog_name(dialog_id),
            device_label: self.store.device_label_for(dialog_id),
            device_count,
            files,
            messages,
        })
    }

    /// Upload one file into the dialog: size check, object PUT, row insert,
    /// local activity bump.
    pub async fn upload_file(
        &mut self,
        dialog_id: &str,
        path: &Path,
    ) -> Result<FileRow, SessionError> {
        if !self.store.has_access(dialog_id) {
            return Err(SessionError::AccessDenied(dialog_id.to_owned()));
        }

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| SessionError::InvalidFileName(path.display().to_string()))?;

        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > MAX_FILE_BYTES {
            return Err(CoreError::FileTooLarge {
                size: metadata.len(),
            }
            .into());
        }

        let bytes = tokio::fs::read(path).await?;
        let uploaded_at = Utc::now();
        let object = object_path(dialog_id, &file_name, uploaded_at);
        self.remote
            .upload_object(&object, bytes, "application/octet-stream")
            .await?;

        let device_label = self.current_label(dialog_id);
        self.remote
            .insert_file(
                dialog_id,
                &file_name,
                metadata.len(),
                &object,
                &device_label,
            )
            .await?;

        self.store
            .upsert_dialog(dialog_id, &device_label, None, Some(uploaded_at));

        info!("uploaded {} to dialog {}", file_name, dialog_id);
        Ok(FileRow {
            id: String::new(),
            dialog_id: dialog_id.to_owned(),
            file_name,
            file_size: metadata.len(),
            file_path: object,
            device_label,
            uploaded_at,
        })
    }

    pub async fn delete_file(&mut self, dialog_id: &str, file: &FileRow) -> Result<(), SessionError> {
        if !self.store.has_access(dialog_id) {
            return Err(SessionError::AccessDenied(dialog_id.to_owned()));
        }
        self.remote.remove_object(&file.file_path).await?;
        self.remote.delete_file(&file.id).await?;
        Ok(())
    }

    pub async fn send_message(
        &mut self,
        dialog_id: &str,
        text: &str,
    ) -> Result<(), SessionError> {
        if !self.store.has_access(dialog_id) {
            return Err(SessionError::AccessDenied(dialog_id.to_owned()));
        }

        let device_label = self.current_label(dialog_id);
        self.remote
            .insert_message(dialog_id, &device_label, MessageKind::Text, Some(text), None)
            .await?;
        self.store
            .upsert_dialog(dialog_id, &device_label, None, Some(Utc::now()));
        Ok(())
    }

    /// A voice note is an uploaded audio blob plus a message row pointing at
    /// it.
    pub async fn send_voice_note(
        &mut self,
        dialog_id: &str,
        path: &Path,
    ) -> Result<(), SessionError> {
        let uploaded = self.upload_file(dialog_id, path).await?;
        let device_label = self.current_label(dialog_id);
        self.remote
            .insert_message(
                dialog_id,
                &device_label,
                MessageKind::Voice,
                None,
                Some(&uploaded.file_path),
            )
            .await?;
        Ok(())
    }

    pub async fn rename_dialog(
        &mut self,
        dialog_id: &str,
        name: &str,
    ) -> Result<(), SessionError> {
        if !self.store.has_access(dialog_id) {
            return Err(SessionError::AccessDenied(dialog_id.to_owned()));
        }
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_DIALOG_NAME_LEN {
            return Err(CoreError::InvalidDialogName.into());
        }

        self.remote.rename_dialog(dialog_id, trimmed).await?;
        self.store.update_dialog_name(dialog_id, trimmed);
        Ok(())
    }

    /// "Exit to archive": hide the dialog from the home list without losing
    /// access. Purely local.
    pub fn exit_dialog(&mut self, dialog_id: &str) {
        self.store.archive_dialog(dialog_id);
    }

    pub fn restore_dialog(&mut self, dialog_id: &str) -> Option<StoredDialog> {
        self.store.restore_dialog(dialog_id)
    }

    /// "Leave completely": drop local membership without archiving. The
    /// remote membership row stays; re-entering by password recovers the
    /// old label.
    pub fn leave_dialog(&mut self, dialog_id: &str) {
        self.store.remove_active_dialog(dialog_id);
    }

    pub fn discard_archived(&mut self, dialog_id: &str) {
        self.store.remove_from_archive(dialog_id);
    }

    /// Reminder file (name, contents) for a dialog whose password this
    /// device cached at create/enter time. `None` when nothing is cached.
    pub fn password_reminder(&self, dialog_id: &str) -> Option<(String, String)> {
        let password = self.store.cached_password(dialog_id)?;
        let name = self.store.dialog_name(dialog_id).unwrap_or_default();
        Some((
            reminder_file_name(&name),
            reminder_file_contents(&name, &password),
        ))
    }

    /// Label to show for this device inside a dialog: the global device
    /// name overrides the historical per-dialog label at display time only.
    /// Both fields stay separate in storage.
    pub fn display_device_label(&self, dialog_id: &str) -> Option<String> {
        self.store
            .device_name()
            .or_else(|| self.store.device_label_for(dialog_id))
    }

    fn current_label(&self, dialog_id: &str) -> String {
        self.store
            .device_label_for(dialog_id)
            .unwrap_or_else(|| "Unknown".to_owned())
    }
}

/// Labels are assigned by join order: the n-th device becomes "Device n+1".
fn numbered_device_label(existing_devices: usize) -> String {
    format!("Device {}", existing_devices + 1)
}

#[cfg(test)]
mod tests {
    use crate::store::MemoryStorage;

    use super::*;

    #[test]
    fn device_labels_count_from_one() {
        assert_eq!(numbered_device_label(0), "Device 1");
        assert_eq!(numbered_device_label(3), "Device 4");
    }

    #[test]
    fn display_label_prefers_global_device_name() {
        let mut store = DeviceStore::new(MemoryStorage::new());
        store.upsert_dialog("d1", "Device 2", None, None);

        let remote = RemoteClient::new(
            crate::remote::RemoteConfig::new("https://backend.example/", "k").unwrap(),
        );
        let mut session = Session::new(store, remote);

        assert_eq!(
            session.display_device_label("d1").as_deref(),
            Some("Device 2")
        );
        session.store_mut().set_device_name("Kitchen Laptop");
        assert_eq!(
            session.display_device_label("d1").as_deref(),
            Some("Kitchen Laptop")
        );
    }

    #[test]
    fn reminder_requires_cached_password() {
        let mut store = DeviceStore::new(MemoryStorage::new());
        store.upsert_dialog("d1", "Device 1", Some("Swift Send"), None);

        let remote = RemoteClient::new(
            crate::remote::RemoteConfig::new("https://backend.example/", "k").unwrap(),
        );
        let mut session = Session::new(store, remote);
        assert!(session.password_reminder("d1").is_none());

        session.store_mut().cache_password("d1", "4721");
        let (file_name, contents) = session.password_reminder("d1").unwrap();
        assert_eq!(file_name, "Swift Send-password.txt");
        assert!(contents.contains("Dialog code: 4721"));
    }
}
