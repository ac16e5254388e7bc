use std::time::Duration;

use allbox_core::{DeviceId, DialogId};
use chrono::{DateTime, Utc};
use reqwest::{
    Response, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

pub const DEFAULT_BUCKET: &str = "dialog-files";

const UPLOAD_MAX_ATTEMPTS: u32 = 3;
const UPLOAD_BACKOFF_BASE_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("backend returned an empty result where a row was expected")]
    EmptyResponse,
    #[error("invalid backend base url: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub api_key: String,
    pub bucket: String,
}

impl RemoteConfig {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| ApiError::InvalidBaseUrl(format!("{base_url}: {err}")))?;
        Ok(Self {
            base_url,
            api_key: api_key.to_owned(),
            bucket: DEFAULT_BUCKET.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogRow {
    pub id: DialogId,
    pub name: String,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogDeviceRow {
    pub dialog_id: DialogId,
    pub device_id: DeviceId,
    pub device_label: String,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRow {
    pub id: String,
    pub dialog_id: DialogId,
    pub file_name: String,
    pub file_size: u64,
    pub file_path: String,
    pub device_label: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Voice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub dialog_id: DialogId,
    pub device_label: String,
    pub kind: MessageKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Client for the hosted relational tables and the object-storage bucket.
/// Tables are addressed PostgREST-style under `/rest/v1`, objects under
/// `/storage/v1`. All durability concerns live on the backend side.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    config: RemoteConfig,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    // --- dialogs ---------------------------------------------------------

    pub async fn create_dialog(
        &self,
        name: &str,
        password_hash: &str,
    ) -> Result<DialogRow, ApiError> {
        let rows: Vec<DialogRow> = self
            .insert_returning(
                "dialogs",
                &serde_json::json!({ "name": name, "password_hash": password_hash }),
            )
            .await?;
        rows.into_iter().next().ok_or(ApiError::EmptyResponse)
    }

    /// Password-equality lookup. `None` means no dialog matches, which the
    /// caller reports as a wrong password.
    pub async fn find_dialog_by_password_hash(
        &self,
        password_hash: &str,
    ) -> Result<Option<DialogRow>, ApiError> {
        let url = self.table_url(
            "dialogs",
            &[
                ("password_hash", &format!("eq.{password_hash}")),
                ("select", "id,name,last_activity_at,created_at"),
            ],
        );
        let rows: Vec<DialogRow> = self.get_json(url).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn fetch_dialog(&self, dialog_id: &str) -> Result<Option<DialogRow>, ApiError> {
        let url = self.table_url(
            "dialogs",
            &[
                ("id", &format!("eq.{dialog_id}")),
                ("select", "id,name,last_activity_at,created_at"),
            ],
        );
        let rows: Vec<DialogRow> = self.get_json(url).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn rename_dialog(&self, dialog_id: &str, name: &str) -> Result<(), ApiError> {
        let url = self.table_url("dialogs", &[("id", &format!("eq.{dialog_id}"))]);
        let response = self
            .http
            .patch(url)
            .headers(self.auth_headers())
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        expect_success(response).await.map(|_| ())
    }

    pub async fn touch_dialog_activity(
        &self,
        dialog_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let url = self.table_url("dialogs", &[("id", &format!("eq.{dialog_id}"))]);
        let response = self
            .http
            .patch(url)
            .headers(self.auth_headers())
            .json(&serde_json::json!({ "last_activity_at": at }))
            .send()
            .await?;
        expect_success(response).await.map(|_| ())
    }

    // --- device memberships ----------------------------------------------

    pub async fn find_membership(
        &self,
        dialog_id: &str,
        device_id: &str,
    ) -> Result<Option<DialogDeviceRow>, ApiError> {
        let url = self.table_url(
            "dialog_devices",
            &[
                ("dialog_id", &format!("eq.{dialog_id}")),
                ("device_id", &format!("eq.{device_id}")),
            ],
        );
        let rows: Vec<DialogDeviceRow> = self.get_json(url).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn count_devices(&self, dialog_id: &str) -> Result<usize, ApiError> {
        let url = self.table_url(
            "dialog_devices",
            &[
                ("dialog_id", &format!("eq.{dialog_id}")),
                ("select", "device_id"),
            ],
        );
        let rows: Vec<serde_json::Value> = self.get_json(url).await?;
        Ok(rows.len())
    }

    pub async fn register_device(
        &self,
        dialog_id: &str,
        device_id: &str,
        device_label: &str,
    ) -> Result<(), ApiError> {
        let url = self.table_url("dialog_devices", &[]);
        let response = self
            .http
            .post(url)
            .headers(self.auth_headers())
            .json(&serde_json::json!({
                "dialog_id": dialog_id,
                "device_id": device_id,
                "device_label": device_label,
            }))
            .send()
            .await?;
        expect_success(response).await.map(|_| ())
    }

    // --- files ------------------------------------------------------------

    pub async fn list_files(&self, dialog_id: &str) -> Result<Vec<FileRow>, ApiError> {
        let url = self.table_url(
            "files",
            &[
                ("dialog_id", &format!("eq.{dialog_id}")),
                ("order", "uploaded_at.desc"),
            ],
        );
        self.get_json(url).await
    }

    pub async fn insert_file(
        &self,
        dialog_id: &str,
        file_name: &str,
        file_size: u64,
        file_path: &str,
        device_label: &str,
    ) -> Result<(), ApiError> {
        let url = self.table_url("files", &[]);
        let response = self
            .http
            .post(url)
            .headers(self.auth_headers())
            .json(&serde_json::json!({
                "dialog_id": dialog_id,
                "file_name": file_name,
                "file_size": file_size,
                "file_path": file_path,
                "device_label": device_label,
            }))
            .send()
            .await?;
        expect_success(response).await.map(|_| ())
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), ApiError> {
        let url = self.table_url("files", &[("id", &format!("eq.{file_id}"))]);
        let response = self
            .http
            .delete(url)
            .headers(self.auth_headers())
            .send()
            .await?;
        expect_success(response).await.map(|_| ())
    }

    // --- messages ----------------------------------------------------------

    pub async fn list_messages(&self, dialog_id: &str) -> Result<Vec<MessageRow>, ApiError> {
        let url = self.table_url(
            "messages",
            &[
                ("dialog_id", &format!("eq.{dialog_id}")),
                ("order", "sent_at.asc"),
            ],
        );
        self.get_json(url).await
    }

    pub async fn insert_message(
        &self,
        dialog_id: &str,
        device_label: &str,
        kind: MessageKind,
        content: Option<&str>,
        file_path: Option<&str>,
    ) -> Result<(), ApiError> {
        let url = self.table_url("messages", &[]);
        let response = self
            .http
            .post(url)
            .headers(self.auth_headers())
            .json(&serde_json::json!({
                "dialog_id": dialog_id,
                "device_label": device_label,
                "kind": kind,
                "content": content,
                "file_path": file_path,
            }))
            .send()
            .await?;
        expect_success(response).await.map(|_| ())
    }

    // --- object storage -----------------------------------------------------

    /// Raw HTTP PUT of the object bytes, retried with backoff. The resumable
    /// upload protocol is the vendor's concern; a plain PUT is the supported
    /// fallback path and is what this client speaks.
    pub async fn upload_object(
        &self,
        object_path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ApiError> {
        let url = self.object_url(object_path);

        let mut last_err: Option<ApiError> = None;
        for attempt in 1..=UPLOAD_MAX_ATTEMPTS {
            let request = self
                .http
                .put(url.clone())
                .headers(self.auth_headers())
                .header(CONTENT_TYPE, content_type)
                .header("x-upsert", "true")
                .body(bytes.clone());

            let result = match request.send().await {
                Ok(response) => expect_success(response).await.map(|_| ()),
                Err(err) => Err(ApiError::Transport(err)),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!("upload attempt {} failed for {}: {}", attempt, object_path, err);
                    last_err = Some(err);
                    if attempt < UPLOAD_MAX_ATTEMPTS {
                        let backoff_ms =
                            UPLOAD_BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(ApiError::EmptyResponse))
    }

    pub async fn remove_object(&self, object_path: &str) -> Result<(), ApiError> {
        let url = self.object_url(object_path);
        let response = self
            .http
            .delete(url)
            .headers(self.auth_headers())
            .send()
            .await?;
        expect_success(response).await.map(|_| ())
    }

    /// Publicly retrievable URL for an uploaded object.
    pub fn public_url(&self, object_path: &str) -> String {
        format!(
            "{}storage/v1/object/public/{}/{}",
            self.config.base_url, self.config.bucket, object_path
        )
    }

    // --- plumbing -----------------------------------------------------------

    fn table_url(&self, table: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.config.base_url.clone();
        url.set_path(&format!("rest/v1/{table}"));
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    fn object_url(&self, object_path: &str) -> Url {
        let mut url = self.config.base_url.clone();
        url.set_path(&format!(
            "storage/v1/object/{}/{}",
            self.config.bucket, object_path
        ));
        url
    }

    fn auth_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(value) = self.config.api_key.parse() {
            headers.insert("apikey", value);
        }
        if let Ok(value) = format!("Bearer {}", self.config.api_key).parse() {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self
            .http
            .get(url)
            .headers(self.auth_headers())
            .send()
            .await?;
        let response = expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn insert_returning<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let url = self.table_url(table, &[]);
        let response = self
            .http
            .post(url)
            .headers(self.auth_headers())
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let response = expect_success(response).await?;
        Ok(response.json().await?)
    }
}

/// Object key for an uploaded file: `{dialog_id}/{unix_ms}-{file_name}`.
pub fn object_path(dialog_id: &str, file_name: &str, uploaded_at: DateTime<Utc>) -> String {
    format!(
        "{dialog_id}/{}-{file_name}",
        uploaded_at.timestamp_millis()
    )
}

async fn expect_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn client() -> RemoteClient {
        let config = RemoteConfig::new("https://backend.example/", "test-key").unwrap();
        RemoteClient::new(config)
    }

    #[test]
    fn object_path_embeds_timestamp_and_name() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let path = object_path("d1", "notes.txt", at);
        assert_eq!(path, format!("d1/{}-notes.txt", at.timestamp_millis()));
    }

    #[test]
    fn public_url_points_into_the_bucket() {
        let url = client().public_url("d1/17-notes.txt");
        assert_eq!(
            url,
            "https://backend.example/storage/v1/object/public/dialog-files/d1/17-notes.txt"
        );
    }

    #[test]
    fn table_url_encodes_filters() {
        let url = client().table_url("dialogs", &[("password_hash", "eq.abc"), ("select", "id")]);
        assert_eq!(url.path(), "/rest/v1/dialogs");
        assert_eq!(url.query(), Some("password_hash=eq.abc&select=id"));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(RemoteConfig::new("not a url", "k").is_err());
    }

    #[test]
    fn rows_decode_with_missing_optional_fields() {
        let row: DialogRow =
            serde_json::from_str(r#"{"id": "d1", "name": "Swift Send"}"#).unwrap();
        assert_eq!(row.id, "d1");
        assert!(row.last_activity_at.is_none());

        let message: MessageRow = serde_json::from_str(
            r#"{"id": "m1", "dialog_id": "d1", "device_label": "Device 1",
                "kind": "text", "sent_at": "2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(message.kind, MessageKind::Text);
        assert!(message.content.is_none());
    }
}
