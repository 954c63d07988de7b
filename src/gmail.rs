//! Gmail REST transport
//!
//! Thin wrapper over the provider's HTTP API: one method per documented
//! endpoint, wire-format DTOs, and the multiplexed batch call. Every method
//! takes the caller's bearer access token; credential lifecycle lives in
//! [`crate::session`]. Calls are attempted exactly once: no retry, no
//! backoff.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::{AppError, AppResult};

/// Maximum sub-requests the provider accepts in one batch call
pub const MAX_BATCH_CALLS: usize = 100;

/// Provider REST client
///
/// Holds the shared HTTP client and the configured endpoint bases. Cheap to
/// clone; cloned into handlers via `Arc`-held app state.
#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    api_base: String,
    batch_base: String,
}

impl GmailClient {
    /// Build the client with the configured timeouts
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            batch_base: config.batch_base.clone(),
        })
    }

    /// List message ids matching `query`/`label_ids`, one page per call
    pub async fn list_messages(
        &self,
        token: &str,
        query: Option<&str>,
        label_ids: &[String],
        page_size: usize,
        cursor: Option<&str>,
    ) -> AppResult<MessagesListResponse> {
        let url = format!("{}/users/me/messages", self.api_base);
        let mut request = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("maxResults", page_size.to_string())]);
        if let Some(q) = query {
            request = request.query(&[("q", q)]);
        }
        for label_id in label_ids {
            request = request.query(&[("labelIds", label_id)]);
        }
        if let Some(cursor) = cursor {
            request = request.query(&[("pageToken", cursor)]);
        }
        self.request_json(request, "message list").await
    }

    /// List thread ids matching `query`, one page per call
    pub async fn list_threads(
        &self,
        token: &str,
        query: Option<&str>,
        page_size: usize,
        cursor: Option<&str>,
    ) -> AppResult<ThreadsListResponse> {
        let url = format!("{}/users/me/threads", self.api_base);
        let mut request = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("maxResults", page_size.to_string())]);
        if let Some(q) = query {
            request = request.query(&[("q", q)]);
        }
        if let Some(cursor) = cursor {
            request = request.query(&[("pageToken", cursor)]);
        }
        self.request_json(request, "thread list").await
    }

    /// List draft ids, one page per call
    pub async fn list_drafts(
        &self,
        token: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> AppResult<DraftsListResponse> {
        let url = format!("{}/users/me/drafts", self.api_base);
        let mut request = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("maxResults", page_size.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("pageToken", cursor)]);
        }
        self.request_json(request, "draft list").await
    }

    /// Fetch one message with the full payload tree
    pub async fn get_message(&self, token: &str, message_id: &str) -> AppResult<GmailMessage> {
        let url = format!("{}/users/me/messages/{}", self.api_base, message_id);
        let request = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("format", "full")]);
        self.request_json(request, &format!("message {message_id}"))
            .await
    }

    /// Fetch one thread with full message payloads
    pub async fn get_thread(&self, token: &str, thread_id: &str) -> AppResult<GmailThread> {
        let url = format!("{}/users/me/threads/{}", self.api_base, thread_id);
        let request = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("format", "full")]);
        self.request_json(request, &format!("thread {thread_id}"))
            .await
    }

    /// Add or remove labels on a message
    ///
    /// The provider accepts both directions in one call, but callers batch
    /// each direction separately to honor the 100-id ceiling per direction.
    pub async fn modify_message(
        &self,
        token: &str,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> AppResult<()> {
        let url = format!("{}/users/me/messages/{}/modify", self.api_base, message_id);
        let body = ModifyMessageRequest {
            add_label_ids,
            remove_label_ids,
        };
        let request = self.http.post(&url).bearer_auth(token).json(&body);
        self.request_empty(request, &format!("modify message {message_id}"))
            .await
    }

    /// Move a message to the trash
    pub async fn trash_message(&self, token: &str, message_id: &str) -> AppResult<()> {
        let url = format!("{}/users/me/messages/{}/trash", self.api_base, message_id);
        let request = self.http.post(&url).bearer_auth(token);
        self.request_empty(request, &format!("trash message {message_id}"))
            .await
    }

    /// Restore a message from the trash
    pub async fn untrash_message(&self, token: &str, message_id: &str) -> AppResult<()> {
        let url = format!("{}/users/me/messages/{}/untrash", self.api_base, message_id);
        let request = self.http.post(&url).bearer_auth(token);
        self.request_empty(request, &format!("untrash message {message_id}"))
            .await
    }

    /// Permanently delete a message, bypassing the trash
    pub async fn delete_message(&self, token: &str, message_id: &str) -> AppResult<()> {
        let url = format!("{}/users/me/messages/{}", self.api_base, message_id);
        let request = self.http.delete(&url).bearer_auth(token);
        self.request_empty(request, &format!("delete message {message_id}"))
            .await
    }

    /// Submit a base64url-encoded RFC 822 envelope for delivery
    pub async fn send_message(&self, token: &str, raw: &str) -> AppResult<MessageRef> {
        let url = format!("{}/users/me/messages/send", self.api_base);
        let body = RawMessageRequest { raw };
        let request = self.http.post(&url).bearer_auth(token).json(&body);
        self.request_json(request, "send message").await
    }

    /// List all labels
    pub async fn list_labels(&self, token: &str) -> AppResult<Vec<Label>> {
        let url = format!("{}/users/me/labels", self.api_base);
        let request = self.http.get(&url).bearer_auth(token);
        let response: LabelsListResponse = self.request_json(request, "label list").await?;
        Ok(response.labels.unwrap_or_default())
    }

    /// Create a label
    pub async fn create_label(&self, token: &str, label: &NewLabel<'_>) -> AppResult<Label> {
        let url = format!("{}/users/me/labels", self.api_base);
        let request = self.http.post(&url).bearer_auth(token).json(label);
        self.request_json(request, &format!("create label '{}'", label.name))
            .await
    }

    /// Fetch one label with counts
    pub async fn get_label(&self, token: &str, label_id: &str) -> AppResult<Label> {
        let url = format!("{}/users/me/labels/{}", self.api_base, label_id);
        let request = self.http.get(&url).bearer_auth(token);
        self.request_json(request, &format!("label {label_id}"))
            .await
    }

    /// Patch label fields (name, visibility)
    pub async fn update_label(
        &self,
        token: &str,
        label_id: &str,
        patch: &LabelPatch<'_>,
    ) -> AppResult<Label> {
        let url = format!("{}/users/me/labels/{}", self.api_base, label_id);
        let request = self.http.patch(&url).bearer_auth(token).json(patch);
        self.request_json(request, &format!("update label {label_id}"))
            .await
    }

    /// Delete a label
    pub async fn delete_label(&self, token: &str, label_id: &str) -> AppResult<()> {
        let url = format!("{}/users/me/labels/{}", self.api_base, label_id);
        let request = self.http.delete(&url).bearer_auth(token);
        self.request_empty(request, &format!("delete label {label_id}"))
            .await
    }

    /// Create a draft from a base64url-encoded envelope
    pub async fn create_draft(&self, token: &str, raw: &str) -> AppResult<GmailDraft> {
        let url = format!("{}/users/me/drafts", self.api_base);
        let body = DraftRequest {
            message: RawMessageRequest { raw },
        };
        let request = self.http.post(&url).bearer_auth(token).json(&body);
        self.request_json(request, "create draft").await
    }

    /// Fetch one draft with the full message payload
    pub async fn get_draft(&self, token: &str, draft_id: &str) -> AppResult<GmailDraft> {
        let url = format!("{}/users/me/drafts/{}", self.api_base, draft_id);
        let request = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("format", "full")]);
        self.request_json(request, &format!("draft {draft_id}")).await
    }

    /// Send an existing draft
    pub async fn send_draft(&self, token: &str, draft_id: &str) -> AppResult<MessageRef> {
        let url = format!("{}/users/me/drafts/send", self.api_base);
        let body = SendDraftRequest { id: draft_id };
        let request = self.http.post(&url).bearer_auth(token).json(&body);
        self.request_json(request, &format!("send draft {draft_id}"))
            .await
    }

    /// Delete a draft
    pub async fn delete_draft(&self, token: &str, draft_id: &str) -> AppResult<()> {
        let url = format!("{}/users/me/drafts/{}", self.api_base, draft_id);
        let request = self.http.delete(&url).bearer_auth(token);
        self.request_empty(request, &format!("delete draft {draft_id}"))
            .await
    }

    /// Execute up to [`MAX_BATCH_CALLS`] sub-requests in one round trip
    ///
    /// Encodes each operation as an `application/http` part of a
    /// `multipart/mixed` request. The provider runs sub-requests
    /// independently; this method reports only whether the batch call itself
    /// succeeded; per-operation outcomes are not itemized.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when more than [`MAX_BATCH_CALLS`] operations are
    /// passed; `Provider` when the batch call fails.
    pub async fn batch(&self, token: &str, operations: &[BatchOperation]) -> AppResult<()> {
        if operations.is_empty() {
            return Ok(());
        }
        if operations.len() > MAX_BATCH_CALLS {
            return Err(AppError::invalid(format!(
                "batch supports at most {MAX_BATCH_CALLS} operations per call"
            )));
        }

        let boundary = "batch_mail_gateway";
        let host = self.api_host();
        let prefix = self.api_path_prefix();
        let mut body = String::new();
        for (i, op) in operations.iter().enumerate() {
            body.push_str(&format!("--{boundary}\r\n"));
            body.push_str("Content-Type: application/http\r\n");
            body.push_str(&format!("Content-ID: <item{}>\r\n\r\n", i + 1));
            body.push_str(&format!(
                "{} {}/{} HTTP/1.1\r\n",
                op.method.as_str(),
                prefix,
                op.path
            ));
            body.push_str(&format!("Host: {host}\r\n\r\n"));
        }
        body.push_str(&format!("--{boundary}--\r\n"));

        let request = self
            .http
            .post(&self.batch_base)
            .bearer_auth(token)
            .header(
                "Content-Type",
                format!("multipart/mixed; boundary={boundary}"),
            )
            .body(body);
        self.request_empty(request, "batch call").await
    }

    /// Path prefix of the API base (e.g., `/gmail/v1`)
    fn api_path_prefix(&self) -> &str {
        match self.api_base.find("://") {
            Some(scheme_end) => match self.api_base[scheme_end + 3..].find('/') {
                Some(host_end) => &self.api_base[scheme_end + 3 + host_end..],
                None => "",
            },
            None => self.api_base.as_str(),
        }
    }

    /// Host component of the API base
    fn api_host(&self) -> &str {
        let start = self
            .api_base
            .find("://")
            .map(|i| i + 3)
            .unwrap_or_default();
        let rest = &self.api_base[start..];
        match rest.find('/') {
            Some(end) => &rest[..end],
            None => rest,
        }
    }

    /// Issue a request and decode the JSON response body
    async fn request_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> AppResult<T> {
        let text = self.request_text(request, what).await?;
        serde_json::from_str(&text)
            .map_err(|e| AppError::Provider(format!("failed to parse {what} response: {e}")))
    }

    /// Issue a request where only success matters
    async fn request_empty(&self, request: reqwest::RequestBuilder, what: &str) -> AppResult<()> {
        self.request_text(request, what).await.map(|_| ())
    }

    async fn request_text(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> AppResult<String> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(what.to_owned()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("{what}: HTTP {status} - {body}")));
        }
        tracing::debug!(status = %status, "{what} succeeded");
        Ok(response.text().await?)
    }
}

/// Sub-request inside a multiplexed batch call
#[derive(Debug, Clone)]
pub struct BatchOperation {
    /// HTTP method of the sub-request
    pub method: BatchMethod,
    /// Path below the API base, without a leading slash
    /// (e.g., `users/me/messages/abc/trash`)
    pub path: String,
}

/// Methods used by batched sub-requests
#[derive(Debug, Clone, Copy)]
pub enum BatchMethod {
    Post,
    Delete,
}

impl BatchMethod {
    fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyMessageRequest<'a> {
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    add_label_ids: &'a [String],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    remove_label_ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct RawMessageRequest<'a> {
    raw: &'a str,
}

#[derive(Debug, Serialize)]
struct DraftRequest<'a> {
    message: RawMessageRequest<'a>,
}

#[derive(Debug, Serialize)]
struct SendDraftRequest<'a> {
    id: &'a str,
}

/// New label payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLabel<'a> {
    pub name: &'a str,
    pub label_list_visibility: &'a str,
    pub message_list_visibility: &'a str,
}

/// Partial label update payload
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_list_visibility: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_list_visibility: Option<&'a str>,
}

/// Minimal message record returned by list and send calls
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Option<Vec<String>>,
}

/// Message list page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesListResponse {
    pub messages: Option<Vec<MessageRef>>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

/// Minimal thread record returned by thread list calls
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRef {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Thread list page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsListResponse {
    pub threads: Option<Vec<ThreadRef>>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

/// Minimal draft record returned by draft list calls
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRef {
    pub id: String,
    #[serde(default)]
    pub message: Option<MessageRef>,
}

/// Draft list page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftsListResponse {
    pub drafts: Option<Vec<DraftRef>>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

/// Full message resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Option<Vec<String>>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// One node of the MIME payload tree
///
/// The root payload and nested parts share this shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub part_id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Option<Vec<Header>>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Option<Vec<MessagePart>>,
}

/// RFC 822 header carried in the payload tree
#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Body of a payload node
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Full thread resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailThread {
    pub id: String,
    #[serde(default)]
    pub messages: Option<Vec<GmailMessage>>,
}

/// Full draft resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailDraft {
    pub id: String,
    #[serde(default)]
    pub message: Option<GmailMessage>,
}

/// Label resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub label_type: Option<String>,
    #[serde(default)]
    pub label_list_visibility: Option<String>,
    #[serde(default)]
    pub message_list_visibility: Option<String>,
    #[serde(default)]
    pub messages_total: Option<u64>,
    #[serde(default)]
    pub messages_unread: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LabelsListResponse {
    labels: Option<Vec<Label>>,
}
