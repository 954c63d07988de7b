//! Input/output DTOs for the HTTP surface and the tool catalog
//!
//! Defines the shaped records returned to callers and the request types
//! accepted by the endpoints. Tool input types are annotated with
//! `JsonSchema` so the agent runtime receives generated schemas.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::gmail::Label;

/// Minimal record returned by a list/search call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Provider-assigned message id
    pub id: String,
    /// Thread the message belongs to
    pub thread_id: Option<String>,
    /// Label ids when the provider includes them in the listing
    #[serde(default)]
    pub label_ids: Vec<String>,
}

/// Full shaped message record
///
/// Derived on demand from a provider-fetched payload; never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDetail {
    /// Provider-assigned message id
    pub id: String,
    /// Subject header, `"no subject"` when missing
    pub subject: String,
    /// From header, `"unknown sender"` when missing
    pub sender: String,
    /// To header, `"unknown recipients"` when missing
    pub recipients: String,
    /// Date header, `"unknown date"` when missing
    pub date: String,
    /// Decoded plain-text body or the unavailable sentinel
    pub body: String,
    /// Provider snippet
    pub snippet: String,
    /// Whether any top-level part carries an attachment filename
    pub has_attachments: bool,
    /// Whether the `STARRED` label is present
    pub starred: bool,
    /// Full label id set
    pub labels: Vec<String>,
}

/// Minimal record returned by a thread search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Provider-assigned thread id
    pub id: String,
    /// Provider snippet of the latest message
    pub snippet: Option<String>,
}

/// Minimal record returned by a draft listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSummary {
    /// Provider-assigned draft id
    pub id: String,
    /// Id of the embedded message, when the listing includes it
    pub message_id: Option<String>,
}

/// One message inside an assembled thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Provider-assigned message id
    pub id: String,
    /// Subject header, `"no subject"` when missing
    pub subject: String,
    /// From header, `"unknown sender"` when missing
    pub from: String,
    /// Date header, `"unknown date"` when missing
    pub date: String,
    /// Decoded plain-text body or the unavailable sentinel
    pub body: String,
}

/// Label metadata shaped for callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelInfo {
    /// Provider-assigned label id
    pub id: String,
    /// Display name
    pub name: String,
    /// Sidebar visibility (`labelShow`, `labelHide`, ...)
    pub label_list_visibility: Option<String>,
    /// Message list visibility (`show`, `hide`)
    pub message_list_visibility: Option<String>,
    /// Total messages carrying the label, when reported
    pub messages_total: Option<u64>,
    /// Unread messages carrying the label, when reported
    pub messages_unread: Option<u64>,
}

impl From<Label> for LabelInfo {
    fn from(label: Label) -> Self {
        Self {
            id: label.id,
            name: label.name,
            label_list_visibility: label.label_list_visibility,
            message_list_visibility: label.message_list_visibility,
            messages_total: label.messages_total,
            messages_unread: label.messages_unread,
        }
    }
}

/// Aggregate mailbox counts
///
/// Every field degrades to zero when its sub-query fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailStats {
    /// Messages received since local midnight
    pub today: u64,
    /// Messages received since the most recent Monday
    pub this_week: u64,
    /// Messages received this calendar month
    pub this_month: u64,
    /// Unread messages
    pub unread: u64,
    /// Messages with attachments
    pub with_attachments: u64,
    /// Total messages
    pub total: u64,
}

/// Authenticated user identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Opaque provider-assigned account id
    pub id: String,
    /// Primary email address
    pub email: String,
    /// Display name, may be empty
    #[serde(default)]
    pub name: String,
}

/// Response: authorization URL issuance
#[derive(Debug, Serialize, Deserialize)]
pub struct OauthUrlResponse {
    /// Provider authorization URL embedding the state token
    pub authorization_url: String,
}

/// Query parameters of the OAuth callback
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code on success
    pub code: Option<String>,
    /// State token issued with the authorization URL
    pub state: Option<String>,
    /// Provider-reported error, when the user denied access
    pub error: Option<String>,
}

/// Response: logout
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Whether a session existed to remove
    pub removed: bool,
}

/// Query parameters of the message listing endpoint
#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    /// Provider query string, forwarded verbatim
    #[serde(default)]
    pub query: String,
    /// Optional label name filter, resolved to a label id
    pub label: Option<String>,
    /// Continuation cursor from a previous page
    pub cursor: Option<String>,
    /// Result cap (default 50)
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

/// Response: message listing
#[derive(Debug, Serialize, Deserialize)]
pub struct ListMessagesResponse {
    /// Shaped summaries in page order
    pub messages: Vec<MessageSummary>,
    /// Count of summaries returned
    pub total_count: usize,
    /// Cursor for the next page, absent at end of data
    pub next_cursor: Option<String>,
}

/// Response: UI bootstrap data
#[derive(Debug, Serialize, Deserialize)]
pub struct UserDataResponse {
    /// Authenticated user identity
    pub user: UserProfile,
    /// All labels
    pub labels: Vec<LabelInfo>,
    /// Aggregate counts
    pub stats: MailStats,
}

/// Request: message action endpoint
///
/// Discriminated by `type`; `value` carries the label name for `addLabel`.
#[derive(Debug, Deserialize)]
pub struct MessageActionRequest {
    /// One of `trash`, `archive`, `markRead`, `addLabel`
    #[serde(rename = "type")]
    pub action_type: String,
    /// Action argument (label name for `addLabel`)
    pub value: Option<String>,
}

/// Parsed message action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageAction {
    /// Move the message to the trash
    Trash,
    /// Remove the `INBOX` label
    Archive,
    /// Remove the `UNREAD` label
    MarkRead,
    /// Resolve the named label and add it
    AddLabel(String),
}

impl MessageAction {
    /// Parse the discriminated request payload
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unknown `type` values or a missing
    /// `value` on `addLabel`.
    pub fn parse(request: &MessageActionRequest) -> AppResult<Self> {
        match request.action_type.as_str() {
            "trash" => Ok(Self::Trash),
            "archive" => Ok(Self::Archive),
            "markRead" => Ok(Self::MarkRead),
            "addLabel" => match request.value.as_deref() {
                Some(name) if !name.trim().is_empty() => Ok(Self::AddLabel(name.to_owned())),
                _ => Err(AppError::invalid("addLabel requires a label name in 'value'")),
            },
            other => Err(AppError::invalid(format!("unknown action type '{other}'"))),
        }
    }
}

/// Response: message action endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Whether the action was applied
    pub success: bool,
    /// Echo of the applied action type
    pub action: String,
}

/// Request: chat endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Free-text user input
    pub message: String,
}

/// Response: chat endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Free-text assistant response
    pub response: String,
    /// Name of the last tool the agent executed, when any
    pub action_taken: Option<String>,
}

/// Tool input: search messages
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchMessagesInput {
    /// Provider query string (e.g., `from:alice is:unread`)
    pub query: String,
    /// Maximum messages to summarize (default 5)
    #[serde(default = "default_tool_max_results")]
    pub max_results: usize,
}

/// Tool input: message id only
///
/// Used by the detail and trash tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MessageIdInput {
    /// Provider-assigned message id
    pub message_id: String,
}

/// Default value for `max_results` on the listing endpoint
fn default_max_results() -> usize {
    50
}

/// Default value for `max_results` on the search tool
///
/// Chat output is read inline by a model; a handful of summaries is enough.
fn default_tool_max_results() -> usize {
    5
}
