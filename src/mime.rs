//! Message body decoding and outbound construction
//!
//! Inbound: extracts a human-readable plain-text body from the provider's
//! tree-shaped MIME payload. Outbound: builds RFC 822 envelopes with `lettre`
//! for the send and draft operations and base64url-encodes them for
//! submission.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::gmail::MessagePart;

/// Sentinel returned when a payload carries no decodable plain-text leaf
pub const BODY_UNAVAILABLE: &str = "text body not available";

/// Body content kind for outgoing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    Plain,
    Html,
}

impl BodyKind {
    /// Parse from the wire value (`plain` or `html`)
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for anything outside the enumerated set.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "html" => Ok(Self::Html),
            other => Err(AppError::invalid(format!(
                "body kind must be 'plain' or 'html', got '{other}'"
            ))),
        }
    }
}

/// Extract the first available plain-text body from a payload tree
///
/// Traversal order: when the payload has parts, the first
/// `multipart/alternative` part wins, and within it the first `text/plain`
/// child carrying data; a flat payload decodes its own body data. Anything
/// else yields [`BODY_UNAVAILABLE`]. Absence of a decodable part is a normal
/// case, not an error; this function never fails.
pub fn extract_text_body(payload: &MessagePart) -> String {
    if let Some(parts) = &payload.parts {
        for part in parts {
            if part.mime_type.as_deref() == Some("multipart/alternative")
                && let Some(subparts) = &part.parts
            {
                for subpart in subparts {
                    if subpart.mime_type.as_deref() == Some("text/plain")
                        && let Some(data) = subpart.body.as_ref().and_then(|b| b.data.as_deref())
                        && let Some(text) = decode_base64url(data)
                    {
                        return text;
                    }
                }
            }
        }
        BODY_UNAVAILABLE.to_owned()
    } else if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
        decode_base64url(data).unwrap_or_else(|| BODY_UNAVAILABLE.to_owned())
    } else {
        BODY_UNAVAILABLE.to_owned()
    }
}

/// Whether any top-level part declares an attachment filename
pub fn has_attachment_filename(payload: &MessagePart) -> bool {
    payload
        .parts
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|part| part.filename.as_deref().is_some_and(|name| !name.is_empty()))
}

/// Decode base64url data, tolerating both padded and unpadded input
fn decode_base64url(data: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| URL_SAFE.decode(data))
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Build an outgoing multipart message and base64url-encode the envelope
///
/// The body becomes the first part (`text/plain` or `text/html` by
/// `body_kind`); each attachment path is read from disk and attached as
/// `application/octet-stream` under its file name.
///
/// # Errors
///
/// - `InvalidInput` for unparseable sender/recipient addresses
/// - `NotFound` when an attachment path does not exist
/// - `Internal` for construction failures
pub fn build_outgoing_message(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    body_kind: BodyKind,
    attachment_paths: &[String],
) -> AppResult<String> {
    let from_mailbox: Mailbox = from
        .parse()
        .map_err(|e| AppError::invalid(format!("invalid sender address '{from}': {e}")))?;
    let to_mailbox: Mailbox = to
        .parse()
        .map_err(|e| AppError::invalid(format!("invalid recipient address '{to}': {e}")))?;

    let body_part = match body_kind {
        BodyKind::Plain => SinglePart::plain(body.to_owned()),
        BodyKind::Html => SinglePart::html(body.to_owned()),
    };

    let mut multipart = MultiPart::mixed().singlepart(body_part);
    for path in attachment_paths {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("attachment file not found - {path}"))
            } else {
                AppError::Internal(format!("failed to read attachment {path}: {e}"))
            }
        })?;
        let filename = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path.as_str())
            .to_owned();
        let content_type = ContentType::parse("application/octet-stream")
            .map_err(|e| AppError::Internal(format!("invalid attachment content type: {e}")))?;
        multipart = multipart.singlepart(Attachment::new(filename).body(bytes, content_type));
    }

    let message = Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(subject)
        .multipart(multipart)
        .map_err(|e| AppError::Internal(format!("failed to build outgoing message: {e}")))?;

    Ok(URL_SAFE.encode(message.formatted()))
}
