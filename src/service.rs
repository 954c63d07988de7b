//! Mail client operations
//!
//! Composes the provider transport, the page collector, and the body decoder
//! into the operations the HTTP surface and the chat tools call: search,
//! detail retrieval, label CRUD and batched mutation, trash lifecycle, batch
//! operations, send, drafts, threads, and aggregate counts.
//!
//! A `MailService` is constructed per request around a validated credential
//! handle; it holds no state of its own.

use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDate};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::gmail::{
    BatchMethod, BatchOperation, GmailClient, GmailMessage, Header, LabelPatch, MAX_BATCH_CALLS,
    NewLabel,
};
use crate::mime::{self, BodyKind};
use crate::models::{
    DraftSummary, LabelInfo, MailStats, MessageDetail, MessageSummary, ThreadMessage,
    ThreadSummary,
};
use crate::pagination::{self, Listing, PROVIDER_PAGE_CAP, Page};
use crate::session::AuthHandle;

/// Provider ceiling on label ids per modify call
const MAX_LABELS_PER_MODIFY: usize = 100;

/// Mail operations bound to one authenticated user
pub struct MailService<'a> {
    client: &'a GmailClient,
    auth: &'a AuthHandle,
}

impl<'a> MailService<'a> {
    /// Bind the shared transport to a validated credential handle
    pub fn new(client: &'a GmailClient, auth: &'a AuthHandle) -> Self {
        Self { client, auth }
    }

    fn token(&self) -> &str {
        &self.auth.access_token
    }

    /// Search messages with a verbatim provider query
    ///
    /// The query grammar is the provider's; nothing is validated or
    /// sanitized here. `max_results = None` collects everything.
    pub async fn search(
        &self,
        query: &str,
        max_results: Option<usize>,
    ) -> AppResult<Vec<MessageSummary>> {
        let query = (!query.is_empty()).then_some(query);
        let listing = self.list_message_page(query, &[], None, max_results).await?;
        Ok(listing.items)
    }

    /// One bounded page run for the listing endpoint
    ///
    /// Resumes from `cursor` and reports the leftover provider cursor so the
    /// caller can page onward.
    pub async fn search_page(
        &self,
        query: Option<&str>,
        label_ids: &[String],
        cursor: Option<String>,
        max_results: Option<usize>,
    ) -> AppResult<Listing<MessageSummary>> {
        self.list_message_page(query, label_ids, cursor, max_results)
            .await
    }

    async fn list_message_page(
        &self,
        query: Option<&str>,
        label_ids: &[String],
        cursor: Option<String>,
        max_results: Option<usize>,
    ) -> AppResult<Listing<MessageSummary>> {
        let query = query.map(str::to_owned);
        let labels = label_ids.to_vec();
        let listing = pagination::collect_pages(max_results, cursor, |cursor, page_size| {
            let query = query.clone();
            let labels = labels.clone();
            async move {
                let response = self
                    .client
                    .list_messages(
                        self.token(),
                        query.as_deref(),
                        &labels,
                        page_size,
                        cursor.as_deref(),
                    )
                    .await?;
                Ok(Page {
                    items: response.messages.unwrap_or_default(),
                    next_cursor: response.next_page_token,
                })
            }
        })
        .await?;

        Ok(Listing {
            items: listing
                .items
                .into_iter()
                .map(|message| MessageSummary {
                    id: message.id,
                    thread_id: message.thread_id,
                    label_ids: message.label_ids.unwrap_or_default(),
                })
                .collect(),
            next_cursor: listing.next_cursor,
        })
    }

    /// Fetch and shape one message
    pub async fn get_detail(&self, message_id: &str) -> AppResult<MessageDetail> {
        let message = self.client.get_message(self.token(), message_id).await?;
        Ok(shape_detail(message_id, &message))
    }

    /// Search threads with a verbatim provider query
    pub async fn search_threads(
        &self,
        query: &str,
        max_results: Option<usize>,
    ) -> AppResult<Vec<ThreadSummary>> {
        let query = query.to_owned();
        let listing = pagination::collect_pages(max_results, None, |cursor, page_size| {
            let query = query.clone();
            async move {
                let response = self
                    .client
                    .list_threads(self.token(), Some(&query), page_size, cursor.as_deref())
                    .await?;
                Ok(Page {
                    items: response.threads.unwrap_or_default(),
                    next_cursor: response.next_page_token,
                })
            }
        })
        .await?;

        Ok(listing
            .items
            .into_iter()
            .map(|thread| ThreadSummary {
                id: thread.id,
                snippet: thread.snippet,
            })
            .collect())
    }

    /// Assemble the full conversation a message belongs to
    pub async fn get_message_thread(&self, message_id: &str) -> AppResult<Vec<ThreadMessage>> {
        let message = self.client.get_message(self.token(), message_id).await?;
        let thread_id = message.thread_id.ok_or_else(|| {
            AppError::Provider(format!("message {message_id} carries no thread id"))
        })?;
        let thread = self.client.get_thread(self.token(), &thread_id).await?;

        Ok(thread
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|msg| {
                let payload = msg.payload.unwrap_or_default();
                let headers = payload.headers.as_deref().unwrap_or_default();
                ThreadMessage {
                    id: msg.id,
                    subject: header_or(headers, "subject", "no subject"),
                    from: header_or(headers, "from", "unknown sender"),
                    date: header_or(headers, "date", "unknown date"),
                    body: mime::extract_text_body(&payload),
                }
            })
            .collect())
    }

    /// List all labels
    pub async fn list_labels(&self) -> AppResult<Vec<LabelInfo>> {
        let labels = self.client.list_labels(self.token()).await?;
        Ok(labels.into_iter().map(LabelInfo::from).collect())
    }

    /// Create a label with optional visibility overrides
    pub async fn create_label(
        &self,
        name: &str,
        label_list_visibility: Option<&str>,
        message_list_visibility: Option<&str>,
    ) -> AppResult<LabelInfo> {
        let label = self
            .client
            .create_label(
                self.token(),
                &NewLabel {
                    name,
                    label_list_visibility: label_list_visibility.unwrap_or("labelShow"),
                    message_list_visibility: message_list_visibility.unwrap_or("show"),
                },
            )
            .await?;
        Ok(label.into())
    }

    /// Fetch one label with counts
    pub async fn get_label(&self, label_id: &str) -> AppResult<LabelInfo> {
        let label = self.client.get_label(self.token(), label_id).await?;
        Ok(label.into())
    }

    /// Patch label fields; `None` leaves a field untouched
    pub async fn update_label(
        &self,
        label_id: &str,
        name: Option<&str>,
        label_list_visibility: Option<&str>,
        message_list_visibility: Option<&str>,
    ) -> AppResult<LabelInfo> {
        let patch = LabelPatch {
            name,
            label_list_visibility,
            message_list_visibility,
        };
        let label = self
            .client
            .update_label(self.token(), label_id, &patch)
            .await?;
        Ok(label.into())
    }

    /// Delete a label
    pub async fn delete_label(&self, label_id: &str) -> AppResult<()> {
        self.client.delete_label(self.token(), label_id).await
    }

    /// Resolve a label name to its provider id
    ///
    /// Linear scan over the label list, case-insensitive.
    pub async fn resolve_label_id(&self, name: &str) -> AppResult<String> {
        let labels = self.client.list_labels(self.token()).await?;
        labels
            .into_iter()
            .find(|label| label.name.eq_ignore_ascii_case(name))
            .map(|label| label.id)
            .ok_or_else(|| AppError::NotFound(format!("label '{name}' not found")))
    }

    /// Add and remove labels on a message
    ///
    /// Label id lists are partitioned into batches of at most 100 per call
    /// (a provider-imposed ceiling), one mutation call per batch per
    /// direction, additions first.
    pub async fn modify_labels(
        &self,
        message_id: &str,
        add: &[String],
        remove: &[String],
    ) -> AppResult<()> {
        for batch in add.chunks(MAX_LABELS_PER_MODIFY) {
            self.client
                .modify_message(self.token(), message_id, batch, &[])
                .await?;
        }
        for batch in remove.chunks(MAX_LABELS_PER_MODIFY) {
            self.client
                .modify_message(self.token(), message_id, &[], batch)
                .await?;
        }
        Ok(())
    }

    /// Move a message to the trash
    pub async fn trash(&self, message_id: &str) -> AppResult<()> {
        self.client.trash_message(self.token(), message_id).await
    }

    /// Restore a message from the trash
    pub async fn untrash(&self, message_id: &str) -> AppResult<()> {
        self.client.untrash_message(self.token(), message_id).await
    }

    /// Permanently delete a message, bypassing the trash
    pub async fn permanently_delete(&self, message_id: &str) -> AppResult<()> {
        self.client.delete_message(self.token(), message_id).await
    }

    /// Trash many messages via multiplexed batch calls
    ///
    /// Sub-call outcomes inside a successful batch are provider-determined
    /// and not itemized back to the caller.
    pub async fn batch_trash(&self, message_ids: &[String]) -> AppResult<()> {
        self.run_batch(message_ids, |id| BatchOperation {
            method: BatchMethod::Post,
            path: format!("users/me/messages/{id}/trash"),
        })
        .await
    }

    /// Untrash many messages via multiplexed batch calls
    pub async fn batch_untrash(&self, message_ids: &[String]) -> AppResult<()> {
        self.run_batch(message_ids, |id| BatchOperation {
            method: BatchMethod::Post,
            path: format!("users/me/messages/{id}/untrash"),
        })
        .await
    }

    async fn run_batch(
        &self,
        message_ids: &[String],
        to_operation: impl Fn(&str) -> BatchOperation,
    ) -> AppResult<()> {
        let operations: Vec<BatchOperation> =
            message_ids.iter().map(|id| to_operation(id)).collect();
        for chunk in operations.chunks(MAX_BATCH_CALLS) {
            self.client.batch(self.token(), chunk).await?;
        }
        Ok(())
    }

    /// Delete every message in the trash
    ///
    /// Lists one page of `in:trash` ids at a time, batch-deletes the page,
    /// and accumulates a running total until no further page exists.
    pub async fn empty_trash(&self) -> AppResult<u64> {
        let mut total_deleted: u64 = 0;
        let mut cursor: Option<String> = None;

        loop {
            let response = self
                .client
                .list_messages(
                    self.token(),
                    Some("in:trash"),
                    &[],
                    PROVIDER_PAGE_CAP,
                    cursor.as_deref(),
                )
                .await?;
            let messages = response.messages.unwrap_or_default();
            if messages.is_empty() {
                break;
            }

            let operations: Vec<BatchOperation> = messages
                .iter()
                .map(|message| BatchOperation {
                    method: BatchMethod::Delete,
                    path: format!("users/me/messages/{}", message.id),
                })
                .collect();
            for chunk in operations.chunks(MAX_BATCH_CALLS) {
                self.client.batch(self.token(), chunk).await?;
            }

            total_deleted += messages.len() as u64;
            cursor = response.next_page_token;
            if cursor.is_none() {
                break;
            }
        }

        debug!(total_deleted, "trash emptied");
        Ok(total_deleted)
    }

    /// Construct and submit an outgoing message
    ///
    /// The authenticated user is the sender. Fails `InvalidInput` for a body
    /// kind outside {plain, html} and `NotFound` for a missing attachment
    /// path.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        body_kind: BodyKind,
        attachment_paths: &[String],
    ) -> AppResult<MessageSummary> {
        let raw = mime::build_outgoing_message(
            &self.auth.user.email,
            to,
            subject,
            body,
            body_kind,
            attachment_paths,
        )?;
        let sent = self.client.send_message(self.token(), &raw).await?;
        Ok(MessageSummary {
            id: sent.id,
            thread_id: sent.thread_id,
            label_ids: sent.label_ids.unwrap_or_default(),
        })
    }

    /// List drafts
    pub async fn list_drafts(&self, max_results: Option<usize>) -> AppResult<Vec<DraftSummary>> {
        let listing = pagination::collect_pages(max_results, None, |cursor, page_size| async move {
            let response = self
                .client
                .list_drafts(self.token(), page_size, cursor.as_deref())
                .await?;
            Ok(Page {
                items: response.drafts.unwrap_or_default(),
                next_cursor: response.next_page_token,
            })
        })
        .await?;

        Ok(listing
            .items
            .into_iter()
            .map(|draft| DraftSummary {
                id: draft.id,
                message_id: draft.message.map(|message| message.id),
            })
            .collect())
    }

    /// Create a draft sharing the outgoing-message builder with `send`
    pub async fn create_draft(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        body_kind: BodyKind,
        attachment_paths: &[String],
    ) -> AppResult<String> {
        let raw = mime::build_outgoing_message(
            &self.auth.user.email,
            to,
            subject,
            body,
            body_kind,
            attachment_paths,
        )?;
        let draft = self.client.create_draft(self.token(), &raw).await?;
        Ok(draft.id)
    }

    /// Fetch one draft shaped like a message detail
    pub async fn get_draft(&self, draft_id: &str) -> AppResult<MessageDetail> {
        let draft = self.client.get_draft(self.token(), draft_id).await?;
        let message = draft.message.ok_or_else(|| {
            AppError::Provider(format!("draft {draft_id} carries no message"))
        })?;
        let message_id = message.id.clone();
        Ok(shape_detail(&message_id, &message))
    }

    /// Send an existing draft
    pub async fn send_draft(&self, draft_id: &str) -> AppResult<MessageSummary> {
        let sent = self.client.send_draft(self.token(), draft_id).await?;
        Ok(MessageSummary {
            id: sent.id,
            thread_id: sent.thread_id,
            label_ids: sent.label_ids.unwrap_or_default(),
        })
    }

    /// Delete a draft
    pub async fn delete_draft(&self, draft_id: &str) -> AppResult<()> {
        self.client.delete_draft(self.token(), draft_id).await
    }

    /// Assemble aggregate mailbox counts
    ///
    /// Six independent count queries run concurrently; any one failing
    /// degrades that field to zero rather than failing the whole call.
    pub async fn get_stats(&self) -> AppResult<MailStats> {
        let today = Local::now().date_naive();
        let today_q = today_query(today);
        let week_q = week_query(today);
        let month_q = month_query(today);
        let (today_count, week, month, unread, with_attachments, total) = futures::join!(
            self.count(Some(&today_q)),
            self.count(Some(&week_q)),
            self.count(Some(&month_q)),
            self.count(Some("is:unread")),
            self.count(Some("has:attachment")),
            self.count(None),
        );

        Ok(MailStats {
            today: today_count.unwrap_or(0),
            this_week: week.unwrap_or(0),
            this_month: month.unwrap_or(0),
            unread: unread.unwrap_or(0),
            with_attachments: with_attachments.unwrap_or(0),
            total: total.unwrap_or(0),
        })
    }

    /// Count messages matching a query via the result-size estimate field
    async fn count(&self, query: Option<&str>) -> AppResult<u64> {
        let response = self
            .client
            .list_messages(self.token(), query, &[], 1, None)
            .await?;
        Ok(response.result_size_estimate.unwrap_or(0))
    }
}

/// Shape a provider message into the caller-facing detail record
fn shape_detail(message_id: &str, message: &GmailMessage) -> MessageDetail {
    let payload = message.payload.clone().unwrap_or_default();
    let headers = payload.headers.as_deref().unwrap_or_default();
    let labels = message.label_ids.clone().unwrap_or_default();
    let starred = labels.iter().any(|label| label == "STARRED");

    MessageDetail {
        id: message_id.to_owned(),
        subject: header_or(headers, "subject", "no subject"),
        sender: header_or(headers, "from", "unknown sender"),
        recipients: header_or(headers, "to", "unknown recipients"),
        date: header_or(headers, "date", "unknown date"),
        body: mime::extract_text_body(&payload),
        snippet: message.snippet.clone().unwrap_or_default(),
        has_attachments: mime::has_attachment_filename(&payload),
        starred,
        labels,
    }
}

/// Header lookup by case-insensitive name with a fixed default
fn header_or(headers: &[Header], key: &str, default: &str) -> String {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(key))
        .map(|header| header.value.clone())
        .unwrap_or_else(|| default.to_owned())
}

/// Format a date in the provider's `YYYY/MM/DD` query format
fn provider_date(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// Messages after local midnight of the current date
fn today_query(today: NaiveDate) -> String {
    format!("after:{}", provider_date(today))
}

/// Messages after the most recent Monday
fn week_query(today: NaiveDate) -> String {
    let monday = today - ChronoDuration::days(i64::from(today.weekday().num_days_from_monday()));
    format!("after:{}", provider_date(monday))
}

/// Messages from day 1 of this month to day 1 of next month, exclusive
fn month_query(today: NaiveDate) -> String {
    let start = today.with_day(1).unwrap_or(today);
    let next = if start.month() == 12 {
        NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
    }
    .unwrap_or(start);
    format!("after:{} before:{}", provider_date(start), provider_date(next))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{
        body_string_contains, method, path, query_param, query_param_is_missing,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{MailService, month_query, today_query, week_query};
    use crate::config::Config;
    use crate::errors::AppError;
    use crate::gmail::GmailClient;
    use crate::mime::{BODY_UNAVAILABLE, BodyKind};
    use crate::models::UserProfile;
    use crate::session::AuthHandle;

    fn auth() -> AuthHandle {
        AuthHandle {
            user: UserProfile {
                id: "108".to_owned(),
                email: "user@example.com".to_owned(),
                name: "Test User".to_owned(),
            },
            access_token: "live-token".to_owned(),
        }
    }

    fn client(server: &MockServer) -> GmailClient {
        GmailClient::new(&Config::for_tests(&server.uri())).expect("client builds")
    }

    fn list_body(ids: &[&str], next: Option<&str>) -> serde_json::Value {
        let messages: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "threadId": format!("t-{id}")}))
            .collect();
        let mut body = serde_json::json!({"messages": messages, "resultSizeEstimate": ids.len()});
        if let Some(next) = next {
            body["nextPageToken"] = serde_json::json!(next);
        }
        body
    }

    #[tokio::test]
    async fn search_follows_cursors_and_caps_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "is:unread"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(list_body(&["m1", "m2"], Some("p2"))),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&["m3"], None)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let summaries = service
            .search("is:unread", Some(5))
            .await
            .expect("search succeeds");

        let ids: Vec<_> = summaries.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(summaries[0].thread_id.as_deref(), Some("t-m1"));
    }

    #[tokio::test]
    async fn search_truncates_overshoot_to_the_requested_max() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(list_body(&["m1", "m2", "m3", "m4"], None)),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let summaries = service.search("", Some(3)).await.expect("search succeeds");
        assert_eq!(summaries.len(), 3);
    }

    #[tokio::test]
    async fn get_detail_shapes_headers_body_and_flags() {
        let server = MockServer::start().await;
        let body_data = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            "The quarterly numbers are attached.",
        );
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/m42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m42",
                "threadId": "t42",
                "labelIds": ["INBOX", "STARRED"],
                "snippet": "The quarterly numbers...",
                "payload": {
                    "mimeType": "multipart/mixed",
                    "headers": [
                        {"name": "Subject", "value": "Q3 report"},
                        {"name": "From", "value": "alice@example.com"},
                        {"name": "Date", "value": "Tue, 5 Aug 2026 09:00:00 +0000"},
                    ],
                    "parts": [
                        {
                            "mimeType": "multipart/alternative",
                            "parts": [
                                {"mimeType": "text/plain", "body": {"data": body_data}},
                                {"mimeType": "text/html", "body": {"data": "PGI+aHRtbDwvYj4"}},
                            ],
                        },
                        {"mimeType": "application/pdf", "filename": "q3.pdf", "body": {"attachmentId": "att-1"}},
                    ],
                },
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let detail = service.get_detail("m42").await.expect("detail succeeds");

        assert_eq!(detail.subject, "Q3 report");
        assert_eq!(detail.sender, "alice@example.com");
        assert_eq!(detail.recipients, "unknown recipients");
        assert_eq!(detail.body, "The quarterly numbers are attached.");
        assert!(detail.has_attachments);
        assert!(detail.starred);
        assert_eq!(detail.labels, vec!["INBOX", "STARRED"]);
    }

    #[tokio::test]
    async fn detail_without_text_leaf_uses_the_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/m7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m7",
                "threadId": "t7",
                "payload": {"mimeType": "text/html", "parts": []},
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let detail = service.get_detail("m7").await.expect("detail succeeds");
        assert_eq!(detail.body, BODY_UNAVAILABLE);
        assert!(!detail.has_attachments);
    }

    #[tokio::test]
    async fn adding_250_labels_issues_three_batched_calls_and_no_removals() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_string_contains("addLabelIds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_string_contains("removeLabelIds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let add: Vec<String> = (0..250).map(|i| format!("Label_{i}")).collect();
        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        service
            .modify_labels("m1", &add, &[])
            .await
            .expect("modify succeeds");
    }

    #[tokio::test]
    async fn empty_trash_deletes_page_by_page_and_counts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "in:trash"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(list_body(&["d1", "d2"], Some("p2"))),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "in:trash"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&["d3"], None)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/batch/gmail/v1"))
            .and(body_string_contains("DELETE /gmail/v1/users/me/messages/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let deleted = service.empty_trash().await.expect("empty succeeds");
        assert_eq!(deleted, 3);
    }

    #[tokio::test]
    async fn batch_trash_splits_beyond_the_provider_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batch/gmail/v1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let ids: Vec<String> = (0..150).map(|i| format!("m{i}")).collect();
        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        service.batch_trash(&ids).await.expect("batch succeeds");
    }

    #[tokio::test]
    async fn send_submits_the_encoded_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/send"))
            .and(body_string_contains("\"raw\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sent-1", "threadId": "t-sent",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let sent = service
            .send(
                "bob@example.com",
                "Hello",
                "Just checking in.",
                BodyKind::Plain,
                &[],
            )
            .await
            .expect("send succeeds");
        assert_eq!(sent.id, "sent-1");
    }

    #[tokio::test]
    async fn send_with_missing_attachment_fails_before_any_provider_call() {
        let server = MockServer::start().await;
        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let err = service
            .send(
                "bob@example.com",
                "Hello",
                "body",
                BodyKind::Plain,
                &["/missing/file.pdf".to_owned()],
            )
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn stats_degrade_failed_sub_queries_to_zero() {
        let server = MockServer::start().await;
        let today = chrono::Local::now().date_naive();
        for query in [today_query(today), week_query(today), month_query(today)] {
            Mock::given(method("GET"))
                .and(path("/gmail/v1/users/me/messages"))
                .and(query_param("q", query.as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "resultSizeEstimate": 4,
                })))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "is:unread"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "has:attachment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultSizeEstimate": 2,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param_is_missing("q"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultSizeEstimate": 99,
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let stats = service.get_stats().await.expect("stats succeed");

        assert_eq!(stats.today, 4);
        assert_eq!(stats.this_week, 4);
        assert_eq!(stats.this_month, 4);
        assert_eq!(stats.unread, 0);
        assert_eq!(stats.with_attachments, 2);
        assert_eq!(stats.total, 99);
    }

    #[tokio::test]
    async fn resolve_label_id_scans_names_case_insensitively() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "labels": [
                    {"id": "INBOX", "name": "INBOX"},
                    {"id": "Label_3", "name": "Receipts"},
                ],
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        assert_eq!(
            service.resolve_label_id("receipts").await.unwrap(),
            "Label_3"
        );
        let err = service
            .resolve_label_id("Archivey")
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn thread_assembly_shapes_every_reply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m1", "threadId": "t1",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/threads/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "t1",
                "messages": [
                    {
                        "id": "m1",
                        "payload": {"headers": [
                            {"name": "Subject", "value": "Plans"},
                            {"name": "From", "value": "alice@example.com"},
                        ]},
                    },
                    {
                        "id": "m2",
                        "payload": {"headers": [
                            {"name": "Subject", "value": "Re: Plans"},
                            {"name": "From", "value": "bob@example.com"},
                        ]},
                    },
                ],
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let replies = service.get_message_thread("m1").await.expect("thread ok");

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1].from, "bob@example.com");
        assert_eq!(replies[0].date, "unknown date");
        assert_eq!(replies[0].body, BODY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn draft_listing_follows_cursors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/drafts"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "drafts": [{"id": "dr1", "message": {"id": "m1"}}],
                "nextPageToken": "p2",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/drafts"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "drafts": [{"id": "dr2"}],
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let drafts = service.list_drafts(Some(10)).await.expect("list succeeds");

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].message_id.as_deref(), Some("m1"));
        assert!(drafts[1].message_id.is_none());
    }

    #[tokio::test]
    async fn create_draft_wraps_the_envelope_in_a_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/drafts"))
            .and(body_string_contains("\"message\""))
            .and(body_string_contains("\"raw\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "dr9",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let draft_id = service
            .create_draft("bob@example.com", "Later", "draft body", BodyKind::Plain, &[])
            .await
            .expect("create succeeds");
        assert_eq!(draft_id, "dr9");
    }

    #[tokio::test]
    async fn label_crud_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/labels"))
            .and(body_string_contains("labelShow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "Label_5", "name": "Receipts",
                "labelListVisibility": "labelShow",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels/Label_5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "Label_5", "name": "Receipts", "messagesTotal": 12, "messagesUnread": 3,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/gmail/v1/users/me/labels/Label_5"))
            .and(body_string_contains("\"name\":\"Paperwork\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "Label_5", "name": "Paperwork",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/gmail/v1/users/me/labels/Label_5"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);

        let created = service
            .create_label("Receipts", None, None)
            .await
            .expect("create succeeds");
        assert_eq!(created.id, "Label_5");

        let fetched = service.get_label("Label_5").await.expect("get succeeds");
        assert_eq!(fetched.messages_total, Some(12));

        let updated = service
            .update_label("Label_5", Some("Paperwork"), None, None)
            .await
            .expect("update succeeds");
        assert_eq!(updated.name, "Paperwork");

        service
            .delete_label("Label_5")
            .await
            .expect("delete succeeds");
    }

    #[tokio::test]
    async fn trash_lifecycle_passes_through_and_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/untrash"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/gmail/v1/users/me/messages/m1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/batch/gmail/v1"))
            .and(body_string_contains("untrash"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);

        service.untrash("m1").await.expect("untrash succeeds");
        service
            .permanently_delete("m1")
            .await
            .expect("delete succeeds");
        service
            .batch_untrash(&["m2".to_owned(), "m3".to_owned()])
            .await
            .expect("batch succeeds");
    }

    #[tokio::test]
    async fn draft_lifecycle_shapes_sends_and_deletes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/drafts/dr1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "dr1",
                "message": {
                    "id": "m-draft",
                    "threadId": "t-draft",
                    "payload": {
                        "headers": [{"name": "Subject", "value": "Unfinished"}],
                    },
                },
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/drafts/send"))
            .and(body_string_contains("dr1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m-sent", "threadId": "t-draft",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/gmail/v1/users/me/drafts/dr1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);

        let detail = service.get_draft("dr1").await.expect("get succeeds");
        assert_eq!(detail.id, "m-draft");
        assert_eq!(detail.subject, "Unfinished");
        assert_eq!(detail.body, BODY_UNAVAILABLE);

        let sent = service.send_draft("dr1").await.expect("send succeeds");
        assert_eq!(sent.id, "m-sent");

        service.delete_draft("dr1").await.expect("delete succeeds");
    }

    #[tokio::test]
    async fn thread_search_follows_cursors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/threads"))
            .and(query_param("q", "project"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "threads": [{"id": "t1", "snippet": "first"}],
                "nextPageToken": "p2",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/threads"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "threads": [{"id": "t2"}],
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let auth = auth();
        let service = MailService::new(&client, &auth);
        let threads = service
            .search_threads("project", Some(5))
            .await
            .expect("search succeeds");

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].snippet.as_deref(), Some("first"));
        assert!(threads[1].snippet.is_none());
    }

    #[test]
    fn week_query_reaches_back_to_monday() {
        // 2026-08-05 is a Wednesday; the most recent Monday is 08-03.
        let wednesday = chrono::NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        assert_eq!(week_query(wednesday), "after:2026/08/03");

        let monday = chrono::NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert_eq!(week_query(monday), "after:2026/08/03");
    }

    #[test]
    fn month_query_bounds_the_calendar_month() {
        let mid = chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap();
        assert_eq!(month_query(mid), "after:2026/08/01 before:2026/09/01");

        let december = chrono::NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        assert_eq!(month_query(december), "after:2026/12/01 before:2027/01/01");
    }

    #[test]
    fn today_query_uses_the_provider_date_format() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();
        assert_eq!(today_query(date), "after:2026/01/09");
    }
}
