//! Chat facade and tool dispatch
//!
//! The assistant's action surface is a closed set of tool commands with a
//! fixed dispatch table, so it is statically enumerable and testable
//! independent of any specific agent runtime. The runtime itself (the thing
//! that reads free text and picks tools) sits behind [`AgentRuntime`]; the
//! shipped implementation speaks the OpenAI-compatible chat-completions
//! tool-calling protocol.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{AgentConfig, Config};
use crate::errors::{AppError, AppResult};
use crate::models::{MessageIdInput, SearchMessagesInput};
use crate::service::MailService;

/// System prompt given to the agent runtime
const SYSTEM_PROMPT: &str = "You are a helpful mail assistant. You manage the \
user's mailbox with the available tools.\n\
\n\
Capabilities: search messages with the provider's query syntax, view message \
details, list labels, move messages to the trash, and report mailbox \
statistics.\n\
\n\
Guidelines: confirm before destructive actions; when asked to delete \
messages, search first and show what would be affected. Query syntax \
examples: from:alice@example.com, subject:meeting, is:unread, \
has:attachment, after:2024/01/01.";

/// Characters of message body included in the detail tool output
const DETAIL_BODY_PREVIEW_CHARS: usize = 500;

/// Closed set of assistant actions
///
/// Mirrors the fixed tool list: anything the assistant can do to the mailbox
/// is one of these variants.
#[derive(Debug, Clone)]
pub enum ToolCommand {
    /// Search messages and summarize the first matches
    SearchMessages(SearchMessagesInput),
    /// Fetch one message's shaped detail
    GetMessageDetail(MessageIdInput),
    /// List available label names
    ListLabels,
    /// Move one message to the trash
    TrashMessage(MessageIdInput),
    /// Report aggregate mailbox counts
    GetMailStats,
}

impl ToolCommand {
    /// Fixed dispatch table from runtime-chosen names to commands
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for names outside the catalog or arguments
    /// that fail schema-shaped deserialization.
    pub fn parse(name: &str, arguments: &Value) -> AppResult<Self> {
        match name {
            "search_messages" => Ok(Self::SearchMessages(parse_args(name, arguments)?)),
            "get_message_detail" => Ok(Self::GetMessageDetail(parse_args(name, arguments)?)),
            "list_labels" => Ok(Self::ListLabels),
            "trash_message" => Ok(Self::TrashMessage(parse_args(name, arguments)?)),
            "get_mail_stats" => Ok(Self::GetMailStats),
            other => Err(AppError::invalid(format!("unknown tool '{other}'"))),
        }
    }

    /// Catalog name of this command
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchMessages(_) => "search_messages",
            Self::GetMessageDetail(_) => "get_message_detail",
            Self::ListLabels => "list_labels",
            Self::TrashMessage(_) => "trash_message",
            Self::GetMailStats => "get_mail_stats",
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(name: &str, arguments: &Value) -> AppResult<T> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| AppError::invalid(format!("invalid arguments for tool '{name}': {e}")))
}

/// One entry of the tool catalog shown to the runtime
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Catalog name, matched by [`ToolCommand::parse`]
    pub name: &'static str,
    /// Natural-language description for tool selection
    pub description: &'static str,
    /// JSON schema of the arguments
    pub parameters: Value,
}

/// The full tool catalog
///
/// Parameter schemas are generated from the input types so the catalog and
/// the dispatch table cannot drift apart.
pub fn tool_catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "search_messages",
            description: "Search messages with the provider query syntax and summarize matches",
            parameters: schema_of::<SearchMessagesInput>(),
        },
        ToolSpec {
            name: "get_message_detail",
            description: "Get subject, sender, date, and body of one message",
            parameters: schema_of::<MessageIdInput>(),
        },
        ToolSpec {
            name: "list_labels",
            description: "List available label names",
            parameters: empty_object_schema(),
        },
        ToolSpec {
            name: "trash_message",
            description: "Move one message to the trash",
            parameters: schema_of::<MessageIdInput>(),
        },
        ToolSpec {
            name: "get_mail_stats",
            description: "Report aggregate mailbox statistics",
            parameters: empty_object_schema(),
        },
    ]
}

fn schema_of<T: schemars::JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| empty_object_schema())
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Execute one command and render its outcome as tool output text
///
/// Operation failures become readable error lines rather than aborting the
/// chat, so the runtime can read them and recover or report.
pub async fn execute(service: &MailService<'_>, command: ToolCommand) -> String {
    match command {
        ToolCommand::SearchMessages(input) => {
            match service.search(&input.query, Some(input.max_results)).await {
                Ok(summaries) if summaries.is_empty() => {
                    format!("no messages found matching query: {}", input.query)
                }
                Ok(summaries) => {
                    let mut lines = Vec::with_capacity(summaries.len());
                    for summary in &summaries {
                        match service.get_detail(&summary.id).await {
                            Ok(detail) => lines.push(format!(
                                "id: {}, subject: {}, from: {}, date: {}",
                                summary.id, detail.subject, detail.sender, detail.date
                            )),
                            Err(e) => lines.push(format!("id: {}, error: {e}", summary.id)),
                        }
                    }
                    lines.join("\n")
                }
                Err(e) => format!("error searching messages: {e}"),
            }
        }
        ToolCommand::GetMessageDetail(input) => {
            match service.get_detail(&input.message_id).await {
                Ok(detail) => {
                    let preview: String =
                        detail.body.chars().take(DETAIL_BODY_PREVIEW_CHARS).collect();
                    format!(
                        "subject: {}\nfrom: {}\ndate: {}\nbody: {preview}...",
                        detail.subject, detail.sender, detail.date
                    )
                }
                Err(e) => format!("error getting message details: {e}"),
            }
        }
        ToolCommand::ListLabels => match service.list_labels().await {
            Ok(labels) => {
                let names: Vec<String> = labels.into_iter().map(|label| label.name).collect();
                format!("available labels: {}", names.join(", "))
            }
            Err(e) => format!("error listing labels: {e}"),
        },
        ToolCommand::TrashMessage(input) => match service.trash(&input.message_id).await {
            Ok(()) => format!("message {} moved to trash", input.message_id),
            Err(e) => format!("failed to trash message {}: {e}", input.message_id),
        },
        ToolCommand::GetMailStats => match service.get_stats().await {
            Ok(stats) => format!(
                "Mailbox statistics:\nTotal messages: {}\nUnread: {}\nToday: {}\nThis week: {}\nThis month: {}\nWith attachments: {}",
                stats.total,
                stats.unread,
                stats.today,
                stats.this_week,
                stats.this_month,
                stats.with_attachments
            ),
            Err(e) => format!("error getting mailbox statistics: {e}"),
        },
    }
}

/// One tool invocation requested by the runtime
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Runtime-assigned call id, echoed back in the tool result
    pub id: String,
    /// Catalog name of the requested tool
    pub name: String,
    /// JSON arguments
    pub arguments: Value,
}

/// One runtime decision
#[derive(Debug, Clone)]
pub enum AgentStep {
    /// The runtime wants tools executed before continuing
    ToolCalls {
        /// The runtime's own message, appended verbatim to the transcript
        /// so tool results pair with their call ids
        assistant_message: Value,
        /// Requested invocations, in order
        calls: Vec<ToolInvocation>,
    },
    /// The runtime produced its final response
    Finish {
        /// Free-text response for the user
        response: String,
    },
}

/// External tool-calling agent runtime
///
/// Given the transcript so far and the tool catalog, decides the next step.
/// Implementations are free to ignore the catalog, but anything they request
/// outside it is rejected by the dispatch table.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Decide the next step for the conversation
    async fn next_step(&self, messages: &[Value], tools: &[ToolSpec]) -> AppResult<AgentStep>;
}

/// Result of one chat request
#[derive(Debug)]
pub struct ChatOutcome {
    /// Final free-text response
    pub response: String,
    /// Name of the last tool executed, when any
    pub action_taken: Option<String>,
}

/// Drive the runtime/tool loop for one user message
///
/// Each round asks the runtime for a step; tool calls are parsed through the
/// dispatch table, executed against the mail service, and appended to the
/// transcript. The loop stops at the runtime's final response or after
/// `max_iterations` rounds.
pub async fn run_chat(
    runtime: &dyn AgentRuntime,
    service: &MailService<'_>,
    user_message: &str,
    max_iterations: usize,
) -> AppResult<ChatOutcome> {
    let mut messages = vec![
        json!({ "role": "system", "content": SYSTEM_PROMPT }),
        json!({ "role": "user", "content": user_message }),
    ];
    let tools = tool_catalog();
    let mut action_taken = None;

    for iteration in 0..max_iterations {
        match runtime.next_step(&messages, &tools).await? {
            AgentStep::Finish { response } => {
                debug!(iteration, "chat finished");
                return Ok(ChatOutcome {
                    response,
                    action_taken,
                });
            }
            AgentStep::ToolCalls {
                assistant_message,
                calls,
            } => {
                messages.push(assistant_message);
                for call in calls {
                    let output = match ToolCommand::parse(&call.name, &call.arguments) {
                        Ok(command) => {
                            action_taken = Some(command.name().to_owned());
                            execute(service, command).await
                        }
                        Err(e) => format!("error: {e}"),
                    };
                    debug!(tool = %call.name, "tool executed");
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": call.id,
                        "content": output,
                    }));
                }
            }
        }
    }

    Ok(ChatOutcome {
        response: "the request could not be completed within the allowed number of steps"
            .to_owned(),
        action_taken,
    })
}

/// OpenAI-compatible chat-completions runtime
pub struct HttpAgentRuntime {
    http: reqwest::Client,
    agent: AgentConfig,
}

impl HttpAgentRuntime {
    /// Build the runtime when agent configuration is present
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> AppResult<Option<Self>> {
        let Some(agent) = config.agent.clone() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Some(Self { http, agent }))
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn next_step(&self, messages: &[Value], tools: &[ToolSpec]) -> AppResult<AgentStep> {
        let tool_payload: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    },
                })
            })
            .collect();
        let body = json!({
            "model": self.agent.model,
            "messages": messages,
            "tools": tool_payload,
            "tool_choice": "auto",
        });

        let url = format!(
            "{}/chat/completions",
            self.agent.base_url.trim_end_matches('/')
        );
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.agent.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "agent runtime failed: HTTP {status} - {body}"
            )));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("agent runtime returned malformed JSON: {e}")))?;

        let message = payload
            .pointer("/choices/0/message")
            .cloned()
            .ok_or_else(|| {
                AppError::Provider("agent runtime response is missing a message".to_owned())
            })?;

        let tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if tool_calls.is_empty() {
            let response = message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            return Ok(AgentStep::Finish { response });
        }

        let mut calls = Vec::with_capacity(tool_calls.len());
        for call in &tool_calls {
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned();
            let name = call
                .pointer("/function/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let arguments = match call.pointer("/function/arguments") {
                Some(Value::String(raw)) => serde_json::from_str(raw)
                    .unwrap_or_else(|_| json!({})),
                Some(value) => value.clone(),
                None => json!({}),
            };
            calls.push(ToolInvocation {
                id,
                name,
                arguments,
            });
        }

        Ok(AgentStep::ToolCalls {
            assistant_message: message,
            calls,
        })
    }
}
