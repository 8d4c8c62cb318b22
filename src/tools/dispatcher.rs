//! Tool-call dispatcher
//!
//! Maps an inbound call's name to a registered async handler and produces a
//! [`ToolResponse`] tagged with the originating call id. A failing or
//! unknown tool never fails the batch and never terminates the session;
//! both cases come back as literal failure strings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::capabilities::Capabilities;
use crate::state::{MediaContent, SharedState};
use crate::Result;

/// Result string for a call whose name has no registered handler
const UNRECOGNIZED_RESULT: &str = "Tool not recognized.";

/// Result string for a handler that returned an error
const EXECUTION_ERROR_RESULT: &str = "Error executing tool.";

/// A structured function invocation received from the remote side
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Correlation id; echoed verbatim in the response
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The answer to one [`ToolCall`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub result: String,
}

/// An asynchronous tool implementation
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool; the returned string is reported back to the model
    async fn call(&self, args: Value) -> Result<String>;
}

/// Registry of named tool handlers
pub struct ToolDispatcher {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolDispatcher {
    /// Create an empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Create a dispatcher with the built-in tools wired to the injected
    /// host capabilities
    #[must_use]
    pub fn with_capabilities(
        capabilities: Arc<dyn Capabilities>,
        shared: Arc<SharedState>,
    ) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(
            "manageTasks",
            Arc::new(TaskTool {
                capabilities: Arc::clone(&capabilities),
            }),
        );
        dispatcher.register(
            "manageReminders",
            Arc::new(ReminderTool {
                capabilities: Arc::clone(&capabilities),
            }),
        );
        dispatcher.register(
            "manageNotes",
            Arc::new(NoteTool {
                capabilities: Arc::clone(&capabilities),
            }),
        );
        dispatcher.register(
            "logMood",
            Arc::new(MoodTool {
                capabilities: Arc::clone(&capabilities),
            }),
        );
        dispatcher.register(
            "updateDisplay",
            Arc::new(DisplayTool {
                capabilities: Arc::clone(&capabilities),
                shared,
            }),
        );
        dispatcher.register("musicControl", Arc::new(MusicTool { capabilities }));
        dispatcher
    }

    /// Register (or replace) a handler under a tool name
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Execute one call and produce its response
    ///
    /// Never errors: unknown names and handler failures are reported as
    /// literal result strings with the call's id and name echoed back.
    pub async fn dispatch(&self, call: ToolCall) -> ToolResponse {
        let Some(handler) = self.handlers.get(&call.name) else {
            tracing::warn!(name = %call.name, id = %call.id, "unrecognized tool call");
            return ToolResponse {
                id: call.id,
                name: call.name,
                result: UNRECOGNIZED_RESULT.to_string(),
            };
        };

        let result = match handler.call(call.args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(name = %call.name, id = %call.id, error = %e, "tool execution failed");
                EXECUTION_ERROR_RESULT.to_string()
            }
        };

        ToolResponse {
            id: call.id,
            name: call.name,
            result,
        }
    }
}

// ── Built-in handlers ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskArgs {
    action: String,
    #[serde(default)]
    task_title: Option<String>,
    #[serde(default)]
    task_search_term: Option<String>,
}

struct TaskTool {
    capabilities: Arc<dyn Capabilities>,
}

#[async_trait]
impl ToolHandler for TaskTool {
    async fn call(&self, args: Value) -> Result<String> {
        let args: TaskArgs = serde_json::from_value(args)?;
        self.capabilities
            .task_action(
                &args.action,
                args.task_title.as_deref(),
                args.task_search_term.as_deref(),
            )
            .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReminderArgs {
    action: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    search_term: Option<String>,
}

struct ReminderTool {
    capabilities: Arc<dyn Capabilities>,
}

#[async_trait]
impl ToolHandler for ReminderTool {
    async fn call(&self, args: Value) -> Result<String> {
        let args: ReminderArgs = serde_json::from_value(args)?;
        self.capabilities
            .reminder_action(
                &args.action,
                args.title.as_deref(),
                args.search_term.as_deref(),
            )
            .await
    }
}

#[derive(Debug, Deserialize)]
struct NoteArgs {
    action: String,
    #[serde(default)]
    content: Option<String>,
}

struct NoteTool {
    capabilities: Arc<dyn Capabilities>,
}

#[async_trait]
impl ToolHandler for NoteTool {
    async fn call(&self, args: Value) -> Result<String> {
        let args: NoteArgs = serde_json::from_value(args)?;
        self.capabilities
            .note_action(&args.action, args.content.as_deref())
            .await
    }
}

#[derive(Debug, Deserialize)]
struct MoodArgs {
    score: f64,
    #[serde(default)]
    notes: Option<String>,
}

struct MoodTool {
    capabilities: Arc<dyn Capabilities>,
}

#[async_trait]
impl ToolHandler for MoodTool {
    async fn call(&self, args: Value) -> Result<String> {
        let args: MoodArgs = serde_json::from_value(args)?;
        // The model occasionally sends fractional scores
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let score = args.score.round().clamp(1.0, 5.0) as u8;
        self.capabilities.log_mood(score, args.notes.as_deref()).await
    }
}

struct DisplayTool {
    capabilities: Arc<dyn Capabilities>,
    shared: Arc<SharedState>,
}

#[async_trait]
impl ToolHandler for DisplayTool {
    async fn call(&self, args: Value) -> Result<String> {
        let content: MediaContent = serde_json::from_value(args)?;
        self.shared.set_display(Some(content.clone()));
        self.capabilities.display_updated(&content);
        Ok("Display updated.".to_string())
    }
}

struct MusicTool {
    capabilities: Arc<dyn Capabilities>,
}

#[async_trait]
impl ToolHandler for MusicTool {
    async fn call(&self, args: Value) -> Result<String> {
        let outcome = self.capabilities.music_action(&args).await?;
        let message = outcome
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| outcome.to_string(), ToString::to_string);
        self.capabilities.music_result(&outcome);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MediaKind;
    use crate::Error;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FailingHandler;

    #[async_trait]
    impl ToolHandler for FailingHandler {
        async fn call(&self, _args: Value) -> Result<String> {
            Err(Error::Tool("backend unavailable".to_string()))
        }
    }

    struct SlowEcho(u64);

    #[async_trait]
    impl ToolHandler for SlowEcho {
        async fn call(&self, args: Value) -> Result<String> {
            tokio::time::sleep(Duration::from_millis(self.0)).await;
            Ok(args["word"].as_str().unwrap_or("?").to_string())
        }
    }

    #[derive(Default)]
    struct RecordingCapabilities {
        moods: Mutex<Vec<(u8, Option<String>)>>,
        music_results: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Capabilities for RecordingCapabilities {
        async fn task_action(
            &self,
            action: &str,
            title: Option<&str>,
            _search_term: Option<&str>,
        ) -> Result<String> {
            assert_eq!(action, "create");
            Ok(format!("Task \"{}\" created.", title.unwrap_or("")))
        }

        async fn reminder_action(
            &self,
            _action: &str,
            _title: Option<&str>,
            _search_term: Option<&str>,
        ) -> Result<String> {
            Ok("Reminder updated.".to_string())
        }

        async fn note_action(&self, _action: &str, _content: Option<&str>) -> Result<String> {
            Ok("Note saved.".to_string())
        }

        async fn log_mood(&self, score: u8, notes: Option<&str>) -> Result<String> {
            self.moods
                .lock()
                .unwrap()
                .push((score, notes.map(ToString::to_string)));
            Ok("Mood logged.".to_string())
        }

        async fn music_action(&self, args: &Value) -> Result<Value> {
            Ok(json!({"message": format!("Playing {}", args["query"].as_str().unwrap_or("?")), "uri": "track:1"}))
        }

        fn music_result(&self, result: &Value) {
            self.music_results.lock().unwrap().push(result.clone());
        }
    }

    fn dispatcher_with_recording() -> (ToolDispatcher, Arc<RecordingCapabilities>, Arc<SharedState>)
    {
        let capabilities = Arc::new(RecordingCapabilities::default());
        let shared = Arc::new(SharedState::default());
        let dispatcher = ToolDispatcher::with_capabilities(
            Arc::clone(&capabilities) as Arc<dyn Capabilities>,
            Arc::clone(&shared),
        );
        (dispatcher, capabilities, shared)
    }

    #[tokio::test]
    async fn unknown_tool_returns_not_recognized() {
        let dispatcher = ToolDispatcher::new();
        let response = dispatcher
            .dispatch(ToolCall {
                id: "c1".into(),
                name: "definitelyNotATool".into(),
                args: json!({}),
            })
            .await;

        assert_eq!(response.id, "c1");
        assert_eq!(response.name, "definitelyNotATool");
        assert_eq!(response.result, "Tool not recognized.");
    }

    #[tokio::test]
    async fn failing_handler_returns_error_string_with_correlation() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register("broken", Arc::new(FailingHandler));

        let response = dispatcher
            .dispatch(ToolCall {
                id: "c2".into(),
                name: "broken".into(),
                args: json!({"x": 1}),
            })
            .await;

        assert_eq!(response.id, "c2");
        assert_eq!(response.name, "broken");
        assert_eq!(response.result, "Error executing tool.");
    }

    #[tokio::test]
    async fn task_create_routes_to_capabilities() {
        let (dispatcher, _, _) = dispatcher_with_recording();
        let response = dispatcher
            .dispatch(ToolCall {
                id: "c3".into(),
                name: "manageTasks".into(),
                args: json!({"action": "create", "taskTitle": "Buy milk"}),
            })
            .await;

        assert_eq!(response.result, "Task \"Buy milk\" created.");
        assert_eq!(response.id, "c3");
    }

    #[tokio::test]
    async fn malformed_args_become_execution_error() {
        let (dispatcher, _, _) = dispatcher_with_recording();
        let response = dispatcher
            .dispatch(ToolCall {
                id: "c4".into(),
                name: "manageTasks".into(),
                args: json!({"taskTitle": "missing action"}),
            })
            .await;

        assert_eq!(response.result, "Error executing tool.");
    }

    #[tokio::test]
    async fn mood_score_is_rounded_and_clamped() {
        let (dispatcher, capabilities, _) = dispatcher_with_recording();

        for (sent, expected) in [(json!(3.6), 4u8), (json!(11), 5), (json!(0), 1)] {
            dispatcher
                .dispatch(ToolCall {
                    id: "m".into(),
                    name: "logMood".into(),
                    args: json!({"score": sent}),
                })
                .await;
            let last = capabilities.moods.lock().unwrap().last().unwrap().clone();
            assert_eq!(last.0, expected);
        }
    }

    #[tokio::test]
    async fn update_display_sets_current_display() {
        let (dispatcher, _, shared) = dispatcher_with_recording();
        let response = dispatcher
            .dispatch(ToolCall {
                id: "d1".into(),
                name: "updateDisplay".into(),
                args: json!({"type": "image", "url": "https://img", "title": "A cat"}),
            })
            .await;

        assert_eq!(response.result, "Display updated.");
        let display = shared.current_display().unwrap();
        assert_eq!(display.kind, MediaKind::Image);
        assert_eq!(display.url.as_deref(), Some("https://img"));
    }

    #[tokio::test]
    async fn music_control_reports_message_and_fires_result_callback() {
        let (dispatcher, capabilities, _) = dispatcher_with_recording();
        let response = dispatcher
            .dispatch(ToolCall {
                id: "s1".into(),
                name: "musicControl".into(),
                args: json!({"action": "search", "query": "lofi"}),
            })
            .await;

        assert_eq!(response.result, "Playing lofi");
        let results = capabilities.music_results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["uri"], "track:1");
    }

    #[tokio::test]
    async fn batch_calls_resolve_independently_with_id_correlation() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register("echo", Arc::new(SlowEcho(30)));
        dispatcher.register("fastEcho", Arc::new(SlowEcho(1)));
        let dispatcher = Arc::new(dispatcher);

        let slow = tokio::spawn({
            let d = Arc::clone(&dispatcher);
            async move {
                d.dispatch(ToolCall {
                    id: "slow".into(),
                    name: "echo".into(),
                    args: json!({"word": "tortoise"}),
                })
                .await
            }
        });
        let fast = tokio::spawn({
            let d = Arc::clone(&dispatcher);
            async move {
                d.dispatch(ToolCall {
                    id: "fast".into(),
                    name: "fastEcho".into(),
                    args: json!({"word": "hare"}),
                })
                .await
            }
        });

        let (slow, fast) = (slow.await.unwrap(), fast.await.unwrap());
        assert_eq!(slow.id, "slow");
        assert_eq!(slow.result, "tortoise");
        assert_eq!(fast.id, "fast");
        assert_eq!(fast.result, "hare");
    }
}
