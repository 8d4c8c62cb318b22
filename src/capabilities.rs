//! Host-application capability callbacks
//!
//! The engine never persists tasks, reminders, notes, or mood entries
//! itself; the hosting application injects an implementation of
//! [`Capabilities`] and the tool dispatcher routes remote tool calls into
//! it. Handler return values are the natural-language strings reported back
//! to the remote model, not the mutation results.

use async_trait::async_trait;
use serde_json::Value;

use crate::state::MediaContent;
use crate::Result;

/// Callbacks owned by the hosting application
///
/// All async methods may be invoked concurrently; the dispatcher does not
/// serialize calls within a batch.
#[async_trait]
pub trait Capabilities: Send + Sync {
    /// Apply a task action (`create`, `complete`, `delete`)
    async fn task_action(
        &self,
        action: &str,
        title: Option<&str>,
        search_term: Option<&str>,
    ) -> Result<String>;

    /// Apply a reminder action (`create`, `complete`, `delete`)
    async fn reminder_action(
        &self,
        action: &str,
        title: Option<&str>,
        search_term: Option<&str>,
    ) -> Result<String>;

    /// Apply a note action (`create`, `delete`)
    async fn note_action(&self, action: &str, content: Option<&str>) -> Result<String>;

    /// Log a mood entry; `score` is 1 (terrible) to 5 (amazing)
    async fn log_mood(&self, score: u8, notes: Option<&str>) -> Result<String>;

    /// The remote side changed the current display; fire-and-forget UI hook
    fn display_updated(&self, content: &MediaContent) {
        let _ = content;
    }

    /// Execute a music/external-service action with opaque arguments,
    /// returning an opaque result object (by convention containing a
    /// `message` string for the model)
    async fn music_action(&self, args: &Value) -> Result<Value>;

    /// Receive the opaque result of a music/external action; fire-and-forget
    /// UI hook
    fn music_result(&self, result: &Value) {
        let _ = result;
    }
}
