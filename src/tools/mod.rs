//! Tool-call dispatch and the outbound tool catalog
//!
//! The remote model issues structured function invocations; the dispatcher
//! routes them to locally registered async handlers and correlates each
//! response by call id.

mod catalog;
mod dispatcher;

pub use catalog::catalog;
pub use dispatcher::{ToolCall, ToolDispatcher, ToolHandler, ToolResponse};
