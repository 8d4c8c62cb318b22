//! Voxlink - Real-time voice session engine
//!
//! This library drives a full-duplex spoken conversation with a remote
//! conversational AI service:
//! - Microphone capture, PCM encoding and live streaming
//! - Gapless scheduling and playback of synthesized speech
//! - Bidirectional tool calls routed into host-injected capabilities
//! - A small session state machine with shared, UI-friendly signals
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Hosting application                  │
//! │   Capabilities impl  │  status / loudness / gain    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              SessionController                       │
//! │   Capture  │  Playback  │  Tool dispatch  │  State  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ duplex WebSocket
//! ┌────────────────────▼────────────────────────────────┐
//! │          Conversational AI service                   │
//! │   Speech in/out  │  Tool calls  │  Grounding        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod capabilities;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod playback;
pub mod session;
pub mod state;
pub mod tools;
pub mod transport;

pub use capabilities::Capabilities;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use session::SessionController;
pub use state::{GroundingSource, MediaContent, MediaKind, SharedState, Status};
pub use tools::{ToolCall, ToolDispatcher, ToolHandler, ToolResponse};
