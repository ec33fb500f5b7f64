//! Core session logic for ollmcp.
//!
//! This crate ties the model provider to the MCP server registry:
//! - The chat session and its tool loop
//! - Per-tool visibility and the index-based selector
//! - Human-in-the-loop approval of tool calls
//! - Generation parameters
//! - Saved settings profiles

pub mod approval;
pub mod config;
pub mod error;
pub mod selection;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod visibility;

pub use approval::{ApprovalDecision, ApprovalGate, AutoApprove, Reviewer, ScriptedReviewer};
pub use config::GenerationConfig;
pub use error::{ConfigError, CoreError, CoreResult};
pub use selection::{Action, Layout, Selection};
pub use session::{
    HistorySummary, ModelSession, NoopObserver, ReloadReport, SessionFlags, SessionObserver,
    SessionState, TurnResult,
};
pub use snapshot::ConfigSnapshot;
pub use store::ConfigStore;
pub use visibility::{ServerState, ToolVisibility};
