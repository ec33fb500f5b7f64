//! Human-in-the-loop approval of tool calls.

use async_trait::async_trait;
use ollmcp_mcp::ToolId;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Reviewer verdict on a proposed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Run the call.
    Approve,
    /// Skip the call.
    Deny,
    /// Run the call and stop asking for the rest of the session.
    DisableGate,
}

impl ApprovalDecision {
    /// Whether the call should run.
    pub fn approves(self) -> bool {
        !matches!(self, ApprovalDecision::Deny)
    }
}

/// Something that decides on tool calls, usually a person at a terminal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, tool: &ToolId, arguments: &Value) -> ApprovalDecision;
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl Reviewer for AutoApprove {
    async fn review(&self, _tool: &ToolId, _arguments: &Value) -> ApprovalDecision {
        ApprovalDecision::Approve
    }
}

/// Replays a fixed list of decisions, then falls back to approving.
#[derive(Debug, Default)]
pub struct ScriptedReviewer {
    decisions: Mutex<VecDeque<ApprovalDecision>>,
    asked: Mutex<Vec<ToolId>>,
}

impl ScriptedReviewer {
    pub fn new(decisions: impl IntoIterator<Item = ApprovalDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Tools the reviewer was asked about, in order.
    pub fn asked(&self) -> Vec<ToolId> {
        self.asked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn review(&self, tool: &ToolId, _arguments: &Value) -> ApprovalDecision {
        self.asked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tool.clone());
        self.decisions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or(ApprovalDecision::Approve)
    }
}

/// Gate every tool call passes through before it runs.
pub struct ApprovalGate {
    enabled: bool,
    reviewer: Arc<dyn Reviewer>,
}

impl ApprovalGate {
    /// An enabled gate asking `reviewer`.
    pub fn new(reviewer: Arc<dyn Reviewer>) -> Self {
        Self {
            enabled: true,
            reviewer,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Flip the gate; returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Decide on one call. A disabled gate approves without asking.
    pub async fn review(&mut self, tool: &ToolId, arguments: &Value) -> ApprovalDecision {
        if !self.enabled {
            return ApprovalDecision::Approve;
        }

        let decision = self.reviewer.review(tool, arguments).await;
        if decision == ApprovalDecision::DisableGate {
            info!(tool = %tool, "Tool approval disabled for the rest of the session");
            self.enabled = false;
        }
        decision
    }
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
