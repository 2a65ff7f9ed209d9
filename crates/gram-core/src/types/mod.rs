//! Shared core types used across the deployment, processing and HTTP layers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller identity resolved by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: String,
    pub organization_id: String,
    /// Active project; operations fail with `Unauthorized` when absent.
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

/// Deployment lifecycle status.
///
/// `created → pending → {completed, failed}`; terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Created,
    Pending,
    Completed,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Created => "created",
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Completed | DeploymentStatus::Failed)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag attached to every deployment log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "deployment:created")]
    Created,
    #[serde(rename = "deployment:pending")]
    Pending,
    #[serde(rename = "deployment:completed")]
    Completed,
    #[serde(rename = "deployment:failed")]
    Failed,
    #[serde(rename = "deployment:error")]
    Error,
    #[serde(rename = "deployment:warning")]
    Warning,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "deployment:created",
            EventKind::Pending => "deployment:pending",
            EventKind::Completed => "deployment:completed",
            EventKind::Failed => "deployment:failed",
            EventKind::Error => "deployment:error",
            EventKind::Warning => "deployment:warning",
        }
    }

    /// Status set by a transition event, `None` for log-only events.
    pub fn transition(&self) -> Option<DeploymentStatus> {
        match self {
            EventKind::Created => Some(DeploymentStatus::Created),
            EventKind::Pending => Some(DeploymentStatus::Pending),
            EventKind::Completed => Some(DeploymentStatus::Completed),
            EventKind::Failed => Some(DeploymentStatus::Failed),
            EventKind::Error | EventKind::Warning => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a client asks the user before calling a tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMode {
    #[default]
    Always,
    Never,
    Session,
}

impl ConfirmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmMode::Always => "always",
            ConfirmMode::Never => "never",
            ConfirmMode::Session => "session",
        }
    }

    /// Case-insensitive parse; `None` for unknown modes.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "always" => Some(ConfirmMode::Always),
            "never" => Some(ConfirmMode::Never),
            "session" => Some(ConfirmMode::Session),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfirmMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a non-fatal extraction finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A finding reported by an extractor that does not abort the attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
        }
    }

    pub fn event_kind(&self) -> EventKind {
        match self.level {
            DiagnosticLevel::Error => EventKind::Error,
            DiagnosticLevel::Warning => EventKind::Warning,
        }
    }
}
