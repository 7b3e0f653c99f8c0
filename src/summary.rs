use std::fmt;

use crate::entity::SessionId;
use crate::media::MediaFailureKind;
use crate::transport::QualityLevel;

/// Why the session reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The user hung up.
    UserEnded,
    /// Local capture could not be acquired.
    MediaFailure(MediaFailureKind),
    /// The remote stream could not be attached.
    ConnectionFailed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::UserEnded => write!(f, "user_ended"),
            TerminationReason::MediaFailure(kind) => write!(f, "media_failure/{kind}"),
            TerminationReason::ConnectionFailed => write!(f, "connection_failed"),
        }
    }
}

/// The one analytics record a finished session produces.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallSummary {
    pub session_id: SessionId,
    pub duration_secs: u64,
    pub termination_reason: TerminationReason,
    pub gifts_sent: u64,
    pub points_spent: u64,
    pub final_quality: QualityLevel,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write summary: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode summary: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where finished-call summaries go. A failing sink is logged, never fatal
/// to the session that produced the summary.
pub trait AnalyticsSink: Send + 'static {
    fn record(&mut self, summary: &CallSummary)
    -> impl Future<Output = Result<(), SinkError>> + Send;
}
