use crate::catalog::AnimationProfile;
use crate::entity::GiftId;
use crate::media::MediaFailureKind;
use crate::points::GiftTransaction;
use crate::state::SessionStatus;
use crate::summary::CallSummary;
use crate::transport::QualityLevel;

/// Typed notifications for anything outside the session that wants to react:
/// toast/banners, navigation, analytics dashboards, tests. Replaces direct
/// UI calls; consumers subscribe through the session handle and decide for
/// themselves what each event looks like on screen.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StatusChanged {
        status: SessionStatus,
    },
    /// Media acquisition failed; the session is now `Failed`. Carries the
    /// classification and user-facing guidance.
    MediaFailed {
        kind: MediaFailureKind,
        hint: &'static str,
    },
    /// First poor sample of a degradation episode.
    QualityDegraded {
        level: QualityLevel,
    },
    LowQualityModeEnabled {
        auto: bool,
    },
    LowQualityModeDisabled {
        auto: bool,
    },
    RecoveryStarted {
        attempt: u32,
    },
    RecoveryOutcome {
        success: bool,
    },
    /// Strong suggestion to hang up; purely advisory.
    RecommendEndCall,
    InsufficientPoints {
        balance: u64,
        required: u64,
    },
    GiftSent {
        transaction: GiftTransaction,
        balance: u64,
    },
    /// Transient overlay animation for a sent gift. Replaced by the next
    /// gift or cleared after `ttl_ms`.
    GiftAnimation {
        gift_id: GiftId,
        animation: AnimationProfile,
        ttl_ms: u64,
    },
    /// Clears the active gift animation once its deadline passes.
    GiftAnimationEnded,
    SummaryReady {
        summary: CallSummary,
    },
    /// Post-failure grace window elapsed without user action.
    NavigateAway,
}

impl SessionEvent {
    /// Short name for log fields and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::StatusChanged { .. } => "status_changed",
            SessionEvent::MediaFailed { .. } => "media_failed",
            SessionEvent::QualityDegraded { .. } => "quality_degraded",
            SessionEvent::LowQualityModeEnabled { .. } => "low_quality_mode_enabled",
            SessionEvent::LowQualityModeDisabled { .. } => "low_quality_mode_disabled",
            SessionEvent::RecoveryStarted { .. } => "recovery_started",
            SessionEvent::RecoveryOutcome { .. } => "recovery_outcome",
            SessionEvent::RecommendEndCall => "recommend_end_call",
            SessionEvent::InsufficientPoints { .. } => "insufficient_points",
            SessionEvent::GiftSent { .. } => "gift_sent",
            SessionEvent::GiftAnimation { .. } => "gift_animation",
            SessionEvent::GiftAnimationEnded => "gift_animation_ended",
            SessionEvent::SummaryReady { .. } => "summary_ready",
            SessionEvent::NavigateAway => "navigate_away",
        }
    }
}
