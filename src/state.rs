//! Shared, lock-free view of one session.
//!
//! The session actor is the single writer of everything here. Render layers
//! and tests read through [`SessionObservables`] clones without locking or
//! awaiting; the handle covers the few outputs that do not fit an atomic
//! (gift history, active animation).

use std::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
};

use crate::transport::QualityLevel;

/// Lifecycle of a call session. `Ended` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionStatus {
    Connecting = 0,
    Connected = 1,
    Ended = 2,
    Failed = 3,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Failed)
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionStatus::Connected,
            2 => SessionStatus::Ended,
            3 => SessionStatus::Failed,
            _ => SessionStatus::Connecting,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Ended => "ended",
            SessionStatus::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// The conclusions a render layer needs, one atomic each.
#[derive(Debug, Clone)]
pub struct SessionObservables {
    status: Arc<AtomicU8>,
    audio_level: Arc<AtomicU8>,
    quality: Arc<AtomicU8>,
    low_quality_mode: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    video_enabled: Arc<AtomicBool>,
    point_balance: Arc<AtomicU64>,
    duration_secs: Arc<AtomicU64>,
}

impl SessionObservables {
    pub fn new(initial_balance: u64) -> Self {
        Self {
            status: Arc::new(AtomicU8::new(SessionStatus::Connecting.as_u8())),
            audio_level: Arc::new(AtomicU8::new(0)),
            quality: Arc::new(AtomicU8::new(QualityLevel::Good.as_u8())),
            low_quality_mode: Arc::new(AtomicBool::new(false)),
            muted: Arc::new(AtomicBool::new(false)),
            video_enabled: Arc::new(AtomicBool::new(true)),
            point_balance: Arc::new(AtomicU64::new(initial_balance)),
            duration_secs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    /// Current speaking level, normalized to `0..=100`.
    pub fn audio_level(&self) -> u8 {
        self.audio_level.load(Ordering::Relaxed)
    }

    /// Quality badge shown next to the remote video.
    pub fn quality(&self) -> QualityLevel {
        QualityLevel::from_u8(self.quality.load(Ordering::Relaxed))
    }

    pub fn low_quality_mode(&self) -> bool {
        self.low_quality_mode.load(Ordering::Relaxed)
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::Relaxed)
    }

    pub fn point_balance(&self) -> u64 {
        self.point_balance.load(Ordering::Relaxed)
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ObservableSnapshot {
        ObservableSnapshot {
            status: self.status(),
            audio_level: self.audio_level(),
            quality: self.quality(),
            low_quality_mode: self.low_quality_mode(),
            muted: self.muted(),
            video_enabled: self.video_enabled(),
            point_balance: self.point_balance(),
            duration_secs: self.duration_secs(),
        }
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        self.status.store(status.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn set_audio_level(&self, level: u8) {
        self.audio_level.store(level.min(100), Ordering::Relaxed);
    }

    pub(crate) fn set_quality(&self, level: QualityLevel) {
        self.quality.store(level.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn set_low_quality_mode(&self, active: bool) {
        self.low_quality_mode.store(active, Ordering::Relaxed);
    }

    pub(crate) fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub(crate) fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_point_balance(&self, balance: u64) {
        self.point_balance.store(balance, Ordering::Relaxed);
    }

    pub(crate) fn set_duration_secs(&self, secs: u64) {
        self.duration_secs.store(secs, Ordering::Relaxed);
    }
}

/// One coherent-enough read of all observables, for logging and demo output.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ObservableSnapshot {
    pub status: SessionStatus,
    pub audio_level: u8,
    pub quality: QualityLevel,
    pub low_quality_mode: bool,
    pub muted: bool,
    pub video_enabled: bool,
    pub point_balance: u64,
    pub duration_secs: u64,
}
