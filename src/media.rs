use std::fmt;

/// Why media acquisition failed, reduced to the cases callers can act on.
/// Acquisition failures are fatal to the session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaAccessError {
    #[error("no capture device found")]
    DeviceNotFound,
    #[error("camera/microphone permission denied")]
    PermissionDenied,
    #[error("capture device is in use by another application")]
    DeviceBusy,
    #[error("requested capture constraints cannot be satisfied")]
    ConstraintsUnsatisfiable,
    #[error("media capture is not supported on this platform")]
    Unsupported,
    #[error("media acquisition failed: {0}")]
    Unknown(String),
}

impl MediaAccessError {
    pub fn kind(&self) -> MediaFailureKind {
        match self {
            MediaAccessError::DeviceNotFound => MediaFailureKind::DeviceNotFound,
            MediaAccessError::PermissionDenied => MediaFailureKind::PermissionDenied,
            MediaAccessError::DeviceBusy => MediaFailureKind::DeviceBusy,
            MediaAccessError::ConstraintsUnsatisfiable => MediaFailureKind::ConstraintsUnsatisfiable,
            MediaAccessError::Unsupported => MediaFailureKind::Unsupported,
            MediaAccessError::Unknown(_) => MediaFailureKind::Unknown,
        }
    }
}

/// Copyable, serializable classification of a [`MediaAccessError`] for events
/// and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaFailureKind {
    DeviceNotFound,
    PermissionDenied,
    DeviceBusy,
    ConstraintsUnsatisfiable,
    Unsupported,
    Unknown,
}

impl MediaFailureKind {
    /// User-facing guidance matching the failure class.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            MediaFailureKind::DeviceNotFound => {
                "Check that a camera and microphone are connected, then try again."
            }
            MediaFailureKind::PermissionDenied => {
                "Allow camera and microphone access in your settings, then try again."
            }
            MediaFailureKind::DeviceBusy => {
                "Close other apps that may be using your camera, then try again."
            }
            MediaFailureKind::ConstraintsUnsatisfiable => {
                "Your device does not meet the video requirements for this call."
            }
            MediaFailureKind::Unsupported => {
                "Video calls are not supported on this device or browser."
            }
            MediaFailureKind::Unknown => "Something went wrong starting the call. Try again.",
        }
    }
}

impl fmt::Display for MediaFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MediaFailureKind::DeviceNotFound => "device_not_found",
            MediaFailureKind::PermissionDenied => "permission_denied",
            MediaFailureKind::DeviceBusy => "device_busy",
            MediaFailureKind::ConstraintsUnsatisfiable => "constraints_unsatisfiable",
            MediaFailureKind::Unsupported => "unsupported",
            MediaFailureKind::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// Non-fatal stream errors, e.g. a failed audio level read. The session keeps
/// running through these.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("audio graph read failed: {0}")]
    AudioGraph(String),
    #[error("stream has been released")]
    Released,
}

/// Capture side of an established call. Track toggles apply synchronously;
/// the amplitude read feeds the activity monitor and may fail without
/// tearing the stream down.
pub trait LocalMedia: Send + 'static {
    fn set_audio_enabled(&mut self, enabled: bool);
    fn set_video_enabled(&mut self, enabled: bool);
    fn audio_enabled(&self) -> bool;
    fn video_enabled(&self) -> bool;

    /// Linear amplitude of the most recent capture window, in `0.0..=1.0`.
    fn audio_amplitude(&mut self) -> Result<f32, MediaError>;

    fn release(&mut self);
}

/// Playback side of an established call.
pub trait RemoteMedia: Send + 'static {
    fn release(&mut self);
}

/// Acquisition port. Local capture is acquired first; only when it succeeds
/// is the remote stream attached.
pub trait MediaProvider: Send + 'static {
    type Local: LocalMedia;
    type Remote: RemoteMedia;

    fn acquire_local(&mut self)
    -> impl Future<Output = Result<Self::Local, MediaAccessError>> + Send;

    fn acquire_remote(&mut self)
    -> impl Future<Output = Result<Self::Remote, MediaAccessError>> + Send;
}
