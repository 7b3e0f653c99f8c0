use std::fmt;

use tokio::sync::oneshot;
use tokio::time::Instant;

/// Coarse link quality as reported by the transport. Ordered worst to best
/// so the numeric encoding doubles as a severity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum QualityLevel {
    Poor = 0,
    Fair = 1,
    Good = 2,
    Excellent = 3,
}

impl QualityLevel {
    pub fn is_poor(&self) -> bool {
        matches!(self, QualityLevel::Poor)
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => QualityLevel::Poor,
            1 => QualityLevel::Fair,
            3 => QualityLevel::Excellent,
            _ => QualityLevel::Good,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityLevel::Poor => "poor",
            QualityLevel::Fair => "fair",
            QualityLevel::Good => "good",
            QualityLevel::Excellent => "excellent",
        };
        write!(f, "{label}")
    }
}

/// One observation from the transport, stamped when it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualitySample {
    pub level: QualityLevel,
    pub observed_at: Instant,
}

impl QualitySample {
    pub fn now(level: QualityLevel) -> Self {
        Self {
            level,
            observed_at: Instant::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport statistics unavailable: {0}")]
    StatsUnavailable(String),
    #[error("bandwidth adjustment rejected: {0}")]
    AdjustmentRejected(String),
    #[error("transport closed")]
    Closed,
}

/// Resolves once a bandwidth adjustment attempt settles. The sender side is
/// owned by the transport; dropping it counts as a failed attempt.
pub type AdjustmentTicket = oneshot::Receiver<Result<(), TransportError>>;

/// Connection-facing port. The session polls quality on its own cadence and
/// asks for bandwidth adjustments when the link stays poor; the transport
/// answers the latter asynchronously through an [`AdjustmentTicket`].
pub trait TransportLayer: Send + 'static {
    fn quality_sample(&mut self)
    -> impl Future<Output = Result<QualitySample, TransportError>> + Send;

    fn request_bandwidth_adjustment(&mut self) -> AdjustmentTicket;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_encoding_round_trips() {
        for level in [
            QualityLevel::Poor,
            QualityLevel::Fair,
            QualityLevel::Good,
            QualityLevel::Excellent,
        ] {
            assert_eq!(QualityLevel::from_u8(level.as_u8()), level);
        }
    }

    #[test]
    fn unknown_encoding_decodes_to_good() {
        assert_eq!(QualityLevel::from_u8(200), QualityLevel::Good);
    }

    #[test]
    fn levels_order_worst_to_best() {
        assert!(QualityLevel::Poor < QualityLevel::Fair);
        assert!(QualityLevel::Fair < QualityLevel::Good);
        assert!(QualityLevel::Good < QualityLevel::Excellent);
    }
}
