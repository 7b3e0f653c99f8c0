//! Seeded fakes behind the session's ports, for demo runs and reproductions.
//!
//! `SyntheticMedia` produces a speech-like amplitude pattern and can be
//! scripted to fail either acquisition step. `SimTransport` drifts its link
//! quality through a random walk and settles bandwidth adjustments after a
//! delay. Same seed, same call.

use std::time::Duration;

use rand::Rng as _;
use tokio::sync::oneshot;
use tokio::time::sleep;

use crate::media::{LocalMedia, MediaAccessError, MediaError, MediaProvider, RemoteMedia};
use crate::rng::Rng;
use crate::transport::{
    AdjustmentTicket, QualityLevel, QualitySample, TransportError, TransportLayer,
};

pub struct SyntheticMedia {
    rng: Rng,
    acquire_delay: Duration,
    local_failure: Option<MediaAccessError>,
    remote_failure: Option<MediaAccessError>,
}

impl SyntheticMedia {
    pub fn new(rng: Rng) -> Self {
        Self {
            rng,
            acquire_delay: Duration::from_millis(400),
            local_failure: None,
            remote_failure: None,
        }
    }

    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Scripts the local capture step to fail with `error`.
    pub fn failing_local(mut self, error: MediaAccessError) -> Self {
        self.local_failure = Some(error);
        self
    }

    /// Scripts the remote attach step to fail with `error`.
    pub fn failing_remote(mut self, error: MediaAccessError) -> Self {
        self.remote_failure = Some(error);
        self
    }
}

impl MediaProvider for SyntheticMedia {
    type Local = SyntheticLocal;
    type Remote = SyntheticRemote;

    async fn acquire_local(&mut self) -> Result<SyntheticLocal, MediaAccessError> {
        sleep(self.acquire_delay).await;
        if let Some(err) = self.local_failure.clone() {
            return Err(err);
        }
        Ok(SyntheticLocal::new(self.rng.clone()))
    }

    async fn acquire_remote(&mut self) -> Result<SyntheticRemote, MediaAccessError> {
        sleep(self.acquire_delay).await;
        if let Some(err) = self.remote_failure.clone() {
            return Err(err);
        }
        Ok(SyntheticRemote { released: false })
    }
}

#[derive(Debug)]
pub struct SyntheticLocal {
    rng: Rng,
    audio_enabled: bool,
    video_enabled: bool,
    reads: u64,
    released: bool,
}

impl SyntheticLocal {
    fn new(rng: Rng) -> Self {
        Self {
            rng,
            audio_enabled: true,
            video_enabled: true,
            reads: 0,
            released: false,
        }
    }
}

impl LocalMedia for SyntheticLocal {
    fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio_enabled = enabled;
    }

    fn set_video_enabled(&mut self, enabled: bool) {
        self.video_enabled = enabled;
    }

    fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    fn audio_amplitude(&mut self) -> Result<f32, MediaError> {
        if self.released {
            return Err(MediaError::Released);
        }
        self.reads += 1;
        if !self.audio_enabled {
            return Ok(0.0);
        }
        // Speech-like bursts: a slow envelope with per-read jitter.
        let phase = self.reads as f32 * 0.12;
        let envelope = phase.sin().abs() * 0.8;
        let jitter: f32 = self.rng.random_range(-0.05..0.05);
        Ok((envelope + jitter).clamp(0.0, 1.0))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

pub struct SyntheticRemote {
    released: bool,
}

impl RemoteMedia for SyntheticRemote {
    fn release(&mut self) {
        self.released = true;
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimTransportConfig {
    /// Chance per sample that quality drifts one level down.
    pub degrade_probability: f64,
    /// Chance per sample that quality drifts one level up.
    pub recover_probability: f64,
    /// How long a bandwidth adjustment takes to settle.
    pub adjust_latency_ms: u64,
    /// Chance that an adjustment settles successfully.
    pub adjust_success_rate: f64,
}

impl Default for SimTransportConfig {
    fn default() -> Self {
        Self {
            degrade_probability: 0.25,
            recover_probability: 0.35,
            adjust_latency_ms: 1_500,
            adjust_success_rate: 0.7,
        }
    }
}

pub struct SimTransport {
    rng: Rng,
    config: SimTransportConfig,
    level: QualityLevel,
}

impl SimTransport {
    pub fn new(rng: Rng, config: SimTransportConfig) -> Self {
        Self {
            rng,
            config,
            level: QualityLevel::Good,
        }
    }

    pub fn level(&self) -> QualityLevel {
        self.level
    }
}

impl TransportLayer for SimTransport {
    async fn quality_sample(&mut self) -> Result<QualitySample, TransportError> {
        let roll: f64 = self.rng.random();
        self.level = if roll < self.config.degrade_probability {
            step_down(self.level)
        } else if roll > 1.0 - self.config.recover_probability {
            step_up(self.level)
        } else {
            self.level
        };
        Ok(QualitySample::now(self.level))
    }

    fn request_bandwidth_adjustment(&mut self) -> AdjustmentTicket {
        let (tx, rx) = oneshot::channel();
        let latency = Duration::from_millis(self.config.adjust_latency_ms);
        let success = self
            .rng
            .random_bool(self.config.adjust_success_rate.clamp(0.0, 1.0));
        if success {
            // The transport starts throttling immediately; samples taken
            // while the ticket is pending already look better.
            self.level = step_up(self.level);
        }
        tokio::spawn(async move {
            sleep(latency).await;
            let outcome = if success {
                Ok(())
            } else {
                Err(TransportError::AdjustmentRejected(
                    "congestion persisted".to_string(),
                ))
            };
            let _ = tx.send(outcome);
        });
        rx
    }
}

fn step_down(level: QualityLevel) -> QualityLevel {
    match level {
        QualityLevel::Excellent => QualityLevel::Good,
        QualityLevel::Good => QualityLevel::Fair,
        QualityLevel::Fair | QualityLevel::Poor => QualityLevel::Poor,
    }
}

fn step_up(level: QualityLevel) -> QualityLevel {
    match level {
        QualityLevel::Poor => QualityLevel::Fair,
        QualityLevel::Fair => QualityLevel::Good,
        QualityLevel::Good | QualityLevel::Excellent => QualityLevel::Excellent,
    }
}
