//! Microphone activity tracking.
//!
//! `AudioActivityMonitor` is a single-owner state machine polled by the
//! session on a sub-100ms cadence. It reads raw amplitude from the local
//! stream, smooths it, and publishes a normalized speaking level through the
//! shared observables. The mute flag wins over everything: a muted session
//! reports level 0 no matter what the capture graph says.

use std::time::Duration;

use crate::media::LocalMedia;
use crate::state::SessionObservables;

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AudioActivityConfig {
    /// Poll cadence. Kept under 100ms so the speaking indicator feels live.
    pub poll_interval_ms: u64,
    /// Exponential smoothing factor for raw amplitude (1.0 = no smoothing).
    pub ema_alpha: f32,
}

impl Default for AudioActivityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            ema_alpha: 0.35,
        }
    }
}

impl AudioActivityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug)]
pub struct AudioActivityMonitor {
    shared: SessionObservables,
    config: AudioActivityConfig,
    smoothed: f32,
    muted: bool,
    failed_reads: u64,
}

impl AudioActivityMonitor {
    pub fn new(shared: SessionObservables, config: AudioActivityConfig) -> Self {
        Self {
            shared,
            config,
            smoothed: 0.0,
            muted: false,
            failed_reads: 0,
        }
    }

    /// Applies a mute change immediately. Muting zeroes both the published
    /// level and the smoothing state so an unmute ramps up from silence
    /// instead of replaying the pre-mute level.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if muted {
            self.smoothed = 0.0;
            self.shared.set_audio_level(0);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// One sampling cycle. A failed amplitude read is non-fatal: the
    /// published level freezes at its last value and the failure is logged
    /// once per streak.
    pub fn poll(&mut self, local: &mut impl LocalMedia) {
        if self.muted {
            self.shared.set_audio_level(0);
            return;
        }

        match local.audio_amplitude() {
            Ok(raw) => {
                if self.failed_reads > 0 {
                    tracing::debug!(failed_reads = self.failed_reads, "audio level reads recovered");
                    self.failed_reads = 0;
                }
                let raw = raw.clamp(0.0, 1.0);
                self.smoothed =
                    self.config.ema_alpha * raw + (1.0 - self.config.ema_alpha) * self.smoothed;
                self.shared.set_audio_level(normalize(self.smoothed));
            }
            Err(err) => {
                if self.failed_reads == 0 {
                    tracing::warn!(error = %err, "audio level read failed, freezing level");
                }
                self.failed_reads += 1;
            }
        }
    }
}

fn normalize(amplitude: f32) -> u8 {
    (amplitude.clamp(0.0, 1.0) * 100.0).round() as u8
}
