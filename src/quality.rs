//! # Network quality tracking and adaptive response
//!
//! ## Architecture
//! Two single-owner components, both owned and driven by the session actor:
//!
//! 1. `NetworkQualityMonitor`: bookkeeping for the fixed-cadence sampling
//!    loop. It ingests transport samples, publishes the current level to the
//!    shared observables, and tolerates sampling failures by freezing the
//!    last known level.
//!
//! 2. `AdaptiveQualityController`: the escalation policy. It owns
//!    `QualityControlState` exclusively and reacts to each observed level by
//!    pushing [`Effect`]s for the actor to execute. It never touches the
//!    transport, emits events, or sleeps; that keeps every decision rule
//!    synchronously testable.
//!
//! Escalation ladder over consecutive poor samples: notify on the first,
//! switch to low-quality mode at `degrade_after`, attempt a bandwidth
//! recovery at `recover_after`, and recommend ending the call at
//! `abandon_after` (then restart the ladder so the recommendation nags
//! instead of spamming).

use std::collections::VecDeque;
use std::time::Duration;

use crate::state::SessionObservables;
use crate::transport::{QualityLevel, QualitySample, TransportError};

/// Tunable thresholds for the escalation ladder. Counts are in consecutive
/// poor samples, i.e. multiples of `sample_interval_ms`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    pub sample_interval_ms: u64,
    /// Poor streak length that turns on low-quality mode (auto mode only).
    pub degrade_after: u32,
    /// Poor streak length that triggers a recovery attempt.
    pub recover_after: u32,
    /// Poor streak length that recommends ending the call.
    pub abandon_after: u32,
    /// Recovery attempts allowed per call.
    pub max_recovery_attempts: u32,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            sample_interval_ms: 5_000,
            degrade_after: 2,
            recover_after: 4,
            abandon_after: 6,
            max_recovery_attempts: 2,
        }
    }
}

impl QualityPolicy {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

pub type EffectQueue = VecDeque<Effect>;

/// Decisions for the actor to execute. The controller only ever *queues*
/// these; side effects stay out of the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Surface a one-time degradation notice for this poor episode.
    NotifyDegraded,
    /// Switch the low-quality rendering mode on or off.
    SetLowQualityMode { active: bool, auto: bool },
    /// Ask the transport for a bandwidth adjustment.
    StartRecovery,
    /// Surface the outcome of a finished recovery attempt.
    NotifyRecoveryOutcome { success: bool },
    /// Suggest the user end the call; the session keeps running.
    RecommendEndCall,
    /// Overwrite the published quality level.
    PublishQuality(QualityLevel),
}

/// All mutable state of the adaptive controller. Owned by the controller,
/// readable by tests and diagnostics through [`AdaptiveQualityController::state`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityControlState {
    pub consecutive_poor: u32,
    pub recovery_attempts: u32,
    pub auto_mode: bool,
    pub low_quality_active: bool,
    /// Explicit in-flight flag; never inferred from timers.
    pub recovery_in_flight: bool,
    /// True when the controller (not the user) enabled low-quality mode.
    pub low_quality_auto_set: bool,
    degraded_notified: bool,
}

#[derive(Debug)]
pub struct AdaptiveQualityController {
    policy: QualityPolicy,
    state: QualityControlState,
}

impl AdaptiveQualityController {
    pub fn new(policy: QualityPolicy) -> Self {
        Self {
            policy,
            state: QualityControlState {
                auto_mode: true,
                ..QualityControlState::default()
            },
        }
    }

    pub fn state(&self) -> &QualityControlState {
        &self.state
    }

    pub fn policy(&self) -> &QualityPolicy {
        &self.policy
    }

    /// Feeds one observed quality level through the escalation ladder.
    pub fn observe(&mut self, level: QualityLevel, effects: &mut EffectQueue) {
        if !level.is_poor() {
            if self.state.consecutive_poor > 0 {
                tracing::debug!(
                    streak = self.state.consecutive_poor,
                    "poor streak ended at {level}"
                );
            }
            self.state.consecutive_poor = 0;
            self.state.degraded_notified = false;
            return;
        }

        self.state.consecutive_poor += 1;
        let streak = self.state.consecutive_poor;

        if !self.state.degraded_notified {
            self.state.degraded_notified = true;
            effects.push_back(Effect::NotifyDegraded);
        }

        if streak == self.policy.degrade_after
            && self.state.auto_mode
            && !self.state.low_quality_active
        {
            self.state.low_quality_active = true;
            self.state.low_quality_auto_set = true;
            metrics::counter!("session_low_quality_switches_total", "trigger" => "auto")
                .increment(1);
            effects.push_back(Effect::SetLowQualityMode {
                active: true,
                auto: true,
            });
        }

        if streak == self.policy.recover_after
            && !self.state.recovery_in_flight
            && self.state.recovery_attempts < self.policy.max_recovery_attempts
        {
            self.state.recovery_in_flight = true;
            metrics::counter!("session_recovery_attempts_total").increment(1);
            effects.push_back(Effect::StartRecovery);
        }

        if streak >= self.policy.abandon_after {
            // Restart the ladder so the recommendation repeats once per full
            // cycle instead of once per sample.
            self.state.consecutive_poor = 0;
            metrics::counter!("session_end_call_recommendations_total", "trigger" => "streak")
                .increment(1);
            effects.push_back(Effect::RecommendEndCall);
        }
    }

    /// Applies the outcome of a finished recovery attempt. The session only
    /// calls this while the call is still live; stale completions are
    /// dropped upstream.
    pub fn recovery_resolved(&mut self, success: bool, effects: &mut EffectQueue) {
        if !self.state.recovery_in_flight {
            tracing::debug!(success, "ignoring recovery outcome with none in flight");
            return;
        }
        self.state.recovery_in_flight = false;
        effects.push_back(Effect::NotifyRecoveryOutcome { success });

        if success {
            self.state.consecutive_poor = 0;
            self.state.degraded_notified = false;
            effects.push_back(Effect::PublishQuality(QualityLevel::Good));
            if self.state.low_quality_auto_set && self.state.auto_mode {
                self.state.low_quality_active = false;
                self.state.low_quality_auto_set = false;
                effects.push_back(Effect::SetLowQualityMode {
                    active: false,
                    auto: true,
                });
            }
        } else {
            self.state.recovery_attempts += 1;
            if self.state.recovery_attempts == self.policy.max_recovery_attempts {
                metrics::counter!("session_end_call_recommendations_total", "trigger" => "attempts")
                    .increment(1);
                effects.push_back(Effect::RecommendEndCall);
            }
        }
    }

    /// Manual low-quality toggle. Always takes effect immediately and marks
    /// the mode as user-chosen, so a later recovery success will not undo it.
    /// Does not cancel an in-flight recovery.
    pub fn set_low_quality(&mut self, active: bool, effects: &mut EffectQueue) {
        if self.state.low_quality_active == active {
            return;
        }
        self.state.low_quality_active = active;
        self.state.low_quality_auto_set = false;
        metrics::counter!("session_low_quality_switches_total", "trigger" => "manual")
            .increment(1);
        effects.push_back(Effect::SetLowQualityMode {
            active,
            auto: false,
        });
    }

    /// Enables or disables automatic degradation handling. Turning auto mode
    /// off leaves the current rendering mode as-is.
    pub fn set_auto_mode(&mut self, enabled: bool) {
        self.state.auto_mode = enabled;
    }
}

/// Sampling-loop bookkeeping. Single writer of the quality badge.
#[derive(Debug)]
pub struct NetworkQualityMonitor {
    shared: SessionObservables,
    current: QualityLevel,
    samples_taken: u64,
    failed_samples: u64,
}

impl NetworkQualityMonitor {
    pub fn new(shared: SessionObservables) -> Self {
        let current = shared.quality();
        Self {
            shared,
            current,
            samples_taken: 0,
            failed_samples: 0,
        }
    }

    /// Records one transport sample and publishes the level.
    pub fn ingest(&mut self, sample: QualitySample) -> QualityLevel {
        self.samples_taken += 1;
        if self.failed_samples > 0 {
            tracing::debug!(failed = self.failed_samples, "quality sampling recovered");
            self.failed_samples = 0;
        }
        self.publish(sample.level);
        sample.level
    }

    /// A failed sampling attempt keeps the previous level. Logged once per
    /// failure streak; escalation never runs on missing data.
    pub fn sample_failed(&mut self, err: &TransportError) {
        if self.failed_samples == 0 {
            tracing::warn!(error = %err, "quality sampling failed, keeping last level");
        }
        self.failed_samples += 1;
    }

    /// Overwrites the published level, e.g. after a successful recovery.
    pub fn force_level(&mut self, level: QualityLevel) {
        self.publish(level);
    }

    pub fn current(&self) -> QualityLevel {
        self.current
    }

    pub fn samples_taken(&self) -> u64 {
        self.samples_taken
    }

    fn publish(&mut self, level: QualityLevel) {
        if level != self.current {
            tracing::debug!("network quality changed: {} -> {}", self.current, level);
            metrics::counter!("session_quality_transitions_total", "to" => level_label(level))
                .increment(1);
            self.current = level;
        }
        self.shared.set_quality(level);
    }
}

fn level_label(level: QualityLevel) -> &'static str {
    match level {
        QualityLevel::Poor => "poor",
        QualityLevel::Fair => "fair",
        QualityLevel::Good => "good",
        QualityLevel::Excellent => "excellent",
    }
}
