//! The call session actor.
//!
//! One actor owns everything a live call touches: the media streams, the
//! transport, the point ledger, and both quality/audio monitors. All inputs
//! arrive through a single command channel, all conclusions leave through
//! shared observables and a typed event stream, so there is exactly one
//! writer and no locks anywhere in the session.
//!
//! A session moves through two phases. While `Connecting` it acquires local
//! capture and then the remote stream, racing both against user commands so
//! a call can be abandoned mid-dial. Once `Connected` it runs a select loop
//! over commands, the audio poll cadence, the quality sample cadence, the
//! duration tick, the in-flight recovery ticket, and the gift animation
//! deadline. `Ended` and `Failed` are terminal: loops stop, the in-flight
//! recovery is dropped, media is released, and exactly one [`CallSummary`]
//! goes out.

use std::fmt;
use std::pin::pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::actor::{Actor, ActorError};
use crate::audio::{AudioActivityConfig, AudioActivityMonitor};
use crate::catalog::GiftCatalog;
use crate::entity::{GiftId, SessionId};
use crate::event::SessionEvent;
use crate::media::{LocalMedia, MediaFailureKind, MediaProvider, RemoteMedia};
use crate::points::{GiftError, GiftTransaction, GiftTransactionLog, PointLedger};
use crate::quality::{
    AdaptiveQualityController, Effect, EffectQueue, NetworkQualityMonitor, QualityPolicy,
};
use crate::state::{ObservableSnapshot, SessionObservables, SessionStatus};
use crate::summary::{AnalyticsSink, CallSummary, TerminationReason};
use crate::transport::{AdjustmentTicket, TransportError, TransportLayer};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a failed session stays on screen before steering the user
    /// away, in milliseconds.
    pub grace_period_ms: u64,
    /// How long a gift animation stays on screen, in milliseconds.
    pub animation_ttl_ms: u64,
    /// Point balance the session starts with.
    pub starting_points: u64,
    pub audio: AudioActivityConfig,
    pub quality: QualityPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
            animation_ttl_ms: 3_000,
            starting_points: 100,
            audio: AudioActivityConfig::default(),
            quality: QualityPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn animation_ttl(&self) -> Duration {
        Duration::from_millis(self.animation_ttl_ms)
    }
}

enum SessionCommand {
    ToggleMute,
    ToggleVideo,
    SetLowQuality(bool),
    SetAutoMode(bool),
    SendGift(
        GiftId,
        oneshot::Sender<Result<GiftTransaction, GiftError>>,
    ),
    AwardPoints(u64),
    RecentGifts(oneshot::Sender<Vec<GiftTransaction>>),
    EndCall,
    DismissFailure,
}

enum Flow {
    Continue,
    Abort,
}

enum Establish {
    Connected,
    Aborted,
    Failed(TerminationReason),
}

/// Outbound event fan-out. `try_send` only: a deaf consumer must never
/// stall the actor.
#[derive(Clone)]
struct EventTx {
    sender: mpsc::Sender<SessionEvent>,
}

impl EventTx {
    fn emit(&self, event: SessionEvent) {
        let name = event.name();
        if let Err(err) = self.sender.try_send(event) {
            tracing::warn!(event = name, "session event dropped: {err}");
        }
    }
}

/// Cloneable front of one session. Commands go through the actor's channel;
/// reads go straight to the shared observables.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    sender: mpsc::Sender<SessionCommand>,
    observables: SessionObservables,
}

impl SessionHandle {
    pub fn new<M, T, S>(
        session_id: SessionId,
        media: M,
        transport: T,
        sink: S,
        catalog: GiftCatalog,
        config: SessionConfig,
    ) -> (Self, SessionActor<M, T, S>, mpsc::Receiver<SessionEvent>)
    where
        M: MediaProvider,
        T: TransportLayer,
        S: AnalyticsSink,
    {
        let (command_sender, command_receiver) = mpsc::channel(1);
        let (event_sender, event_receiver) = mpsc::channel(128);
        let observables = SessionObservables::new(config.starting_points);

        let handle = SessionHandle {
            session_id: session_id.clone(),
            sender: command_sender,
            observables: observables.clone(),
        };
        let actor = SessionActor {
            session_id,
            media,
            transport,
            sink,
            catalog,
            commands: command_receiver,
            events: EventTx {
                sender: event_sender,
            },
            audio: AudioActivityMonitor::new(observables.clone(), config.audio),
            quality_monitor: NetworkQualityMonitor::new(observables.clone()),
            quality: AdaptiveQualityController::new(config.quality),
            ledger: PointLedger::new(config.starting_points),
            gift_log: GiftTransactionLog::new(),
            observables,
            config,
            local: None,
            remote: None,
            recovery: None,
            animation_deadline: None,
            duration_secs: 0,
            termination: None,
        };
        (handle, actor, event_receiver)
    }

    pub fn id(&self) -> &SessionId {
        &self.session_id
    }

    /// Live, lock-free view of the session. Cheap to clone and read from
    /// any thread.
    pub fn observables(&self) -> SessionObservables {
        self.observables.clone()
    }

    pub fn snapshot(&self) -> ObservableSnapshot {
        self.observables.snapshot()
    }

    pub async fn toggle_mute(&self) {
        self.send(SessionCommand::ToggleMute).await;
    }

    pub async fn toggle_video(&self) {
        self.send(SessionCommand::ToggleVideo).await;
    }

    /// Manual low-quality rendering toggle.
    pub async fn set_low_quality(&self, active: bool) {
        self.send(SessionCommand::SetLowQuality(active)).await;
    }

    /// Enables or disables automatic degradation handling.
    pub async fn set_auto_mode(&self, enabled: bool) {
        self.send(SessionCommand::SetAutoMode(enabled)).await;
    }

    /// Sends a catalog gift: debits its cost and records the transaction.
    /// On insufficient balance nothing changes and the caller gets the
    /// shortfall back.
    pub async fn send_gift(&self, gift_id: GiftId) -> Result<GiftTransaction, GiftError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::SendGift(gift_id, tx))
            .await
            .map_err(|_| GiftError::NotConnected)?;
        rx.await.map_err(|_| GiftError::NotConnected)?
    }

    /// Deposits earned points into the session balance.
    pub async fn award_points(&self, amount: u64) {
        self.send(SessionCommand::AwardPoints(amount)).await;
    }

    /// The most recently sent gifts, newest first.
    pub async fn recent_gifts(&self) -> Vec<GiftTransaction> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionCommand::RecentGifts(tx))
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Hangs up. Safe to call at any point in the lifecycle, any number of
    /// times.
    pub async fn end_call(&self) {
        self.send(SessionCommand::EndCall).await;
    }

    /// Acknowledges a failure screen, cancelling the pending auto-navigation.
    pub async fn dismiss_failure(&self) {
        self.send(SessionCommand::DismissFailure).await;
    }

    async fn send(&self, command: SessionCommand) {
        // A terminated session absorbs every further command.
        if self.sender.send(command).await.is_err() {
            tracing::debug!(session_id = %self.session_id, "command after session ended");
        }
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.session_id)
    }
}

pub struct SessionActor<M, T, S>
where
    M: MediaProvider,
    T: TransportLayer,
    S: AnalyticsSink,
{
    session_id: SessionId,
    config: SessionConfig,
    media: M,
    transport: T,
    sink: S,
    catalog: GiftCatalog,

    commands: mpsc::Receiver<SessionCommand>,
    events: EventTx,
    observables: SessionObservables,

    audio: AudioActivityMonitor,
    quality_monitor: NetworkQualityMonitor,
    quality: AdaptiveQualityController,
    ledger: PointLedger,
    gift_log: GiftTransactionLog,

    local: Option<M::Local>,
    remote: Option<M::Remote>,
    recovery: Option<AdjustmentTicket>,
    animation_deadline: Option<Instant>,
    duration_secs: u64,
    termination: Option<TerminationReason>,
}

impl<M, T, S> Actor for SessionActor<M, T, S>
where
    M: MediaProvider,
    T: TransportLayer,
    S: AnalyticsSink,
{
    type ID = SessionId;

    fn kind(&self) -> &'static str {
        "call_session"
    }

    fn id(&self) -> SessionId {
        self.session_id.clone()
    }

    async fn run(&mut self) -> Result<(), ActorError> {
        match self.establish().await {
            Establish::Connected => {
                self.transition(SessionStatus::Connected);
                tracing::info!("call connected");
                self.connected_loop().await;
                self.terminate(TerminationReason::UserEnded).await;
            }
            Establish::Aborted => {
                // Hung up while still dialing.
                self.terminate(TerminationReason::UserEnded).await;
            }
            Establish::Failed(reason) => {
                self.terminate(reason).await;
                self.failure_grace().await;
            }
        }
        Ok(())
    }

    async fn post_stop(&mut self) -> Result<(), ActorError> {
        // Devices must not stay captured if run was cut short.
        self.release_media();
        Ok(())
    }
}

impl<M, T, S> SessionActor<M, T, S>
where
    M: MediaProvider,
    T: TransportLayer,
    S: AnalyticsSink,
{
    /// Local capture first; the remote stream is only attached once capture
    /// holds. Both waits stay responsive to commands.
    async fn establish(&mut self) -> Establish {
        let acquired = race_connecting(
            &mut self.commands,
            &self.observables,
            &mut self.ledger,
            self.media.acquire_local(),
        )
        .await;
        let local = match acquired {
            Ok(Ok(local)) => local,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "local capture acquisition failed");
                let kind = err.kind();
                return self.establish_failed(kind, TerminationReason::MediaFailure(kind));
            }
            Err(aborted) => return aborted,
        };
        self.local = Some(local);
        self.apply_pending_toggles();

        let acquired = race_connecting(
            &mut self.commands,
            &self.observables,
            &mut self.ledger,
            self.media.acquire_remote(),
        )
        .await;
        match acquired {
            Ok(Ok(remote)) => {
                self.remote = Some(remote);
                // A toggle can land during the remote wait too.
                self.apply_pending_toggles();
                Establish::Connected
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "remote stream attach failed");
                self.establish_failed(err.kind(), TerminationReason::ConnectionFailed)
            }
            Err(aborted) => aborted,
        }
    }

    fn establish_failed(
        &mut self,
        kind: MediaFailureKind,
        reason: TerminationReason,
    ) -> Establish {
        metrics::counter!("session_media_failures_total", "kind" => kind.to_string())
            .increment(1);
        self.transition(SessionStatus::Failed);
        self.events.emit(SessionEvent::MediaFailed {
            kind,
            hint: kind.remediation_hint(),
        });
        Establish::Failed(reason)
    }

    /// Toggles received while dialing only touch the observables; sync them
    /// onto capture after each acquisition wait.
    fn apply_pending_toggles(&mut self) {
        let muted = self.observables.muted();
        self.audio.set_muted(muted);
        if let Some(local) = self.local.as_mut() {
            local.set_audio_enabled(!muted);
            local.set_video_enabled(self.observables.video_enabled());
        }
    }

    async fn connected_loop(&mut self) {
        let mut effects = EffectQueue::new();

        let audio_period = self.config.audio.poll_interval();
        let quality_period = self.config.quality.sample_interval();
        let start = Instant::now();

        let mut audio_tick = time::interval_at(start + audio_period, audio_period);
        // Skip, never burst: a stalled loop must not replay meter updates.
        audio_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut quality_tick = time::interval_at(start + quality_period, quality_period);
        // Skip here too: caught-up samples would compress the poor streak.
        quality_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let second = Duration::from_secs(1);
        let mut duration_tick = time::interval_at(start + second, second);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if matches!(self.handle_command(cmd, &mut effects), Flow::Abort) {
                            break;
                        }
                    }
                    // All handles gone; nobody is left to hang up.
                    None => break,
                },

                _ = audio_tick.tick() => self.poll_audio(),

                _ = quality_tick.tick() => self.sample_quality(&mut effects).await,

                outcome = recovery_finished(&mut self.recovery) => {
                    self.recovery = None;
                    self.finish_recovery(outcome, &mut effects);
                }

                _ = deadline(self.animation_deadline) => {
                    self.animation_deadline = None;
                    self.events.emit(SessionEvent::GiftAnimationEnded);
                }

                _ = duration_tick.tick() => {
                    self.duration_secs += 1;
                    self.observables.set_duration_secs(self.duration_secs);
                }
            }

            self.apply_effects(&mut effects);
        }
    }

    fn handle_command(&mut self, cmd: SessionCommand, effects: &mut EffectQueue) -> Flow {
        match cmd {
            SessionCommand::ToggleMute => self.toggle_mute(),
            SessionCommand::ToggleVideo => self.toggle_video(),
            SessionCommand::SetLowQuality(active) => self.quality.set_low_quality(active, effects),
            SessionCommand::SetAutoMode(enabled) => self.quality.set_auto_mode(enabled),
            SessionCommand::SendGift(gift_id, resp) => {
                let _ = resp.send(self.process_gift(gift_id));
            }
            SessionCommand::AwardPoints(amount) => {
                let balance = self.ledger.credit(amount);
                self.observables.set_point_balance(balance);
            }
            SessionCommand::RecentGifts(resp) => {
                let _ = resp.send(self.gift_log.recent());
            }
            SessionCommand::EndCall => return Flow::Abort,
            SessionCommand::DismissFailure => {}
        }
        Flow::Continue
    }

    fn toggle_mute(&mut self) {
        let muted = !self.observables.muted();
        self.observables.set_muted(muted);
        // The monitor zeroes the published level before the next poll runs.
        self.audio.set_muted(muted);
        if let Some(local) = self.local.as_mut() {
            local.set_audio_enabled(!muted);
        }
        tracing::debug!(muted, "microphone toggled");
    }

    fn toggle_video(&mut self) {
        let enabled = !self.observables.video_enabled();
        self.observables.set_video_enabled(enabled);
        if let Some(local) = self.local.as_mut() {
            local.set_video_enabled(enabled);
        }
        tracing::debug!(enabled, "camera toggled");
    }

    fn poll_audio(&mut self) {
        if let Some(local) = self.local.as_mut() {
            self.audio.poll(local);
        }
    }

    async fn sample_quality(&mut self, effects: &mut EffectQueue) {
        match self.transport.quality_sample().await {
            Ok(sample) => {
                let level = self.quality_monitor.ingest(sample);
                self.quality.observe(level, effects);
            }
            Err(err) => self.quality_monitor.sample_failed(&err),
        }
    }

    fn finish_recovery(&mut self, outcome: Result<(), TransportError>, effects: &mut EffectQueue) {
        let success = match outcome {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "bandwidth recovery attempt failed");
                false
            }
        };
        self.quality.recovery_resolved(success, effects);
    }

    fn process_gift(&mut self, gift_id: GiftId) -> Result<GiftTransaction, GiftError> {
        let Some(entry) = self.catalog.get(&gift_id) else {
            return Err(GiftError::UnknownGift(gift_id));
        };
        let cost = entry.point_cost;
        let animation = entry.animation;

        let balance = match self.ledger.debit(cost) {
            Ok(balance) => balance,
            Err(GiftError::InsufficientPoints { balance, required }) => {
                tracing::debug!(balance, required, gift_id = %gift_id, "gift rejected, balance too low");
                self.events
                    .emit(SessionEvent::InsufficientPoints { balance, required });
                return Err(GiftError::InsufficientPoints { balance, required });
            }
            Err(other) => return Err(other),
        };
        self.observables.set_point_balance(balance);

        let transaction = self
            .gift_log
            .record(gift_id.clone(), cost, self.duration_secs);
        metrics::counter!("session_gifts_sent_total").increment(1);
        metrics::histogram!("session_gift_cost_points").record(cost as f64);
        tracing::info!(gift_id = %gift_id, cost, balance, "gift sent");

        self.events.emit(SessionEvent::GiftSent {
            transaction: transaction.clone(),
            balance,
        });
        self.events.emit(SessionEvent::GiftAnimation {
            gift_id,
            animation,
            ttl_ms: self.config.animation_ttl_ms,
        });
        // A new gift replaces the active animation and restarts its clock.
        self.animation_deadline = Some(Instant::now() + self.config.animation_ttl());

        Ok(transaction)
    }

    fn apply_effects(&mut self, effects: &mut EffectQueue) {
        while let Some(effect) = effects.pop_front() {
            match effect {
                Effect::NotifyDegraded => {
                    self.events.emit(SessionEvent::QualityDegraded {
                        level: self.quality_monitor.current(),
                    });
                }
                Effect::SetLowQualityMode { active, auto } => {
                    self.observables.set_low_quality_mode(active);
                    tracing::info!(active, auto, "low-quality mode switched");
                    let event = if active {
                        SessionEvent::LowQualityModeEnabled { auto }
                    } else {
                        SessionEvent::LowQualityModeDisabled { auto }
                    };
                    self.events.emit(event);
                }
                Effect::StartRecovery => {
                    let attempt = self.quality.state().recovery_attempts + 1;
                    tracing::info!(attempt, "starting bandwidth recovery");
                    self.recovery = Some(self.transport.request_bandwidth_adjustment());
                    self.events.emit(SessionEvent::RecoveryStarted { attempt });
                }
                Effect::NotifyRecoveryOutcome { success } => {
                    self.events.emit(SessionEvent::RecoveryOutcome { success });
                }
                Effect::RecommendEndCall => {
                    tracing::warn!("sustained poor quality, recommending end of call");
                    self.events.emit(SessionEvent::RecommendEndCall);
                }
                Effect::PublishQuality(level) => self.quality_monitor.force_level(level),
            }
        }
    }

    fn transition(&mut self, status: SessionStatus) {
        let current = self.observables.status();
        if current == status || current.is_terminal() {
            return;
        }
        tracing::info!("session {current} -> {status}");
        self.observables.set_status(status);
        self.events.emit(SessionEvent::StatusChanged { status });
    }

    /// Idempotent. Loops have already stopped by the time this runs; the
    /// in-flight recovery dies here, then the streams, then the summary.
    async fn terminate(&mut self, reason: TerminationReason) {
        if self.termination.is_some() {
            return;
        }
        self.termination = Some(reason);
        self.recovery = None;
        self.animation_deadline = None;

        let status = match reason {
            TerminationReason::UserEnded => SessionStatus::Ended,
            TerminationReason::MediaFailure(_) | TerminationReason::ConnectionFailed => {
                SessionStatus::Failed
            }
        };
        self.transition(status);
        self.release_media();
        self.emit_summary(reason).await;
    }

    fn release_media(&mut self) {
        if let Some(mut remote) = self.remote.take() {
            remote.release();
        }
        if let Some(mut local) = self.local.take() {
            local.release();
        }
    }

    async fn emit_summary(&mut self, reason: TerminationReason) {
        let summary = CallSummary {
            session_id: self.session_id.clone(),
            duration_secs: self.duration_secs,
            termination_reason: reason,
            gifts_sent: self.gift_log.sent_count(),
            points_spent: self.gift_log.points_spent(),
            final_quality: self.quality_monitor.current(),
        };
        tracing::info!(
            duration_secs = summary.duration_secs,
            reason = %summary.termination_reason,
            gifts = summary.gifts_sent,
            "call finished"
        );
        metrics::histogram!("session_duration_seconds").record(summary.duration_secs as f64);

        self.events.emit(SessionEvent::SummaryReady {
            summary: summary.clone(),
        });
        if let Err(err) = self.sink.record(&summary).await {
            tracing::warn!(error = %err, "analytics sink rejected call summary");
        }
    }

    /// Holds a failed session open so the user can read the error. Dismissal
    /// or hang-up cancels the auto-navigation.
    async fn failure_grace(&mut self) {
        let deadline = Instant::now() + self.config.grace_period();
        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => {
                    tracing::info!("failure grace elapsed, steering away from the call screen");
                    self.events.emit(SessionEvent::NavigateAway);
                    return;
                }
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::DismissFailure) | Some(SessionCommand::EndCall) => {
                        tracing::debug!("failure screen dismissed");
                        return;
                    }
                    Some(SessionCommand::SendGift(_, resp)) => {
                        let _ = resp.send(Err(GiftError::NotConnected));
                    }
                    Some(SessionCommand::RecentGifts(resp)) => {
                        let _ = resp.send(self.gift_log.recent());
                    }
                    // Terminal state: everything else is absorbed.
                    Some(_) => {}
                    None => return,
                },
            }
        }
    }
}

/// Waits for an acquisition step while keeping the command channel live, so
/// the user can hang up mid-dial. Toggle commands only touch the
/// observables here and are applied to capture once it exists; point
/// awards credit the ledger right away.
async fn race_connecting<F, O>(
    commands: &mut mpsc::Receiver<SessionCommand>,
    observables: &SessionObservables,
    ledger: &mut PointLedger,
    acquire: F,
) -> Result<O, Establish>
where
    F: Future<Output = O>,
{
    let mut acquire = pin!(acquire);
    loop {
        tokio::select! {
            out = &mut acquire => return Ok(out),
            Some(cmd) = commands.recv() => {
                if matches!(absorb_connecting(cmd, observables, ledger), Flow::Abort) {
                    return Err(Establish::Aborted);
                }
            }
        }
    }
}

fn absorb_connecting(
    cmd: SessionCommand,
    observables: &SessionObservables,
    ledger: &mut PointLedger,
) -> Flow {
    match cmd {
        SessionCommand::EndCall => return Flow::Abort,
        SessionCommand::ToggleMute => {
            observables.set_muted(!observables.muted());
        }
        SessionCommand::ToggleVideo => {
            observables.set_video_enabled(!observables.video_enabled());
        }
        SessionCommand::AwardPoints(amount) => {
            let balance = ledger.credit(amount);
            observables.set_point_balance(balance);
        }
        SessionCommand::SendGift(_, resp) => {
            let _ = resp.send(Err(GiftError::NotConnected));
        }
        SessionCommand::RecentGifts(resp) => {
            let _ = resp.send(Vec::new());
        }
        SessionCommand::SetLowQuality(_)
        | SessionCommand::SetAutoMode(_)
        | SessionCommand::DismissFailure => {
            tracing::debug!("command ignored while connecting");
        }
    }
    Flow::Continue
}

/// Resolves when the in-flight recovery settles; pends forever when none is
/// running. A dropped ticket sender counts as a failed attempt.
async fn recovery_finished(ticket: &mut Option<AdjustmentTicket>) -> Result<(), TransportError> {
    match ticket {
        Some(rx) => match rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Closed),
        },
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
