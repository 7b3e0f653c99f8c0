//! Scriptable doubles for the session's ports plus a driver that owns the
//! running actor. Everything here is deterministic under a paused clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use callsteer::actor;
use callsteer::catalog::GiftCatalog;
use callsteer::entity::SessionId;
use callsteer::event::SessionEvent;
use callsteer::media::{LocalMedia, MediaAccessError, MediaError, MediaProvider, RemoteMedia};
use callsteer::session::{SessionConfig, SessionHandle};
use callsteer::state::SessionStatus;
use callsteer::summary::{AnalyticsSink, CallSummary, SinkError};
use callsteer::transport::{
    AdjustmentTicket, QualityLevel, QualitySample, TransportError, TransportLayer,
};

/// Virtual-time budget per expected event. Generous because it is free
/// under a paused clock; hitting it means the event never came.
const EVENT_TIMEOUT: Duration = Duration::from_secs(120);

// ── Media double ─────────────────────────────────────────────────────────────

/// Scriptable acquisition: succeeds after `acquire_delay` unless a failure
/// is armed. The shared cells stay with the test after the provider moves
/// into the actor.
pub struct FakeMedia {
    pub acquire_delay: Duration,
    pub fail_local: Option<MediaAccessError>,
    pub fail_remote: Option<MediaAccessError>,
    /// Amplitude the fake capture reports, stored as f32 bits.
    pub amplitude: Arc<AtomicU32>,
    pub local_released: Arc<AtomicBool>,
    pub remote_released: Arc<AtomicBool>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self {
            acquire_delay: Duration::from_millis(20),
            fail_local: None,
            fail_remote: None,
            amplitude: Arc::new(AtomicU32::new(0.5f32.to_bits())),
            local_released: Arc::new(AtomicBool::new(false)),
            remote_released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    pub fn failing_local(mut self, error: MediaAccessError) -> Self {
        self.fail_local = Some(error);
        self
    }

    pub fn failing_remote(mut self, error: MediaAccessError) -> Self {
        self.fail_remote = Some(error);
        self
    }

    pub fn set_amplitude(&self, amplitude: f32) {
        self.amplitude.store(amplitude.to_bits(), Ordering::Relaxed);
    }
}

pub struct FakeLocal {
    amplitude: Arc<AtomicU32>,
    released: Arc<AtomicBool>,
    audio_enabled: bool,
    video_enabled: bool,
}

impl LocalMedia for FakeLocal {
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
        if !self.audio_enabled {
            return Ok(0.0);
        }
        Ok(f32::from_bits(self.amplitude.load(Ordering::Relaxed)))
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::Relaxed);
    }
}

pub struct FakeRemote {
    released: Arc<AtomicBool>,
}

impl RemoteMedia for FakeRemote {
    fn release(&mut self) {
        self.released.store(true, Ordering::Relaxed);
    }
}

impl MediaProvider for FakeMedia {
    type Local = FakeLocal;
    type Remote = FakeRemote;

    async fn acquire_local(&mut self) -> Result<FakeLocal, MediaAccessError> {
        tokio::time::sleep(self.acquire_delay).await;
        if let Some(err) = self.fail_local.clone() {
            return Err(err);
        }
        Ok(FakeLocal {
            amplitude: self.amplitude.clone(),
            released: self.local_released.clone(),
            audio_enabled: true,
            video_enabled: true,
        })
    }

    async fn acquire_remote(&mut self) -> Result<FakeRemote, MediaAccessError> {
        tokio::time::sleep(self.acquire_delay).await;
        if let Some(err) = self.fail_remote.clone() {
            return Err(err);
        }
        Ok(FakeRemote {
            released: self.remote_released.clone(),
        })
    }
}

// ── Transport double ─────────────────────────────────────────────────────────

/// Outcome for one bandwidth adjustment request, in request order.
#[derive(Debug, Clone, Copy)]
pub enum Adjustment {
    Succeed,
    Fail,
    /// Keep the ticket pending for the rest of the call.
    Hold,
}

/// Replays a scripted level sequence, then repeats `idle` forever.
/// Adjustment tickets resolve immediately per the script; unscripted
/// requests stay pending.
pub struct ScriptedTransport {
    levels: VecDeque<QualityLevel>,
    idle: QualityLevel,
    adjustments: VecDeque<Adjustment>,
    sample_delays: VecDeque<Duration>,
    pub requests: Arc<AtomicU32>,
    held: Vec<oneshot::Sender<Result<(), TransportError>>>,
}

impl ScriptedTransport {
    pub fn steady(level: QualityLevel) -> Self {
        Self {
            levels: VecDeque::new(),
            idle: level,
            adjustments: VecDeque::new(),
            sample_delays: VecDeque::new(),
            requests: Arc::new(AtomicU32::new(0)),
            held: Vec::new(),
        }
    }

    pub fn sequence(levels: impl IntoIterator<Item = QualityLevel>, idle: QualityLevel) -> Self {
        Self {
            levels: levels.into_iter().collect(),
            ..Self::steady(idle)
        }
    }

    pub fn with_adjustments(mut self, outcomes: impl IntoIterator<Item = Adjustment>) -> Self {
        self.adjustments = outcomes.into_iter().collect();
        self
    }

    /// Stalls the next sample call by `delay` before it resolves.
    pub fn with_sample_delay(mut self, delay: Duration) -> Self {
        self.sample_delays.push_back(delay);
        self
    }
}

impl TransportLayer for ScriptedTransport {
    async fn quality_sample(&mut self) -> Result<QualitySample, TransportError> {
        if let Some(delay) = self.sample_delays.pop_front() {
            tokio::time::sleep(delay).await;
        }
        let level = self.levels.pop_front().unwrap_or(self.idle);
        Ok(QualitySample::now(level))
    }

    fn request_bandwidth_adjustment(&mut self) -> AdjustmentTicket {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        match self.adjustments.pop_front().unwrap_or(Adjustment::Hold) {
            Adjustment::Succeed => {
                let _ = tx.send(Ok(()));
            }
            Adjustment::Fail => {
                let _ = tx.send(Err(TransportError::AdjustmentRejected(
                    "scripted rejection".to_string(),
                )));
            }
            Adjustment::Hold => self.held.push(tx),
        }
        rx
    }
}

// ── Analytics double ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RecordingSink {
    summaries: Arc<Mutex<Vec<CallSummary>>>,
}

impl AnalyticsSink for RecordingSink {
    async fn record(&mut self, summary: &CallSummary) -> Result<(), SinkError> {
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

pub struct TestCall {
    pub handle: SessionHandle,
    pub events: mpsc::Receiver<SessionEvent>,
    pub summaries: Arc<Mutex<Vec<CallSummary>>>,
    pub task: tokio::task::JoinHandle<()>,
}

pub fn launch(media: FakeMedia, transport: ScriptedTransport) -> TestCall {
    launch_with(media, transport, SessionConfig::default())
}

pub fn launch_with(
    media: FakeMedia,
    transport: ScriptedTransport,
    config: SessionConfig,
) -> TestCall {
    let summaries = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink {
        summaries: summaries.clone(),
    };
    let (handle, session, events) = SessionHandle::new(
        SessionId::from_label("test-call"),
        media,
        transport,
        sink,
        GiftCatalog::default(),
        config,
    );
    let task = tokio::spawn(actor::run(session));
    TestCall {
        handle,
        events,
        summaries,
        task,
    }
}

impl TestCall {
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event stream closed before the expected event")
    }

    /// Skips ahead to the next event with this name. Use `next_event` when
    /// the exact order matters.
    pub async fn wait_for(&mut self, name: &str) -> SessionEvent {
        loop {
            let event = self.next_event().await;
            if event.name() == name {
                return event;
            }
        }
    }

    pub async fn expect_connected(&mut self) {
        let event = self.next_event().await;
        assert_eq!(
            event,
            SessionEvent::StatusChanged {
                status: SessionStatus::Connected
            },
            "expected the connect notification first, got {event:?}"
        );
    }

    /// Remaining event names until the actor closes the stream.
    pub async fn drain(&mut self) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(EVENT_TIMEOUT, self.events.recv()).await
        {
            names.push(event.name());
        }
        names
    }

    /// Waits for the actor to finish and returns everything the analytics
    /// sink recorded.
    pub async fn finished(self) -> Vec<CallSummary> {
        self.task.await.expect("session actor panicked");
        let summaries = self.summaries.lock().unwrap();
        summaries.clone()
    }
}
