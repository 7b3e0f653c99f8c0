use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::panic::{AssertUnwindSafe, RefUnwindSafe, UnwindSafe};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActorError {
    #[error("pre-start initialization failed: {0}")]
    PreStartFailed(String),
    #[error("actor logic encountered an error: {0}")]
    LogicError(String),
    #[error("post-stop cleanup failed: {0}")]
    PostStopFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    Starting,
    PreStartFailed,
    Running,
    ExitedGracefully,
    ExitedWithError,
    Panicked,
    PostStopFailed,
    ShutDown,
}

impl Display for ActorStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ActorStatus::Starting => "starting",
                ActorStatus::PreStartFailed => "pre_start_failed",
                ActorStatus::Running => "running",
                ActorStatus::ExitedGracefully => "exited_gracefully",
                ActorStatus::ExitedWithError => "exited_with_error",
                ActorStatus::Panicked => "panicked",
                ActorStatus::PostStopFailed => "post_stop_failed",
                ActorStatus::ShutDown => "shut_down",
            }
        )
    }
}

/// A long-lived task with supervised lifecycle hooks. The runner owns the
/// start/run/stop sequencing so actor impls only write their loop body.
pub trait Actor: Send + Sized {
    fn kind(&self) -> &'static str;

    type ID: Display + Debug + Clone + Send + Sync + UnwindSafe + RefUnwindSafe + 'static;
    fn id(&self) -> Self::ID;

    /// Called once before the main `run` loop starts.
    fn pre_start(&mut self) -> impl Future<Output = Result<(), ActorError>> {
        async { Ok(()) }
    }

    /// The main logic of the actor.
    fn run(&mut self) -> impl Future<Output = Result<(), ActorError>>;

    /// Called once after `run` completes (Ok or Err), after `pre_start`
    /// fails, or after `run` panics. Must tolerate inconsistent state when
    /// invoked on the panic path.
    fn post_stop(&mut self) -> impl Future<Output = Result<(), ActorError>> {
        async { Ok(()) }
    }
}

pub async fn run<A>(actor: A)
where
    A: Actor + Send + 'static,
{
    let actor_kind = actor.kind();
    let actor_id = actor.id();

    run_instrumented(actor, actor_kind, actor_id).await;
}

#[tracing::instrument(
    name = "actor_run",
    skip_all,
    fields(
        actor.kind = %actor_kind,
        actor.id = %actor_id,
        status = tracing::field::Empty,
    )
)]
async fn run_instrumented<A>(mut actor: A, actor_kind: &'static str, actor_id: A::ID)
where
    A: Actor + Send + 'static,
{
    let span = tracing::Span::current();
    tracing::info!("starting actor");

    let mut current_status = ActorStatus::Starting;
    span.record("status", tracing::field::display(current_status));

    match actor.pre_start().await {
        Ok(()) => {
            current_status = ActorStatus::Running;
        }
        Err(err) => {
            tracing::error!(error = %err, "pre_start failed, proceeding to post_stop");
            current_status = ActorStatus::PreStartFailed;
        }
    }
    span.record("status", tracing::field::display(current_status));

    if current_status == ActorStatus::Running {
        // AssertUnwindSafe: the panic is caught from this one unit of work and
        // the actor is dropped right after post_stop, so no torn state escapes.
        let run_result = AssertUnwindSafe(actor.run()).catch_unwind().await;

        match run_result {
            Ok(Ok(())) => {
                tracing::info!("exited gracefully");
                current_status = ActorStatus::ExitedGracefully;
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "exited with an error");
                current_status = ActorStatus::ExitedWithError;
            }
            Err(panic_payload) => {
                let panic_msg = extract_panic_message(panic_payload.as_ref());
                tracing::error!(panic.message = %panic_msg, "actor panicked");
                current_status = ActorStatus::Panicked;
            }
        };
        span.record("status", tracing::field::display(current_status));
    }

    match actor.post_stop().await {
        Ok(()) => {
            // A clean post_stop never masks an earlier failure status.
            if matches!(
                current_status,
                ActorStatus::ExitedGracefully | ActorStatus::Running | ActorStatus::Starting
            ) {
                current_status = ActorStatus::ShutDown;
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "post_stop failed");
            if current_status != ActorStatus::Panicked
                && current_status != ActorStatus::PreStartFailed
            {
                current_status = ActorStatus::PostStopFailed;
            }
        }
    }

    span.record("status", tracing::field::display(current_status));
    tracing::info!("fully shut down with final status: {}", current_status);
}

fn extract_panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
