//! The external scheduler: drives an [`Engine`] from an [`InstrumentContext`] timer.
//!
//! ```text
//!   InstrumentHandle ──Command──► mailbox ─┐
//!        ▲                                 ├─► select! ─► Engine (one task)
//!        └──── oneshot reply ◄─────────────┘      ▲
//!                                  ctx.sleep(period)
//! ```
//!
//! Each loop iteration either handles one command or runs one tick, never
//! both, so commands always land between ticks.

use crate::chemistry::{MethodPatch, Sample};
use crate::engine::{Engine, EngineSnapshot};
use crate::error::{EngineError, RuntimeError};
use crate::events::{EngineListener, SubscriptionId};
use hplc_env::{EnvError, InstrumentContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Default reply timeout of an [`InstrumentHandle`].
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

const MAILBOX_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages accepted by the runtime.
pub enum Command {
    Configure(MethodPatch, Reply<()>),
    SetSample(Sample, Reply<()>),
    SelectSample(String, Reply<()>),
    StartPump(Reply<()>),
    StopPump(oneshot::Sender<()>),
    Inject(Reply<()>),
    Reset(Reply<()>),
    AdjustConditions(MethodPatch, Reply<()>),
    Subscribe(Box<dyn EngineListener>, oneshot::Sender<SubscriptionId>),
    Unsubscribe(SubscriptionId, oneshot::Sender<bool>),
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Configure(..) => "Configure",
            Command::SetSample(..) => "SetSample",
            Command::SelectSample(..) => "SelectSample",
            Command::StartPump(_) => "StartPump",
            Command::StopPump(_) => "StopPump",
            Command::Inject(_) => "Inject",
            Command::Reset(_) => "Reset",
            Command::AdjustConditions(..) => "AdjustConditions",
            Command::Subscribe(..) => "Subscribe",
            Command::Unsubscribe(..) => "Unsubscribe",
            Command::Snapshot(_) => "Snapshot",
            Command::Shutdown => "Shutdown",
        };
        write!(f, "Command::{}", name)
    }
}

/// Owns an engine inside one task and paces its clock.
pub struct InstrumentRuntime<Ctx: InstrumentContext> {
    engine: Engine,
    ctx: Arc<Ctx>,
    rx: mpsc::Receiver<Command>,
}

impl<Ctx: InstrumentContext> InstrumentRuntime<Ctx> {
    /// Creates a runtime and the handle that talks to it.
    pub fn new(engine: Engine, ctx: Arc<Ctx>) -> (Self, InstrumentHandle) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let handle = InstrumentHandle {
            tx,
            timeout: DEFAULT_CALL_TIMEOUT,
        };
        (Self { engine, ctx, rx }, handle)
    }

    /// Runs until shutdown or until every handle is dropped, then returns the engine.
    pub async fn run(mut self) -> Engine {
        let period = self.engine.config().clock.tick_period();
        let mut next_tick = self.ctx.now() + period;
        info!("[{}] Runtime started ({:?} per tick)", self.engine.id(), period);

        loop {
            if !self.engine.is_ticking() {
                match self.rx.recv().await {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                }
                next_tick = self.ctx.now() + period;
                continue;
            }

            let wait = next_tick.saturating_sub(self.ctx.now());
            tokio::select! {
                biased;
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                _ = self.ctx.sleep(wait) => {
                    self.engine.tick();
                    next_tick += period;
                }
            }
        }

        info!("[{}] Runtime stopped in {}", self.engine.id(), self.engine.phase());
        self.engine
    }

    fn handle(&mut self, cmd: Command) {
        debug!("[{}] {:?}", self.engine.id(), cmd);
        // A dropped reply receiver means the caller timed out; nothing to do
        match cmd {
            Command::Configure(patch, reply) => {
                let _ = reply.send(self.engine.configure(&patch));
            }
            Command::SetSample(sample, reply) => {
                let _ = reply.send(self.engine.set_sample(sample));
            }
            Command::SelectSample(id, reply) => {
                let _ = reply.send(self.engine.select_sample(&id));
            }
            Command::StartPump(reply) => {
                let _ = reply.send(self.engine.start_pump());
            }
            Command::StopPump(reply) => {
                self.engine.stop_pump();
                let _ = reply.send(());
            }
            Command::Inject(reply) => {
                let _ = reply.send(self.engine.inject());
            }
            Command::Reset(reply) => {
                let _ = reply.send(self.engine.reset());
            }
            Command::AdjustConditions(patch, reply) => {
                let _ = reply.send(self.engine.adjust_conditions(&patch));
            }
            Command::Subscribe(listener, reply) => {
                let _ = reply.send(self.engine.subscribe_boxed(listener));
            }
            Command::Unsubscribe(id, reply) => {
                let _ = reply.send(self.engine.unsubscribe(id));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.engine.snapshot());
            }
            Command::Shutdown => {}
        }
    }
}

/// Cloneable client of an [`InstrumentRuntime`].
#[derive(Clone, Debug)]
pub struct InstrumentHandle {
    tx: mpsc::Sender<Command>,
    timeout: Duration,
}

impl InstrumentHandle {
    /// Returns a handle with a different reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EnvError::closed("command mailbox"))?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(EnvError::closed("reply channel").into()),
            Err(_) => Err(EnvError::timeout(self.timeout).into()),
        }
    }

    pub async fn configure(&self, patch: MethodPatch) -> Result<(), RuntimeError> {
        Ok(self.call(|r| Command::Configure(patch, r)).await??)
    }

    pub async fn set_sample(&self, sample: Sample) -> Result<(), RuntimeError> {
        Ok(self.call(|r| Command::SetSample(sample, r)).await??)
    }

    pub async fn select_sample(&self, sample_id: impl Into<String>) -> Result<(), RuntimeError> {
        let id = sample_id.into();
        Ok(self.call(|r| Command::SelectSample(id, r)).await??)
    }

    pub async fn start_pump(&self) -> Result<(), RuntimeError> {
        Ok(self.call(Command::StartPump).await??)
    }

    pub async fn stop_pump(&self) -> Result<(), RuntimeError> {
        self.call(Command::StopPump).await
    }

    pub async fn inject(&self) -> Result<(), RuntimeError> {
        Ok(self.call(Command::Inject).await??)
    }

    pub async fn reset(&self) -> Result<(), RuntimeError> {
        Ok(self.call(Command::Reset).await??)
    }

    pub async fn adjust_conditions(&self, patch: MethodPatch) -> Result<(), RuntimeError> {
        Ok(self.call(|r| Command::AdjustConditions(patch, r)).await??)
    }

    pub async fn subscribe<L: EngineListener + 'static>(
        &self,
        listener: L,
    ) -> Result<SubscriptionId, RuntimeError> {
        let listener: Box<dyn EngineListener> = Box::new(listener);
        self.call(|r| Command::Subscribe(listener, r)).await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, RuntimeError> {
        self.call(|r| Command::Unsubscribe(id, r)).await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, RuntimeError> {
        self.call(Command::Snapshot).await
    }

    /// Asks the runtime to exit. The engine is returned from `run`.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| EnvError::closed("command mailbox"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::{ChannelListener, EngineEvent};
    use crate::state_machine::RunPhase;
    use hplc_env::TokioContext;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn spawn_runtime() -> (tokio::task::JoinHandle<Engine>, InstrumentHandle) {
        let engine = Engine::new(EngineConfig::seeded(7)).unwrap();
        let (runtime, handle) = InstrumentRuntime::new(engine, TokioContext::shared());
        (tokio::spawn(runtime.run()), handle)
    }

    async fn wait_for(rx: &mut UnboundedReceiver<EngineEvent>, target: RunPhase) {
        while let Some(event) = rx.recv().await {
            if let EngineEvent::StateChanged { phase, .. } = event {
                if phase == target {
                    return;
                }
            }
        }
        panic!("event stream ended before {}", target);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_drives_a_full_run() {
        let (task, handle) = spawn_runtime();
        let (listener, mut rx) = ChannelListener::new();
        handle.subscribe(listener).await.unwrap();

        handle.start_pump().await.unwrap();
        wait_for(&mut rx, RunPhase::Ready).await;
        handle.inject().await.unwrap();
        wait_for(&mut rx, RunPhase::Completed).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase(), RunPhase::Completed);
        assert!(!snapshot.clock_active);

        handle.shutdown().await.unwrap();
        let engine = task.await.unwrap();
        assert_eq!(engine.chromatogram().len(), snapshot.chromatogram.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_the_period() {
        let (task, handle) = spawn_runtime();
        handle.start_pump().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1050)).await;
        handle.stop_pump().await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.chromatogram.len(), 10);
        assert_eq!(snapshot.phase(), RunPhase::Stopped);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_engine_errors_pass_through() {
        let (task, handle) = spawn_runtime();
        let err = handle.inject().await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Engine(EngineError::InvalidState { operation: "inject", .. })
        ));

        let err = handle.select_sample("morphine").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Engine(EngineError::UnknownSample(_))));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_calls_fail_after_shutdown() {
        let (task, handle) = spawn_runtime();
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let err = handle.start_pump().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Env(EnvError::ChannelClosed(_))));
    }
}
