//! Live run through the async runtime: pump, equilibrate, inject, elute.
//!
//! Works with any context: `TokioContext` paces ticks in wall-clock time
//! (classroom demo), `SimContext` runs them back to back.

use crate::exporter::RunExport;
use hplc_core::{
    ChannelListener, Engine, EngineConfig, EngineEvent, InstrumentRuntime, RunPhase, RuntimeError,
};
use hplc_env::InstrumentContext;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Event stream closed while waiting for {0}")]
    StreamClosed(RunPhase),

    #[error("Runtime task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Waits for `target`, forwarding every event to `sink`.
async fn wait_for_phase(
    rx: &mut UnboundedReceiver<EngineEvent>,
    target: RunPhase,
    sink: &mut Vec<EngineEvent>,
    on_event: &mut impl FnMut(&EngineEvent),
) -> Result<(), LiveError> {
    while let Some(event) = rx.recv().await {
        on_event(&event);
        let reached = matches!(event, EngineEvent::StateChanged { phase, .. } if phase == target);
        sink.push(event);
        if reached {
            return Ok(());
        }
    }
    Err(LiveError::StreamClosed(target))
}

/// Runs one injection of `sample_id` to completion and returns the export.
///
/// `on_event` sees every event as it arrives, e.g. to print the trace.
pub async fn run_live<Ctx: InstrumentContext>(
    config: EngineConfig,
    sample_id: &str,
    ctx: Arc<Ctx>,
    mut on_event: impl FnMut(&EngineEvent),
) -> Result<RunExport, LiveError> {
    let seed = ctx.seed();
    let engine = Engine::with_context(config, ctx.as_ref()).map_err(RuntimeError::from)?;
    let (runtime, handle) = InstrumentRuntime::new(engine, ctx);
    let task = tokio::spawn(runtime.run());

    let (listener, mut rx) = ChannelListener::new();
    handle.subscribe(listener).await?;
    handle.select_sample(sample_id).await?;

    let mut events = Vec::new();
    handle.start_pump().await?;
    wait_for_phase(&mut rx, RunPhase::Ready, &mut events, &mut on_event).await?;

    handle.inject().await?;
    info!("Injected {}", sample_id);
    wait_for_phase(&mut rx, RunPhase::Completed, &mut events, &mut on_event).await?;

    handle.shutdown().await?;
    let engine = task.await?;

    let mut export = RunExport::new("live", seed, &engine.snapshot()).with_events(events);
    export.finalize(engine.phase() == RunPhase::Completed, None);
    Ok(export)
}
