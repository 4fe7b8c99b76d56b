//! Ticker component (periodic emitter).
//!
//! Emits the configured context once per delay period. The first tick
//! fires immediately on Start; thereafter the delay is measured from
//! downstream completion, not from tick start, so a slow consumer slows
//! the ticker instead of piling up emissions.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weft_core::prelude::*;

/// Kind name of the ticker component.
pub const COMPONENT_NAME: &str = "ticker";
/// Output port.
pub const OUT_PORT: &str = "out";

/// Metadata marker: the ticker should be actively emitting.
pub const METADATA_KEY_RUNNING: &str = "ticker-running";
/// Metadata key holding the serialized settings for resume.
pub const METADATA_KEY_CONFIG: &str = "ticker-config";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Settings {
    #[serde(default)]
    context: JsonValue,
    delay: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            context: JsonValue::Null,
            delay: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ControlMsg {
    #[serde(default)]
    context: JsonValue,
    #[serde(default)]
    start: bool,
    #[serde(default)]
    stop: bool,
}

#[derive(Debug, Default)]
struct TickerState {
    settings: Mutex<Settings>,
    cancel: Mutex<Option<CancellationToken>>,
    settings_from_port: AtomicBool,
    run_lock: tokio::sync::Mutex<()>,
}

impl TickerState {
    fn is_running(&self) -> bool {
        self.cancel.lock().is_some()
    }

    fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().clone() {
            cancel.cancel();
        }
    }

    /// The emission loop. One worker per instance, serialized by the run
    /// lock. First tick is immediate; each subsequent tick waits `delay`
    /// ms after the previous downstream completion.
    async fn run(self: Arc<Self>, ctx: Context, emit: Emitter) -> Result<()> {
        let _serialized = self.run_lock.lock().await;

        let run_ctx = ctx.child();
        *self.cancel.lock() = Some(run_ctx.cancel_token().clone());
        let _ = emit
            .emit(run_ctx.detached(), RECONCILE_PORT, EmitMessage::Refresh)
            .await;
        tracing::info!("ticker started");

        loop {
            let (payload, delay) = {
                let settings = self.settings.lock();
                (settings.context.clone(), settings.delay)
            };

            let tick_ctx = run_ctx.with_new_trace();
            tracing::debug!(trace = %tick_ctx.trace_id(), "ticker tick fired");
            let _ = emit
                .emit(tick_ctx, OUT_PORT, EmitMessage::Value(payload))
                .await;
            if run_ctx.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                _ = run_ctx.cancelled() => break,
            }
        }

        *self.cancel.lock() = None;
        let _ = emit
            .emit(ctx.detached(), RECONCILE_PORT, EmitMessage::Refresh)
            .await;
        tracing::info!("ticker stopped");
        Ok(())
    }

    async fn persist_running(&self, ctx: &Context, emit: &Emitter) -> Result<()> {
        let config = serde_json::to_string(&*self.settings.lock())
            .map_err(|e| WeftError::Serialization(e.to_string()))?;
        emit.emit(
            ctx.detached(),
            RECONCILE_PORT,
            EmitMessage::patch(move |meta| {
                meta.insert(METADATA_KEY_RUNNING.to_string(), "true".to_string());
                meta.insert(METADATA_KEY_CONFIG.to_string(), config);
                Ok(())
            }),
        )
        .await
    }

    async fn clear_running(&self, ctx: &Context, emit: &Emitter) -> Result<()> {
        emit.emit(
            ctx.detached(),
            RECONCILE_PORT,
            EmitMessage::patch(|meta| {
                meta.remove(METADATA_KEY_RUNNING);
                meta.remove(METADATA_KEY_CONFIG);
                Ok(())
            }),
        )
        .await
    }
}

/// Periodic emitter.
#[derive(Debug, Default)]
pub struct Ticker {
    state: Arc<TickerState>,
}

impl Component for Ticker {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::default())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Ticker")
            .with_info(
                "Periodic emitter. Click Start to begin emitting context on Out. Emits \
                 immediately, then waits for Out to unblock (downstream completes) plus \
                 [delay] ms before the next emit. Click Stop to pause. Survives pod restarts \
                 and leadership changes. Use for polling or scheduled triggers.",
            )
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        let state = &self.state;
        let settings = state.settings.lock().clone();

        let control = if state.is_running() {
            json!({ "context": &settings.context, "status": "Running", "stop": true })
        } else {
            json!({ "context": &settings.context, "status": "Not running", "start": true })
        };

        vec![
            Port::reconcile(),
            Port::settings(json!({ "context": settings.context, "delay": settings.delay })),
            Port::new(OUT_PORT)
                .labeled("Out")
                .source()
                .at(Position::Right),
            Port::control(control),
        ]
    }

    fn handle<'a>(
        &'a self,
        ctx: Context,
        emit: Emitter,
        port: &'a str,
        msg: Packet,
    ) -> ComponentFuture<'a> {
        Box::pin(async move {
            match port {
                RECONCILE_PORT => {
                    let Some(node) = msg.node() else {
                        return Ok(());
                    };

                    if !self.state.settings_from_port.load(Ordering::SeqCst) {
                        if let Some(raw) = node.get(METADATA_KEY_CONFIG) {
                            if let Ok(settings) = serde_json::from_str::<Settings>(raw) {
                                *self.state.settings.lock() = settings;
                            }
                        }
                    }

                    // Resume after a pod restart or leadership change.
                    if node.get(METADATA_KEY_RUNNING).is_some()
                        && !self.state.is_running()
                        && ctx.is_leader()
                    {
                        tracing::info!("ticker: resuming after pod restart or leadership change");
                        tokio::spawn(self.state.clone().run(ctx.detached(), emit));
                    }
                    Ok(())
                }

                SETTINGS_PORT => {
                    let settings: Settings =
                        msg.decode(port).map_err(|e| WeftError::InvalidSettings {
                            cause: e.to_string(),
                        })?;
                    *self.state.settings.lock() = settings;
                    self.state.settings_from_port.store(true, Ordering::SeqCst);
                    if self.state.is_running() {
                        self.state.persist_running(&ctx, &emit).await?;
                    }
                    Ok(())
                }

                CONTROL_PORT => {
                    if !ctx.is_leader() {
                        return Ok(());
                    }
                    if msg.is_null() {
                        return Ok(());
                    }
                    let control: ControlMsg = msg.decode(port)?;

                    if control.stop {
                        self.state.stop();
                        return self.state.clear_running(&ctx, &emit).await;
                    }
                    if !control.start {
                        return Ok(());
                    }

                    {
                        let mut settings = self.state.settings.lock();
                        settings.context = control.context;
                    }
                    self.state.settings_from_port.store(true, Ordering::SeqCst);
                    self.state.persist_running(&ctx, &emit).await?;

                    // The Start handler is the long-running worker; it
                    // returns when the ticker is stopped or cancelled.
                    self.state.clone().run(ctx, emit).await
                }

                _ => Err(WeftError::unknown_port(port)),
            }
        })
    }
}
