//! Signal component (blocking flow trigger).
//!
//! Flow entry point: the operator clicks Send to begin emission and Reset
//! to end it. The Out port is blocking, so the emit stays outstanding for
//! the lifetime of the downstream edge. Running state and the payload are
//! persisted to metadata before the blocking emit begins, which lets a
//! new leader re-enter the emit with the same payload after a pod restart
//! or leadership change.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use weft_core::prelude::*;

/// Kind name of the signal component.
pub const COMPONENT_NAME: &str = "signal";
/// Blocking output port.
pub const OUT_PORT: &str = "out";

/// Metadata marker: an emission is in progress.
pub const METADATA_KEY_RUNNING: &str = "signal-running";
/// Metadata key holding the serialized emission payload.
pub const METADATA_KEY_CONTEXT: &str = "signal-context";

#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default)]
    context: JsonValue,
}

#[derive(Debug, Deserialize)]
struct ControlMsg {
    #[serde(default)]
    context: JsonValue,
    #[serde(default)]
    reset: bool,
}

struct RunHandle {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SignalState {
    settings: Mutex<Settings>,
    /// Last control-supplied payload; preserved across Reset so the next
    /// Send reuses it.
    control_context: Mutex<JsonValue>,
    run: Mutex<Option<RunHandle>>,
    next_run_id: AtomicU64,
    /// Running marker as synced from metadata, so non-leader replicas
    /// render the correct buttons too.
    running_meta: AtomicBool,
    /// Serializes control handling so concurrent Send/Reset cannot race.
    handle_lock: tokio::sync::Mutex<()>,
}

impl SignalState {
    fn payload(&self) -> JsonValue {
        let control_context = self.control_context.lock().clone();
        if !control_context.is_null() {
            return control_context;
        }
        self.settings.lock().context.clone()
    }

    fn reset_enable(&self) -> bool {
        self.running_meta.load(Ordering::SeqCst) || self.run.lock().is_some()
    }

    fn cancel_outstanding(&self) {
        if let Some(handle) = self.run.lock().take() {
            handle.cancel.cancel();
        }
    }

    /// Launch the blocking emit in the background. The caller must have
    /// persisted the running marker and payload first.
    fn launch(self: Arc<Self>, ctx: Context, emit: Emitter, payload: JsonValue) {
        let id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let run_ctx = ctx.detached().child();
        *self.run.lock() = Some(RunHandle {
            id,
            cancel: run_ctx.cancel_token().clone(),
        });

        let state = self;
        tokio::spawn(async move {
            let started = Instant::now();
            let result = emit
                .emit(run_ctx.clone(), OUT_PORT, EmitMessage::Value(payload))
                .await;
            tracing::info!(
                elapsed = ?started.elapsed(),
                result = ?result.as_ref().map(|_| ()),
                "signal: blocking emit returned"
            );

            // Completion and cancellation both mean "edge ended". Clear
            // the running state unless a newer Send took over meanwhile.
            let owns_run = {
                let mut run = state.run.lock();
                match run.as_ref() {
                    Some(handle) if handle.id == id => {
                        *run = None;
                        true
                    }
                    _ => false,
                }
            };
            if !owns_run {
                return;
            }

            state.running_meta.store(false, Ordering::SeqCst);
            let cleanup = run_ctx.detached();
            let _ = emit
                .emit(
                    cleanup.clone(),
                    RECONCILE_PORT,
                    EmitMessage::patch(|meta| {
                        meta.remove(METADATA_KEY_RUNNING);
                        meta.remove(METADATA_KEY_CONTEXT);
                        Ok(())
                    }),
                )
                .await;
            let _ = emit
                .emit(cleanup, RECONCILE_PORT, EmitMessage::Refresh)
                .await;
        });
    }
}

/// Blocking flow trigger.
#[derive(Default)]
pub struct Signal {
    state: Arc<SignalState>,
}

impl Component for Signal {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::default())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Signal")
            .with_info(
                "Flow trigger. Click Send to emit configured context on Out port and start \
                 the flow. Signal keeps running (maintaining the trigger) until Reset is \
                 clicked. Use as entry point - connect Out to components you want to activate \
                 when flow starts.",
            )
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        let reset_enable = self.state.reset_enable();
        let context = self.state.payload();

        // Only the applicable button is exposed; resetEnable tells the UI
        // which state it is looking at.
        let control = if reset_enable {
            json!({ "context": context, "reset": true, "resetEnable": true })
        } else {
            json!({ "context": context, "send": true, "resetEnable": false })
        };

        vec![
            Port::reconcile(),
            Port::settings(json!({ "context": self.state.settings.lock().context.clone() })),
            Port::new(OUT_PORT)
                .labeled("Out")
                .source()
                .blocking()
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
                CONTROL_PORT => {
                    // Only the leader acts; otherwise every replica would
                    // multiply the emission.
                    if !ctx.is_leader() {
                        return Ok(());
                    }
                    let control: ControlMsg = msg.decode(port)?;

                    let _serialized = self.state.handle_lock.lock().await;

                    // Keep the payload for the next Send even on Reset.
                    *self.state.control_context.lock() = control.context;
                    self.state.cancel_outstanding();

                    if control.reset {
                        tracing::info!("signal: reset requested");
                        self.state.running_meta.store(false, Ordering::SeqCst);
                        return emit
                            .emit(
                                ctx.detached(),
                                RECONCILE_PORT,
                                EmitMessage::patch(|meta| {
                                    meta.remove(METADATA_KEY_RUNNING);
                                    meta.remove(METADATA_KEY_CONTEXT);
                                    Ok(())
                                }),
                            )
                            .await;
                    }

                    // Send: persist enough state to reconstruct the emit
                    // before the blocking call begins.
                    let payload = self.state.payload();
                    let encoded = serde_json::to_string(&payload)
                        .map_err(|e| WeftError::Serialization(e.to_string()))?;
                    self.state.running_meta.store(true, Ordering::SeqCst);
                    emit.emit(
                        ctx.detached(),
                        RECONCILE_PORT,
                        EmitMessage::patch(move |meta| {
                            meta.insert(METADATA_KEY_RUNNING.to_string(), "true".to_string());
                            meta.insert(METADATA_KEY_CONTEXT.to_string(), encoded);
                            Ok(())
                        }),
                    )
                    .await?;

                    tracing::info!("signal: launching blocking emit");
                    self.state.clone().launch(ctx, emit, payload);
                    Ok(())
                }

                SETTINGS_PORT => {
                    let settings: Settings =
                        msg.decode(port).map_err(|e| WeftError::InvalidSettings {
                            cause: e.to_string(),
                        })?;
                    *self.state.settings.lock() = settings;
                    Ok(())
                }

                RECONCILE_PORT => {
                    let Some(node) = msg.node() else {
                        return Ok(());
                    };

                    let should_be_running = node.get(METADATA_KEY_RUNNING) == Some("true");
                    self.state
                        .running_meta
                        .store(should_be_running, Ordering::SeqCst);

                    if let Some(raw) = node.get(METADATA_KEY_CONTEXT) {
                        if let Ok(saved) = serde_json::from_str::<JsonValue>(raw) {
                            *self.state.control_context.lock() = saved;
                        }
                    }

                    let is_actually_running = self.state.run.lock().is_some();
                    if !should_be_running || is_actually_running || !ctx.is_leader() {
                        return Ok(());
                    }

                    // Crash recovery: re-enter the blocking emit with the
                    // persisted payload, or clear an orphaned marker.
                    let payload = self.state.payload();
                    if payload.is_null() {
                        tracing::warn!("signal: orphaned running marker, clearing");
                        self.state.running_meta.store(false, Ordering::SeqCst);
                        return emit
                            .emit(
                                ctx.detached(),
                                RECONCILE_PORT,
                                EmitMessage::patch(|meta| {
                                    meta.remove(METADATA_KEY_RUNNING);
                                    Ok(())
                                }),
                            )
                            .await;
                    }

                    tracing::info!("signal: auto-recovering blocking emit");
                    self.state.clone().launch(ctx, emit, payload);
                    Ok(())
                }

                _ => Err(WeftError::unknown_port(port)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control_of(signal: &Signal) -> JsonValue {
        signal
            .ports()
            .into_iter()
            .find(|p| p.name == CONTROL_PORT)
            .unwrap()
            .configuration
    }

    #[test]
    fn out_port_is_blocking() {
        let signal = Signal::default();
        let out = signal
            .ports()
            .into_iter()
            .find(|p| p.name == OUT_PORT)
            .unwrap();
        assert!(out.blocking);
        assert!(out.source);
    }

    #[test]
    fn control_shows_send_while_idle() {
        let signal = Signal::default();
        let control = control_of(&signal);
        assert_eq!(control["resetEnable"], json!(false));
        assert_eq!(control["send"], json!(true));
        assert!(control.get("reset").is_none());
    }

    #[test]
    fn control_shows_reset_while_running() {
        let signal = Signal::default();
        signal.state.running_meta.store(true, Ordering::SeqCst);
        let control = control_of(&signal);
        assert_eq!(control["resetEnable"], json!(true));
        assert_eq!(control["reset"], json!(true));
        assert!(control.get("send").is_none());
    }

    #[test]
    fn payload_prefers_control_context() {
        let state = SignalState::default();
        state.settings.lock().context = json!("from-settings");
        assert_eq!(state.payload(), json!("from-settings"));

        *state.control_context.lock() = json!("from-control");
        assert_eq!(state.payload(), json!("from-control"));
    }
}
