//! Async relay component (non-blocking pass-through).
//!
//! Returns immediately and emits the context from a background worker. A
//! bounded semaphore caps the outstanding workers; when the pool is
//! exhausted the handler degrades to synchronous emission, trading caller
//! latency for a bounded worker count.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::Semaphore;
use weft_core::prelude::*;

/// Kind name of the async relay component.
pub const COMPONENT_NAME: &str = "async";
/// Input port.
pub const IN_PORT: &str = "in";
/// Output port.
pub const OUT_PORT: &str = "out";

/// Default bound on outstanding background workers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    #[serde(default = "default_max_concurrency")]
    max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InMessage {
    #[serde(default)]
    context: JsonValue,
}

/// Non-blocking pass-through with bounded worker pool.
pub struct AsyncRelay {
    settings: Mutex<Settings>,
    workers: Mutex<Arc<Semaphore>>,
}

impl AsyncRelay {
    /// Create a relay with the default concurrency bound.
    pub fn new() -> Self {
        Self {
            settings: Mutex::new(Settings::default()),
            workers: Mutex::new(Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENCY))),
        }
    }
}

impl Default for AsyncRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for AsyncRelay {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::new())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Async")
            .with_info(
                "Non-blocking pass-through. Returns immediately (unblocks sender), then emits \
                 context on Out in a background worker. The worker pool is bounded; when it is \
                 full the message is emitted synchronously instead, blocking the sender.",
            )
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        let settings = self.settings.lock().clone();
        vec![
            Port::settings(json!({ "maxConcurrency": settings.max_concurrency })),
            Port::new(IN_PORT)
                .labeled("In")
                .with_config(json!({ "context": null })),
            Port::new(OUT_PORT)
                .labeled("Out")
                .source()
                .at(Position::Right),
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
                SETTINGS_PORT => {
                    let settings: Settings = msg
                        .decode(port)
                        .map_err(|e| WeftError::InvalidSettings {
                            cause: e.to_string(),
                        })?;
                    if settings.max_concurrency == 0 {
                        return Err(WeftError::InvalidSettings {
                            cause: "maxConcurrency must be positive".to_string(),
                        });
                    }
                    let mut workers = self.workers.lock();
                    *workers = Arc::new(Semaphore::new(settings.max_concurrency));
                    *self.settings.lock() = settings;
                    Ok(())
                }

                IN_PORT => {
                    let input: InMessage = msg.decode(port)?;
                    let pool = self.workers.lock().clone();

                    match pool.try_acquire_owned() {
                        Ok(permit) => {
                            // Detach the worker from the caller's
                            // cancellation; the trace carries over.
                            let worker_ctx = ctx.detached();
                            tokio::spawn(async move {
                                let _permit = permit;
                                if let Err(err) = emit
                                    .emit(worker_ctx, OUT_PORT, EmitMessage::Value(input.context))
                                    .await
                                {
                                    tracing::warn!(
                                        error = %err,
                                        "async relay: background emission failed"
                                    );
                                }
                            });
                            Ok(())
                        }
                        Err(_) => {
                            tracing::debug!(
                                "async relay: worker pool exhausted, emitting synchronously"
                            );
                            emit.emit(ctx, OUT_PORT, EmitMessage::Value(input.context))
                                .await
                        }
                    }
                }

                _ => Err(WeftError::unknown_port(port)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::testing::Harness;

    #[tokio::test]
    async fn emits_in_background() {
        let harness = Harness::new(&AsyncRelay::new());
        harness
            .send(IN_PORT, json!({"context": "bg"}))
            .await
            .unwrap();

        // The handler has returned; the worker delivers shortly after.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(harness.port_outputs(OUT_PORT), vec![json!("bg")]);
    }

    #[tokio::test]
    async fn zero_concurrency_is_invalid_settings() {
        let harness = Harness::new(&AsyncRelay::new());
        let err = harness
            .send(SETTINGS_PORT, json!({"maxConcurrency": 0}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E102");
    }

    #[tokio::test]
    async fn exhausted_pool_falls_back_to_synchronous_emission() {
        let harness = Harness::new(&AsyncRelay::new());
        harness
            .send(SETTINGS_PORT, json!({"maxConcurrency": 1}))
            .await
            .unwrap();

        // Hold the only worker open on a blocking edge.
        harness.mark_blocking(OUT_PORT);
        harness
            .send(IN_PORT, json!({"context": "held"}))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(harness.port_outputs(OUT_PORT).len(), 1);

        // Pool is full: this one must be emitted on the caller's thread.
        // It lands on the same blocking port, so drive it with a context
        // we can end the edge through.
        let ctx = Context::new();
        let cancel = ctx.cancel_token().clone();
        let call = harness.handle_with(
            ctx,
            IN_PORT,
            Packet::Value(json!({"context": "sync"})),
        );
        tokio::pin!(call);

        tokio::select! {
            _ = &mut call => panic!("synchronous fallback returned before the edge ended"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {
                // Both payloads recorded, second one synchronously.
                assert_eq!(harness.port_outputs(OUT_PORT).len(), 2);
                cancel.cancel();
            }
        }
        call.await.unwrap();
    }
}
