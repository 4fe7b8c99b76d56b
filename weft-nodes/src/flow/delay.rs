//! Delay component.
//!
//! Sleeps for the requested number of milliseconds, then forwards the
//! context. The downstream emit result is returned verbatim, so a blocking
//! downstream's outcome propagates back through the caller.

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use weft_core::prelude::*;

/// Kind name of the delay component.
pub const COMPONENT_NAME: &str = "delay";
/// Input port.
pub const IN_PORT: &str = "in";
/// Output port.
pub const OUT_PORT: &str = "out";

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    context: JsonValue,
    delay: i64,
}

/// Sleep-then-forward.
#[derive(Debug, Default)]
pub struct Delay;

impl Component for Delay {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self)
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Delay")
            .with_info("Sleeps before passing incoming messages further")
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port::new(IN_PORT)
                .labeled("In")
                .with_config(json!({ "context": null, "delay": 1000 })),
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
            if port != IN_PORT {
                return Err(WeftError::unknown_port(port));
            }
            let request: Request = msg.decode(port)?;
            if request.delay <= 0 {
                return Err(WeftError::validation("invalid delay"));
            }

            // The sleep is not cancellable via input, only via the
            // invocation context.
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(request.delay as u64)) => {}
                _ = ctx.cancelled() => return Err(WeftError::Cancelled),
            }

            emit.emit(ctx, OUT_PORT, EmitMessage::Value(request.context))
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::testing::Harness;

    #[tokio::test(start_paused = true)]
    async fn sleeps_then_forwards() {
        let harness = Harness::new(&Delay);
        harness
            .send(IN_PORT, json!({"context": "later", "delay": 5000}))
            .await
            .unwrap();
        assert_eq!(harness.port_outputs(OUT_PORT), vec![json!("later")]);
    }

    #[tokio::test]
    async fn rejects_non_positive_delay() {
        let harness = Harness::new(&Delay);
        for delay in [0, -5] {
            let err = harness
                .send(IN_PORT, json!({"context": null, "delay": delay}))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "E201");
        }
        assert!(harness.outputs().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_sleep() {
        let harness = Harness::new(&Delay);
        let ctx = Context::new();
        let cancel = ctx.cancel_token().clone();

        let pending = harness.handle_with(
            ctx,
            IN_PORT,
            Packet::Value(json!({"context": null, "delay": 60_000})),
        );
        tokio::pin!(pending);

        tokio::select! {
            _ = &mut pending => panic!("delay completed before cancellation"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => cancel.cancel(),
        }

        let err = pending.await.unwrap_err();
        assert_eq!(err.code(), "E401");
        assert!(harness.outputs().is_empty());
    }
}
