//! Cron component (scheduled emitter).
//!
//! Evaluates a classic five-field cron expression and emits the
//! configured context at each scheduled tick. Tick-time drift is not
//! corrected: each next tick is computed from real time at emission.
//! Survives pod restarts and leadership changes via metadata.

use chrono::{DateTime, SecondsFormat, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weft_core::prelude::*;

/// Kind name of the cron component.
pub const COMPONENT_NAME: &str = "cron";
/// Output port.
pub const OUT_PORT: &str = "out";

/// Metadata marker: the cron should be actively emitting.
pub const METADATA_KEY_RUNNING: &str = "cron-running";
/// Metadata key holding the schedule expression.
pub const METADATA_KEY_SCHEDULE: &str = "cron-schedule";
/// Metadata key holding the serialized context payload.
pub const METADATA_KEY_CONTEXT: &str = "cron-context";
/// Metadata key holding the last schedule parse error.
pub const METADATA_KEY_ERROR: &str = "cron-error";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Settings {
    #[serde(default)]
    context: JsonValue,
    schedule: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            context: JsonValue::Null,
            schedule: "*/1 * * * *".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ControlMsg {
    #[serde(default)]
    context: JsonValue,
    #[serde(default)]
    schedule: String,
    #[serde(default)]
    start: bool,
    #[serde(default)]
    stop: bool,
}

/// Parse a five-field cron expression (minute hour day-of-month month
/// day-of-week). The underlying parser wants a seconds column, so one is
/// prepended; ticks land exactly on minute boundaries.
fn parse_schedule(expression: &str) -> Result<Schedule> {
    let expression = expression.trim();
    if expression.split_whitespace().count() != 5 {
        return Err(WeftError::Schedule {
            expression: expression.to_string(),
            cause: "expected five fields (minute hour day-of-month month day-of-week)"
                .to_string(),
        });
    }
    Schedule::from_str(&format!("0 {expression}")).map_err(|e| WeftError::Schedule {
        expression: expression.to_string(),
        cause: e.to_string(),
    })
}

#[derive(Debug, Default)]
struct CronState {
    settings: Mutex<Settings>,
    cancel: Mutex<Option<CancellationToken>>,
    next_tick: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<String>,
    settings_from_port: AtomicBool,
    run_lock: tokio::sync::Mutex<()>,
}

impl CronState {
    fn is_running(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// The scheduling loop. Sleeps until the next fire time, emits, then
    /// recomputes the next fire time from the current clock.
    async fn run(self: Arc<Self>, ctx: Context, emit: Emitter) -> Result<()> {
        let _serialized = self.run_lock.lock().await;

        let run_ctx = ctx.child();
        *self.cancel.lock() = Some(run_ctx.cancel_token().clone());

        let expression = self.settings.lock().schedule.clone();
        let schedule = match parse_schedule(&expression) {
            Ok(schedule) => schedule,
            Err(err) => {
                // The resume path can restore an expression the running
                // replica never validated.
                *self.cancel.lock() = None;
                *self.last_error.lock() = err.to_string();
                self.clear_running_metadata(&ctx, &emit).await?;
                return Err(err);
            }
        };

        *self.next_tick.lock() = schedule.upcoming(Utc).next();
        let _ = emit
            .emit(run_ctx.detached(), RECONCILE_PORT, EmitMessage::Refresh)
            .await;
        tracing::info!(schedule = %expression, "cron started");

        loop {
            let Some(next) = *self.next_tick.lock() else {
                break;
            };
            if !wait_until(&run_ctx, next).await {
                break;
            }

            let payload = self.settings.lock().context.clone();
            let tick_ctx = run_ctx.with_new_trace();
            tracing::debug!(trace = %tick_ctx.trace_id(), "cron tick fired");
            let _ = emit
                .emit(tick_ctx, OUT_PORT, EmitMessage::Value(payload))
                .await;
            if run_ctx.is_cancelled() {
                break;
            }

            let next = schedule.upcoming(Utc).next();
            *self.next_tick.lock() = next;
            let _ = emit
                .emit(run_ctx.detached(), RECONCILE_PORT, EmitMessage::Refresh)
                .await;
            tracing::debug!(next_tick = ?next, "cron scheduled next tick");
        }

        *self.cancel.lock() = None;
        *self.next_tick.lock() = None;
        let _ = emit
            .emit(ctx.detached(), RECONCILE_PORT, EmitMessage::Refresh)
            .await;
        tracing::info!("cron stopped");
        Ok(())
    }

    async fn stop(&self, ctx: &Context, emit: &Emitter) -> Result<()> {
        if let Some(cancel) = self.cancel.lock().clone() {
            cancel.cancel();
        }
        self.clear_running_metadata(ctx, emit).await
    }

    async fn persist_running_state(&self, ctx: &Context, emit: &Emitter) -> Result<()> {
        let (schedule, context) = {
            let settings = self.settings.lock();
            (settings.schedule.clone(), settings.context.clone())
        };
        let context = serde_json::to_string(&context)
            .map_err(|e| WeftError::Serialization(e.to_string()))?;

        emit.emit(
            ctx.detached(),
            RECONCILE_PORT,
            EmitMessage::patch(move |meta| {
                meta.insert(METADATA_KEY_RUNNING.to_string(), "true".to_string());
                meta.insert(METADATA_KEY_SCHEDULE.to_string(), schedule);
                meta.insert(METADATA_KEY_CONTEXT.to_string(), context);
                Ok(())
            }),
        )
        .await
    }

    async fn clear_running_metadata(&self, ctx: &Context, emit: &Emitter) -> Result<()> {
        emit.emit(
            ctx.detached(),
            RECONCILE_PORT,
            EmitMessage::patch(|meta| {
                meta.remove(METADATA_KEY_RUNNING);
                meta.remove(METADATA_KEY_SCHEDULE);
                meta.remove(METADATA_KEY_CONTEXT);
                meta.remove(METADATA_KEY_ERROR);
                Ok(())
            }),
        )
        .await
    }

    async fn persist_error(&self, ctx: &Context, emit: &Emitter, message: String) -> Result<()> {
        emit.emit(
            ctx.detached(),
            RECONCILE_PORT,
            EmitMessage::patch(move |meta| {
                meta.insert(METADATA_KEY_ERROR.to_string(), message);
                Ok(())
            }),
        )
        .await
    }

    async fn clear_error(&self, ctx: &Context, emit: &Emitter) -> Result<()> {
        emit.emit(
            ctx.detached(),
            RECONCILE_PORT,
            EmitMessage::patch(|meta| {
                meta.remove(METADATA_KEY_ERROR);
                Ok(())
            }),
        )
        .await
    }

    fn restore_from_metadata(&self, node: &NodeState) {
        if self.settings_from_port.load(Ordering::SeqCst) {
            return;
        }

        if let Some(schedule) = node.get(METADATA_KEY_SCHEDULE).filter(|s| !s.is_empty()) {
            self.settings.lock().schedule = schedule.to_string();
        }
        if let Some(raw) = node.get(METADATA_KEY_CONTEXT).filter(|s| !s.is_empty()) {
            if let Ok(context) = serde_json::from_str::<JsonValue>(raw) {
                self.settings.lock().context = context;
            }
        }
        if let Some(error) = node.get(METADATA_KEY_ERROR) {
            *self.last_error.lock() = error.to_string();
        }
    }

    fn control_config(&self) -> JsonValue {
        let settings = self.settings.lock().clone();

        if self.is_running() {
            let next_run = self
                .next_tick
                .lock()
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default();
            return json!({
                "context": settings.context,
                "schedule": settings.schedule,
                "nextRun": next_run,
                "status": "Running",
                "stop": true,
            });
        }

        let last_error = self.last_error.lock().clone();
        let status = if last_error.is_empty() {
            "Not running".to_string()
        } else {
            last_error
        };
        json!({
            "context": settings.context,
            "schedule": settings.schedule,
            "nextRun": "",
            "status": status,
            "start": true,
        })
    }
}

/// Wait until `t`, interruptible by cancellation. Returns false when
/// cancelled. A fire time already in the past fires immediately.
async fn wait_until(ctx: &Context, t: DateTime<Utc>) -> bool {
    let wait = (t - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    if wait.is_zero() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(wait) => true,
        _ = ctx.cancelled() => false,
    }
}

/// Scheduled emitter driven by cron expressions.
#[derive(Debug, Default)]
pub struct Cron {
    state: Arc<CronState>,
}

impl Component for Cron {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::default())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Cron")
            .with_info(
                "Scheduled emitter using cron expressions. Click Start to begin emitting \
                 context on Out port according to the schedule. Supports standard cron syntax \
                 (minute hour day-of-month month day-of-week). Examples: '*/5 * * * *' (every \
                 5 min), '0 */2 * * *' (every 2 hours), '0 9 * * 1-5' (9 AM weekdays). Click \
                 Stop to pause. Cron survives pod restarts and leadership changes.",
            )
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        let settings = self.state.settings.lock().clone();
        vec![
            Port::reconcile(),
            Port::settings(json!({
                "context": settings.context,
                "schedule": settings.schedule,
            })),
            Port::new(OUT_PORT)
                .labeled("Out")
                .source()
                .at(Position::Right),
            Port::control(self.state.control_config()),
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
                    self.state.restore_from_metadata(node);

                    // Orphaned running marker: resume on the leader.
                    if node.get(METADATA_KEY_RUNNING).is_some()
                        && !self.state.is_running()
                        && ctx.is_leader()
                    {
                        tracing::info!("cron: resuming after pod restart or leadership change");
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
                        self.state.persist_running_state(&ctx, &emit).await?;
                    }
                    Ok(())
                }

                CONTROL_PORT => {
                    if msg.is_null() {
                        return Ok(());
                    }
                    if !ctx.is_leader() {
                        return Ok(());
                    }
                    let control: ControlMsg = msg.decode(port)?;

                    if control.stop {
                        return self.state.stop(&ctx, &emit).await;
                    }
                    if !control.start {
                        return Ok(());
                    }

                    // Validate before starting; a bad expression is
                    // surfaced through metadata and the control Status,
                    // not returned as a handler error.
                    if let Err(err) = parse_schedule(&control.schedule) {
                        let message = err.to_string();
                        *self.state.last_error.lock() = message.clone();
                        self.state.persist_error(&ctx, &emit, message).await?;
                        return Ok(());
                    }

                    {
                        let mut settings = self.state.settings.lock();
                        settings.context = control.context;
                        settings.schedule = control.schedule;
                    }
                    self.state.settings_from_port.store(true, Ordering::SeqCst);
                    self.state.last_error.lock().clear();
                    self.state.clear_error(&ctx, &emit).await?;

                    self.state.persist_running_state(&ctx, &emit).await?;
                    tokio::spawn(self.state.clone().run(ctx.detached(), emit));
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

    #[test]
    fn five_field_expressions_parse() {
        assert!(parse_schedule("*/5 * * * *").is_ok());
        assert!(parse_schedule("0 9 * * 1-5").is_ok());
    }

    #[test]
    fn invalid_expressions_are_rejected() {
        assert_eq!(parse_schedule("not-a-cron").unwrap_err().code(), "E202");
        // Six fields are the parser's native form but not this contract.
        assert_eq!(parse_schedule("0 0 9 * * 1-5").unwrap_err().code(), "E202");
    }

    #[test]
    fn next_fire_is_on_a_minute_boundary() {
        let schedule = parse_schedule("*/1 * * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.timestamp() % 60, 0);
    }

    #[test]
    fn control_config_surfaces_last_error() {
        let state = CronState::default();
        *state.last_error.lock() = "invalid schedule".to_string();
        let config = state.control_config();
        assert_eq!(config["status"], json!("invalid schedule"));
        assert_eq!(config["start"], json!(true));
    }

    #[test]
    fn control_config_shows_next_run_while_running() {
        let state = CronState::default();
        *state.cancel.lock() = Some(CancellationToken::new());
        let next = Utc::now();
        *state.next_tick.lock() = Some(next);

        let config = state.control_config();
        assert_eq!(config["status"], json!("Running"));
        assert_eq!(
            config["nextRun"],
            json!(next.to_rfc3339_opts(SecondsFormat::Secs, true))
        );
        assert_eq!(config["stop"], json!(true));
    }
}
