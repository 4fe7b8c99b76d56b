//! Scheduler component (one-shot task pool).
//!
//! Accepts tasks on the Tasks port and, while started, emits each at its
//! due time. Tasks are keyed by id: re-submitting an id reschedules it,
//! submitting with `schedule: false` unschedules it. The pool is
//! instance-local; multiple scheduler instances do not share state.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weft_core::prelude::*;

/// Kind name of the scheduler component.
pub const COMPONENT_NAME: &str = "scheduler";
/// Task input port.
pub const IN_PORT: &str = "in";
/// Scheduled-task output port.
pub const OUT_PORT: &str = "out";
/// Start input port.
pub const START_PORT: &str = "start";
/// Optional stop input port, enabled via settings.
pub const STOP_PORT: &str = "stop";
/// Optional acknowledgement output port, enabled via settings.
pub const ACK_PORT: &str = "ack";

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    #[serde(default)]
    enable_ack_port: bool,
    #[serde(default)]
    enable_stop_port: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Task {
    id: String,
    date_time: DateTime<Utc>,
    schedule: bool,
}

#[derive(Debug, Deserialize)]
struct InMessage {
    #[serde(default)]
    context: JsonValue,
    task: Task,
}

#[derive(Debug, Deserialize)]
struct ControlMsg {
    #[serde(default)]
    start: bool,
    #[serde(default)]
    stop: bool,
}

struct TaskEntry {
    cancel: CancellationToken,
    generation: u64,
}

/// One-shot task pool.
pub struct Scheduler {
    settings: Mutex<Settings>,
    cancel: Mutex<Option<CancellationToken>>,
    run_ctx: Mutex<Option<Context>>,
    run_lock: tokio::sync::Mutex<()>,
    tasks: Arc<DashMap<String, TaskEntry>>,
    generation: AtomicU64,
}

impl Scheduler {
    /// Create a stopped scheduler.
    pub fn new() -> Self {
        Self {
            settings: Mutex::new(Settings::default()),
            cancel: Mutex::new(None),
            run_ctx: Mutex::new(None),
            run_lock: tokio::sync::Mutex::new(()),
            tasks: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn is_running(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// Run until the context or a Stop cancels us. Holds the run lock for
    /// the whole run so Start/Stop transitions are serialized.
    async fn run(&self, ctx: Context, emit: Emitter) -> Result<()> {
        let _serialized = self.run_lock.lock().await;

        let run_ctx = ctx.child();
        *self.cancel.lock() = Some(run_ctx.cancel_token().clone());
        *self.run_ctx.lock() = Some(run_ctx.clone());

        let _ = emit
            .emit(ctx.detached(), RECONCILE_PORT, EmitMessage::Refresh)
            .await;
        tracing::info!("scheduler started");

        run_ctx.cancelled().await;

        *self.cancel.lock() = None;
        *self.run_ctx.lock() = None;
        let _ = emit
            .emit(ctx.detached(), RECONCILE_PORT, EmitMessage::Refresh)
            .await;
        tracing::info!("scheduler stopped");
        Ok(())
    }

    fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().clone() {
            cancel.cancel();
        }
    }

    /// Add, reschedule, or remove a task. The due duration is clamped to
    /// zero so past-due tasks fire immediately.
    fn add_or_update(&self, emit: Emitter, task: Task, context: JsonValue) -> Result<()> {
        let Some(run_ctx) = self.run_ctx.lock().clone() else {
            return Err(WeftError::NotRunning {
                component: COMPONENT_NAME.to_string(),
            });
        };

        if let Some((_, old)) = self.tasks.remove(&task.id) {
            old.cancel.cancel();
        }
        if !task.schedule {
            return Ok(());
        }

        let due = (task.date_time - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        // Each scheduled task fires as its own flow pass.
        let task_ctx = run_ctx.child().with_new_trace();
        self.tasks.insert(
            task.id.clone(),
            TaskEntry {
                cancel: task_ctx.cancel_token().clone(),
                generation,
            },
        );

        let payload = json!({ "task": &task, "context": context });
        let id = task.id;
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            let fire = tokio::select! {
                _ = tokio::time::sleep(due) => true,
                _ = task_ctx.cancelled() => false,
            };
            // Only this timer's own entry may be removed; the id may have
            // been rescheduled under a newer generation meanwhile.
            tasks.remove_if(&id, |_, entry| entry.generation == generation);
            if fire {
                if let Err(err) = emit
                    .emit(task_ctx, OUT_PORT, EmitMessage::Value(payload))
                    .await
                {
                    tracing::warn!(task = %id, error = %err, "scheduled emission failed");
                }
            }
        });
        Ok(())
    }

    fn control_config(&self) -> JsonValue {
        if self.is_running() {
            json!({ "stop": true, "status": "Running" })
        } else {
            json!({ "start": true, "status": "Not running" })
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Scheduler {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::new())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Scheduler")
            .with_info(
                "Collects tasks messages. When its running sends messages further when \
                 scheduled date and time come. Tasks with same IDs are updating scheduled date \
                 and task itself. If scheduled date is already passed - sends message as soon \
                 as being started.",
            )
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        let settings = *self.settings.lock();

        let mut ports = vec![
            Port::settings(json!({
                "enableAckPort": settings.enable_ack_port,
                "enableStopPort": settings.enable_stop_port,
            })),
            Port::new(START_PORT).labeled("Start").with_config(json!({})),
            Port::control(self.control_config()).labeled("Dashboard"),
            Port::new(IN_PORT).labeled("Tasks").with_config(json!({
                "context": null,
                "task": {
                    "id": "someUniqueID",
                    "dateTime": Utc::now(),
                    "schedule": true,
                },
            })),
            Port::new(OUT_PORT)
                .labeled("Scheduled")
                .source()
                .at(Position::Right)
                .with_config(json!({ "task": null, "context": null })),
        ];

        if settings.enable_stop_port {
            ports.push(
                Port::new(STOP_PORT)
                    .labeled("Stop")
                    .at(Position::Bottom)
                    .with_config(json!({})),
            );
        }
        if settings.enable_ack_port {
            ports.push(
                Port::new(ACK_PORT)
                    .labeled("Ack")
                    .source()
                    .at(Position::Right)
                    .with_config(json!({
                        "task": null,
                        "context": null,
                        "scheduledIn": 0,
                        "error": null,
                    })),
            );
        }

        ports
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
                    let settings: Settings =
                        msg.decode(port).map_err(|e| WeftError::InvalidSettings {
                            cause: e.to_string(),
                        })?;
                    *self.settings.lock() = settings;
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
                        self.stop();
                        return Ok(());
                    }
                    if control.start {
                        return self.run(ctx, emit).await;
                    }
                    Ok(())
                }

                START_PORT => self.run(ctx, emit).await,

                STOP_PORT => {
                    self.stop();
                    Ok(())
                }

                IN_PORT => {
                    let input: InMessage = msg.decode(port)?;
                    let task = input.task.clone();

                    let scheduled_in = if task.schedule {
                        (task.date_time - Utc::now()).num_seconds()
                    } else {
                        0
                    };

                    let outcome = self.add_or_update(emit.clone(), input.task, input.context.clone());

                    if self.settings.lock().enable_ack_port {
                        let ack = json!({
                            "task": task,
                            "context": input.context,
                            "scheduledIn": scheduled_in,
                            "error": outcome.as_ref().err().map(|e| e.to_string()),
                        });
                        return emit.emit(ctx, ACK_PORT, EmitMessage::Value(ack)).await;
                    }
                    outcome
                }

                _ => Err(WeftError::unknown_port(port)),
            }
        })
    }
}
