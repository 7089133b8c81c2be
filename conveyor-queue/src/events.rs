use crate::job::EvaluationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle/worker events emitted onto a typed channel, replacing the teacher's
/// `worker.on('completed', ...)` callback style with a checkable ordering contract (spec.md
/// §4.2 "Worker contract" event list): `active` always precedes a terminal `completed`/`failed`
/// for a given `(job_id, attempt)`, and at most one terminal event fires per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerEvent {
    Ready,
    Active { job_id: String, attempt: u32 },
    Progress { job_id: String, progress: f64 },
    Completed { job_id: String, attempt: u32, result: EvaluationResult },
    Failed { job_id: String, attempt: u32, error: String },
    Stalled { job_id: String },
    Error { message: String },
}

/// External event-bus publish boundary (spec.md §6 "Event bus publish"): best-effort, failures
/// never propagate. The core publishes evaluation results on `evaluation:complete`/
/// `evaluation:failed` and lifecycle transitions on `system:lifecycle`.
pub trait EventBus: Send + Sync {
    fn publish(&self, topic: &str, payload: Value);
}

/// Default bus for deployments that have not wired a real one: logs at `debug!` and drops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventBus;

impl EventBus for NoopEventBus {
    fn publish(&self, topic: &str, payload: Value) {
        tracing::debug!(topic, %payload, "event bus publish (noop)");
    }
}

/// In-memory bus for tests: records every published `(topic, payload)` pair in order.
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    pub published: parking_lot::Mutex<Vec<(String, Value)>>,
}

impl EventBus for RecordingEventBus {
    fn publish(&self, topic: &str, payload: Value) {
        self.published.lock().push((topic.to_string(), payload));
    }
}

/// `topic ∈ {evaluation:complete, evaluation:failed}` payload per spec.md §6 "Outbound from
/// core" — `{jobId, candidateId, instrument, success, metrics?, assessment?, error?,
/// processingTimeMs, timestamp}`.
pub fn publish_evaluation_result(bus: &dyn EventBus, result: &EvaluationResult, timestamp: chrono::DateTime<chrono::Utc>) {
    let topic = if result.is_success() { "evaluation:complete" } else { "evaluation:failed" };
    let payload = match serde_json::to_value(result) {
        Ok(mut value) => {
            if let Value::Object(ref mut map) = value {
                map.insert("timestamp".to_string(), Value::String(timestamp.to_rfc3339()));
            }
            value
        }
        Err(error) => {
            tracing::warn!(%error, "failed to serialize evaluation result for event bus publish");
            Value::Null
        }
    };
    bus.publish(topic, payload);
}

/// `system:lifecycle` payload per spec.md §6 — `{event, name?, timestamp}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Started,
    Stopped,
    Paused,
    Resumed,
    BreakerOpen,
    BreakerClosed,
}

pub fn publish_lifecycle(
    bus: &dyn EventBus,
    event: LifecycleEvent,
    name: Option<&str>,
    timestamp: chrono::DateTime<chrono::Utc>,
) {
    let payload = serde_json::json!({
        "event": event,
        "name": name,
        "timestamp": timestamp.to_rfc3339(),
    });
    bus.publish("system:lifecycle", payload);
}
