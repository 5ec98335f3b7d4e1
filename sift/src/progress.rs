use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::router;

/// The four independently tracked units of progress. Serialized names match
/// what the browser client keys its progress bars on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Upload,
    Parsing,
    GzipMale,
    GzipFemale,
}

impl Stage {
    pub const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            Stage::Upload => 0,
            Stage::Parsing => 1,
            Stage::GzipMale => 2,
            Stage::GzipFemale => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub percent: f64,
}

/// Process-wide fan-out of progress events. Jobs only ever send, subscribers
/// only ever receive; nothing here reads job internals.
#[derive(Clone)]
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: ProgressEvent) {
        // Err here just means nobody is subscribed right now.
        self.tx.send(event).ok();
    }
}

/// Per-job view over the bus enforcing the monotonicity invariant: values
/// are rounded to two decimals, clamped to [last published, 100], and only
/// increases reach the wire. A stage that hit 100 never regresses.
#[derive(Clone)]
pub struct JobProgress {
    bus: ProgressBus,
    floor: Arc<Mutex<[f64; Stage::COUNT]>>,
}

impl JobProgress {
    pub fn new(bus: ProgressBus) -> Self {
        Self {
            bus,
            floor: Arc::new(Mutex::new([0.0; Stage::COUNT])),
        }
    }

    pub fn publish(&self, stage: Stage, percent: f64) {
        if !percent.is_finite() {
            return;
        }
        let percent = (percent.clamp(0.0, 100.0) * 100.0).round() / 100.0;

        let mut floor = self.floor.lock().expect("progress state poisoned");
        if percent <= floor[stage.index()] {
            return;
        }
        floor[stage.index()] = percent;
        drop(floor);

        self.bus.send(ProgressEvent { stage, percent });
    }

    /// Totals are only estimates while a stage runs, so completion is forced
    /// to exactly 100 instead of trusting the ratio to land there.
    pub fn complete(&self, stage: Stage) {
        self.publish(stage, 100.0);
    }
}

/// `GET /progress`: long-lived SSE feed of every event broadcast after the
/// subscriber attached. No history is replayed.
pub async fn subscribe(
    State(state): State<router::State>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = BroadcastStream::new(state.progress.subscribe()).filter_map(|update| {
        match update {
            Ok(event) => Some(Event::default().json_data(&event)),
            // Lagged subscribers skip missed events rather than erroring.
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::debug!("progress subscriber lagged, skipped {skipped} events");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
