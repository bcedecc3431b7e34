mod filter;
mod pipeline;
mod point;
mod reemit;
mod sink;

use std::sync::Arc;

use derive_more::derive::{Display, Error};
use infrastructure::EventListener;
use infrastructure::meter::{increment, increment_by};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::time::Duration;
use crate::entity::StateChangedEvent;
use crate::t;

pub use filter::EntityFilter;
pub use pipeline::{ExportPipeline, WriteBatch};
pub use point::{ExportPoint, FieldValue, PointTransformer};
pub use sink::{PointSink, SinkError};

const MAX_CONCURRENT_WRITES: usize = 4;
const WRITE_QUEUE_SIZE: usize = 64;

/// Validated, immutable settings of the export pipeline.
#[derive(Debug, Clone, Default)]
pub struct ExportSettings {
    pub filter: EntityFilter,
    pub transformer: PointTransformer,
    pub max_emit_interval: Option<Duration>,
}

#[derive(Debug, Display, Error)]
pub enum ExportError {
    #[display("Invalid export configuration: {_0}")]
    Configuration(#[error(not(source))] String),

    #[display("Database host is not accessible: {_0}")]
    Connectivity(#[error(source)] SinkError),
}

type WriteDone = (WriteBatch, Result<(), SinkError>);

pub struct ExportRunner<S> {
    pipeline: ExportPipeline,
    sink: Arc<S>,
    events: EventListener<StateChangedEvent>,
    stopping: CancellationToken,
}

impl<S: PointSink + 'static> ExportRunner<S> {
    /// Probes the sink once and fails without subscribing if it is not reachable.
    pub async fn start(
        sink: S,
        settings: ExportSettings,
        events: EventListener<StateChangedEvent>,
        stopping: CancellationToken,
    ) -> Result<Self, ExportError> {
        sink.check_connectivity().await.map_err(ExportError::Connectivity)?;

        Ok(Self {
            pipeline: ExportPipeline::new(settings.filter, settings.transformer, settings.max_emit_interval),
            sink: Arc::new(sink),
            events,
            stopping,
        })
    }

    pub async fn run(mut self) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<WriteDone>();
        let (queue_tx, queue_rx) = mpsc::channel::<WriteBatch>(WRITE_QUEUE_SIZE);
        spawn_writers(self.sink.clone(), queue_rx, done_tx);

        let mut reemit_timer = self.pipeline.max_emit_interval().map(new_reemit_timer);

        tracing::info!(
            "State export started, re-emit interval {}",
            self.pipeline
                .max_emit_interval()
                .map_or("disabled".to_owned(), |i| i.to_string())
        );

        loop {
            tokio::select! {
                biased;

                _ = self.stopping.cancelled() => break,

                Some((batch, result)) = done_rx.recv() => self.on_write_done(batch, result),

                _ = next_tick(&mut reemit_timer) => {
                    if self.stopping.is_cancelled() {
                        break;
                    }

                    for batch in self.pipeline.on_tick(t!(now)) {
                        self.dispatch(batch, &queue_tx);
                    }

                    //tick may have taken a while, don't wait for another one when stopping
                    if self.stopping.is_cancelled() {
                        break;
                    }
                },

                event = self.events.recv() => match event {
                    Some(event) => {
                        match self.pipeline.on_event(&event) {
                            Some(batch) => self.dispatch(batch, &queue_tx),
                            None => increment("state_export_events_skipped", &[]),
                        }
                    }
                    None => break,
                },
            }
        }

        tracing::info!(
            "State export stopped, discarding {} tracked entities",
            self.pipeline.registry().len()
        );
    }

    /// Hands the batch to the writers. A full queue sheds the batch, which
    /// counts as a failed write for the re-emit bookkeeping.
    fn dispatch(&mut self, batch: WriteBatch, queue: &mpsc::Sender<WriteBatch>) {
        let batch = match queue.try_send(batch) {
            Ok(()) => return,
            Err(TrySendError::Full(batch)) => {
                tracing::warn!("Write queue full, dropping {} points", batch.len());
                batch
            }
            Err(TrySendError::Closed(batch)) => {
                tracing::error!("Writers stopped, dropping {} points", batch.len());
                batch
            }
        };

        increment_by("state_export_points_dropped", batch.len() as u64, &[]);
        self.pipeline.on_write_result(batch, false);
    }

    fn on_write_done(&mut self, batch: WriteBatch, result: Result<(), SinkError>) {
        match &result {
            Ok(()) => {
                increment_by("state_export_points_written", batch.len() as u64, &[]);
                if batch.reemit {
                    increment_by("state_export_reemitted", batch.len() as u64, &[]);
                }
            }
            Err(e) => {
                let body = serde_json::to_string(&batch.points()).unwrap_or_else(|e| format!("<{e}>"));
                tracing::error!("Error saving points {} to InfluxDB: {}", body, e);
                increment("state_export_write_errors", &[]);
            }
        }

        self.pipeline.on_write_result(batch, result.is_ok());
    }
}

fn spawn_writers<S: PointSink + 'static>(
    sink: Arc<S>,
    queue: mpsc::Receiver<WriteBatch>,
    done_tx: mpsc::UnboundedSender<WriteDone>,
) {
    let queue = Arc::new(Mutex::new(queue));

    for _ in 0..MAX_CONCURRENT_WRITES {
        let sink = sink.clone();
        let queue = queue.clone();
        let done_tx = done_tx.clone();

        tokio::spawn(async move {
            loop {
                let Some(batch) = queue.lock().await.recv().await else {
                    break;
                };

                let result = sink.write(batch.points()).await;

                if done_tx.send((batch, result)).is_err() {
                    tracing::debug!("Export stopped before write completed");
                    break;
                }
            }
        });
    }
}

fn new_reemit_timer(interval: Duration) -> Interval {
    let period = std::time::Duration::from(interval).max(std::time::Duration::from_millis(1));
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
