use crate::core::time::{DateTime, Duration};
use crate::entity::{EntityId, StateChangedEvent};

use super::filter::EntityFilter;
use super::point::{ExportPoint, PointTransformer};
use super::reemit::{ReemitRegistry, WriteTicket};

pub const MAX_BATCH: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub entity_id: EntityId,
    pub ticket: Option<WriteTicket>,
    pub point: ExportPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub entries: Vec<BatchEntry>,
    pub reemit: bool,
}

impl WriteBatch {
    pub fn points(&self) -> Vec<ExportPoint> {
        self.entries.iter().map(|e| e.point.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Decides what to write and keeps the re-emit bookkeeping. Performs no I/O,
/// the caller delivers the batches and reports back via [`ExportPipeline::on_write_result`].
pub struct ExportPipeline {
    filter: EntityFilter,
    transformer: PointTransformer,
    max_emit_interval: Option<Duration>,
    registry: ReemitRegistry,
}

impl ExportPipeline {
    pub fn new(filter: EntityFilter, transformer: PointTransformer, max_emit_interval: Option<Duration>) -> Self {
        Self {
            filter,
            transformer,
            max_emit_interval: max_emit_interval.filter(|i| i.is_positive()),
            registry: ReemitRegistry::new(),
        }
    }

    pub fn max_emit_interval(&self) -> Option<Duration> {
        self.max_emit_interval
    }

    pub fn registry(&self) -> &ReemitRegistry {
        &self.registry
    }

    pub fn on_event(&mut self, event: &StateChangedEvent) -> Option<WriteBatch> {
        let state = match &event.new_state {
            Some(state) if self.filter.should_export(Some(state)) => state,
            _ => {
                if self.max_emit_interval.is_some() && self.registry.remove(&event.entity_id) {
                    tracing::debug!("Stopped re-emitting {}", event.entity_id);
                }
                return None;
            }
        };

        let point = self.transformer.to_point(state, event.time_fired);
        let ticket = self.max_emit_interval.map(|_| self.registry.submit(&event.entity_id));

        Some(WriteBatch {
            entries: vec![BatchEntry {
                entity_id: event.entity_id.clone(),
                ticket,
                point,
            }],
            reemit: false,
        })
    }

    pub fn on_tick(&mut self, now: DateTime) -> Vec<WriteBatch> {
        let Some(interval) = self.max_emit_interval else {
            return vec![];
        };

        let entries: Vec<BatchEntry> = self
            .registry
            .stale(now, interval)
            .into_iter()
            .map(|(entity_id, point)| {
                tracing::debug!("Re-emitting metric {}", entity_id);
                let ticket = Some(self.registry.submit(&entity_id));
                BatchEntry {
                    entity_id,
                    ticket,
                    point,
                }
            })
            .collect();

        entries
            .chunks(MAX_BATCH)
            .map(|chunk| WriteBatch {
                entries: chunk.to_vec(),
                reemit: true,
            })
            .collect()
    }

    pub fn on_write_result(&mut self, batch: WriteBatch, succeeded: bool) {
        for entry in batch.entries {
            let Some(ticket) = entry.ticket else {
                continue;
            };

            if succeeded {
                self.registry.record_success(&entry.entity_id, ticket, entry.point);
            } else {
                self.registry.record_failure(&entry.entity_id, ticket);
            }
        }
    }
}
