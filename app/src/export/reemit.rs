use std::collections::HashMap;

use crate::core::time::{DateTime, Duration};
use crate::entity::EntityId;

use super::point::ExportPoint;

/// Identifies one submitted write of an entity. Only the most recent ticket of
/// an entity is allowed to update its bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTicket(u64);

#[derive(Debug, Clone)]
struct Tracked {
    written_at: DateTime,
    point: ExportPoint,
}

/// Last successfully written point per entity, used to re-send unchanged values.
#[derive(Debug, Default)]
pub struct ReemitRegistry {
    tracked: HashMap<EntityId, Tracked>,
    in_flight: HashMap<EntityId, WriteTicket>,
    next_ticket: u64,
}

impl ReemitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new write for `entity_id`, superseding any write still in flight.
    pub fn submit(&mut self, entity_id: &EntityId) -> WriteTicket {
        self.next_ticket += 1;
        let ticket = WriteTicket(self.next_ticket);
        self.in_flight.insert(entity_id.clone(), ticket);
        ticket
    }

    /// Returns `false` if the ticket was superseded or the entity removed meanwhile.
    pub fn record_success(&mut self, entity_id: &EntityId, ticket: WriteTicket, point: ExportPoint) -> bool {
        if !self.take_in_flight(entity_id, ticket) {
            return false;
        }

        self.tracked.insert(
            entity_id.clone(),
            Tracked {
                written_at: point.time,
                point,
            },
        );

        true
    }

    //a failed write leaves the previous entry untouched, including its age
    pub fn record_failure(&mut self, entity_id: &EntityId, ticket: WriteTicket) {
        self.take_in_flight(entity_id, ticket);
    }

    pub fn remove(&mut self, entity_id: &EntityId) -> bool {
        self.in_flight.remove(entity_id);
        self.tracked.remove(entity_id).is_some()
    }

    /// Points not written for at least `interval`, restamped to `now`. Entities
    /// with a write in flight are skipped.
    pub fn stale(&self, now: DateTime, interval: Duration) -> Vec<(EntityId, ExportPoint)> {
        let mut stale: Vec<(EntityId, ExportPoint)> = self
            .tracked
            .iter()
            .filter(|(entity_id, _)| !self.in_flight.contains_key(*entity_id))
            .filter(|(_, tracked)| now.elapsed_since(tracked.written_at) >= interval)
            .map(|(entity_id, tracked)| (entity_id.clone(), tracked.point.at(now)))
            .collect();

        stale.sort_by(|a, b| a.0.cmp(&b.0));
        stale
    }

    pub fn is_tracked(&self, entity_id: &EntityId) -> bool {
        self.tracked.contains_key(entity_id)
    }

    pub fn written_at(&self, entity_id: &EntityId) -> Option<DateTime> {
        self.tracked.get(entity_id).map(|t| t.written_at)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    fn take_in_flight(&mut self, entity_id: &EntityId, ticket: WriteTicket) -> bool {
        match self.in_flight.get(entity_id) {
            Some(current) if *current == ticket => {
                self.in_flight.remove(entity_id);
                true
            }
            _ => false,
        }
    }
}
