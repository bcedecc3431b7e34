use std::collections::HashSet;

use crate::entity::{EntityId, EntityState};

/// Static allow/deny rules, evaluated deny-first.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub entity_allow: HashSet<EntityId>,
    pub domain_allow: HashSet<String>,
    pub entity_deny: HashSet<EntityId>,
    pub domain_deny: HashSet<String>,
}

impl EntityFilter {
    pub fn should_export(&self, state: Option<&EntityState>) -> bool {
        let Some(state) = state else {
            return false;
        };

        if !state.is_valid() {
            return false;
        }

        if self.entity_deny.contains(&state.entity_id) || self.domain_deny.contains(state.domain()) {
            return false;
        }

        self.is_allowed(state)
    }

    //an empty allow-list does not restrict, a non-empty one has to match
    fn is_allowed(&self, state: &EntityState) -> bool {
        if self.entity_allow.is_empty() && self.domain_allow.is_empty() {
            return true;
        }

        self.entity_allow.contains(&state.entity_id) || self.domain_allow.contains(state.domain())
    }
}
