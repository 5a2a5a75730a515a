//! Expansion queueing, one slot per step.
//!
//! The tracker holds the still-needed count per kind and the slots it has
//! already queued. Each `step` looks at a fresh slot listing and picks at most
//! one slot, so a bad queue call never cascades and the caller re-observes
//! between steps.
use crate::model::{ExpansionSlot, SlotStatus};
use crate::reconcile::differ::{accounted_expansions, missing_expansions};
use crate::schema::TargetSchema;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionTracker {
    still_needed: BTreeMap<String, u32>,
    queued: BTreeSet<String>,
}

impl ExpansionTracker {
    /// Seed the tracker from the first observation of a facility.
    pub fn new(
        slots: &[ExpansionSlot],
        targets: &BTreeMap<String, u32>,
        schema: &TargetSchema,
    ) -> Self {
        let accounted = accounted_expansions(slots, schema);
        Self {
            still_needed: missing_expansions(&accounted, targets),
            queued: BTreeSet::new(),
        }
    }

    pub fn still_needed(&self) -> &BTreeMap<String, u32> {
        &self.still_needed
    }

    pub fn remaining(&self) -> u32 {
        self.still_needed.values().sum()
    }

    pub fn is_satisfied(&self) -> bool {
        self.remaining() == 0
    }

    /// Pick the first buildable slot, in display order, whose kind is still
    /// needed; decrement its bucket and remember the slot.
    ///
    /// Slots queued by earlier steps are skipped even if a stale listing
    /// still reports them as buildable.
    pub fn step(&mut self, slots: &[ExpansionSlot], schema: &TargetSchema) -> Option<ExpansionSlot> {
        if self.is_satisfied() {
            return None;
        }
        let slot = slots.iter().find(|slot| {
            slot.status == SlotStatus::ToBuild
                && !self.queued.contains(&slot.id)
                && self
                    .still_needed
                    .get(schema.expansion_bucket(&slot.kind))
                    .is_some_and(|needed| *needed > 0)
        })?;
        let bucket = schema.expansion_bucket(&slot.kind).to_string();
        if let Some(needed) = self.still_needed.get_mut(&bucket) {
            *needed -= 1;
            if *needed == 0 {
                self.still_needed.remove(&bucket);
            }
        }
        self.queued.insert(slot.id.clone());
        Some(slot.clone())
    }
}
