//! Facility space accounting for a purchase plan.
use crate::schema::TargetSchema;
use serde::Serialize;
use std::collections::BTreeMap;

/// Space verdict for one purchase plan.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CapacityVerdict {
    pub required: u32,
    pub free_space: i64,
    pub reserved: u32,
    /// Expand-by-one calls needed before buying.
    pub expansions_needed: u32,
}

impl CapacityVerdict {
    pub fn adjusted_free_space(&self) -> i64 {
        self.free_space - i64::from(self.reserved)
    }

    pub fn needs_expansion(&self) -> bool {
        self.expansions_needed > 0
    }
}

/// Units of facility space consumed by `to_buy`; container classes are free.
pub fn required_space(to_buy: &BTreeMap<String, u32>, schema: &TargetSchema) -> u32 {
    to_buy
        .iter()
        .filter(|(class, _)| {
            schema
                .vehicle(class)
                .map(|target| target.category.uses_facility_space())
                .unwrap_or(true)
        })
        .map(|(_, count)| *count)
        .sum()
}

/// Compare required space against free space minus the category's reserve.
pub fn plan_capacity(required: u32, free_space: i64, reserved: u32) -> CapacityVerdict {
    let mut verdict = CapacityVerdict {
        required,
        free_space,
        reserved,
        expansions_needed: 0,
    };
    let shortfall = i64::from(required) - verdict.adjusted_free_space();
    verdict.expansions_needed = u32::try_from(shortfall.max(0)).unwrap_or(u32::MAX);
    verdict
}
