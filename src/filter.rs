//! Facility selection applied before reconciliation.
use crate::model::Facility;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fmt;

/// Inclusive range with optional bounds, written `MIN-MAX`.
///
/// Either side may be empty and a `k` suffix multiplies by 1000, so `-20k`,
/// `5-` and `10-100` are all valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl Bounds {
    pub fn parse(value: &str) -> Result<Self> {
        let pattern = Regex::new(r"^\s*(?:(\d+)(k?))?\s*-\s*(?:(\d+)(k?))?\s*$")
            .context("compile range pattern")?;
        let caps = pattern
            .captures(value)
            .ok_or_else(|| anyhow!("invalid range {value:?}; expected MIN-MAX such as 0-20k"))?;
        let bound = |digits: usize, suffix: usize| -> Result<Option<u32>> {
            let Some(number) = caps.get(digits) else {
                return Ok(None);
            };
            let base: u32 = number
                .as_str()
                .parse()
                .with_context(|| format!("range bound {:?}", number.as_str()))?;
            let scale = if caps.get(suffix).is_some_and(|m| !m.as_str().is_empty()) {
                1000
            } else {
                1
            };
            base.checked_mul(scale)
                .map(Some)
                .ok_or_else(|| anyhow!("range bound {value:?} is too large"))
        };
        let bounds = Bounds {
            min: bound(1, 2)?,
            max: bound(3, 4)?,
        };
        if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
            if min > max {
                return Err(anyhow!("invalid range {value:?}; minimum exceeds maximum"));
            }
        }
        Ok(bounds)
    }

    pub fn contains(&self, value: u32) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |bound: Option<u32>| bound.map(|value| value.to_string()).unwrap_or_default();
        write!(f, "{}-{}", side(self.min), side(self.max))
    }
}

/// clap value parser for `--crew-range` and `--level-range`.
pub fn parse_bounds(value: &str) -> std::result::Result<Bounds, String> {
    Bounds::parse(value).map_err(|err| format!("{err:#}"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacilityFilter {
    pub crew: Bounds,
    pub level: Bounds,
    /// Facilities to skip from the front of the listing.
    pub start: usize,
    pub limit: Option<usize>,
}

impl FacilityFilter {
    /// Slice by `start`/`limit` in listing order, then drop facilities outside
    /// the crew or level range.
    pub fn apply(&self, facilities: Vec<Facility>) -> Vec<Facility> {
        facilities
            .into_iter()
            .skip(self.start)
            .take(self.limit.unwrap_or(usize::MAX))
            .filter(|facility| {
                self.crew.contains(facility.crew_size) && self.level.contains(facility.level)
            })
            .collect()
    }
}
