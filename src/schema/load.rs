//! Schema loading and validation.
//!
//! Malformed schemas are rejected here so the engine only ever sees a
//! validated `TargetSchema`.
use super::{
    RawCount, RawSchema, RawVehicleTarget, TargetSchema, VehicleCategory, VehicleTarget,
    DEFAULT_SCHEMA_FILE, SCHEMA_VERSION,
};
use crate::model::QualificationKey;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Derived expansion kinds that count toward a parent kind unless overridden.
const DEFAULT_EXPANSION_ALIASES: [(&str, &str); 2] = [
    ("prison_cell_1", "prison_cells"),
    ("prison_cell_n", "prison_cells"),
];

/// Location of the schema in the per-user config dir.
pub fn default_schema_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("station-builder").join(DEFAULT_SCHEMA_FILE))
}

/// Read, parse, and validate a schema file.
pub fn load_schema(path: &Path) -> Result<TargetSchema> {
    let bytes = fs::read(path).with_context(|| format!("read schema {}", path.display()))?;
    let text = String::from_utf8(bytes).context("decode schema as UTF-8")?;
    parse_schema(&text).with_context(|| format!("load schema {}", path.display()))
}

pub fn parse_schema(text: &str) -> Result<TargetSchema> {
    let raw: RawSchema = serde_json::from_str(text).context("parse schema JSON")?;
    schema_from_raw(raw)
}

/// Validate a raw schema and normalize it into its immutable form.
fn schema_from_raw(raw: RawSchema) -> Result<TargetSchema> {
    if raw.schema_version != SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported schema_version {} (expected {SCHEMA_VERSION})",
            raw.schema_version
        ));
    }

    let mut vehicles = BTreeMap::new();
    for (class, target) in raw.vehicles {
        let class_name = class.trim();
        if class_name.is_empty() {
            return Err(anyhow!("vehicle class names must be non-empty"));
        }
        let target = vehicle_target(class_name, target)?;
        if vehicles.insert(class_name.to_string(), target).is_some() {
            return Err(anyhow!("duplicate vehicle class {class_name:?}"));
        }
    }

    let mut expansion_aliases: BTreeMap<String, String> = DEFAULT_EXPANSION_ALIASES
        .iter()
        .map(|(derived, parent)| (derived.to_string(), parent.to_string()))
        .collect();
    for (derived, parent) in raw.expansion_aliases {
        let derived = derived.trim().to_string();
        let parent = parent.trim().to_string();
        if derived.is_empty() || parent.is_empty() {
            return Err(anyhow!("expansion aliases must name both kinds"));
        }
        if derived == parent {
            return Err(anyhow!("expansion alias {derived:?} points at itself"));
        }
        expansion_aliases.insert(derived, parent);
    }

    let mut expansions = BTreeMap::new();
    for (category, kinds) in raw.expansions {
        let mut counts = BTreeMap::new();
        for (kind, raw_count) in kinds {
            let kind = kind.trim();
            if kind.is_empty() {
                return Err(anyhow!("{category}: expansion kind names must be non-empty"));
            }
            let count = expansion_count(&raw_count)
                .with_context(|| format!("{category}: expansion {kind:?}"))?;
            let bucket = expansion_aliases
                .get(kind)
                .map(String::as_str)
                .unwrap_or(kind);
            *counts.entry(bucket.to_string()).or_insert(0) += count;
        }
        expansions.insert(category, counts);
    }

    if let Some(recruitment) = raw.recruitment.as_ref() {
        if !(1..=4).contains(&recruitment.duration) {
            return Err(anyhow!(
                "recruitment duration must be between 1 and 4 (got {})",
                recruitment.duration
            ));
        }
    }

    Ok(TargetSchema {
        vehicles,
        expansions,
        expansion_aliases,
        reserved_space: raw.reserved_space,
        recruitment: raw.recruitment,
    })
}

fn vehicle_target(class: &str, raw: RawVehicleTarget) -> Result<VehicleTarget> {
    let count = u32::try_from(raw.count)
        .map_err(|_| anyhow!("{class}: count must be a non-negative integer"))?;
    let crew = match raw.crew {
        Some(crew) => u32::try_from(crew)
            .map_err(|_| anyhow!("{class}: crew must be a non-negative integer"))?,
        None => 0,
    };
    let qualifications = raw
        .qualifications
        .map(QualificationKey::from_tags)
        .unwrap_or_default();
    if raw.category != VehicleCategory::Vehicle
        && (crew > 0 || !qualifications.is_unqualified())
    {
        return Err(anyhow!(
            "{class}: {} targets cannot declare crew or qualifications",
            raw.category
        ));
    }
    Ok(VehicleTarget {
        count,
        crew,
        qualifications,
        category: raw.category,
    })
}

/// Coerce booleans to 0/1 and numeric strings to integers.
fn expansion_count(raw: &RawCount) -> Result<u32> {
    match raw {
        RawCount::Flag(flag) => Ok(u32::from(*flag)),
        RawCount::Number(value) => {
            u32::try_from(*value).map_err(|_| anyhow!("count must be non-negative (got {value})"))
        }
        RawCount::Text(text) => {
            let text = text.trim();
            if text.eq_ignore_ascii_case("true") {
                return Ok(1);
            }
            if text.eq_ignore_ascii_case("false") {
                return Ok(0);
            }
            text.parse::<u32>()
                .map_err(|_| anyhow!("count must be a boolean or integer (got {text:?})"))
        }
    }
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
