//! Schema types, both the raw file shape and the validated form.
use crate::model::{FacilityCategory, QualificationKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Resource category of a vehicle class.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VehicleCategory {
    #[default]
    #[serde(alias = "car")]
    Vehicle,
    Trailer,
    Container,
}

impl VehicleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::Vehicle => "vehicle",
            VehicleCategory::Trailer => "trailer",
            VehicleCategory::Container => "container",
        }
    }

    /// Containers live in dedicated storage and never use facility space.
    pub fn uses_facility_space(&self) -> bool {
        !matches!(self, VehicleCategory::Container)
    }
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state for one vehicle class.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct VehicleTarget {
    pub count: u32,
    pub crew: u32,
    pub qualifications: QualificationKey,
    pub category: VehicleCategory,
}

impl VehicleTarget {
    /// Whether buying this class needs crew coverage.
    pub fn needs_crew(&self) -> bool {
        self.crew > 0
    }
}

/// Recruitment settings applied to every reconciled facility.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RecruitmentTarget {
    #[serde(default = "default_recruitment_duration")]
    pub duration: u8,
    pub target_crew: u32,
}

fn default_recruitment_duration() -> u8 {
    4
}

/// Validated, immutable target schema.
#[derive(Debug, Serialize, Clone, PartialEq, Eq, Default)]
pub struct TargetSchema {
    pub vehicles: BTreeMap<String, VehicleTarget>,
    pub expansions: BTreeMap<FacilityCategory, BTreeMap<String, u32>>,
    pub expansion_aliases: BTreeMap<String, String>,
    pub reserved_space: BTreeMap<FacilityCategory, u32>,
    pub recruitment: Option<RecruitmentTarget>,
}

impl TargetSchema {
    pub fn vehicle(&self, class: &str) -> Option<&VehicleTarget> {
        self.vehicles.get(class)
    }

    /// Expansion targets for a category; empty when the schema declares none.
    pub fn expansions_for(&self, category: FacilityCategory) -> BTreeMap<String, u32> {
        self.expansions.get(&category).cloned().unwrap_or_default()
    }

    /// Fold a derived expansion kind into the bucket it counts toward.
    pub fn expansion_bucket<'a>(&'a self, kind: &'a str) -> &'a str {
        self.expansion_aliases
            .get(kind)
            .map(String::as_str)
            .unwrap_or(kind)
    }

    /// Classes whose purchases never use facility space.
    pub fn space_exempt_classes(&self) -> Vec<String> {
        self.vehicles
            .iter()
            .filter(|(_, target)| !target.category.uses_facility_space())
            .map(|(class, _)| class.clone())
            .collect()
    }

    pub fn reserved_space(&self, category: FacilityCategory) -> u32 {
        self.reserved_space
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_reserved_space())
    }
}

/// Expansion count as written in the file: `true`, `2`, or `"2"`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawCount {
    Flag(bool),
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RawVehicleTarget {
    pub count: i64,
    #[serde(default)]
    pub crew: Option<i64>,
    #[serde(default, alias = "education")]
    pub qualifications: Option<Vec<String>>,
    #[serde(default)]
    pub category: VehicleCategory,
}

/// Schema file as read from disk, before validation.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RawSchema {
    pub schema_version: u32,
    #[serde(default)]
    pub vehicles: BTreeMap<String, RawVehicleTarget>,
    #[serde(default)]
    pub expansions: BTreeMap<FacilityCategory, BTreeMap<String, RawCount>>,
    #[serde(default)]
    pub expansion_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub reserved_space: BTreeMap<FacilityCategory, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recruitment: Option<RecruitmentTarget>,
}
