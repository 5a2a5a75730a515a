//! Observed facility state as reported by the external system.
//!
//! Everything here is a snapshot: the engine never edits these values to
//! reflect its own actions, it re-observes instead.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Facility kinds managed by the reconciler.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FacilityCategory {
    Opi,
    Medic,
    MedicHeli,
    OpiHeli,
    Opp,
    Sm,
    Jrg,
}

impl FacilityCategory {
    pub const ALL: [FacilityCategory; 7] = [
        FacilityCategory::Opi,
        FacilityCategory::Medic,
        FacilityCategory::MedicHeli,
        FacilityCategory::OpiHeli,
        FacilityCategory::Opp,
        FacilityCategory::Sm,
        FacilityCategory::Jrg,
    ];

    /// Return the stable string identifier used in schema and report files.
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityCategory::Opi => "OPI",
            FacilityCategory::Medic => "MEDIC",
            FacilityCategory::MedicHeli => "MEDIC_HELI",
            FacilityCategory::OpiHeli => "OPI_HELI",
            FacilityCategory::Opp => "OPP",
            FacilityCategory::Sm => "SM",
            FacilityCategory::Jrg => "JRG",
        }
    }

    /// Building type code the external system uses for this category.
    pub fn external_code(&self) -> &'static str {
        match self {
            FacilityCategory::Opi => "Building_polizeiwache",
            FacilityCategory::Medic => "Building_rettungswache",
            FacilityCategory::MedicHeli => "Building_helipad",
            FacilityCategory::OpiHeli => "Building_helipad_polizei",
            FacilityCategory::Opp => "Building_bereitschaftspolizei",
            FacilityCategory::Sm => "Building_municipal_police",
            FacilityCategory::Jrg => "Building_fire",
        }
    }

    /// Vehicle slots taken by built-in infrastructure and never usable for purchases.
    pub fn default_reserved_space(&self) -> u32 {
        match self {
            FacilityCategory::Opi => 3,
            _ => 0,
        }
    }

    pub fn parse(value: &str) -> Option<FacilityCategory> {
        let wanted = value.trim();
        Self::ALL.into_iter().find(|category| {
            category.as_str().eq_ignore_ascii_case(wanted) || category.external_code() == wanted
        })
    }
}

impl fmt::Display for FacilityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical set of qualification tags.
///
/// Tags are trimmed, blank tags dropped, then sorted and deduplicated, so two
/// keys compare equal exactly when their tag sets are equal. The empty key
/// means "no qualification".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct QualificationKey(Vec<String>);

impl QualificationKey {
    pub fn unqualified() -> Self {
        Self(Vec::new())
    }

    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        Self(tags)
    }

    pub fn is_unqualified(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for QualificationKey {
    fn from(tags: Vec<String>) -> Self {
        Self::from_tags(tags)
    }
}

impl From<QualificationKey> for Vec<String> {
    fn from(key: QualificationKey) -> Self {
        key.0
    }
}

impl fmt::Display for QualificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("unqualified")
        } else {
            f.write_str(&self.0.join("+"))
        }
    }
}

/// A facility as it appears in the location listing.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub location_id: String,
    pub category: FacilityCategory,
    pub level: u32,
    pub crew_size: u32,
    #[serde(default)]
    pub recruitment_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crew_target: Option<u32>,
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Vehicle {
    pub id: String,
    pub class: String,
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.class, self.id)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrewState {
    Available,
    OnDuty,
    InTraining,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CrewMember {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub qualifications: QualificationKey,
    /// Vehicle the member is assigned to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub state: CrewState,
}

impl CrewMember {
    pub fn is_available(&self) -> bool {
        self.assigned_to.is_none() && self.state == CrewState::Available
    }

    pub fn is_assigned_to(&self, vehicle_id: &str) -> bool {
        self.assigned_to.as_deref() == Some(vehicle_id)
    }
}

/// Observed lifecycle status of one expansion slot.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    ToBuild,
    InProgress,
    Done,
    WaitingOther,
    #[serde(other)]
    Other,
}

impl SlotStatus {
    /// Whether the slot already counts toward its kind's target.
    pub fn is_accounted(&self) -> bool {
        matches!(self, SlotStatus::Done | SlotStatus::InProgress)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ExpansionSlot {
    pub id: String,
    pub kind: String,
    pub status: SlotStatus,
}

/// Result of one `observe_facility` call.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct FacilityObservation {
    pub free_space: i64,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub expansion_slots: Vec<ExpansionSlot>,
}
