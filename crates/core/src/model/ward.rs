use chrono::{DateTime, Utc};
use ipd_types::NonEmptyText;
use ipd_uuid::{FacilityId, WardId};
use serde::{Deserialize, Deserializer, Serialize};

text_enum!(
    WardType {
        General => "general",
        Pediatric => "pediatric",
        Maternity => "maternity",
        Icu => "icu",
        Surgical => "surgical",
        Private => "private",
        Isolation => "isolation",
    }
);

text_enum!(
    WardStatus {
        Active => "active",
        Inactive => "inactive",
        Maintenance => "maintenance",
    }
);

/// A grouping of beds.
///
/// `total_beds` and `occupied_beds` are a cache over the ward's bed rows. They are written only
/// by the occupancy recompute, inside the same transaction as the bed change that made them
/// stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ward {
    pub id: WardId,
    pub facility_id: Option<FacilityId>,
    pub name: NonEmptyText,
    pub code: NonEmptyText,
    pub ward_type: WardType,
    pub status: WardStatus,
    pub floor: Option<i32>,
    pub description: Option<String>,
    pub total_beds: u32,
    pub occupied_beds: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewWard {
    #[serde(default)]
    pub facility_id: Option<FacilityId>,
    pub name: NonEmptyText,
    pub code: NonEmptyText,
    pub ward_type: WardType,
    #[serde(default)]
    pub floor: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update of ward metadata. Counters are not part of an update.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WardUpdate {
    pub name: Option<NonEmptyText>,
    pub code: Option<NonEmptyText>,
    pub ward_type: Option<WardType>,
    pub status: Option<WardStatus>,
    /// `None` leaves the floor as is, `Some(None)` clears it.
    #[serde(default, deserialize_with = "present")]
    pub floor: Option<Option<i32>>,
    /// `None` leaves the description as is, `Some(None)` clears it.
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
}

/// Maps a field that is present in the input, even as `null`, to `Some`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl WardUpdate {
    pub(crate) fn apply(self, ward: &mut Ward) {
        if let Some(name) = self.name {
            ward.name = name;
        }
        if let Some(code) = self.code {
            ward.code = code;
        }
        if let Some(ward_type) = self.ward_type {
            ward.ward_type = ward_type;
        }
        if let Some(status) = self.status {
            ward.status = status;
        }
        if let Some(floor) = self.floor {
            ward.floor = floor;
        }
        if let Some(description) = self.description {
            ward.description = description;
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WardFilter {
    pub facility_id: Option<FacilityId>,
    pub ward_type: Option<WardType>,
    pub status: Option<WardStatus>,
}

impl WardFilter {
    pub fn matches(&self, ward: &Ward) -> bool {
        self.facility_id.map_or(true, |f| ward.facility_id == Some(f))
            && self.ward_type.map_or(true, |t| ward.ward_type == t)
            && self.status.map_or(true, |s| ward.status == s)
    }
}

/// Occupancy snapshot of one ward, read from its cached counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardOccupancy {
    pub ward_id: WardId,
    pub name: String,
    pub code: String,
    pub ward_type: WardType,
    pub total_beds: u32,
    pub occupied_beds: u32,
    /// Beds that are not occupied. Includes beds being cleaned or under maintenance, so it is
    /// not the number of beds that can be claimed right now.
    pub unoccupied_beds: u32,
    /// Occupied share of total beds as a whole percentage, rounded half up.
    pub occupancy_rate: u32,
}
