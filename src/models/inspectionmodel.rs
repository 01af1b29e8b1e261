use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "inspection_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InspectionType {
    Pre,
    Post,
}

impl InspectionType {
    pub fn to_str(&self) -> &str {
        match self {
            InspectionType::Pre => "pre",
            InspectionType::Post => "post",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "inspection_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Started,
    Completed,
    Submitted,
}

impl InspectionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InspectionStatus::Submitted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TripInspection {
    pub id: Uuid,
    pub contract_id: Uuid,
    #[serde(rename = "type")]
    pub inspection_type: InspectionType,
    pub driver_user_id: Uuid,
    pub status: InspectionStatus,
    pub data: Option<serde_json::Value>,
    pub defects: Option<serde_json::Value>,
    pub photos: Option<Vec<String>>,
    pub pod_photo: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Fields a driver may send when completing an inspection. Absent fields keep
/// their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectionPatch {
    pub data: Option<serde_json::Value>,
    pub defects: Option<serde_json::Value>,
    pub photos: Option<Vec<String>>,
    pub pod_photo: Option<String>,
}

impl TripInspection {
    pub fn apply_patch(&mut self, patch: InspectionPatch) {
        if let Some(data) = patch.data {
            self.data = Some(data);
        }
        if let Some(defects) = patch.defects {
            self.defects = Some(defects);
        }
        if let Some(photos) = patch.photos {
            self.photos = Some(photos);
        }
        if let Some(pod_photo) = patch.pod_photo {
            self.pod_photo = Some(pod_photo);
        }
    }
}
