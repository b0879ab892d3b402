//! Study metadata as exchanged with the REST API.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Summary of a study as listed by `GET /studies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMetadata {
    /// Study identity.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Solver version the study targets.
    #[serde(default)]
    pub version: String,
    /// Creation time.
    #[serde(default)]
    pub created: Option<String>,
    /// Last update time.
    #[serde(default)]
    pub updated: Option<String>,
    /// `"rawstudy"` or `"variantstudy"`.
    #[serde(rename = "type", default)]
    pub study_type: Option<String>,
    /// Owner descriptor.
    #[serde(default)]
    pub owner: Option<StudyOwner>,
    /// Whether the study is managed by the server.
    #[serde(default)]
    pub managed: bool,
    /// Whether the study is archived.
    #[serde(default)]
    pub archived: bool,
    /// Parent study for variants.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Storage workspace.
    #[serde(default)]
    pub workspace: Option<String>,
}

impl StudyMetadata {
    /// Returns `true` for variant studies.
    pub fn is_variant(&self) -> bool {
        self.study_type.as_deref() == Some("variantstudy")
    }
}

/// Owner of a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyOwner {
    /// User id, absent for external owners.
    #[serde(default)]
    pub id: Option<u64>,
    /// Display name.
    pub name: String,
}

/// Partial metadata update (`PUT /studies/{id}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyMetadataPatch {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// New horizon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizon: Option<String>,
    /// Replacement tag list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Options for `POST /launcher/run/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchOptions {
    /// Display name for the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_suffix: Option<String>,
    /// Time limit in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    /// Number of CPU cores requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nb_cpu: Option<u32>,
    /// Launcher-specific extra settings.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// Body returned by `POST /launcher/run/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResponse {
    /// Id of the created job.
    pub job_id: String,
}

/// Maintenance mode state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceStatus {
    /// Whether the server is in maintenance mode.
    pub enabled: bool,
    /// Message shown to users during maintenance.
    #[serde(default)]
    pub message: Option<String>,
}
