//! ---
//! srr_section: "03-orchestration-core"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Save/restore orchestration engine and fleet catalog."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
//! Wire shapes exchanged with agents (queries/responses) and with the
//! operator UI (list/save/restore payloads). The feature `data` blob is an
//! opaque string produced by the owning agent and carried verbatim; the
//! integrity digest is bound to its exact bytes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Outcome classification shared by every reply in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    #[default]
    Failed,
    Unknown,
    InProgress,
    PartialSuccess,
}

impl Status {
    /// Wire string for the two-part `(status, json)` reply.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Failed => "FAILED",
            Status::Unknown => "UNKNOWN",
            Status::InProgress => "IN_PROGRESS",
            Status::PartialSuccess => "PARTIAL_SUCCESS",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque snapshot blob plus the producing agent's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureData {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub data: String,
}

/// A named feature snapshot inside a saved group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub name: String,
    pub data: FeatureData,
}

/// One saved group: priority-sorted snapshots plus the integrity digest
/// bound to that exact ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPayload {
    pub group_id: String,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub features: Vec<FeatureSnapshot>,
    #[serde(default)]
    pub data_integrity: String,
}

// ---------------------------------------------------------------------------
// Agent protocol
// ---------------------------------------------------------------------------

/// Query fanned out to an owning agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Query {
    Save(SaveQuery),
    Restore(RestoreQuery),
    Reset(ResetQuery),
}

/// Ask an agent to snapshot the named features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveQuery {
    pub version: String,
    pub passphrase: String,
    pub features: Vec<String>,
}

/// Ask an agent to reinstall the carried snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreQuery {
    pub version: String,
    pub checksum: String,
    pub passphrase: String,
    #[serde(default)]
    pub map_features_data: IndexMap<String, FeatureData>,
}

/// Ask an agent to reset the named features to factory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetQuery {
    pub version: String,
    pub features: Vec<String>,
}

/// Reply from an owning agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Response {
    Save(SaveResponse),
    Restore(RestoreResponse),
    Reset(ResetResponse),
}

/// Per-feature snapshots returned by a save query. Insertion order is
/// preserved so merged responses keep their staging order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub map_features_data: IndexMap<String, FeatureData>,
}

impl SaveResponse {
    /// Union-merge another response into this one. Later entries win on
    /// duplicate feature names.
    pub fn merge(&mut self, other: SaveResponse) {
        self.map_features_data.extend(other.map_features_data);
    }

    /// True when no feature data has been collected.
    pub fn is_empty(&self) -> bool {
        self.map_features_data.is_empty()
    }
}

/// Single status+error block returned by a restore query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub status: Status,
    #[serde(default)]
    pub error: String,
}

/// Per-feature status block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBlock {
    pub status: Status,
    #[serde(default)]
    pub error: String,
}

/// Per-feature statuses returned by a reset query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResetResponse {
    #[serde(default)]
    pub map_features_status: IndexMap<String, StatusBlock>,
}

// ---------------------------------------------------------------------------
// Operator UI protocol
// ---------------------------------------------------------------------------

/// Feature entry in the list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub name: String,
    pub description: String,
}

/// Group entry in the list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: String,
    pub group_name: String,
    pub description: String,
    #[serde(default)]
    pub features: Vec<FeatureInfo>,
}

/// Reply to the `list` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrrListResponse {
    pub version: String,
    pub passphrase_description: String,
    pub passphrase_validation: String,
    #[serde(default)]
    pub groups: Vec<GroupInfo>,
}

/// Operator request to save a set of groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrrSaveRequest {
    pub passphrase: String,
    #[serde(default)]
    pub group_list: Vec<String>,
}

/// Reply to the `save` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrrSaveResponse {
    pub version: String,
    pub status: Status,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub data: Vec<GroupPayload>,
}

/// Operator request to restore a previously saved payload. The shape of
/// `data` depends on `version`: a flat feature array for 1.0, a group array
/// for 2.0 (exactly what the save reply's `data` field carries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrrRestoreRequest {
    pub version: String,
    pub checksum: String,
    pub passphrase: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Per-feature (v1.0) or per-group (v2.0) outcome entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStatus {
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub error: String,
}

/// Reply to the `restore` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SrrRestoreResponse {
    pub status: Status,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub status_list: Vec<RestoreStatus>,
}
