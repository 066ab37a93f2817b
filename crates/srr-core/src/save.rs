//! ---
//! srr_section: "03-orchestration-core"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Save/restore orchestration engine and fleet catalog."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
//! Save pipeline: expand features to their owning agents, fan one save query
//! out per agent, merge the per-feature snapshots back, and assemble them
//! into integrity-checked groups.

use std::sync::Arc;

use indexmap::IndexMap;
use srr_common::crypto::sha256_hex;
use srr_msg::RequestClient;
use tracing::{debug, error, warn};

use crate::dto::{
    FeatureSnapshot, GroupPayload, Query, Response, SaveQuery, SaveResponse,
};
use crate::registry::SrrRegistry;
use crate::{Result, SrrError};

/// Canonical digest over a priority-sorted feature list. The byte sequence
/// is the serde_json serialization of the array; callers must sort before
/// digesting or the value is not reproducible.
pub fn digest_features(features: &[FeatureSnapshot]) -> String {
    let canonical =
        serde_json::to_string(features).expect("feature snapshots always serialize");
    sha256_hex(canonical.as_bytes())
}

/// Fans save queries out to owning agents and assembles the replies into
/// per-group payloads.
#[derive(Clone)]
pub struct SaveEngine {
    registry: Arc<SrrRegistry>,
    client: RequestClient,
    version: String,
}

impl SaveEngine {
    pub fn new(registry: Arc<SrrRegistry>, client: RequestClient, version: impl Into<String>) -> Self {
        Self {
            registry,
            client,
            version: version.into(),
        }
    }

    /// Snapshot the named features: one save RPC per owning agent, replies
    /// union-merged into a single response. Unknown features are dropped
    /// with a warning; any RPC failure aborts the whole save.
    pub fn save_features(&self, features: &[String], passphrase: &str) -> Result<SaveResponse> {
        let by_agent = self.group_features_by_agent(features);

        let mut merged = SaveResponse::default();
        for (agent, agent_features) in by_agent {
            let Some(queue) = self.registry.queue_of_agent(&agent) else {
                warn!(agent = %agent, "no queue registered for agent; skipping its features");
                continue;
            };
            debug!(agent = %agent, features = ?agent_features, "requesting save");
            let query = Query::Save(SaveQuery {
                version: self.version.clone(),
                passphrase: passphrase.to_owned(),
                features: agent_features,
            });
            let response: Response = self.client.request(queue, &agent, "save", &query)?;
            let Response::Save(save) = response else {
                return Err(SrrError::UnexpectedReply { agent });
            };
            debug!(agent = %agent, "save done by agent");
            merged.merge(save);
        }

        Ok(merged)
    }

    /// Route merged snapshots into their owning groups, sort each group into
    /// canonical order, and attach the integrity digest. Features without a
    /// group are dropped from the payload.
    pub fn assemble_groups(&self, response: &SaveResponse) -> Vec<GroupPayload> {
        let mut assembled: IndexMap<String, GroupPayload> = IndexMap::new();

        for (name, data) in &response.map_features_data {
            let group_id = self.registry.group_of_feature(name);
            if group_id.is_empty() {
                error!(
                    feature = %name,
                    "feature is not part of any group, will not be included in the save payload"
                );
                continue;
            }
            assembled
                .entry(group_id.to_owned())
                .or_insert_with(|| GroupPayload {
                    group_id: group_id.to_owned(),
                    group_name: group_id.to_owned(),
                    features: Vec::new(),
                    data_integrity: String::new(),
                })
                .features
                .push(FeatureSnapshot {
                    name: name.clone(),
                    data: data.clone(),
                });
        }

        let mut groups: Vec<GroupPayload> = assembled.into_values().collect();
        for group in &mut groups {
            self.eval_data_integrity(group);
        }
        groups
    }

    /// Normalize the group to canonical order and bind the digest to it.
    pub fn eval_data_integrity(&self, group: &mut GroupPayload) {
        self.registry
            .sort_by_priority(&mut group.features, |snapshot| snapshot.name.as_str());
        group.data_integrity = digest_features(&group.features);
    }

    /// Recompute the digest over the (already normalized) feature list and
    /// compare with the stored value.
    pub fn check_data_integrity(&self, group: &GroupPayload) -> bool {
        digest_features(&group.features) == group.data_integrity
    }

    fn group_features_by_agent(&self, features: &[String]) -> IndexMap<String, Vec<String>> {
        let mut by_agent: IndexMap<String, Vec<String>> = IndexMap::new();
        for feature in features {
            match self.registry.feature_by_name(feature) {
                Some(descriptor) => {
                    let entry = by_agent.entry(descriptor.agent.clone()).or_default();
                    if !entry.contains(feature) {
                        entry.push(feature.clone());
                    }
                }
                None => warn!(feature = %feature, "feature not found, dropped from save"),
            }
        }
        by_agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::FeatureData;
    use crate::registry::default_fleet;
    use srr_msg::InMemoryBus;
    use std::time::Duration;

    fn engine() -> SaveEngine {
        let client = RequestClient::new(
            Arc::new(InMemoryBus::new()),
            "etn-srr",
            "srr.reply",
            Duration::from_millis(1_000),
        );
        SaveEngine::new(Arc::new(default_fleet()), client, "2.0")
    }

    fn snapshot(name: &str, blob: &str) -> (String, FeatureData) {
        (
            name.to_owned(),
            FeatureData {
                version: "1.0".into(),
                status: crate::dto::Status::Success,
                error: String::new(),
                data: blob.to_owned(),
            },
        )
    }

    fn config_response() -> SaveResponse {
        let mut response = SaveResponse::default();
        // deliberately unsorted arrival order
        for (name, data) in [
            snapshot("discovery", "d"),
            snapshot("user-session", "u"),
            snapshot("automation-settings", "a"),
            snapshot("mass-mgmt", "m"),
            snapshot("notification", "n"),
            snapshot("monitoring", "o"),
        ] {
            response.map_features_data.insert(name, data);
        }
        response
    }

    #[test]
    fn assembly_sorts_and_digests() {
        let engine = engine();
        let groups = engine.assemble_groups(&config_response());
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.group_id, "config");
        let order: Vec<&str> = group.features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "user-session",
                "notification",
                "monitoring",
                "discovery",
                "mass-mgmt",
                "automation-settings",
            ]
        );
        assert_eq!(group.data_integrity, digest_features(&group.features));
        assert_eq!(group.data_integrity.len(), 64);
    }

    #[test]
    fn digest_is_stable_under_arrival_shuffle() {
        let engine = engine();
        let first = engine.assemble_groups(&config_response());

        // same snapshots, reversed arrival order
        let mut reversed = SaveResponse::default();
        for (name, data) in config_response().map_features_data.into_iter().rev() {
            reversed.map_features_data.insert(name, data);
        }
        let second = engine.assemble_groups(&reversed);

        assert_eq!(first[0].data_integrity, second[0].data_integrity);
    }

    #[test]
    fn digest_is_sensitive_to_blob_mutation() {
        let engine = engine();
        let mut groups = engine.assemble_groups(&config_response());
        let original = groups[0].data_integrity.clone();
        groups[0].features[2].data.data = "tampered".into();
        assert!(!engine.check_data_integrity(&groups[0]));
        engine.eval_data_integrity(&mut groups[0]);
        assert_ne!(groups[0].data_integrity, original);
    }

    #[test]
    fn ungrouped_features_are_dropped_from_assembly() {
        let engine = engine();
        let mut response = SaveResponse::default();
        let (name, data) = snapshot("network", "x");
        response.map_features_data.insert(name, data);
        assert!(engine.assemble_groups(&response).is_empty());
    }

    #[test]
    fn unknown_features_are_dropped_before_fan_out() {
        let engine = engine();
        let by_agent = engine.group_features_by_agent(&[
            "asset-agent".to_owned(),
            "no-such-feature".to_owned(),
            "asset-agent".to_owned(),
        ]);
        assert_eq!(by_agent.len(), 1);
        assert_eq!(by_agent["etn-asset"], vec!["asset-agent".to_owned()]);
    }
}
