//! ---
//! srr_section: "03-orchestration-core"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Save/restore orchestration engine and fleet catalog."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
//! Restore pipeline for the 1.0 (flat feature list) and 2.0 (group list)
//! payload versions.
//!
//! Version 2.0 treats each group as a transaction: the group either ends
//! fully restored to the new snapshot or rolled back, best effort, to the
//! pre-restore one. Reset runs in ascending priority, restore in descending
//! priority, and the two phases never interleave across features.

use std::sync::Arc;

use srr_common::crypto::{decrypt, encrypt};
use srr_msg::RequestClient;
use tracing::{debug, error, info, warn};

use crate::dto::{
    FeatureData, FeatureSnapshot, GroupPayload, Query, Response, ResetQuery, RestoreQuery,
    RestoreResponse, RestoreStatus, SaveResponse, SrrRestoreRequest, SrrRestoreResponse, Status,
};
use crate::registry::{GroupDescriptor, SrrRegistry};
use crate::save::SaveEngine;
use crate::{Result, SrrError};

/// Execution phases of one v2.0 group transaction. The only legal path into
/// `RollingBack` is a failed `Restoring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupPhase {
    Idle,
    StagingRollback,
    Resetting,
    Restoring,
    RollingBack,
    Done,
    Unrecoverable,
}

impl GroupPhase {
    fn can_advance_to(self, next: GroupPhase) -> bool {
        use GroupPhase::*;
        matches!(
            (self, next),
            (Idle, StagingRollback)
                | (StagingRollback, Resetting)
                | (Resetting, Restoring)
                | (Restoring, Done)
                | (Restoring, RollingBack)
                | (RollingBack, Done)
                | (RollingBack, Unrecoverable)
        )
    }
}

struct GroupTransaction {
    group_id: String,
    phase: GroupPhase,
}

impl GroupTransaction {
    fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            phase: GroupPhase::Idle,
        }
    }

    fn advance(&mut self, next: GroupPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal group transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(group = %self.group_id, from = ?self.phase, to = ?next, "group transaction");
        self.phase = next;
    }
}

/// Outcome of a best-effort rollback pass.
#[derive(Debug, Default)]
struct RollbackOutcome {
    /// OR of the `restart` flags of every feature touched.
    restart: bool,
    /// Features whose rollback restore failed; possibly in undefined state.
    unrecoverable: Vec<String>,
}

/// Result of one restore request: the UI response plus the aggregated
/// restart flag the arbiter acts on after the reply is committed.
#[derive(Debug)]
pub struct RestoreRun {
    pub response: SrrRestoreResponse,
    pub restart: bool,
}

/// Drives ordered reset→restore per feature with per-group rollback.
#[derive(Clone)]
pub struct RestoreEngine {
    registry: Arc<SrrRegistry>,
    client: RequestClient,
    save: SaveEngine,
    version: String,
    supported_versions: Vec<String>,
}

impl RestoreEngine {
    pub fn new(
        registry: Arc<SrrRegistry>,
        client: RequestClient,
        version: impl Into<String>,
        supported_versions: Vec<String>,
    ) -> Self {
        let version = version.into();
        let save = SaveEngine::new(registry.clone(), client.clone(), version.clone());
        Self {
            registry,
            client,
            save,
            version,
            supported_versions,
        }
    }

    /// Run a restore request to completion, never panicking and never
    /// returning early with a half-built response: the status list collected
    /// up to a failure survives into the reply.
    pub fn run(&self, request: &SrrRestoreRequest, force: bool) -> RestoreRun {
        let mut status_list = Vec::new();
        let mut restart = false;

        let response = match self.execute(request, force, &mut status_list, &mut restart) {
            Ok(()) => SrrRestoreResponse {
                status: Status::Success,
                error: String::new(),
                status_list,
            },
            Err(err) => {
                let status = match &err {
                    SrrError::IntegrityCheckFailed(_) => Status::Unknown,
                    _ => Status::Failed,
                };
                error!(error = %err, "restore request failed");
                SrrRestoreResponse {
                    status,
                    error: err.to_string(),
                    status_list,
                }
            }
        };

        RestoreRun { response, restart }
    }

    fn execute(
        &self,
        request: &SrrRestoreRequest,
        force: bool,
        status_list: &mut Vec<RestoreStatus>,
        restart: &mut bool,
    ) -> Result<()> {
        let plain = decrypt(&request.checksum, &request.passphrase)
            .map_err(|_| SrrError::InvalidPassphrase)?;
        if plain != request.passphrase {
            return Err(SrrError::InvalidPassphrase);
        }

        if !self.supported_versions.contains(&request.version) {
            return Err(SrrError::InvalidVersion(request.version.clone()));
        }

        match request.version.as_str() {
            "1.0" => self.run_v1(request, status_list, restart),
            "2.0" => self.run_v2(request, force, status_list, restart),
            other => Err(SrrError::InvalidVersion(other.to_owned())),
        }
    }

    /// Version 1.0: flat feature list, processed in payload order. The first
    /// restore failure stops the run, rolls back every staged feature, and
    /// fails the whole call.
    fn run_v1(
        &self,
        request: &SrrRestoreRequest,
        status_list: &mut Vec<RestoreStatus>,
        restart: &mut bool,
    ) -> Result<()> {
        let snapshots: Vec<FeatureSnapshot> = serde_json::from_value(request.data.clone())?;

        let mut rollback = SaveResponse::default();
        for snapshot in &snapshots {
            let name = &snapshot.name;

            debug!(feature = %name, "saving current state for rollback");
            if let Err(err) = self.stage_rollback(name, &request.passphrase, &mut rollback) {
                error!(feature = %name, error = %err, "rollback save failed");
            }

            self.reset_if_supported(name);

            let query = self.restore_query_for(name, &snapshot.data, &request.passphrase);
            match self.restore_feature(name, &query) {
                Ok(reply) => {
                    if let Some(descriptor) = self.registry.feature_by_name(name) {
                        *restart |= descriptor.restart;
                    }
                    status_list.push(RestoreStatus {
                        name: name.clone(),
                        status: reply.status,
                        error: reply.error,
                    });
                }
                Err(err) => {
                    info!("starting rollback");
                    *restart |= self.rollback(&rollback, &request.passphrase).restart;
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Version 2.0: list of independent group transactions. The overall run
    /// succeeds once orchestration completes, even when individual groups
    /// report FAILED.
    fn run_v2(
        &self,
        request: &SrrRestoreRequest,
        force: bool,
        status_list: &mut Vec<RestoreStatus>,
        restart: &mut bool,
    ) -> Result<()> {
        let mut groups: Vec<GroupPayload> = serde_json::from_value(request.data.clone())?;

        // canonical order: execution and digest agree on it
        for group in &mut groups {
            self.registry
                .sort_by_priority(&mut group.features, |snapshot| snapshot.name.as_str());
        }

        if force {
            warn!("restoring with force option: data integrity check will be skipped");
        } else {
            let failed: Vec<String> = groups
                .iter()
                .filter(|group| !self.save.check_data_integrity(group))
                .map(|group| group.group_id.clone())
                .collect();
            for group_id in &failed {
                error!(group = %group_id, "integrity check failed");
            }
            if !failed.is_empty() {
                return Err(SrrError::IntegrityCheckFailed(failed));
            }
        }

        for group in &groups {
            if let Some(status) = self.restore_group(group, &request.passphrase, restart) {
                status_list.push(status);
            }
        }

        Ok(())
    }

    /// One group transaction. Returns `None` for unknown groups, which are
    /// skipped without an entry in the status list.
    fn restore_group(
        &self,
        group: &GroupPayload,
        passphrase: &str,
        restart: &mut bool,
    ) -> Option<RestoreStatus> {
        let group_id = &group.group_id;
        let Some(descriptor) = self.registry.group_by_name(group_id) else {
            error!(group = %group_id, "group does not exist, will not be restored");
            return None;
        };

        let mut transaction = GroupTransaction::new(group_id);

        // Build every restore query up front so missing features surface
        // before any RPC goes out.
        let queries = match self.build_restore_queries(descriptor, group, passphrase) {
            Ok(queries) => queries,
            Err(err) => {
                error!(group = %group_id, error = %err, "group cannot be restored");
                return Some(RestoreStatus {
                    name: group_id.clone(),
                    status: Status::Failed,
                    error: format!("Group {} cannot be restored. Missing features", group_id),
                });
            }
        };

        transaction.advance(GroupPhase::StagingRollback);
        let mut rollback = SaveResponse::default();
        for snapshot in &group.features {
            debug!(feature = %snapshot.name, "saving current state for rollback");
            if let Err(err) = self.stage_rollback(&snapshot.name, passphrase, &mut rollback) {
                error!(feature = %snapshot.name, error = %err, "rollback save failed");
            }
        }

        // reset runs in reverse of the restore order
        transaction.advance(GroupPhase::Resetting);
        for snapshot in group.features.iter().rev() {
            self.reset_if_supported(&snapshot.name);
        }

        transaction.advance(GroupPhase::Restoring);
        let mut status = RestoreStatus {
            name: group_id.clone(),
            status: Status::Success,
            error: String::new(),
        };
        for snapshot in &group.features {
            let name = &snapshot.name;
            let Some(query) = queries.get(name.as_str()) else {
                warn!(
                    feature = %name,
                    group = %group_id,
                    "payload feature not declared by group, skipping restore"
                );
                continue;
            };
            match self.restore_feature(name, query) {
                Ok(_) => {
                    if let Some(descriptor) = self.registry.feature_by_name(name) {
                        *restart |= descriptor.restart;
                    }
                }
                Err(err) => {
                    status.status = Status::Failed;
                    status.error = format!("Restore failed for feature {}: {}", name, err);
                    error!(group = %group_id, feature = %name, error = %err, "restore failed");

                    info!(group = %group_id, "starting group rollback");
                    transaction.advance(GroupPhase::RollingBack);
                    let outcome = self.rollback(&rollback, passphrase);
                    *restart |= outcome.restart;
                    transaction.advance(if outcome.unrecoverable.is_empty() {
                        GroupPhase::Done
                    } else {
                        GroupPhase::Unrecoverable
                    });
                    return Some(status);
                }
            }
        }

        transaction.advance(GroupPhase::Done);
        Some(status)
    }

    /// Restore queries for every feature the group's registry entry declares.
    /// A feature missing from the payload fails the whole group before any
    /// RPC is issued.
    fn build_restore_queries(
        &self,
        descriptor: &GroupDescriptor,
        group: &GroupPayload,
        passphrase: &str,
    ) -> Result<indexmap::IndexMap<String, RestoreQuery>> {
        let by_name: std::collections::HashMap<&str, &FeatureData> = group
            .features
            .iter()
            .map(|snapshot| (snapshot.name.as_str(), &snapshot.data))
            .collect();

        let mut queries = indexmap::IndexMap::new();
        for edge in &descriptor.features {
            let Some(data) = by_name.get(edge.feature.as_str()) else {
                return Err(SrrError::MissingFeatures {
                    group: group.group_id.clone(),
                });
            };
            queries.insert(
                edge.feature.clone(),
                self.restore_query_for(&edge.feature, data, passphrase),
            );
        }
        Ok(queries)
    }

    fn restore_query_for(
        &self,
        name: &str,
        data: &FeatureData,
        passphrase: &str,
    ) -> RestoreQuery {
        let mut map = indexmap::IndexMap::new();
        map.insert(name.to_owned(), data.clone());
        RestoreQuery {
            version: self.version.clone(),
            checksum: encrypt(passphrase, passphrase),
            passphrase: passphrase.to_owned(),
            map_features_data: map,
        }
    }

    /// One restore RPC to the owning agent. A non-SUCCESS reply raises
    /// [`SrrError::RestoreFailed`].
    fn restore_feature(&self, name: &str, query: &RestoreQuery) -> Result<RestoreResponse> {
        let (agent, queue) = self.route(name)?;
        debug!(feature = %name, agent = %agent, "restoring configuration");
        let response: Response =
            self.client
                .request(&queue, &agent, "restore", &Query::Restore(query.clone()))?;
        let Response::Restore(restore) = response else {
            return Err(SrrError::UnexpectedReply { agent });
        };
        if restore.status != Status::Success {
            return Err(SrrError::RestoreFailed {
                feature: name.to_owned(),
                reason: if restore.error.is_empty() {
                    "agent reported failure".to_owned()
                } else {
                    restore.error
                },
            });
        }
        debug!(feature = %name, agent = %agent, "feature restored");
        Ok(restore)
    }

    /// One reset RPC to the owning agent.
    fn reset_feature(&self, name: &str) -> Result<()> {
        let (agent, queue) = self.route(name)?;
        let query = Query::Reset(ResetQuery {
            version: self.version.clone(),
            features: vec![name.to_owned()],
        });
        let response: Response = self.client.request(&queue, &agent, "reset", &query)?;
        let Response::Reset(reset) = response else {
            return Err(SrrError::UnexpectedReply { agent });
        };
        match reset.map_features_status.get(name) {
            Some(block) if block.status == Status::Success => Ok(()),
            Some(block) => Err(SrrError::ResetFailed {
                feature: name.to_owned(),
                reason: block.error.clone(),
            }),
            None => Err(SrrError::ResetFailed {
                feature: name.to_owned(),
                reason: "agent returned no status".to_owned(),
            }),
        }
    }

    /// Reset the feature when its descriptor opts in; failures are logged
    /// and swallowed since reset is not universally supported.
    fn reset_if_supported(&self, name: &str) {
        let supported = self
            .registry
            .feature_by_name(name)
            .map(|descriptor| descriptor.reset)
            .unwrap_or(false);
        if !supported {
            return;
        }
        debug!(feature = %name, "resetting feature");
        if let Err(err) = self.reset_feature(name) {
            warn!(feature = %name, error = %err, "reset failed, continuing");
        }
    }

    /// Snapshot the feature's current state into the rollback accumulator.
    fn stage_rollback(
        &self,
        name: &str,
        passphrase: &str,
        accumulator: &mut SaveResponse,
    ) -> Result<()> {
        let saved = self.save.save_features(&[name.to_owned()], passphrase)?;
        accumulator.merge(saved);
        Ok(())
    }

    /// Best-effort reinstallation of every staged snapshot, in staging
    /// order. Failures never escape this loop; the feature is reported
    /// unrecoverable and iteration continues.
    fn rollback(&self, accumulator: &SaveResponse, passphrase: &str) -> RollbackOutcome {
        let mut outcome = RollbackOutcome::default();

        for (name, data) in &accumulator.map_features_data {
            self.reset_if_supported(name);

            debug!(feature = %name, "rolling back configuration");
            let query = self.restore_query_for(name, data, passphrase);
            if let Err(err) = self.restore_feature(name, &query) {
                error!(
                    feature = %name,
                    error = %err,
                    "feature is unrecoverable, may be in undefined state"
                );
                outcome.unrecoverable.push(name.clone());
            }
            if let Some(descriptor) = self.registry.feature_by_name(name) {
                outcome.restart |= descriptor.restart;
            }
        }

        outcome
    }

    fn route(&self, feature: &str) -> Result<(String, String)> {
        let descriptor =
            self.registry
                .feature_by_name(feature)
                .ok_or_else(|| SrrError::RestoreFailed {
                    feature: feature.to_owned(),
                    reason: "feature not found in registry".to_owned(),
                })?;
        let queue = self
            .registry
            .queue_of_agent(&descriptor.agent)
            .ok_or_else(|| SrrError::RestoreFailed {
                feature: feature.to_owned(),
                reason: format!("no queue registered for agent {}", descriptor.agent),
            })?;
        Ok((descriptor.agent.clone(), queue.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_back_is_only_reachable_from_restoring() {
        use GroupPhase::*;
        for phase in [Idle, StagingRollback, Resetting, Done, Unrecoverable] {
            assert!(!phase.can_advance_to(RollingBack));
        }
        assert!(Restoring.can_advance_to(RollingBack));
        assert!(Restoring.can_advance_to(Done));
        assert!(!Restoring.can_advance_to(Unrecoverable));
    }
}
