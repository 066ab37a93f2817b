//! ---
//! srr_section: "03-orchestration-core"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Save/restore orchestration engine and fleet catalog."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
//! Operator-facing entry points. Each returns a two-part reply: the status
//! string for the transport layer and the JSON body for the UI. Every error
//! is caught here; nothing escapes to the serve loop.

use std::sync::Arc;

use serde::Serialize;
use srr_common::crypto::{check_passphrase_format, encrypt, passphrase_format};
use srr_msg::RequestClient;
use tracing::{debug, error};

use crate::dto::{
    FeatureInfo, GroupInfo, GroupPayload, SrrListResponse, SrrRestoreRequest, SrrRestoreResponse,
    SrrSaveRequest, SrrSaveResponse, Status,
};
use crate::registry::SrrRegistry;
use crate::restore::RestoreEngine;
use crate::save::SaveEngine;
use crate::{Result, SrrError};

/// Two-part reply `(status, json)` handed back to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub json: String,
}

impl Reply {
    fn new<T: Serialize>(status: Status, body: &T) -> Self {
        Self {
            status,
            json: serde_json::to_string(body).expect("ui responses always serialize"),
        }
    }
}

/// Outcome of a restore request: the reply plus the restart flag the serve
/// loop hands to the arbiter once the reply is on the wire.
#[derive(Debug)]
pub struct RestoreReply {
    pub reply: Reply,
    pub restart: bool,
}

/// Parses the operator request payloads and drives the engines.
#[derive(Clone)]
pub struct SrrCoordinator {
    registry: Arc<SrrRegistry>,
    save: SaveEngine,
    restore: RestoreEngine,
    version: String,
}

impl SrrCoordinator {
    pub fn new(
        registry: Arc<SrrRegistry>,
        client: RequestClient,
        version: impl Into<String>,
        supported_versions: Vec<String>,
    ) -> Self {
        let version = version.into();
        let save = SaveEngine::new(registry.clone(), client.clone(), version.clone());
        let restore = RestoreEngine::new(
            registry.clone(),
            client,
            version.clone(),
            supported_versions,
        );
        Self {
            registry,
            save,
            restore,
            version,
        }
    }

    /// Catalog of groups and features. Never fails; an empty registry yields
    /// an empty group list.
    pub fn request_list(&self) -> Reply {
        let groups = self
            .registry
            .all_groups()
            .map(|group| GroupInfo {
                group_id: group.id.clone(),
                group_name: group.id.clone(),
                description: group.description.clone(),
                features: group
                    .features
                    .iter()
                    .map(|edge| FeatureInfo {
                        name: edge.feature.clone(),
                        description: self
                            .registry
                            .feature_by_name(&edge.feature)
                            .map(|descriptor| descriptor.description.clone())
                            .unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect();

        let response = SrrListResponse {
            version: self.version.clone(),
            passphrase_description: format!(
                "Passphrase must have {} characters",
                passphrase_format()
            ),
            passphrase_validation: passphrase_format(),
            groups,
        };
        Reply::new(Status::Success, &response)
    }

    /// Save the requested groups into an encrypted, integrity-checked
    /// payload.
    pub fn request_save(&self, json: &str) -> Reply {
        let mut response = SrrSaveResponse {
            version: self.version.clone(),
            status: Status::Failed,
            checksum: String::new(),
            error: String::new(),
            data: Vec::new(),
        };

        match serde_json::from_str::<SrrSaveRequest>(json) {
            Err(err) => {
                response.error = format!("malformed save request: {}", err);
                error!(error = %err, "save request did not parse");
            }
            Ok(request) => {
                if !check_passphrase_format(&request.passphrase) {
                    response.error = format!(
                        "Passphrase must have {} characters",
                        passphrase_format()
                    );
                    error!("{}", response.error);
                } else {
                    response.checksum = encrypt(&request.passphrase, &request.passphrase);
                    match self.save_groups(&request) {
                        Ok(groups) => {
                            response.data = groups;
                            response.status = Status::Success;
                        }
                        Err(err) => {
                            response.error = err.to_string();
                            error!(error = %err, "save request failed");
                        }
                    }
                }
            }
        }

        Reply::new(response.status, &response)
    }

    fn save_groups(&self, request: &SrrSaveRequest) -> Result<Vec<GroupPayload>> {
        debug!(groups = ?request.group_list, "processing configuration save");

        let mut features = Vec::new();
        for group_id in &request.group_list {
            match self.registry.group_by_name(group_id) {
                Some(group) => {
                    features.extend(group.features.iter().map(|edge| edge.feature.clone()))
                }
                None => error!(group = %group_id, "group not found"),
            }
        }

        let merged = self.save.save_features(&features, &request.passphrase)?;
        Ok(self.save.assemble_groups(&merged))
    }

    /// Restore a previously saved payload. The returned restart flag must be
    /// acted on only after the reply has been delivered.
    pub fn request_restore(&self, json: &str, force: bool) -> RestoreReply {
        match serde_json::from_str::<SrrRestoreRequest>(json) {
            Err(err) => {
                error!(error = %err, "restore request did not parse");
                let response = SrrRestoreResponse {
                    status: Status::Failed,
                    error: format!("malformed restore request: {}", err),
                    status_list: Vec::new(),
                };
                RestoreReply {
                    reply: Reply::new(Status::Failed, &response),
                    restart: false,
                }
            }
            Ok(request) => {
                let run = self.restore.run(&request, force);
                RestoreReply {
                    reply: Reply::new(run.response.status, &run.response),
                    restart: run.restart,
                }
            }
        }
    }

    /// Reserved entry point.
    pub fn request_reset(&self, _json: &str) -> Reply {
        let err = SrrError::NotImplemented;
        let response = SrrRestoreResponse {
            status: Status::Failed,
            error: err.to_string(),
            status_list: Vec::new(),
        };
        Reply::new(Status::Failed, &response)
    }
}
