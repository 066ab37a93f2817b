//! ---
//! srr_section: "03-orchestration-core"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Save/restore orchestration engine and fleet catalog."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
//! Static catalog of features, groups, and agents.
//!
//! The registry is the single source of truth for feature→agent routing;
//! agents are never inferred from payload contents. Tables are built once at
//! startup through [`SrrRegistryBuilder`] and immutable afterwards, so they
//! can be shared across threads without synchronization.

use std::cmp::Reverse;
use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;

/// Feature identifiers of the reference fleet.
pub mod features {
    pub const F_ALERT_AGENT: &str = "alert-agent";
    pub const F_ASSET_AGENT: &str = "asset-agent";
    pub const F_AUTOMATION_SETTINGS: &str = "automation-settings";
    pub const F_AUTOMATIONS: &str = "automations";
    pub const F_DISCOVERY: &str = "discovery";
    pub const F_MASS_MANAGEMENT: &str = "mass-mgmt";
    pub const F_MONITORING: &str = "monitoring";
    pub const F_NETWORK: &str = "network";
    pub const F_NOTIFICATION: &str = "notification";
    pub const F_SECURITY_WALLET: &str = "security-wallet";
    pub const F_USER_SESSION: &str = "user-session";
    pub const F_VIRTUAL_ASSETS: &str = "virtual-assets";
}

/// Group identifiers of the reference fleet.
pub mod groups {
    pub const G_ASSETS: &str = "assets";
    pub const G_CONFIG: &str = "config";
    pub const G_SECURITY_WALLET: &str = "security-wallet";
}

/// Agent names and bus queues of the reference fleet.
pub mod agents {
    pub const ALERT_AGENT: &str = "etn-alert";
    pub const ALERT_QUEUE: &str = "ETN.Q.ALERT.SRR";
    pub const ASSET_AGENT: &str = "etn-asset";
    pub const ASSET_QUEUE: &str = "ETN.Q.ASSET.SRR";
    pub const CONFIG_AGENT: &str = "etn-malamute-config";
    pub const CONFIG_QUEUE: &str = "ETN.Q.CONFIG.SRR";
    pub const EMC4J_AGENT: &str = "etn-emc4j";
    pub const EMC4J_QUEUE: &str = "ETN.Q.EMC4J.SRR";
    pub const SECURITY_WALLET_AGENT: &str = "etn-security-wallet";
    pub const SECURITY_WALLET_QUEUE: &str = "ETN.Q.SECW.SRR";
}

/// Prefix applied to feature description translation keys.
const TRANSLATE_KEY_PREFIX: &str = "srr_";

/// One configurable slice of the product, owned by exactly one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDescriptor {
    /// Identity; equals the wire feature name.
    pub id: String,
    /// Translation key describing the feature to operators.
    pub description: String,
    /// Agent that owns save/restore/reset for this feature.
    pub agent: String,
    /// True when restoring or rolling back this feature requires a host
    /// restart.
    pub restart: bool,
    /// True when the feature supports an explicit reset before restore.
    pub reset: bool,
}

impl FeatureDescriptor {
    /// New descriptor with both flags off and the conventional description
    /// key derived from the id.
    pub fn new(id: impl Into<String>, agent: impl Into<String>) -> Self {
        let id = id.into();
        let description = format!("{}{}", TRANSLATE_KEY_PREFIX, id);
        Self {
            id,
            description,
            agent: agent.into(),
            restart: false,
            reset: false,
        }
    }

    /// Mark the feature as requiring a host restart after restore.
    pub fn with_restart(mut self) -> Self {
        self.restart = true;
        self
    }

    /// Mark the feature as supporting reset before restore.
    pub fn with_reset(mut self) -> Self {
        self.reset = true;
        self
    }
}

/// Edge between a group and one of its features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePriority {
    /// Feature id.
    pub feature: String,
    /// Higher priority sorts first in processing; ties resolve by
    /// registration order.
    pub priority: u32,
}

/// An ordered bundle of features sharing a lifecycle from the operator's
/// point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescriptor {
    /// Identity; equals the wire group name.
    pub id: String,
    /// Translation key describing the group to operators.
    pub description: String,
    /// Member features with their priorities, in registration order.
    pub features: Vec<FeaturePriority>,
}

/// A remote service addressed over the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    /// Agent name, used in envelope routing fields.
    pub name: String,
    /// Queue the agent listens on.
    pub queue: String,
}

/// Structural problems detected while building a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A group references a feature missing from the feature table.
    #[error("group {group} references unknown feature {feature}")]
    UnknownFeature {
        group: String,
        feature: String,
    },
    /// A feature appears in more than one group.
    #[error("feature {feature} already belongs to group {existing}, cannot join {group}")]
    DuplicateGroupMembership {
        feature: String,
        group: String,
        existing: String,
    },
    /// A feature names an agent missing from the agent table.
    #[error("feature {feature} references unknown agent {agent}")]
    UnknownAgent {
        feature: String,
        agent: String,
    },
}

/// Immutable catalog: features, groups, agents, plus the derived reverse
/// lookups the engines need on every request.
#[derive(Debug)]
pub struct SrrRegistry {
    features: IndexMap<String, FeatureDescriptor>,
    groups: IndexMap<String, GroupDescriptor>,
    agents: IndexMap<String, AgentDescriptor>,
    group_of: HashMap<String, String>,
    rank: HashMap<String, (u32, usize)>,
}

impl SrrRegistry {
    /// Start building a registry.
    pub fn builder() -> SrrRegistryBuilder {
        SrrRegistryBuilder::default()
    }

    /// Look up a feature descriptor.
    pub fn feature_by_name(&self, name: &str) -> Option<&FeatureDescriptor> {
        self.features.get(name)
    }

    /// Look up a group descriptor.
    pub fn group_by_name(&self, name: &str) -> Option<&GroupDescriptor> {
        self.groups.get(name)
    }

    /// Group owning `feature`; empty string when the feature is not grouped.
    pub fn group_of_feature(&self, feature: &str) -> &str {
        self.group_of.get(feature).map(String::as_str).unwrap_or("")
    }

    /// Priority of `feature` inside its group; 0 when unknown.
    pub fn priority_of(&self, feature: &str) -> u32 {
        self.rank.get(feature).map(|(priority, _)| *priority).unwrap_or(0)
    }

    /// All groups, in registration order.
    pub fn all_groups(&self) -> impl Iterator<Item = &GroupDescriptor> {
        self.groups.values()
    }

    /// All agents, in registration order.
    pub fn all_agents(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.values()
    }

    /// Queue the named agent listens on.
    pub fn queue_of_agent(&self, agent: &str) -> Option<&str> {
        self.agents.get(agent).map(|a| a.queue.as_str())
    }

    /// Sort `items` into canonical processing order: descending priority,
    /// ties by registration order, unknown features last. The sort is stable
    /// and deterministic regardless of input order, which is what binds the
    /// integrity digest to a unique byte sequence.
    pub fn sort_by_priority<T>(&self, items: &mut [T], name_of: impl Fn(&T) -> &str) {
        items.sort_by_key(|item| {
            let (priority, index) = self
                .rank
                .get(name_of(item))
                .copied()
                .unwrap_or((0, usize::MAX));
            (Reverse(priority), index)
        });
    }
}

/// Builder validating the registry invariants before any table is exposed.
#[derive(Debug, Default)]
pub struct SrrRegistryBuilder {
    features: IndexMap<String, FeatureDescriptor>,
    groups: IndexMap<String, GroupDescriptor>,
    agents: IndexMap<String, AgentDescriptor>,
}

impl SrrRegistryBuilder {
    /// Register an agent and the queue it listens on.
    pub fn agent(mut self, name: &str, queue: &str) -> Self {
        self.agents.insert(
            name.to_owned(),
            AgentDescriptor {
                name: name.to_owned(),
                queue: queue.to_owned(),
            },
        );
        self
    }

    /// Register a feature descriptor.
    pub fn feature(mut self, descriptor: FeatureDescriptor) -> Self {
        self.features.insert(descriptor.id.clone(), descriptor);
        self
    }

    /// Register a group with its `(feature, priority)` edges in order.
    pub fn group(mut self, id: &str, features: &[(&str, u32)]) -> Self {
        self.groups.insert(
            id.to_owned(),
            GroupDescriptor {
                id: id.to_owned(),
                description: format!("{}{}", TRANSLATE_KEY_PREFIX, id),
                features: features
                    .iter()
                    .map(|(feature, priority)| FeaturePriority {
                        feature: (*feature).to_owned(),
                        priority: *priority,
                    })
                    .collect(),
            },
        );
        self
    }

    /// Validate the invariants and freeze the tables.
    pub fn build(self) -> Result<SrrRegistry, RegistryError> {
        for feature in self.features.values() {
            if !self.agents.contains_key(&feature.agent) {
                return Err(RegistryError::UnknownAgent {
                    feature: feature.id.clone(),
                    agent: feature.agent.clone(),
                });
            }
        }

        let mut group_of: HashMap<String, String> = HashMap::new();
        let mut rank: HashMap<String, (u32, usize)> = HashMap::new();
        for group in self.groups.values() {
            for (index, edge) in group.features.iter().enumerate() {
                if !self.features.contains_key(&edge.feature) {
                    return Err(RegistryError::UnknownFeature {
                        group: group.id.clone(),
                        feature: edge.feature.clone(),
                    });
                }
                if let Some(existing) = group_of.get(&edge.feature) {
                    return Err(RegistryError::DuplicateGroupMembership {
                        feature: edge.feature.clone(),
                        group: group.id.clone(),
                        existing: existing.clone(),
                    });
                }
                group_of.insert(edge.feature.clone(), group.id.clone());
                rank.insert(edge.feature.clone(), (edge.priority, index));
            }
        }

        Ok(SrrRegistry {
            features: self.features,
            groups: self.groups,
            agents: self.agents,
            group_of,
            rank,
        })
    }
}

/// The reference fleet catalog.
///
/// `network`, `automations`, and `virtual-assets` are registered but not
/// grouped: their owners accept save queries, yet their snapshots are not
/// part of any operator-visible bundle.
pub fn default_fleet() -> SrrRegistry {
    use agents::*;
    use features::*;
    use groups::*;

    SrrRegistry::builder()
        .agent(ALERT_AGENT, ALERT_QUEUE)
        .agent(ASSET_AGENT, ASSET_QUEUE)
        .agent(CONFIG_AGENT, CONFIG_QUEUE)
        .agent(EMC4J_AGENT, EMC4J_QUEUE)
        .agent(SECURITY_WALLET_AGENT, SECURITY_WALLET_QUEUE)
        .feature(FeatureDescriptor::new(F_ALERT_AGENT, ALERT_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_ASSET_AGENT, ASSET_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_AUTOMATION_SETTINGS, CONFIG_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_AUTOMATIONS, EMC4J_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_DISCOVERY, CONFIG_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_MASS_MANAGEMENT, CONFIG_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_MONITORING, CONFIG_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_NETWORK, CONFIG_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_NOTIFICATION, CONFIG_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_SECURITY_WALLET, SECURITY_WALLET_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_USER_SESSION, CONFIG_AGENT).with_restart())
        .feature(FeatureDescriptor::new(F_VIRTUAL_ASSETS, EMC4J_AGENT).with_restart())
        .group(G_ASSETS, &[(F_ASSET_AGENT, 1)])
        .group(
            G_CONFIG,
            &[
                (F_AUTOMATION_SETTINGS, 1),
                (F_DISCOVERY, 2),
                (F_MASS_MANAGEMENT, 2),
                (F_MONITORING, 3),
                (F_NOTIFICATION, 5),
                (F_USER_SESSION, 6),
            ],
        )
        .group(G_SECURITY_WALLET, &[(F_SECURITY_WALLET, 1)])
        .build()
        .expect("reference fleet catalog is well-formed")
}
