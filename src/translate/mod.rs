use std::error::Error;
use std::fmt;

use crate::config::intent::Intent;
use crate::engine::ConfigSet;

mod config;
pub mod policy;

pub use config::translate_device;
pub use policy::{
    community_to_string, default_policy_to_disposition, qualified_policy_name,
    split_qualified_name, translate_policies, PolicyTranslation,
};

#[derive(Clone, Debug, PartialEq)]
pub enum TranslateError {
    UnresolvedCommunitySet(String),
    UnsupportedMed(String),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TranslateError::UnresolvedCommunitySet(name) => {
                write!(f, "Community set {} is not defined", name)
            }
            TranslateError::UnsupportedMed(value) => {
                write!(f, "MED form {} is not supported", value)
            }
        }
    }
}

impl Error for TranslateError {}

/// Produce the complete engine configuration for one reconciliation pass
pub fn to_engine_config(intent: &Intent, endpoint: &str, listen_port: u16) -> ConfigSet {
    let mut config = translate_device(&intent.bgp, endpoint, listen_port);
    let policies = translate_policies(intent);
    for neighbor in &mut config.neighbors {
        if let Some(apply_policy) = policies.apply_policy.get(&neighbor.config.neighbor_address) {
            neighbor.apply_policy.config = apply_policy.clone();
        }
    }
    config.defined_sets = policies.defined_sets;
    config.policy_definitions = policies.policy_definitions;
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::intent::{
        ApplyPolicyIntent, CommunityMember, DefaultPolicy, GlobalIntent, NeighborIntent,
        PolicyDefinitionIntent, PolicyResult, SetCommunityIntent, SetCommunityMethod,
        StatementIntent,
    };

    fn sample_intent() -> Intent {
        let mut intent = Intent::default();
        intent.bgp.global = GlobalIntent {
            asn: Some(65001),
            router_id: Some("127.0.0.1".to_string()),
        };
        intent.bgp.neighbors.insert(
            "127.0.0.2".to_string(),
            NeighborIntent {
                peer_as: Some(65002),
                neighbor_port: Some(1179),
                apply_policy: ApplyPolicyIntent {
                    default_import_policy: Some(DefaultPolicy::AcceptRoute),
                    default_export_policy: None,
                    import_policy: vec!["tag-in".to_string()],
                    export_policy: vec![],
                },
            },
        );
        intent.routing_policy.community_sets.insert(
            "transit".to_string(),
            crate::config::intent::CommunitySetIntent {
                match_set_options: None,
                members: vec![CommunityMember::Value((65000 << 16) | 100)],
            },
        );
        intent.routing_policy.policy_definitions.insert(
            "tag-in".to_string(),
            PolicyDefinitionIntent {
                statements: vec![StatementIntent {
                    name: "tag".to_string(),
                    conditions: Default::default(),
                    actions: crate::config::intent::ActionsIntent {
                        policy_result: Some(PolicyResult::AcceptRoute),
                        bgp: crate::config::intent::BgpActionsIntent {
                            set_community: Some(SetCommunityIntent {
                                method: Some(SetCommunityMethod::Reference),
                                options: None,
                                inline: vec![],
                                reference: Some("transit".to_string()),
                            }),
                            ..Default::default()
                        },
                    },
                }],
            },
        );
        intent
    }

    #[test]
    fn test_full_translation_wires_policies_to_neighbors() {
        let config = to_engine_config(&sample_intent(), "unix:/tmp/r.api", 179);
        assert_eq!(config.global.config.asn, 65001);
        assert_eq!(config.neighbors.len(), 1);
        let neighbor = &config.neighbors[0];
        assert_eq!(
            neighbor.apply_policy.config.import_policy,
            vec!["127.0.0.2|tag-in".to_string()]
        );
        assert_eq!(config.policy_definitions.len(), 1);
        assert_eq!(config.policy_definitions[0].name, "127.0.0.2|tag-in");
        assert_eq!(
            config.policy_definitions[0].statements[0]
                .actions
                .bgp
                .set_community
                .communities,
            vec!["65000:100".to_string()]
        );
        assert_eq!(config.defined_sets.neighbor_sets.len(), 1);
        assert_eq!(config.defined_sets.neighbor_sets[0].name, "127.0.0.2");
    }

    #[test]
    fn test_translation_is_deterministic() {
        let intent = sample_intent();
        let first = to_engine_config(&intent, "unix:/tmp/r.api", 179);
        let second = to_engine_config(&intent, "unix:/tmp/r.api", 179);
        assert_eq!(first, second);
    }
}
