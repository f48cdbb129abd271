//! Translation from the per-neighbor, vendor-neutral routing-policy model
//! into the engine's flat, globally-named policy model.
//!
//! Policies are authored per-neighbor but the engine keeps a single policy
//! namespace, so every policy and statement name is qualified with the
//! owning neighbor's address, and each translated policy is pinned to its
//! neighbor through the match-neighbor-set condition.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use log::{error, warn};

use crate::config::intent;
use crate::engine::policy::*;

use super::TranslateError;

/// Qualify a policy name with its owning neighbor's address so all
/// per-neighbor policies can share the engine's global policy list.
pub fn qualified_policy_name(neighbor: &str, policy: &str) -> String {
    format!("{}|{}", neighbor, policy)
}

/// Recover (neighbor, original policy name) from a qualified name
pub fn split_qualified_name(qualified: &str) -> Option<(&str, &str)> {
    qualified.split_once('|')
}

fn statement_name(qualified_policy: &str, statement: &str) -> String {
    format!("{}:{}", qualified_policy, statement)
}

/// Render a packed 32-bit community as `high16:low16`
pub fn community_to_string(value: u32) -> String {
    format!("{}:{}", value >> 16, value & 0x0000_ffff)
}

pub fn translate_community(member: &intent::CommunityMember) -> String {
    use intent::WellKnownCommunity::*;
    match member {
        intent::CommunityMember::Literal(literal) => literal.clone(),
        intent::CommunityMember::Value(value) => community_to_string(*value),
        intent::CommunityMember::WellKnown(well_known) => match well_known {
            NoExport => "65535:65281".to_string(),
            NoAdvertise => "65535:65282".to_string(),
            NoExportSubconfed => "65535:65283".to_string(),
            NoPeer => "65535:65284".to_string(),
        },
    }
}

/// Translate all community sets, sorted by name so repeated runs with
/// identical intent produce an identical engine config. Also returns the
/// name-to-index map used to resolve set-community references.
pub fn translate_community_sets(
    sets: &HashMap<String, intent::CommunitySetIntent>,
) -> (Vec<CommunitySet>, HashMap<String, usize>) {
    let mut index_map = HashMap::new();
    let mut community_sets = Vec::with_capacity(sets.len());
    for name in sets.keys().sorted() {
        index_map.insert(name.clone(), community_sets.len());
        community_sets.push(CommunitySet {
            name: name.clone(),
            communities: sets[name].members.iter().map(translate_community).collect(),
        });
    }
    (community_sets, index_map)
}

pub fn translate_prefix_sets(sets: &HashMap<String, intent::PrefixSetIntent>) -> Vec<PrefixSet> {
    let mut prefix_sets = Vec::with_capacity(sets.len());
    for name in sets.keys().sorted() {
        let prefixes = sets[name]
            .prefixes
            .iter()
            .map(|prefix| {
                let range = match prefix.masklength_range.as_deref() {
                    // The engine spells exact-match as the empty string
                    Some("exact") | None => String::new(),
                    Some(range) => range.to_string(),
                };
                Prefix {
                    ip_prefix: prefix.ip_prefix.to_string(),
                    masklength_range: range,
                }
            })
            .collect();
        prefix_sets.push(PrefixSet {
            name: name.clone(),
            prefixes,
        });
    }
    prefix_sets
}

pub fn translate_as_path_sets(sets: &HashMap<String, intent::AsPathSetIntent>) -> Vec<AsPathSet> {
    sets.keys()
        .sorted()
        .map(|name| AsPathSet {
            name: name.clone(),
            members: sets[name].members.clone(),
        })
        .collect()
}

/// Resolve the communities a statement's set-community action applies
pub fn translate_set_communities(
    set_community: Option<&intent::SetCommunityIntent>,
    community_sets: &[CommunitySet],
    index_map: &HashMap<String, usize>,
) -> Result<Vec<String>, TranslateError> {
    let set_community = match set_community {
        Some(set_community) => set_community,
        None => return Ok(vec![]),
    };
    match set_community.method {
        Some(intent::SetCommunityMethod::Inline) => Ok(set_community
            .inline
            .iter()
            .map(translate_community)
            .collect()),
        Some(intent::SetCommunityMethod::Reference) => match &set_community.reference {
            Some(reference) => match index_map.get(reference) {
                Some(index) => Ok(community_sets[*index].communities.clone()),
                None => Err(TranslateError::UnresolvedCommunitySet(reference.clone())),
            },
            None => Ok(vec![]),
        },
        None => Ok(vec![]),
    }
}

pub fn translate_med(med: Option<&intent::MedIntent>) -> Result<String, TranslateError> {
    match med {
        None => Ok(String::new()),
        Some(intent::MedIntent::Value(value)) => Ok(value.to_string()),
        Some(intent::MedIntent::Literal(literal)) => Ok(literal.clone()),
        // The engine cannot look up the IGP cost; known limitation
        Some(intent::MedIntent::Igp) => Err(TranslateError::UnsupportedMed("IGP".to_string())),
    }
}

pub fn translate_default_policy(policy: Option<intent::DefaultPolicy>) -> DefaultPolicyType {
    match policy {
        Some(intent::DefaultPolicy::AcceptRoute) => DefaultPolicyType::AcceptRoute,
        Some(intent::DefaultPolicy::RejectRoute) => DefaultPolicyType::RejectRoute,
        // Reject-by-default: never accept on an unset or unrecognized value
        _ => DefaultPolicyType::RejectRoute,
    }
}

pub fn translate_route_disposition(result: Option<intent::PolicyResult>) -> RouteDisposition {
    match result {
        Some(intent::PolicyResult::AcceptRoute) => RouteDisposition::AcceptRoute,
        Some(intent::PolicyResult::RejectRoute) => RouteDisposition::RejectRoute,
        _ => RouteDisposition::None,
    }
}

pub fn default_policy_to_disposition(policy: DefaultPolicyType) -> RouteDisposition {
    match policy {
        DefaultPolicyType::AcceptRoute => RouteDisposition::AcceptRoute,
        DefaultPolicyType::RejectRoute => RouteDisposition::RejectRoute,
    }
}

pub fn translate_match_set_options(options: Option<intent::MatchSetOptions>) -> MatchSetOptions {
    match options {
        Some(intent::MatchSetOptions::Invert) => MatchSetOptions::Invert,
        Some(intent::MatchSetOptions::Any) => MatchSetOptions::Any,
        Some(intent::MatchSetOptions::All) => MatchSetOptions::All,
        _ => MatchSetOptions::Any,
    }
}

pub fn translate_match_set_options_restricted(
    options: Option<intent::MatchSetOptionsRestricted>,
) -> MatchSetOptionsRestricted {
    match options {
        Some(intent::MatchSetOptionsRestricted::Invert) => MatchSetOptionsRestricted::Invert,
        Some(intent::MatchSetOptionsRestricted::Any) => MatchSetOptionsRestricted::Any,
        _ => MatchSetOptionsRestricted::Any,
    }
}

/// Translate one policy definition for the neighbor it is instantiated for.
///
/// Translation errors inside a statement degrade the affected field and are
/// logged; the statement is still emitted.
pub fn translate_policy_definition(
    name: &str,
    policy: &intent::PolicyDefinitionIntent,
    neighbor: &str,
    community_set_intents: &HashMap<String, intent::CommunitySetIntent>,
    community_sets: &[CommunitySet],
    index_map: &HashMap<String, usize>,
) -> PolicyDefinition {
    let qualified_name = qualified_policy_name(neighbor, name);
    let statements = policy
        .statements
        .iter()
        .map(|statement| {
            let communities = match translate_set_communities(
                statement.actions.bgp.set_community.as_ref(),
                community_sets,
                index_map,
            ) {
                Ok(communities) => communities,
                Err(err) => {
                    error!("{}", err);
                    vec![]
                }
            };
            let set_med = match translate_med(statement.actions.bgp.set_med.as_ref()) {
                Ok(set_med) => set_med,
                Err(err) => {
                    error!("MED value not supported: {}", err);
                    String::new()
                }
            };
            let community_set_ref = statement.conditions.bgp.community_set.clone();
            let community_match_options = community_set_ref
                .as_ref()
                .and_then(|reference| community_set_intents.get(reference))
                .and_then(|set| set.match_set_options);
            let match_as_path = statement.conditions.bgp.match_as_path_set.as_ref();
            let prepend = statement.actions.bgp.set_as_path_prepend.as_ref();

            Statement {
                name: statement_name(&qualified_name, &statement.name),
                conditions: Conditions {
                    match_prefix_set: MatchPrefixSet {
                        prefix_set: statement
                            .conditions
                            .match_prefix_set
                            .as_ref()
                            .and_then(|m| m.prefix_set.clone())
                            .unwrap_or_default(),
                        match_set_options: translate_match_set_options_restricted(
                            statement
                                .conditions
                                .match_prefix_set
                                .as_ref()
                                .and_then(|m| m.match_set_options),
                        ),
                    },
                    // Confine the policy to its originating neighbor,
                    // whatever neighbor set the statement named
                    match_neighbor_set: MatchNeighborSet {
                        neighbor_set: neighbor.to_string(),
                    },
                    bgp: BgpConditions {
                        match_community_set: MatchCommunitySet {
                            community_set: community_set_ref.unwrap_or_default(),
                            match_set_options: translate_match_set_options(
                                community_match_options,
                            ),
                        },
                        match_as_path_set: MatchAsPathSet {
                            as_path_set: match_as_path
                                .and_then(|m| m.as_path_set.clone())
                                .unwrap_or_default(),
                            match_set_options: translate_match_set_options(
                                match_as_path.and_then(|m| m.match_set_options),
                            ),
                        },
                    },
                },
                actions: Actions {
                    disposition: translate_route_disposition(statement.actions.policy_result),
                    bgp: BgpActions {
                        set_community: SetCommunity {
                            communities,
                            options: statement
                                .actions
                                .bgp
                                .set_community
                                .as_ref()
                                .and_then(|sc| sc.options)
                                .map(|options| options.to_string())
                                .unwrap_or_default(),
                        },
                        set_local_pref: statement.actions.bgp.set_local_pref,
                        set_med,
                        set_as_path_prepend: SetAsPathPrepend {
                            repeat_n: prepend.map(|p| p.repeat_n).unwrap_or_default(),
                            asn: prepend.map(|p| p.asn.to_string()).unwrap_or_default(),
                        },
                    },
                },
            }
        })
        .collect();

    PolicyDefinition {
        name: qualified_name,
        statements,
    }
}

/// Per-neighbor apply-policy with its policy references qualified to the
/// engine's global policy names
pub fn translate_apply_policy(
    apply_policy: &intent::ApplyPolicyIntent,
    neighbor: &str,
) -> ApplyPolicyConfig {
    ApplyPolicyConfig {
        default_import_policy: translate_default_policy(apply_policy.default_import_policy),
        default_export_policy: translate_default_policy(apply_policy.default_export_policy),
        import_policy: apply_policy
            .import_policy
            .iter()
            .map(|name| qualified_policy_name(neighbor, name))
            .collect(),
        export_policy: apply_policy
            .export_policy
            .iter()
            .map(|name| qualified_policy_name(neighbor, name))
            .collect(),
    }
}

/// Everything the policy side of a reconciliation pass produces
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolicyTranslation {
    pub defined_sets: DefinedSets,
    pub policy_definitions: Vec<PolicyDefinition>,
    pub apply_policy: BTreeMap<String, ApplyPolicyConfig>,
}

/// Translate the full routing-policy intent for every configured neighbor.
///
/// The community-set index map is built once per pass and shared by all
/// per-neighbor policy translations.
pub fn translate_policies(intent: &intent::Intent) -> PolicyTranslation {
    let routing_policy = &intent.routing_policy;
    let (community_sets, index_map) = translate_community_sets(&routing_policy.community_sets);
    let prefix_sets = translate_prefix_sets(&routing_policy.prefix_sets);
    let as_path_sets = translate_as_path_sets(&routing_policy.as_path_sets);

    let mut neighbor_sets = Vec::new();
    let mut policy_definitions = Vec::new();
    let mut apply_policy = BTreeMap::new();

    for (address, neighbor) in &intent.bgp.neighbors {
        // One single-member neighbor set per neighbor, named by its
        // address, for translated policies to pin themselves to
        neighbor_sets.push(NeighborSet {
            name: address.clone(),
            neighbors: vec![address.clone()],
        });

        let referenced = neighbor
            .apply_policy
            .import_policy
            .iter()
            .chain(neighbor.apply_policy.export_policy.iter())
            .unique();
        for policy_name in referenced {
            match routing_policy.policy_definitions.get(policy_name) {
                Some(policy) => policy_definitions.push(translate_policy_definition(
                    policy_name,
                    policy,
                    address,
                    &routing_policy.community_sets,
                    &community_sets,
                    &index_map,
                )),
                None => warn!(
                    "Policy {} referenced by neighbor {} is not defined",
                    policy_name, address
                ),
            }
        }

        apply_policy.insert(
            address.clone(),
            translate_apply_policy(&neighbor.apply_policy, address),
        );
    }

    PolicyTranslation {
        defined_sets: DefinedSets {
            prefix_sets,
            neighbor_sets,
            community_sets,
            as_path_sets,
        },
        policy_definitions,
        apply_policy,
    }
}
