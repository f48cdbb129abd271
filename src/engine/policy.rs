use std::fmt;

use serde::Serialize;

/// Named match sets shared by all policy definitions.
///
/// The engine keeps one flat namespace for each kind of set, so every name
/// here must be globally unique across all neighbors.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DefinedSets {
    pub prefix_sets: Vec<PrefixSet>,
    pub neighbor_sets: Vec<NeighborSet>,
    pub community_sets: Vec<CommunitySet>,
    pub as_path_sets: Vec<AsPathSet>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PrefixSet {
    pub name: String,
    pub prefixes: Vec<Prefix>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Prefix {
    pub ip_prefix: String,
    // Empty string means exact match only
    pub masklength_range: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NeighborSet {
    pub name: String,
    pub neighbors: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CommunitySet {
    pub name: String,
    pub communities: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AsPathSet {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PolicyDefinition {
    pub name: String,
    pub statements: Vec<Statement>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Statement {
    // Statement names must be globally unique across all policies
    pub name: String,
    pub conditions: Conditions,
    pub actions: Actions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Conditions {
    pub match_prefix_set: MatchPrefixSet,
    pub match_neighbor_set: MatchNeighborSet,
    pub bgp: BgpConditions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchPrefixSet {
    pub prefix_set: String,
    pub match_set_options: MatchSetOptionsRestricted,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchNeighborSet {
    pub neighbor_set: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BgpConditions {
    pub match_community_set: MatchCommunitySet,
    pub match_as_path_set: MatchAsPathSet,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchCommunitySet {
    pub community_set: String,
    pub match_set_options: MatchSetOptions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchAsPathSet {
    pub as_path_set: String,
    pub match_set_options: MatchSetOptions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Actions {
    pub disposition: RouteDisposition,
    pub bgp: BgpActions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BgpActions {
    pub set_community: SetCommunity,
    pub set_local_pref: Option<u32>,
    // Empty string means no MED action
    pub set_med: String,
    pub set_as_path_prepend: SetAsPathPrepend,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SetCommunity {
    pub communities: Vec<String>,
    pub options: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SetAsPathPrepend {
    pub repeat_n: u8,
    // ASN in decimal string form
    pub asn: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RouteDisposition {
    None,
    AcceptRoute,
    RejectRoute,
}

impl Default for RouteDisposition {
    fn default() -> Self {
        RouteDisposition::None
    }
}

impl fmt::Display for RouteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            RouteDisposition::None => "none",
            RouteDisposition::AcceptRoute => "accept-route",
            RouteDisposition::RejectRoute => "reject-route",
        };
        write!(f, "{}", word)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MatchSetOptions {
    Any,
    All,
    Invert,
}

impl Default for MatchSetOptions {
    fn default() -> Self {
        MatchSetOptions::Any
    }
}

/// Match options allowed on prefix and neighbor sets (no ALL support)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MatchSetOptionsRestricted {
    Any,
    Invert,
}

impl Default for MatchSetOptionsRestricted {
    fn default() -> Self {
        MatchSetOptionsRestricted::Any
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DefaultPolicyType {
    AcceptRoute,
    RejectRoute,
}

impl Default for DefaultPolicyType {
    fn default() -> Self {
        // Reject-by-default is the safety invariant for policy evaluation
        DefaultPolicyType::RejectRoute
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ApplyPolicy {
    pub config: ApplyPolicyConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ApplyPolicyConfig {
    pub default_import_policy: DefaultPolicyType,
    pub default_export_policy: DefaultPolicyType,
    pub import_policy: Vec<String>,
    pub export_policy: Vec<String>,
}
