use serde::Serialize;

use super::policy::{ApplyPolicy, DefinedSets, PolicyDefinition};

/// Full configuration pushed into the BGP session engine.
///
/// The engine has a flat, globally-named view of the world: one global
/// instance, one neighbor list, one policy namespace. The reconciler keeps
/// the last successfully pushed `ConfigSet` as its notion of "current" and
/// diffs newly translated intent against it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConfigSet {
    pub global: Global,
    pub neighbors: Vec<Neighbor>,
    pub redistribution: Redistribution,
    pub defined_sets: DefinedSets,
    pub policy_definitions: Vec<PolicyDefinition>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Global {
    pub config: GlobalConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GlobalConfig {
    pub asn: u32,
    pub router_id: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Neighbor {
    pub config: NeighborConfig,
    // The engine's internal diffing logic may read the state sub-structure
    // instead of config depending on code path; both must agree or spurious
    // deltas appear.
    pub state: NeighborState,
    pub transport: Transport,
    pub apply_policy: ApplyPolicy,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NeighborConfig {
    pub peer_as: u32,
    pub neighbor_address: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NeighborState {
    pub peer_as: u32,
    pub neighbor_address: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Transport {
    pub config: TransportConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TransportConfig {
    // Local bind address for the session, empty for engine default
    pub local_address: String,
    pub remote_port: u16,
}

/// Downstream route-installation channel config
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Redistribution {
    pub config: RedistributionConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RedistributionConfig {
    pub enabled: bool,
    pub endpoint: String,
    // Empty list means all route types are redistributed
    pub route_types: Vec<String>,
}
