//! Mirror of the state actually applied to the engine, published as two
//! sub-trees (BGP and routing-policy). Neighbor maps are ordered so the
//! serialized form is stable across snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::engine::policy::{DefinedSets, PolicyDefinition};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AppliedState {
    pub bgp: BgpApplied,
    pub routing_policy: RoutingPolicyApplied,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BgpApplied {
    pub global: GlobalApplied,
    pub neighbors: BTreeMap<String, NeighborApplied>,
    pub rib: RibApplied,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GlobalApplied {
    pub asn: Option<u32>,
    pub router_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NeighborApplied {
    pub neighbor_address: String,
    pub peer_as: Option<u32>,
    pub session_state: SessionState,
    pub last_transition: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RibApplied {
    pub ipv4_unicast: AfiSafiApplied,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AfiSafiApplied {
    pub loc_rib: Vec<LocRibRoute>,
    pub neighbors: BTreeMap<String, NeighborRib>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LocRibRoute {
    pub prefix: String,
    pub origin: RouteOrigin,
    pub path_index: u32,
    pub communities: Vec<String>,
}

/// Where a locally-selected route was learned from
#[derive(Clone, Debug, PartialEq)]
pub enum RouteOrigin {
    Unset,
    Source(String),
}

impl Default for RouteOrigin {
    fn default() -> Self {
        RouteOrigin::Unset
    }
}

impl fmt::Display for RouteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RouteOrigin::Unset => write!(f, "UNSET"),
            RouteOrigin::Source(source) => write!(f, "{}", source),
        }
    }
}

impl Serialize for RouteOrigin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Per-neighbor Adj-RIB tables. Pre tables include filtered paths, post
/// tables hold only what survived policy.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NeighborRib {
    pub adj_rib_in_pre: BTreeSet<RouteKey>,
    pub adj_rib_in_post: BTreeSet<RouteKey>,
    pub adj_rib_out_pre: BTreeSet<RouteKey>,
    pub adj_rib_out_post: BTreeSet<RouteKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RouteKey {
    pub prefix: String,
    pub path_index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Unset,
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Unset
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SessionState::Unset => "UNSET",
            SessionState::Idle => "IDLE",
            SessionState::Connect => "CONNECT",
            SessionState::Active => "ACTIVE",
            SessionState::OpenSent => "OPEN_SENT",
            SessionState::OpenConfirm => "OPEN_CONFIRM",
            SessionState::Established => "ESTABLISHED",
        };
        write!(f, "{}", name)
    }
}

impl SessionState {
    /// Map an engine-reported state name. The engine's UNKNOWN collapses
    /// into Unset; names outside the engine's vocabulary return None and
    /// are the caller's problem to log.
    pub fn from_engine_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(SessionState::Unset),
            "IDLE" => Some(SessionState::Idle),
            "CONNECT" => Some(SessionState::Connect),
            "ACTIVE" => Some(SessionState::Active),
            "OPEN_SENT" => Some(SessionState::OpenSent),
            "OPEN_CONFIRM" => Some(SessionState::OpenConfirm),
            "ESTABLISHED" => Some(SessionState::Established),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RoutingPolicyApplied {
    pub defined_sets: DefinedSets,
    pub policy_definitions: Vec<PolicyDefinition>,
}
