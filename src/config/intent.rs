//! Vendor-neutral intended configuration: the operator-authored desired
//! state of the BGP process and its routing policies. Snapshots of this
//! tree arrive over a watch subscription and are reconciled against the
//! engine's applied configuration.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use ipnetwork::IpNetwork;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Intent {
    #[serde(default)]
    pub bgp: BgpIntent,
    #[serde(default)]
    pub routing_policy: RoutingPolicyIntent,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct BgpIntent {
    #[serde(default)]
    pub global: GlobalIntent,
    // Keyed by neighbor address; ordered so translation is deterministic
    #[serde(default)]
    pub neighbors: BTreeMap<String, NeighborIntent>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct GlobalIntent {
    pub asn: Option<u32>,
    pub router_id: Option<String>,
}

impl GlobalIntent {
    /// BGP can only be started once both identifiers are set
    pub fn is_startable(&self) -> bool {
        self.asn.is_some() && self.router_id.is_some()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct NeighborIntent {
    pub peer_as: Option<u32>,
    pub neighbor_port: Option<u16>,
    #[serde(default)]
    pub apply_policy: ApplyPolicyIntent,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ApplyPolicyIntent {
    pub default_import_policy: Option<DefaultPolicy>,
    pub default_export_policy: Option<DefaultPolicy>,
    #[serde(default)]
    pub import_policy: Vec<String>,
    #[serde(default)]
    pub export_policy: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefaultPolicy {
    AcceptRoute,
    RejectRoute,
    Unspecified,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyResult {
    AcceptRoute,
    RejectRoute,
    Unspecified,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchSetOptions {
    Any,
    All,
    Invert,
    Unspecified,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchSetOptionsRestricted {
    Any,
    Invert,
    Unspecified,
}

/// Routing-policy definitions are authored per-neighbor against named sets.
/// Set maps are unordered here; the translator is responsible for the
/// deterministic ordering the engine-facing config requires.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RoutingPolicyIntent {
    #[serde(default)]
    pub prefix_sets: HashMap<String, PrefixSetIntent>,
    #[serde(default)]
    pub community_sets: HashMap<String, CommunitySetIntent>,
    #[serde(default)]
    pub as_path_sets: HashMap<String, AsPathSetIntent>,
    #[serde(default)]
    pub policy_definitions: HashMap<String, PolicyDefinitionIntent>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PrefixSetIntent {
    #[serde(default)]
    pub prefixes: Vec<PrefixIntent>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PrefixIntent {
    pub ip_prefix: IpNetwork,
    // "exact" is the sentinel for exact-length match
    pub masklength_range: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CommunitySetIntent {
    pub match_set_options: Option<MatchSetOptions>,
    #[serde(default)]
    pub members: Vec<CommunityMember>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AsPathSetIntent {
    #[serde(default)]
    pub members: Vec<String>,
}

/// A community literal: an explicit `AAAA:BBBB` string, a packed 32-bit
/// value, or one of the well-known symbolic communities.
#[derive(Clone, Debug, PartialEq)]
pub enum CommunityMember {
    Literal(String),
    Value(u32),
    WellKnown(WellKnownCommunity),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WellKnownCommunity {
    NoExport,
    NoAdvertise,
    NoExportSubconfed,
    NoPeer,
}

impl WellKnownCommunity {
    fn from_name(name: &str) -> Option<Self> {
        use WellKnownCommunity::*;
        match name {
            "NO_EXPORT" => Some(NoExport),
            "NO_ADVERTISE" => Some(NoAdvertise),
            "NO_EXPORT_SUBCONFED" => Some(NoExportSubconfed),
            "NOPEER" => Some(NoPeer),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for CommunityMember {
    fn deserialize<D>(deserializer: D) -> Result<CommunityMember, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MemberVisitor;

        impl<'de> Visitor<'de> for MemberVisitor {
            type Value = CommunityMember;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a community string or 32-bit value")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<CommunityMember, E> {
                if value > u64::from(u32::MAX) {
                    return Err(E::custom(format!("community value out of range: {}", value)));
                }
                Ok(CommunityMember::Value(value as u32))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<CommunityMember, E> {
                if value < 0 {
                    return Err(E::custom(format!("community value out of range: {}", value)));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<CommunityMember, E> {
                match WellKnownCommunity::from_name(value) {
                    Some(well_known) => Ok(CommunityMember::WellKnown(well_known)),
                    None => Ok(CommunityMember::Literal(value.to_string())),
                }
            }
        }

        deserializer.deserialize_any(MemberVisitor)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PolicyDefinitionIntent {
    // Evaluation order matters; statements stay in authored order
    #[serde(default)]
    pub statements: Vec<StatementIntent>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct StatementIntent {
    pub name: String,
    #[serde(default)]
    pub conditions: ConditionsIntent,
    #[serde(default)]
    pub actions: ActionsIntent,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ConditionsIntent {
    pub match_prefix_set: Option<MatchPrefixSetIntent>,
    // Ignored by translation; a policy is always confined to the neighbor
    // it is instantiated for
    pub match_neighbor_set: Option<String>,
    #[serde(default)]
    pub bgp: BgpConditionsIntent,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct MatchPrefixSetIntent {
    pub prefix_set: Option<String>,
    pub match_set_options: Option<MatchSetOptionsRestricted>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct BgpConditionsIntent {
    pub community_set: Option<String>,
    pub match_as_path_set: Option<MatchAsPathSetIntent>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct MatchAsPathSetIntent {
    pub as_path_set: Option<String>,
    pub match_set_options: Option<MatchSetOptions>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ActionsIntent {
    pub policy_result: Option<PolicyResult>,
    #[serde(default)]
    pub bgp: BgpActionsIntent,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct BgpActionsIntent {
    pub set_community: Option<SetCommunityIntent>,
    pub set_local_pref: Option<u32>,
    pub set_med: Option<MedIntent>,
    pub set_as_path_prepend: Option<AsPathPrependIntent>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SetCommunityIntent {
    pub method: Option<SetCommunityMethod>,
    pub options: Option<SetCommunityOptions>,
    #[serde(default)]
    pub inline: Vec<CommunityMember>,
    pub reference: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetCommunityMethod {
    Inline,
    Reference,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetCommunityOptions {
    Add,
    Remove,
    Replace,
}

impl fmt::Display for SetCommunityOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            SetCommunityOptions::Add => "add",
            SetCommunityOptions::Remove => "remove",
            SetCommunityOptions::Replace => "replace",
        };
        write!(f, "{}", word)
    }
}

/// MED action value: a numeric MED, a literal string the engine parses
/// (e.g. "+10"), or the symbolic "use IGP cost" value.
#[derive(Clone, Debug, PartialEq)]
pub enum MedIntent {
    Value(u32),
    Literal(String),
    Igp,
}

impl<'de> Deserialize<'de> for MedIntent {
    fn deserialize<D>(deserializer: D) -> Result<MedIntent, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MedVisitor;

        impl<'de> Visitor<'de> for MedVisitor {
            type Value = MedIntent;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a MED value, string, or \"IGP\"")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<MedIntent, E> {
                if value > u64::from(u32::MAX) {
                    return Err(E::custom(format!("MED value out of range: {}", value)));
                }
                Ok(MedIntent::Value(value as u32))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<MedIntent, E> {
                if value < 0 {
                    return Err(E::custom(format!("MED value out of range: {}", value)));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<MedIntent, E> {
                if value == "IGP" {
                    Ok(MedIntent::Igp)
                } else {
                    Ok(MedIntent::Literal(value.to_string()))
                }
            }
        }

        deserializer.deserialize_any(MedVisitor)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AsPathPrependIntent {
    pub asn: u32,
    pub repeat_n: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intent() {
        let intent: Intent = toml::from_str(
            r#"
            [bgp.global]
            asn = 65001
            router_id = "1.1.1.1"

            [bgp.neighbors."127.0.0.2"]
            peer_as = 65002
            neighbor_port = 1179

            [bgp.neighbors."127.0.0.2".apply_policy]
            default_export_policy = "REJECT_ROUTE"
            export_policy = ["prefix-filter"]

            [routing_policy.prefix_sets.west]
            prefixes = [
                { ip_prefix = "10.33.0.0/16", masklength_range = "exact" },
                { ip_prefix = "10.34.0.0/16", masklength_range = "16..23" },
            ]

            [routing_policy.community_sets.markers]
            match_set_options = "ANY"
            members = ["NO_EXPORT", 4259905637, "65000:100"]

            [routing_policy.policy_definitions.prefix-filter]
            statements = [
                { name = "allow-west", conditions = { match_prefix_set = { prefix_set = "west", match_set_options = "ANY" } }, actions = { policy_result = "ACCEPT_ROUTE" } },
            ]
            "#,
        )
        .unwrap();

        assert!(intent.bgp.global.is_startable());
        assert_eq!(intent.bgp.global.asn, Some(65001));
        let neighbor = &intent.bgp.neighbors["127.0.0.2"];
        assert_eq!(neighbor.peer_as, Some(65002));
        assert_eq!(
            neighbor.apply_policy.default_export_policy,
            Some(DefaultPolicy::RejectRoute)
        );

        let west = &intent.routing_policy.prefix_sets["west"];
        assert_eq!(west.prefixes.len(), 2);
        assert_eq!(west.prefixes[0].masklength_range.as_deref(), Some("exact"));

        let markers = &intent.routing_policy.community_sets["markers"];
        assert_eq!(
            markers.members,
            vec![
                CommunityMember::WellKnown(WellKnownCommunity::NoExport),
                CommunityMember::Value(4_259_905_637),
                CommunityMember::Literal("65000:100".to_string()),
            ]
        );

        let policy = &intent.routing_policy.policy_definitions["prefix-filter"];
        assert_eq!(policy.statements.len(), 1);
        assert_eq!(
            policy.statements[0].actions.policy_result,
            Some(PolicyResult::AcceptRoute)
        );
    }

    #[test]
    fn test_not_startable_without_router_id() {
        let global = GlobalIntent {
            asn: Some(65001),
            router_id: None,
        };
        assert!(!global.is_startable());
    }

    #[test]
    fn test_med_forms() {
        #[derive(Deserialize)]
        struct Wrapper {
            med: MedIntent,
        }
        let numeric: Wrapper = toml::from_str("med = 50").unwrap();
        assert_eq!(numeric.med, MedIntent::Value(50));
        let igp: Wrapper = toml::from_str(r#"med = "IGP""#).unwrap();
        assert_eq!(igp.med, MedIntent::Igp);
        let literal: Wrapper = toml::from_str(r#"med = "+10""#).unwrap();
        assert_eq!(literal.med, MedIntent::Literal("+10".to_string()));
    }
}
