//! Field-level delta between two engine configurations, used both to skip
//! no-op updates and to log what a pass changed.

use std::collections::BTreeMap;
use std::fmt;

use crate::engine::config::{ConfigSet, Neighbor};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigDelta {
    pub global_changed: bool,
    pub added_neighbors: Vec<String>,
    pub removed_neighbors: Vec<String>,
    pub changed_neighbors: Vec<String>,
    pub policy_changed: bool,
}

impl ConfigDelta {
    pub fn of(previous: &ConfigSet, next: &ConfigSet) -> Self {
        let previous_neighbors: BTreeMap<&str, &Neighbor> = previous
            .neighbors
            .iter()
            .map(|n| (n.config.neighbor_address.as_str(), n))
            .collect();
        let next_neighbors: BTreeMap<&str, &Neighbor> = next
            .neighbors
            .iter()
            .map(|n| (n.config.neighbor_address.as_str(), n))
            .collect();

        let mut delta = ConfigDelta {
            global_changed: previous.global != next.global
                || previous.redistribution != next.redistribution,
            policy_changed: previous.defined_sets != next.defined_sets
                || previous.policy_definitions != next.policy_definitions,
            ..Default::default()
        };
        for (address, neighbor) in &next_neighbors {
            match previous_neighbors.get(address) {
                None => delta.added_neighbors.push(address.to_string()),
                Some(previous) if *previous != *neighbor => {
                    delta.changed_neighbors.push(address.to_string())
                }
                Some(_) => {}
            }
        }
        for address in previous_neighbors.keys() {
            if !next_neighbors.contains_key(address) {
                delta.removed_neighbors.push(address.to_string());
            }
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        *self == ConfigDelta::default()
    }
}

impl fmt::Display for ConfigDelta {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no changes");
        }
        let mut parts = Vec::new();
        if self.global_changed {
            parts.push("global".to_string());
        }
        if !self.added_neighbors.is_empty() {
            parts.push(format!("+neighbors {}", self.added_neighbors.join(", ")));
        }
        if !self.removed_neighbors.is_empty() {
            parts.push(format!("-neighbors {}", self.removed_neighbors.join(", ")));
        }
        if !self.changed_neighbors.is_empty() {
            parts.push(format!("~neighbors {}", self.changed_neighbors.join(", ")));
        }
        if self.policy_changed {
            parts.push("policy".to_string());
        }
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{NeighborConfig, NeighborState};

    fn neighbor(address: &str, peer_as: u32) -> Neighbor {
        Neighbor {
            config: NeighborConfig {
                peer_as,
                neighbor_address: address.to_string(),
            },
            state: NeighborState {
                peer_as,
                neighbor_address: address.to_string(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_configs_have_empty_delta() {
        let mut config = ConfigSet::default();
        config.global.config.asn = 65001;
        config.neighbors.push(neighbor("10.0.0.2", 65002));
        let delta = ConfigDelta::of(&config, &config.clone());
        assert!(delta.is_empty());
        assert_eq!(delta.to_string(), "no changes");
    }

    #[test]
    fn test_neighbor_membership_changes() {
        let mut previous = ConfigSet::default();
        previous.neighbors.push(neighbor("10.0.0.2", 65002));
        previous.neighbors.push(neighbor("10.0.0.3", 65003));

        let mut next = ConfigSet::default();
        next.neighbors.push(neighbor("10.0.0.3", 65999));
        next.neighbors.push(neighbor("10.0.0.4", 65004));

        let delta = ConfigDelta::of(&previous, &next);
        assert_eq!(delta.added_neighbors, vec!["10.0.0.4"]);
        assert_eq!(delta.removed_neighbors, vec!["10.0.0.2"]);
        assert_eq!(delta.changed_neighbors, vec!["10.0.0.3"]);
        assert!(!delta.global_changed);
        assert!(!delta.is_empty());
    }

    #[test]
    fn test_policy_and_global_changes_detected() {
        let previous = ConfigSet::default();
        let mut next = ConfigSet::default();
        next.global.config.router_id = "1.1.1.1".to_string();
        let delta = ConfigDelta::of(&previous, &next);
        assert!(delta.global_changed);

        let mut next = ConfigSet::default();
        next.policy_definitions.push(Default::default());
        let delta = ConfigDelta::of(&previous, &next);
        assert!(delta.policy_changed);
        assert_eq!(delta.to_string(), "policy");
    }
}
