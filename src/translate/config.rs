//! Translation of the device-level BGP intent (global settings and
//! neighbor list) into the engine's configuration shape.

use std::net::IpAddr;

use crate::config::intent::BgpIntent;
use crate::engine::config::*;

/// Loopback router-ids double as the local bind address so multiple
/// instances can share a host under test. Anything else leaves local
/// address selection to the engine.
fn local_address_for(router_id: &str) -> String {
    match router_id.parse::<IpAddr>() {
        Ok(addr) if addr.is_loopback() => router_id.to_string(),
        _ => String::new(),
    }
}

/// Build the non-policy portion of the engine config from the intent.
///
/// Peer AS and address are duplicated into both the config and state
/// sub-structures, matching how the engine echoes accepted values back.
pub fn translate_device(intent: &BgpIntent, endpoint: &str, listen_port: u16) -> ConfigSet {
    let router_id = intent.global.router_id.clone().unwrap_or_default();
    let local_address = local_address_for(&router_id);

    let neighbors = intent
        .neighbors
        .iter()
        .map(|(address, neighbor)| Neighbor {
            config: NeighborConfig {
                peer_as: neighbor.peer_as.unwrap_or_default(),
                neighbor_address: address.clone(),
            },
            state: NeighborState {
                peer_as: neighbor.peer_as.unwrap_or_default(),
                neighbor_address: address.clone(),
            },
            transport: Transport {
                config: TransportConfig {
                    local_address: local_address.clone(),
                    remote_port: neighbor.neighbor_port.unwrap_or_default(),
                },
            },
            apply_policy: Default::default(),
        })
        .collect();

    ConfigSet {
        global: Global {
            config: GlobalConfig {
                asn: intent.global.asn.unwrap_or_default(),
                router_id,
                port: listen_port,
            },
        },
        neighbors,
        redistribution: Redistribution {
            config: RedistributionConfig {
                // Always on; an empty filter admits every route type
                enabled: true,
                endpoint: endpoint.to_string(),
                route_types: vec![],
            },
        },
        defined_sets: Default::default(),
        policy_definitions: vec![],
    }
}
