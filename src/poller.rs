//! Periodic RIB mirror.
//!
//! Every cycle queries the engine's route tables and rebuilds the RIB
//! portion of the applied tree inside a single store update, so readers
//! never see a half-refreshed RIB. A failed table query logs and leaves
//! that table's previous contents in place.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use log::{error, trace};
use tokio::time::{interval_at, Instant};

use crate::applied::{AppliedStateStore, LocRibRoute, RouteKey, RouteOrigin};
use crate::engine::{BgpEngine, Destination, TableQuery};
use crate::translate::community_to_string;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

pub struct RibPoller {
    engine: Arc<dyn BgpEngine>,
    applied: Arc<AppliedStateStore>,
    interval: Duration,
}

impl RibPoller {
    pub fn new(
        engine: Arc<dyn BgpEngine>,
        applied: Arc<AppliedStateStore>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            applied,
            interval,
        }
    }

    pub async fn run(self) {
        // First cycle fires one full interval in, not immediately
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// One polling cycle. Public so tests can drive cycles directly.
    pub async fn poll_once(&self) {
        // The global table is observability only, never mirrored
        match self.engine.list_paths(TableQuery::global()).await {
            Ok(destinations) => {
                trace!("Global table holds {} destinations", destinations.len())
            }
            Err(err) => error!("Failed to query global table: {}", err),
        }

        let engine = self.engine.clone();
        let result: Result<(), Infallible> = self
            .applied
            .update(move |state| {
                Box::pin(async move {
                    let neighbors: Vec<String> = state.bgp.neighbors.keys().cloned().collect();

                    if let Some(destinations) =
                        query_table(engine.as_ref(), TableQuery::local()).await
                    {
                        state.bgp.rib.ipv4_unicast.loc_rib = fold_loc_rib(&destinations);
                    }

                    for neighbor in neighbors {
                        if let Some(destinations) =
                            query_table(engine.as_ref(), TableQuery::adj_in(&neighbor)).await
                        {
                            // Inbound paths carry their advertising peer;
                            // fold by that, clearing the queried neighbor
                            // even when it advertised nothing
                            let mut folded = fold_adj_in(&destinations);
                            let (pre, post) = folded.remove(&neighbor).unwrap_or_default();
                            let rib = state
                                .bgp
                                .rib
                                .ipv4_unicast
                                .neighbors
                                .entry(neighbor.clone())
                                .or_default();
                            rib.adj_rib_in_pre = pre;
                            rib.adj_rib_in_post = post;
                            for (peer, (pre, post)) in folded {
                                let rib = state
                                    .bgp
                                    .rib
                                    .ipv4_unicast
                                    .neighbors
                                    .entry(peer)
                                    .or_default();
                                rib.adj_rib_in_pre = pre;
                                rib.adj_rib_in_post = post;
                            }
                        }

                        if let Some(destinations) =
                            query_table(engine.as_ref(), TableQuery::adj_out(&neighbor)).await
                        {
                            // Outbound paths do not reliably name their
                            // peer, so key by the neighbor that was queried
                            let (pre, post) = fold_adj_out(&destinations);
                            let rib = state
                                .bgp
                                .rib
                                .ipv4_unicast
                                .neighbors
                                .entry(neighbor)
                                .or_default();
                            rib.adj_rib_out_pre = pre;
                            rib.adj_rib_out_post = post;
                        }
                    }
                    Ok(())
                })
            })
            .await;
        match result {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }
}

async fn query_table(engine: &dyn BgpEngine, query: TableQuery) -> Option<Vec<Destination>> {
    match engine.list_paths(query.clone()).await {
        Ok(destinations) => Some(destinations),
        Err(err) => {
            error!("Failed to query {} table: {}", query.table, err);
            None
        }
    }
}

fn fold_loc_rib(destinations: &[Destination]) -> Vec<LocRibRoute> {
    let mut routes = Vec::new();
    for destination in destinations {
        for (index, path) in destination.paths.iter().enumerate() {
            let origin = if path.source_id.is_empty() {
                RouteOrigin::Unset
            } else {
                RouteOrigin::Source(path.source_id.clone())
            };
            routes.push(LocRibRoute {
                prefix: destination.prefix.clone(),
                origin,
                path_index: index as u32,
                communities: path
                    .communities
                    .iter()
                    .map(|community| community_to_string(*community))
                    .collect(),
            });
        }
    }
    routes
}

type AdjTables = (BTreeSet<RouteKey>, BTreeSet<RouteKey>);

fn fold_adj_in(destinations: &[Destination]) -> BTreeMap<String, AdjTables> {
    let mut folded: BTreeMap<String, AdjTables> = BTreeMap::new();
    for destination in destinations {
        for (index, path) in destination.paths.iter().enumerate() {
            let key = RouteKey {
                prefix: destination.prefix.clone(),
                path_index: index as u32,
            };
            let (pre, post) = folded.entry(path.neighbor_ip.clone()).or_default();
            pre.insert(key.clone());
            if !path.filtered {
                post.insert(key);
            }
        }
    }
    folded
}

fn fold_adj_out(destinations: &[Destination]) -> AdjTables {
    let mut pre = BTreeSet::new();
    let mut post = BTreeSet::new();
    for destination in destinations {
        for (index, path) in destination.paths.iter().enumerate() {
            let key = RouteKey {
                prefix: destination.prefix.clone(),
                path_index: index as u32,
            };
            pre.insert(key.clone());
            if !path.filtered {
                post.insert(key);
            }
        }
    }
    (pre, post)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Path;

    fn path(source_id: &str, neighbor_ip: &str, filtered: bool) -> Path {
        Path {
            source_id: source_id.to_string(),
            neighbor_ip: neighbor_ip.to_string(),
            filtered,
            communities: vec![],
        }
    }

    #[test]
    fn test_loc_rib_origin_and_communities() {
        let destinations = vec![Destination {
            prefix: "10.33.0.0/16".to_string(),
            paths: vec![
                Path {
                    communities: vec![(65000 << 16) | 100],
                    ..path("", "", false)
                },
                path("10.0.0.2", "10.0.0.2", false),
            ],
        }];
        let routes = fold_loc_rib(&destinations);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].origin, RouteOrigin::Unset);
        assert_eq!(routes[0].path_index, 0);
        assert_eq!(routes[0].communities, vec!["65000:100".to_string()]);
        assert_eq!(routes[1].origin, RouteOrigin::Source("10.0.0.2".to_string()));
        assert_eq!(routes[1].path_index, 1);
    }

    #[test]
    fn test_adj_in_folds_by_advertising_peer_and_drops_filtered_from_post() {
        let destinations = vec![Destination {
            prefix: "10.33.0.0/16".to_string(),
            paths: vec![
                path("10.0.0.2", "10.0.0.2", false),
                path("10.0.0.3", "10.0.0.3", true),
            ],
        }];
        let folded = fold_adj_in(&destinations);
        assert_eq!(folded.len(), 2);

        let (pre, post) = &folded["10.0.0.2"];
        assert_eq!(pre.len(), 1);
        assert_eq!(post.len(), 1);

        let (pre, post) = &folded["10.0.0.3"];
        assert_eq!(pre.len(), 1);
        assert!(post.is_empty(), "filtered path leaked into post table");
    }

    #[test]
    fn test_adj_out_keeps_filtered_only_in_pre() {
        let destinations = vec![Destination {
            prefix: "10.34.0.0/16".to_string(),
            paths: vec![path("", "", true), path("", "", false)],
        }];
        let (pre, post) = fold_adj_out(&destinations);
        assert_eq!(pre.len(), 2);
        assert_eq!(post.len(), 1);
        assert_eq!(
            post.iter().next().unwrap(),
            &RouteKey {
                prefix: "10.34.0.0/16".to_string(),
                path_index: 1,
            }
        );
    }
}
