//! Reconciliation loop between the declared intent and the BGP engine.
//!
//! Each pass translates the full intent, decides between starting, updating
//! or stopping the engine, and records the engine's accepted config into the
//! applied-state tree. The applied tree is only published for passes where
//! the engine accepted the change.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::applied::{AppliedState, AppliedStateStore, NeighborApplied, SessionState};
use crate::config::Intent;
use crate::engine::{BgpEngine, ConfigSet, EngineError, PeerEvent};
use crate::translate;

mod diff;
pub use diff::ConfigDelta;

#[derive(Debug)]
pub enum ReconcileError {
    Start(EngineError),
    Update(EngineError),
    Stop(EngineError),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReconcileError::Start(err) => {
                write!(f, "Failed to apply initial BGP configuration: {}", err)
            }
            ReconcileError::Update(err) => write!(f, "Failed to update BGP service: {}", err),
            ReconcileError::Stop(err) => write!(f, "Failed to stop BGP service: {}", err),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReconcileError::Start(err)
            | ReconcileError::Update(err)
            | ReconcileError::Stop(err) => Some(err),
        }
    }
}

pub struct Reconciler {
    engine: Arc<dyn BgpEngine>,
    applied: Arc<AppliedStateStore>,
    redistribution_endpoint: String,
    listen_port: u16,
    started: bool,
    current: ConfigSet,
}

impl Reconciler {
    pub fn new(
        engine: Arc<dyn BgpEngine>,
        applied: Arc<AppliedStateStore>,
        redistribution_endpoint: String,
        listen_port: u16,
    ) -> Self {
        Self {
            engine,
            applied,
            redistribution_endpoint,
            listen_port,
            started: false,
            current: ConfigSet::default(),
        }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn current(&self) -> &ConfigSet {
        &self.current
    }

    /// Run one reconciliation pass against the given intent.
    ///
    /// On failure the engine keeps whatever it had, the applied tree is not
    /// published, and the reconciler's last-known-good snapshot is kept for
    /// the next pass to diff against.
    pub async fn pass(&mut self, intent: &Intent) -> Result<(), ReconcileError> {
        let engine = self.engine.clone();
        let intent = intent.clone();
        let current = self.current.clone();
        let started = self.started;
        let endpoint = self.redistribution_endpoint.clone();
        let listen_port = self.listen_port;

        let (current, started) = self
            .applied
            .update(move |state| {
                Box::pin(async move {
                    reconcile(
                        state,
                        engine.as_ref(),
                        &intent,
                        current,
                        started,
                        &endpoint,
                        listen_port,
                    )
                    .await
                })
            })
            .await?;
        self.current = current;
        self.started = started;
        Ok(())
    }

    /// Drive passes from an intent watch channel until the sender goes away
    pub async fn run(mut self, mut intents: watch::Receiver<Arc<Intent>>) {
        loop {
            let intent = intents.borrow().clone();
            if let Err(err) = self.pass(&intent).await {
                warn!("{}", err);
            }
            if intents.changed().await.is_err() {
                break;
            }
        }
    }
}

/// One pass of the start/update/stop state machine, run inside the applied
/// store's critical section.
async fn reconcile(
    state: &mut AppliedState,
    engine: &dyn BgpEngine,
    intent: &Intent,
    current: ConfigSet,
    started: bool,
    endpoint: &str,
    listen_port: u16,
) -> Result<(ConfigSet, bool), ReconcileError> {
    let startable = intent.bgp.global.is_startable();
    match (started, startable) {
        (false, true) => {
            let next = translate::to_engine_config(intent, endpoint, listen_port);
            info!(
                "Starting BGP with AS {} and router-id {}",
                next.global.config.asn, next.global.config.router_id
            );
            let accepted = engine.start(next).await.map_err(ReconcileError::Start)?;
            record_applied(state, &accepted);
            Ok((accepted, true))
        }
        (true, true) => {
            let next = translate::to_engine_config(intent, endpoint, listen_port);
            let delta = ConfigDelta::of(&current, &next);
            if delta.is_empty() {
                debug!("BGP configuration unchanged");
                return Ok((current, true));
            }
            info!("Updating BGP configuration: {}", delta);
            let accepted = engine
                .update(&current, next)
                .await
                .map_err(ReconcileError::Update)?;
            record_applied(state, &accepted);
            Ok((accepted, true))
        }
        (true, false) => {
            info!("Stopping BGP, global AS or router-id no longer set");
            engine.stop().await.map_err(ReconcileError::Stop)?;
            state.bgp = Default::default();
            state.routing_policy = Default::default();
            Ok((ConfigSet::default(), false))
        }
        (false, false) => {
            debug!("Waiting for global AS and router-id before starting BGP");
            Ok((current, false))
        }
    }
}

/// Mirror an engine-accepted config into the applied tree. Session state
/// and RIB contents are owned by the event adapter and the poller, so
/// surviving neighbors keep theirs.
fn record_applied(state: &mut AppliedState, accepted: &ConfigSet) {
    state.bgp.global.asn = Some(accepted.global.config.asn);
    state.bgp.global.router_id = Some(accepted.global.config.router_id.clone());

    let configured: Vec<&str> = accepted
        .neighbors
        .iter()
        .map(|n| n.config.neighbor_address.as_str())
        .collect();
    state
        .bgp
        .neighbors
        .retain(|address, _| configured.contains(&address.as_str()));
    state
        .bgp
        .rib
        .ipv4_unicast
        .neighbors
        .retain(|address, _| configured.contains(&address.as_str()));
    for neighbor in &accepted.neighbors {
        let address = neighbor.config.neighbor_address.clone();
        let entry = state
            .bgp
            .neighbors
            .entry(address.clone())
            .or_insert_with(|| NeighborApplied {
                neighbor_address: address,
                ..Default::default()
            });
        entry.peer_as = Some(neighbor.config.peer_as);
    }

    state.routing_policy.defined_sets = accepted.defined_sets.clone();
    state.routing_policy.policy_definitions = accepted.policy_definitions.clone();
}

/// Forward engine peer events into the applied tree.
///
/// Unrecognized state names are logged and skipped so one bad notification
/// cannot wedge the subscription.
pub fn spawn_session_event_adapter(
    engine: Arc<dyn BgpEngine>,
    applied: Arc<AppliedStateStore>,
) -> JoinHandle<()> {
    let mut events: mpsc::UnboundedReceiver<PeerEvent> = engine.subscribe_peer_events();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let session_state = match SessionState::from_engine_name(&event.session_state) {
                Some(session_state) => session_state,
                None => {
                    warn!(
                        "Unknown neighbor session-state value received: {}",
                        event.session_state
                    );
                    continue;
                }
            };
            applied
                .update_sync(move |state| {
                    let address = event.neighbor_address.clone();
                    let entry = state
                        .bgp
                        .neighbors
                        .entry(address.clone())
                        .or_insert_with(|| NeighborApplied {
                            neighbor_address: address,
                            ..Default::default()
                        });
                    debug!(
                        "Neighbor {} session {} -> {}",
                        event.neighbor_address, entry.session_state, session_state
                    );
                    entry.session_state = session_state;
                    entry.last_transition = Some(Utc::now());
                })
                .await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::intent::{GlobalIntent, NeighborIntent};
    use crate::engine::mock::{EngineCall, MockEngine};
    use crate::store::MemoryPublisher;

    fn startable_intent() -> Intent {
        let mut intent = Intent::default();
        intent.bgp.global = GlobalIntent {
            asn: Some(65001),
            router_id: Some("127.0.0.1".to_string()),
        };
        intent.bgp.neighbors.insert(
            "127.0.0.2".to_string(),
            NeighborIntent {
                peer_as: Some(65002),
                ..Default::default()
            },
        );
        intent
    }

    fn reconciler(engine: Arc<MockEngine>) -> (Reconciler, Arc<MemoryPublisher>) {
        let publisher = Arc::new(MemoryPublisher::default());
        let applied = Arc::new(AppliedStateStore::new(publisher.clone()));
        (
            Reconciler::new(engine, applied, "unix:/tmp/r.api".to_string(), 179),
            publisher,
        )
    }

    #[tokio::test]
    async fn test_pass_starts_engine_when_intent_is_startable() {
        let engine = MockEngine::new();
        let (mut reconciler, publisher) = reconciler(engine.clone());

        reconciler.pass(&startable_intent()).await.unwrap();

        assert!(reconciler.started());
        assert!(engine.running());
        assert_eq!(engine.config().unwrap().global.config.asn, 65001);
        let bgp = publisher.get(crate::store::paths::BGP_STATE).unwrap();
        assert_eq!(bgp["global"]["asn"], 65001);
        assert_eq!(bgp["neighbors"]["127.0.0.2"]["peer_as"], 65002);
        assert_eq!(bgp["neighbors"]["127.0.0.2"]["session_state"], "UNSET");
    }

    #[tokio::test]
    async fn test_pass_waits_without_router_id() {
        let engine = MockEngine::new();
        let (mut reconciler, publisher) = reconciler(engine.clone());

        let mut intent = startable_intent();
        intent.bgp.global.router_id = None;
        reconciler.pass(&intent).await.unwrap();

        assert!(!reconciler.started());
        assert!(!engine.running());
        assert!(engine.calls().is_empty());
        assert!(publisher.get(crate::store::paths::BGP_STATE).is_none());
    }

    #[tokio::test]
    async fn test_unsetting_global_stops_and_resets() {
        let engine = MockEngine::new();
        let (mut reconciler, publisher) = reconciler(engine.clone());

        reconciler.pass(&startable_intent()).await.unwrap();
        let mut unset = startable_intent();
        unset.bgp.global.asn = None;
        reconciler.pass(&unset).await.unwrap();

        assert!(!reconciler.started());
        assert!(!engine.running());
        assert_eq!(reconciler.current(), &ConfigSet::default());
        let bgp = publisher.get(crate::store::paths::BGP_STATE).unwrap();
        assert_eq!(bgp["global"]["asn"], serde_json::Value::Null);
        assert!(bgp["neighbors"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_intent_skips_engine_update() {
        let engine = MockEngine::new();
        let (mut reconciler, _) = reconciler(engine.clone());

        reconciler.pass(&startable_intent()).await.unwrap();
        let calls_after_start = engine.calls().len();
        reconciler.pass(&startable_intent()).await.unwrap();

        assert_eq!(engine.calls().len(), calls_after_start);
    }

    #[tokio::test]
    async fn test_changed_intent_updates_and_prunes_neighbors() {
        let engine = MockEngine::new();
        let (mut reconciler, publisher) = reconciler(engine.clone());

        reconciler.pass(&startable_intent()).await.unwrap();

        let mut next = startable_intent();
        next.bgp.neighbors.clear();
        next.bgp.neighbors.insert(
            "127.0.0.3".to_string(),
            NeighborIntent {
                peer_as: Some(65003),
                ..Default::default()
            },
        );
        reconciler.pass(&next).await.unwrap();

        assert!(engine.calls().contains(&EngineCall::Update));
        let bgp = publisher.get(crate::store::paths::BGP_STATE).unwrap();
        let neighbors = bgp["neighbors"].as_object().unwrap();
        assert!(neighbors.contains_key("127.0.0.3"));
        assert!(!neighbors.contains_key("127.0.0.2"));
    }

    #[tokio::test]
    async fn test_failed_start_keeps_state_unpublished_and_retries() {
        let engine = MockEngine::new();
        let (mut reconciler, publisher) = reconciler(engine.clone());

        engine.fail_next_call("engine unavailable");
        let err = reconciler.pass(&startable_intent()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Start(_)));
        assert!(!reconciler.started());
        assert_eq!(publisher.replace_count(), 0);

        // Next pass with the same intent tries again
        reconciler.pass(&startable_intent()).await.unwrap();
        assert!(reconciler.started());
    }

    #[tokio::test]
    async fn test_failed_stop_stays_started_and_retries() {
        let engine = MockEngine::new();
        let (mut reconciler, publisher) = reconciler(engine.clone());

        reconciler.pass(&startable_intent()).await.unwrap();
        let replaces = publisher.replace_count();

        let mut unset = startable_intent();
        unset.bgp.global.router_id = None;
        engine.fail_next_call("engine hung");
        let err = reconciler.pass(&unset).await.unwrap_err();

        // Optimistically still STARTED; the stop is retried next pass
        assert!(matches!(err, ReconcileError::Stop(_)));
        assert!(reconciler.started());
        assert!(engine.running());
        assert_eq!(publisher.replace_count(), replaces);

        reconciler.pass(&unset).await.unwrap();
        assert!(!reconciler.started());
        assert!(!engine.running());
    }

    #[tokio::test]
    async fn test_session_events_update_applied_state() {
        let engine = MockEngine::new();
        let (mut reconciler, publisher) = reconciler(engine.clone());
        let applied = reconciler.applied.clone();

        reconciler.pass(&startable_intent()).await.unwrap();
        let adapter = spawn_session_event_adapter(engine.clone(), applied.clone());

        engine.push_peer_event("127.0.0.2", "ESTABLISHED");
        engine.push_peer_event("127.0.0.2", "HALF_OPEN");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snapshot = applied.snapshot().await;
        let neighbor = &snapshot.bgp.neighbors["127.0.0.2"];
        assert_eq!(neighbor.session_state, SessionState::Established);
        assert!(neighbor.last_transition.is_some());
        let bgp = publisher.get(crate::store::paths::BGP_STATE).unwrap();
        assert_eq!(bgp["neighbors"]["127.0.0.2"]["session_state"], "ESTABLISHED");
        adapter.abort();
    }
}
