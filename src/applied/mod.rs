//! Single-writer funnel for the applied-state tree.
//!
//! Every mutation of the applied state goes through [`AppliedStateStore::update`],
//! which holds the tree lock for the duration of the mutator and publishes
//! both sub-trees only when the mutator succeeds. A failed mutation is never
//! published; readers of the external store keep the last good snapshot.

use std::convert::Infallible;
use std::sync::Arc;

use futures::future::BoxFuture;
use log::error;
use tokio::sync::Mutex;

use crate::store::{paths, StatePublisher};

mod tree;
pub use tree::*;

pub struct AppliedStateStore {
    state: Mutex<AppliedState>,
    publisher: Arc<dyn StatePublisher>,
}

impl AppliedStateStore {
    pub fn new(publisher: Arc<dyn StatePublisher>) -> Self {
        Self {
            state: Mutex::new(AppliedState::default()),
            publisher,
        }
    }

    /// Run an async mutator against the applied tree, publishing the result
    /// only if the mutator returns Ok. The lock is held across the mutator
    /// so no other writer can observe or interleave a partial update.
    pub async fn update<T, E, F>(&self, mutate: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut AppliedState) -> BoxFuture<'a, Result<T, E>>,
    {
        let mut state = self.state.lock().await;
        let value = mutate(&mut state).await?;
        self.publish(&state).await;
        Ok(value)
    }

    /// Synchronous counterpart of [`update`] for mutations that cannot fail
    pub async fn update_sync<T, F>(&self, mutate: F) -> T
    where
        T: Send,
        F: FnOnce(&mut AppliedState) -> T + Send + 'static,
    {
        let result: Result<T, Infallible> = self
            .update(|state| Box::pin(async move { Ok(mutate(state)) }))
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    pub async fn snapshot(&self) -> AppliedState {
        self.state.lock().await.clone()
    }

    /// Publish failures are logged, not propagated; the in-memory tree is
    /// authoritative and the next successful update republishes everything.
    async fn publish(&self, state: &AppliedState) {
        let subtrees = [
            (paths::BGP_STATE, serde_json::to_value(&state.bgp)),
            (
                paths::ROUTING_POLICY_STATE,
                serde_json::to_value(&state.routing_policy),
            ),
        ];
        for (path, value) in subtrees {
            match value {
                Ok(value) => {
                    if let Err(err) = self.publisher.replace(path, value).await {
                        error!("Failed to publish {}: {}", path, err);
                    }
                }
                Err(err) => error!("Failed to serialize {}: {}", path, err),
            }
        }
    }
}
