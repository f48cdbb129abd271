//! External state store boundary and intent-file watching.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, warn};
use serde_json::Value;
use tokio::sync::watch;

use crate::config::Intent;

/// Store paths the reconciler owns. Each publish replaces the whole
/// sub-tree at its path.
pub mod paths {
    pub const BGP_STATE: &str = "/bgp/state";
    pub const ROUTING_POLICY_STATE: &str = "/routing-policy/state";
}

#[derive(Debug)]
pub struct PublishError(pub String);

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "State publish failed: {}", self.0)
    }
}

impl Error for PublishError {}

/// Sink for applied-state snapshots
#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn replace(&self, path: &str, value: Value) -> Result<(), PublishError>;
}

/// Publisher for running without an external store attached
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl StatePublisher for LogPublisher {
    async fn replace(&self, path: &str, value: Value) -> Result<(), PublishError> {
        debug!("Applied state at {}: {}", path, value);
        Ok(())
    }
}

/// In-memory publisher, used by tests to inspect what was published
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    values: Mutex<HashMap<String, Value>>,
    replaces: Mutex<usize>,
}

impl MemoryPublisher {
    pub fn get(&self, path: &str) -> Option<Value> {
        self.values.lock().unwrap().get(path).cloned()
    }

    pub fn replace_count(&self) -> usize {
        *self.replaces.lock().unwrap()
    }
}

#[async_trait]
impl StatePublisher for MemoryPublisher {
    async fn replace(&self, path: &str, value: Value) -> Result<(), PublishError> {
        self.values.lock().unwrap().insert(path.to_string(), value);
        *self.replaces.lock().unwrap() += 1;
        Ok(())
    }
}

fn read_intent(path: &str) -> Result<Intent, String> {
    let contents = std::fs::read_to_string(path).map_err(|err| err.to_string())?;
    toml::from_str(&contents).map_err(|err| err.to_string())
}

/// Poll the intent file, pushing a new snapshot into the returned channel
/// whenever its parsed contents change. An unreadable or invalid file at
/// startup yields an empty intent; later read failures keep the previous
/// snapshot.
pub fn watch_intent(path: String, interval: Duration) -> watch::Receiver<Arc<Intent>> {
    let initial = match read_intent(&path) {
        Ok(intent) => intent,
        Err(err) => {
            warn!("Could not load intent from {}: {}", path, err);
            Intent::default()
        }
    };
    let (tx, rx) = watch::channel(Arc::new(initial));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let intent = match read_intent(&path) {
                Ok(intent) => intent,
                Err(err) => {
                    warn!("Could not reload intent from {}: {}", path, err);
                    continue;
                }
            };
            if *tx.borrow().as_ref() == intent {
                trace!("Intent file unchanged");
                continue;
            }
            debug!("Intent file changed, notifying reconciler");
            if tx.send(Arc::new(intent)).is_err() {
                break;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_memory_publisher_replaces_wholesale() {
        let publisher = MemoryPublisher::default();
        publisher
            .replace(paths::BGP_STATE, serde_json::json!({"asn": 65001}))
            .await
            .unwrap();
        publisher
            .replace(paths::BGP_STATE, serde_json::json!({"asn": 65002}))
            .await
            .unwrap();
        assert_eq!(
            publisher.get(paths::BGP_STATE).unwrap(),
            serde_json::json!({"asn": 65002})
        );
        assert_eq!(publisher.replace_count(), 2);
    }

    #[tokio::test]
    async fn test_watch_intent_picks_up_changes() {
        let dir = std::env::temp_dir().join("bgpsyncd-watch-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("intent.toml");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            write!(file, "[bgp.global]\nasn = 65001\n").unwrap();
        }

        let mut rx = watch_intent(
            path.to_string_lossy().to_string(),
            Duration::from_millis(20),
        );
        assert_eq!(rx.borrow().bgp.global.asn, Some(65001));

        {
            let mut file = std::fs::File::create(&path).unwrap();
            write!(file, "[bgp.global]\nasn = 65002\n").unwrap();
        }
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().bgp.global.asn, Some(65002));
    }

    #[tokio::test]
    async fn test_watch_intent_defaults_on_missing_file() {
        let rx = watch_intent(
            "/nonexistent/intent.toml".to_string(),
            Duration::from_secs(60),
        );
        assert_eq!(*rx.borrow().as_ref(), Intent::default());
    }
}
