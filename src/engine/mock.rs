//! In-memory BGP engine used by the test suite and as the binary's
//! stand-in when no real session engine is attached. Records every call,
//! serves canned route tables and replays injected peer events.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    BgpEngine, ConfigSet, Destination, EngineError, LogLevel, PeerEvent, TableQuery, TableType,
};

#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    Start,
    Update,
    Stop,
    ListPaths(TableType),
    SetLogLevel(LogLevel),
}

#[derive(Default)]
struct MockInner {
    running: bool,
    config: Option<ConfigSet>,
    calls: Vec<EngineCall>,
    tables: HashMap<(TableType, Option<String>), Vec<Destination>>,
    failing_tables: HashSet<TableType>,
    fail_next: Option<String>,
    event_senders: Vec<mpsc::UnboundedSender<PeerEvent>>,
}

#[derive(Default)]
pub struct MockEngine {
    inner: Mutex<MockInner>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn running(&self) -> bool {
        self.inner.lock().unwrap().running
    }

    /// Configuration the engine currently runs with (None when stopped)
    pub fn config(&self) -> Option<ConfigSet> {
        self.inner.lock().unwrap().config.clone()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Canned content returned for subsequent queries of the table
    pub fn set_table(
        &self,
        table: TableType,
        neighbor: Option<&str>,
        destinations: Vec<Destination>,
    ) {
        self.inner
            .lock()
            .unwrap()
            .tables
            .insert((table, neighbor.map(str::to_string)), destinations);
    }

    /// Make every query of the table fail until cleared
    pub fn fail_table(&self, table: TableType, failing: bool) {
        let mut inner = self.inner.lock().unwrap();
        if failing {
            inner.failing_tables.insert(table);
        } else {
            inner.failing_tables.remove(&table);
        }
    }

    /// Make the next start/update/stop call fail
    pub fn fail_next_call(&self, reason: &str) {
        self.inner.lock().unwrap().fail_next = Some(reason.to_string());
    }

    /// Push a peer state-change notification to all subscribers
    pub fn push_peer_event(&self, neighbor: &str, session_state: &str) {
        let event = PeerEvent {
            neighbor_address: neighbor.to_string(),
            session_state: session_state.to_string(),
        };
        let mut inner = self.inner.lock().unwrap();
        inner
            .event_senders
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn take_failure(inner: &mut MockInner) -> Result<(), EngineError> {
        match inner.fail_next.take() {
            Some(reason) => Err(EngineError::Call(reason)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BgpEngine for MockEngine {
    async fn start(&self, config: ConfigSet) -> Result<ConfigSet, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.running {
            return Err(EngineError::AlreadyRunning);
        }
        Self::take_failure(&mut inner)?;
        inner.calls.push(EngineCall::Start);
        inner.running = true;
        inner.config = Some(config.clone());
        Ok(config)
    }

    async fn update(&self, _previous: &ConfigSet, next: ConfigSet) -> Result<ConfigSet, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.running {
            return Err(EngineError::NotRunning);
        }
        Self::take_failure(&mut inner)?;
        inner.calls.push(EngineCall::Update);
        inner.config = Some(next.clone());
        Ok(next)
    }

    async fn stop(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.running {
            return Err(EngineError::NotRunning);
        }
        Self::take_failure(&mut inner)?;
        inner.calls.push(EngineCall::Stop);
        inner.running = false;
        inner.config = None;
        Ok(())
    }

    async fn list_paths(&self, query: TableQuery) -> Result<Vec<Destination>, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.running {
            return Err(EngineError::NotRunning);
        }
        inner.calls.push(EngineCall::ListPaths(query.table));
        if inner.failing_tables.contains(&query.table) {
            return Err(EngineError::Call(format!("{} table unavailable", query.table)));
        }
        Ok(inner
            .tables
            .get(&(query.table, query.neighbor))
            .cloned()
            .unwrap_or_default())
    }

    fn subscribe_peer_events(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().event_senders.push(tx);
        rx
    }

    async fn set_log_level(&self, level: LogLevel) -> Result<(), EngineError> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .push(EngineCall::SetLogLevel(level));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let engine = MockEngine::new();
        assert!(!engine.running());
        assert_eq!(engine.stop().await, Err(EngineError::NotRunning));

        engine.start(ConfigSet::default()).await.unwrap();
        assert!(engine.running());
        assert_eq!(
            engine.start(ConfigSet::default()).await,
            Err(EngineError::AlreadyRunning)
        );

        engine.stop().await.unwrap();
        assert!(!engine.running());
        assert_eq!(engine.calls(), vec![EngineCall::Start, EngineCall::Stop]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let engine = MockEngine::new();
        engine.fail_next_call("no sockets");
        assert_eq!(
            engine.start(ConfigSet::default()).await,
            Err(EngineError::Call("no sockets".to_string()))
        );
        // Next attempt succeeds
        engine.start(ConfigSet::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_events_reach_all_subscribers() {
        let engine = MockEngine::new();
        let mut first = engine.subscribe_peer_events();
        let mut second = engine.subscribe_peer_events();
        engine.push_peer_event("127.0.0.2", "ESTABLISHED");

        let event = first.recv().await.unwrap();
        assert_eq!(event.neighbor_address, "127.0.0.2");
        assert_eq!(event.session_state, "ESTABLISHED");
        assert_eq!(second.recv().await.unwrap(), event);
    }
}
