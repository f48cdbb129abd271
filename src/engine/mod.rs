pub mod config;
pub mod mock;
pub mod policy;

pub use config::ConfigSet;

use std::error;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Session-state names the engine reports in peer events.
///
/// The applied-state schema maps these by name; see
/// `applied::SessionState::from_engine_name`.
pub const SESSION_STATE_NAMES: [&str; 7] = [
    "UNKNOWN",
    "IDLE",
    "CONNECT",
    "ACTIVE",
    "OPEN_SENT",
    "OPEN_CONFIRM",
    "ESTABLISHED",
];

/// Which engine route table to query
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableType {
    Global,
    Local,
    AdjIn,
    AdjOut,
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            TableType::Global => "global",
            TableType::Local => "local",
            TableType::AdjIn => "adj-rib-in",
            TableType::AdjOut => "adj-rib-out",
        };
        write!(f, "{}", word)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableQuery {
    pub table: TableType,
    pub neighbor: Option<String>,
    // The engine does not drop filtered paths, it only marks them;
    // queries always ask for the marked paths too.
    pub include_filtered: bool,
}

impl TableQuery {
    pub fn global() -> Self {
        Self {
            table: TableType::Global,
            neighbor: None,
            include_filtered: true,
        }
    }

    pub fn local() -> Self {
        Self {
            table: TableType::Local,
            neighbor: None,
            include_filtered: true,
        }
    }

    pub fn adj_in(neighbor: &str) -> Self {
        Self {
            table: TableType::AdjIn,
            neighbor: Some(neighbor.to_string()),
            include_filtered: true,
        }
    }

    pub fn adj_out(neighbor: &str) -> Self {
        Self {
            table: TableType::AdjOut,
            neighbor: Some(neighbor.to_string()),
            include_filtered: true,
        }
    }
}

/// One destination prefix and the paths the engine knows for it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Destination {
    pub prefix: String,
    pub paths: Vec<Path>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    // Advertising-source identifier, empty for locally-originated routes
    pub source_id: String,
    // Peer the path was learned from; not reliably set on outbound tables
    pub neighbor_ip: String,
    // Marked (not dropped) by the import/export policy
    pub filtered: bool,
    pub communities: Vec<u32>,
}

/// Peer state-change notification pushed asynchronously by the engine
#[derive(Clone, Debug, PartialEq)]
pub struct PeerEvent {
    pub neighbor_address: String,
    pub session_state: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        write!(f, "{}", word)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineError {
    /// Call requires a running engine
    NotRunning,
    /// Initial configuration applied twice
    AlreadyRunning,
    /// Call was accepted but failed inside the engine. [reason]
    Call(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use EngineError::*;
        match self {
            NotRunning => write!(f, "BGP engine is not running"),
            AlreadyRunning => write!(f, "BGP engine is already running"),
            Call(reason) => write!(f, "BGP engine call failed: {}", reason),
        }
    }
}

impl error::Error for EngineError {}

/// Boundary to the external BGP session engine.
///
/// The reconciler only configures and observes the engine; speaker behavior
/// (session negotiation, best-path selection) lives entirely behind this
/// trait.
#[async_trait]
pub trait BgpEngine: Send + Sync {
    /// Apply the initial configuration and start the engine.
    /// Returns the engine's view of the applied config as the snapshot to
    /// diff future updates against.
    async fn start(&self, config: ConfigSet) -> Result<ConfigSet, EngineError>;

    /// Push an incremental update from `previous` to `next`. The engine
    /// issues one internal call per changed neighbor; there is no atomic
    /// multi-neighbor rollback.
    async fn update(&self, previous: &ConfigSet, next: ConfigSet) -> Result<ConfigSet, EngineError>;

    /// Administrative stop.
    async fn stop(&self) -> Result<(), EngineError>;

    /// List all routes stored in the selected table.
    async fn list_paths(&self, query: TableQuery) -> Result<Vec<Destination>, EngineError>;

    /// Subscribe to peer session-state change notifications.
    fn subscribe_peer_events(&self) -> mpsc::UnboundedReceiver<PeerEvent>;

    async fn set_log_level(&self, level: LogLevel) -> Result<(), EngineError>;
}
