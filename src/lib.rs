pub mod applied;
pub mod config;
pub mod engine;
pub mod poller;
pub mod reconciler;
pub mod store;
pub mod translate;

pub use applied::AppliedStateStore;
pub use config::Settings;
pub use poller::RibPoller;
pub use reconciler::Reconciler;
