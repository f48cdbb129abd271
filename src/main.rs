use std::io::Result;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use env_logger::Builder;
use log::{debug, info, warn, LevelFilter};

use bgpsyncd::engine::{mock::MockEngine, BgpEngine, LogLevel};
use bgpsyncd::reconciler::spawn_session_event_adapter;
use bgpsyncd::store::{watch_intent, LogPublisher};
use bgpsyncd::{AppliedStateStore, Reconciler, RibPoller, Settings};

#[derive(Parser, Debug)]
#[clap(name = "bgpsyncd", rename_all = "kebab-case")]
/// BGP intent reconciler
struct Args {
    /// Path to bgpsyncd settings file
    config_path: String,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences))]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (bgpsyncd_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("bgpsyncd"), bgpsyncd_level)
        .filter(None, other_level)
        .init();
    info!("Logging at levels {}/{}", bgpsyncd_level, other_level);

    let settings = Settings::from_file(&args.config_path)?;
    debug!(
        "Watching intent at {} every {}s",
        settings.intent_path, settings.intent_poll_interval
    );

    // Stand-in engine until a real session engine is wired up
    let engine: Arc<MockEngine> = MockEngine::new();
    if args.verbose >= 2 {
        if let Err(err) = engine.set_log_level(LogLevel::Debug).await {
            warn!("Could not raise engine log level: {}", err);
        }
    }
    let engine: Arc<dyn BgpEngine> = engine;

    let applied = Arc::new(AppliedStateStore::new(Arc::new(LogPublisher)));
    let intents = watch_intent(
        settings.intent_path.clone(),
        Duration::from_secs(settings.intent_poll_interval),
    );

    spawn_session_event_adapter(engine.clone(), applied.clone());
    let poller = RibPoller::new(
        engine.clone(),
        applied.clone(),
        Duration::from_secs(settings.rib_poll_interval),
    );
    tokio::spawn(poller.run());

    let reconciler = Reconciler::new(
        engine.clone(),
        applied,
        settings.redistribution_endpoint.clone(),
        settings.listen_port,
    );
    let reconcile_loop = tokio::spawn(reconciler.run(intents));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    reconcile_loop.abort();
    if let Err(err) = engine.stop().await {
        debug!("Engine stop on shutdown: {}", err);
    }
    Ok(())
}
