use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use color_eyre::Result;
use log::{error, info};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wantlist_tracker::config::Config;
use wantlist_tracker::server::{self, AppState};
use wantlist_tracker::store::Store;
use wantlist_tracker::watcher::{Status, Watcher};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env()?;
    let store = Store::load(&config.storage_path);
    info!(
        "loaded state: {} seen listing(s), {} release(s) tracked",
        store.seen_count(),
        store.releases_tracked()
    );

    let status = Arc::new(Mutex::new(Status::default()));
    let (control_tx, control_rx) = mpsc::channel();

    // blocking poll loop lives on its own thread; reqwest's blocking
    // client must stay off the async runtime
    let watcher_status = status.clone();
    let watcher_config = config.clone();
    thread::Builder::new()
        .name("watcher".into())
        .spawn(move || match Watcher::new(&watcher_config, store, watcher_status, control_rx) {
            Ok(watcher) => watcher.run(),
            Err(e) => error!("watcher failed to start: {e:#}"),
        })?;

    server::serve(
        AppState {
            status,
            control: control_tx,
        },
        config.port,
    )
    .await
}
