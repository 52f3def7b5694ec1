//! KeyStudio headless session runner.
//!
//! Loads the configuration, opens the bundled keycode catalog, and keeps a
//! device session alive against the in-memory gateway until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()          -- config.toml or defaults
//!  └─ CatalogRegistry::new() -- bundled keycode catalog
//!  └─ DeviceSession::new()   -- state machine over the gateway
//!  └─ start services
//!       ├─ auto-connect      (optional)
//!       └─ device poller     (Tokio task, skipped while busy or dragging)
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keystudio_core::keycode::CatalogRegistry;
use keystudio_session::application::{spawn_device_poller, DeviceSession, InteractionMonitor};
use keystudio_session::infrastructure::gateway::InMemoryGateway;
use keystudio_session::infrastructure::storage::config::{load_config, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config first so its log level can seed the filter.  `RUST_LOG` wins.
    let (config, config_error) = match load_config() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.studio.log_level)),
        )
        .init();

    if let Some(e) = config_error {
        warn!("failed to load config, using defaults: {e}");
    }
    info!("KeyStudio session runner starting");

    let catalogs = Arc::new(CatalogRegistry::new(
        config.studio.catalog_id(),
        config.studio.os_profile(),
    )?);
    info!(
        "keycode catalog {} loaded ({} entries)",
        catalogs.active_id().as_str(),
        catalogs.active().entries().len()
    );

    let gateway = Arc::new(InMemoryGateway::with_demo_device());
    let session = Arc::new(DeviceSession::new(gateway, Arc::clone(&catalogs)));
    let monitor = Arc::new(InteractionMonitor::new());
    session.set_preferred_device(config.session.preferred_device.clone());

    // Shutdown flag shared across all background services.
    let running = Arc::new(AtomicBool::new(true));

    // ── Auto-connect ──────────────────────────────────────────────────────────
    if config.session.auto_connect {
        if let Err(e) = session.refresh_devices().await {
            error!("device listing failed: {e}");
        }
        let target = session
            .preferred_device()
            .or_else(|| session.devices().first().map(|d| d.id.clone()));
        match session.connect(target.as_deref()).await {
            Ok(_) => {
                let status = session.sync_status();
                info!(
                    "connected: mode={:?} dirty={} ram_loaded={}",
                    session.device_mode(),
                    status.dirty,
                    status.ram_loaded
                );
            }
            Err(e) => error!("auto-connect failed: {e}"),
        }
    }

    // ── Device poller ─────────────────────────────────────────────────────────
    let poller = config.polling.enabled.then(|| {
        info!("polling devices every {:?}", config.polling.interval());
        spawn_device_poller(
            Arc::clone(&session),
            Arc::clone(&monitor),
            config.polling.interval(),
            Arc::clone(&running),
        )
    });

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("KeyStudio session runner ready.  Press Ctrl-C to exit.");

    loop {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    if let Some(poller) = poller {
        poller.abort();
    }
    session.disconnect().await;
    info!("KeyStudio session runner stopped");
    Ok(())
}
