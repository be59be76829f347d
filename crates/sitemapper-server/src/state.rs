//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use sitemapper_core::{SitemapSettings, SitemapperConfig};
use sitemapper_runtime::{BudgetGuard, Scheduler, SchedulerConfig};
use sitemapper_store::{CacheStore, SqliteStore};
use tracing::{info, warn};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: SitemapperConfig,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    /// Open the store and cache under the configured data directory and
    /// build the scheduler from persisted settings.
    pub fn open(config: SitemapperConfig) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteStore::open(&config.data_paths.db)
                .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?,
        );
        let cache = Arc::new(CacheStore::new(&config.data_paths.cache, store.clone()));
        cache
            .init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize cache: {}", e))?;

        let settings = SitemapSettings::load(&config.data_paths.settings_file);
        if let Err(e) = settings.validate() {
            warn!("Invalid sitemap settings: {}", e);
        }

        let guard = BudgetGuard::new(config.host_limits);
        let scheduler = Scheduler::new(store, cache, settings, guard).with_config(SchedulerConfig {
            lease_ttl: Duration::from_secs(config.lease_ttl_secs),
            ..Default::default()
        });
        info!("Dispatcher identity: {}", scheduler.owner_id());

        Ok(Self {
            config,
            scheduler: Arc::new(scheduler),
        })
    }

    pub fn settings(&self) -> SitemapSettings {
        self.scheduler.settings()
    }

    /// Validate, persist and apply new settings.
    pub fn update_settings(&self, settings: SitemapSettings) -> sitemapper_core::Result<()> {
        settings.validate()?;
        settings.save(&self.config.data_paths.settings_file)?;
        self.scheduler.set_settings(settings);
        Ok(())
    }
}
