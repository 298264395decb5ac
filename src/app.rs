//! Application container.
//!
//! Everything process-wide (store, tunnels, limiters, clients) is built once
//! here and handed to the workers and the collector.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::{Clients, ProfileCollector, build_registry};
use crate::queue::periodic::run_periodic;
use crate::queue::{JobQueue, Runner, WorkerRegistry, periodic_jobs};
use crate::storage::Store;
use crate::utils::{Fetcher, Limiters, ProxyRotator};

pub struct App {
    config: Config,
    store: Store,
    queue: JobQueue,
    proxies: Option<Arc<ProxyRotator>>,
    clients: Clients,
    collector: ProfileCollector,
    registry: Arc<WorkerRegistry>,
}

impl App {
    /// Validate `config`, open the store (running migrations) and wire up
    /// every client. Tunnels are dialed here when proxies are enabled.
    pub async fn new(config: Config, cancel: &CancellationToken) -> Result<Self> {
        config.validate()?;

        let store = Store::open(&config).await?;
        let proxies = if config.proxies_enabled {
            let rotator = ProxyRotator::start(
                &config.proxies,
                &config.private_key_path,
                config.http_timeout(),
                cancel,
            )
            .await?;
            log::info!("Started {} proxy tunnels", rotator.len());
            Some(Arc::new(rotator))
        } else {
            None
        };

        let limiters = Limiters::default();
        let fetcher = Arc::new(Fetcher::from_config(&config, proxies.clone())?);
        let clients = Clients::new(&config, fetcher, &limiters);
        let collector = ProfileCollector::new(store.clone(), clients.steam.clone());
        let registry = Arc::new(build_registry(&store, &clients, &config));
        let queue = JobQueue::new(&store);

        log::info!(
            "Registered workers: {}",
            registry
                .kinds()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            config,
            store,
            queue,
            proxies,
            clients,
            collector,
            registry,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    pub fn collector(&self) -> &ProfileCollector {
        &self.collector
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Run the queue runner and the periodic scheduler until ctrl-c or
    /// `cancel`, then drain in-flight jobs and release resources.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let interrupt = tokio::spawn(watch_interrupt(cancel.clone()));

        let runner = Runner::new(self.queue.clone(), Arc::clone(&self.registry));
        let periodic = periodic_jobs(&self.config);
        log::info!("Service started in {:?} mode", self.config.run_mode);

        tokio::join!(
            runner.run(cancel.clone()),
            run_periodic(self.queue.clone(), periodic, cancel.clone()),
        );

        interrupt.abort();
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        if let Some(proxies) = &self.proxies {
            proxies.shutdown();
        }
        self.store.close().await;
        log::info!("Shutdown complete");
    }
}

async fn watch_interrupt(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                log::info!("Interrupt received, shutting down");
                cancel.cancel();
            }
            Err(e) => log::error!("Cannot listen for interrupts: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::queue::{InsertOpts, JobArgs, JobKind};

    fn config() -> Config {
        Config {
            steam_api_key: "test-key".into(),
            dsn: "sqlite::memory:".into(),
            logstf_scraper_enabled: true,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let cancel = CancellationToken::new();
        let config = Config {
            steam_api_key: String::new(),
            ..config()
        };
        let err = App::new(config, &cancel).await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn wires_enabled_sources() {
        let cancel = CancellationToken::new();
        let app = App::new(config(), &cancel).await.unwrap();

        let kinds = app.registry().kinds();
        assert!(kinds.contains(&JobKind::LogsTf));
        assert!(kinds.contains(&JobKind::BdLists));
        assert!(!kinds.contains(&JobKind::RglBans));
        assert!(app.store().bd_lists(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_returns_once_cancelled() {
        let cancel = CancellationToken::new();
        let app = App::new(config(), &cancel).await.unwrap();
        let id = app
            .queue()
            .enqueue(&JobArgs::SteamServers, InsertOpts::default())
            .await
            .unwrap()
            .unwrap();
        let queue = app.queue().clone();

        cancel.cancel();
        app.run(cancel).await.unwrap();

        // The pool is closed by shutdown.
        assert!(queue.job_get(id).await.is_err());
    }
}
