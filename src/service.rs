//! Relayer Service
//!
//! Wires the durable store, the signer pool and both monitors together and
//! owns their tasks.
//!
//! ## Lifecycle
//!
//! 1. [`RelayerService::new`] opens the store, loads and registers signers (only
//!    with the poly → zilliqa direction enabled) and
//!    resolves each monitor's start height. Any failure here is fatal.
//! 2. [`RelayerService::start`] spawns the enabled monitors and the nonce loop.
//! 3. [`RelayerService::stop`] cancels them and waits for the running
//!    iterations to finish.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chain::{CrossChainProxy, PolyClient, ZilliqaClient};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::RelayerError;
use crate::monitor::{PolySyncManager, ZilliqaSyncManager};
use crate::sender::{AuditLog, NonceManager, SenderPool, ZilSender};
use crate::storage::RelayerStore;

/// Chain adapters the relayer runs against.
#[derive(Clone)]
pub struct ChainAdapters {
    pub zil: Arc<dyn ZilliqaClient>,
    pub poly: Arc<dyn PolyClient>,
    pub proxy: Arc<dyn CrossChainProxy>,
}

pub struct RelayerService {
    config: Arc<Config>,
    store: Arc<RelayerStore>,
    nonces: Arc<NonceManager>,
    pool: Arc<SenderPool>,
    zil_monitor: Option<ZilliqaSyncManager>,
    poly_monitor: Option<PolySyncManager>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayerService {
    /// Builds every component and resolves start heights.
    ///
    /// Signers whose nonce cannot be fetched are dropped with a warning;
    /// having none left is fatal.
    pub async fn new(
        config: Config,
        adapters: ChainAdapters,
        credentials: &dyn CredentialStore,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let shutdown = CancellationToken::new();

        let store = Arc::new(
            RelayerStore::open(&config.storage.path, config.storage.remove_db)
                .with_context(|| format!("Failed to open store at {}", config.storage.path))?,
        );
        info!("Opened store at {}", config.storage.path);

        let nonces = Arc::new(NonceManager::new(
            Arc::clone(&adapters.zil),
            config.zil.max_exist_tx_epoch,
        ));
        let audit = config
            .relayer
            .audit_log_path
            .as_ref()
            .map(|path| Arc::new(AuditLog::new(path)));

        // Only the poly → zilliqa direction signs zilliqa transactions
        let mut senders = Vec::new();
        if config.relayer.enable_poly_to_zil {
            let accounts = credentials
                .signing_accounts()
                .context("Failed to load signing accounts")?;
            for account in accounts {
                if let Err(e) = nonces.register_signer(&account.address).await {
                    warn!("Dropping signer {}: {:#}", account.address, e);
                    continue;
                }
                senders.push(Arc::new(ZilSender::new(
                    account,
                    Arc::clone(&adapters.zil),
                    Arc::clone(&adapters.proxy),
                    Arc::clone(&nonces),
                    audit.clone(),
                    config.cross_chain_manager(),
                )));
            }
            if senders.is_empty() {
                return Err(RelayerError::NoSigners.into());
            }
        }
        info!("Loaded {} signers", senders.len());

        let pool = Arc::new(SenderPool::new(
            senders,
            Arc::clone(&nonces),
            config.relayer.sender_backoff(),
        ));

        let zil_monitor = if config.relayer.enable_zil_to_poly {
            Some(
                ZilliqaSyncManager::new(
                    &config,
                    Arc::clone(&adapters.zil),
                    Arc::clone(&adapters.poly),
                    Arc::clone(&store),
                    shutdown.child_token(),
                )
                .await
                .context("Failed to initialize zilliqa monitor")?,
            )
        } else {
            info!("Zilliqa → poly direction disabled");
            None
        };

        let poly_monitor = if config.relayer.enable_poly_to_zil {
            Some(
                PolySyncManager::new(
                    Arc::clone(&config),
                    Arc::clone(&adapters.zil),
                    Arc::clone(&adapters.poly),
                    Arc::clone(&store),
                    Arc::clone(&pool),
                    shutdown.child_token(),
                )
                .await
                .context("Failed to initialize poly monitor")?,
            )
        } else {
            info!("Poly → zilliqa direction disabled");
            None
        };

        Ok(Self {
            config,
            store,
            nonces,
            pool,
            zil_monitor,
            poly_monitor,
            shutdown,
            tasks: Vec::new(),
        })
    }

    pub fn store(&self) -> &Arc<RelayerStore> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<SenderPool> {
        &self.pool
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawns the monitors and, with the poly → zilliqa direction, the nonce loop.
    pub fn start(&mut self) {
        if let Some(monitor) = self.zil_monitor.take() {
            self.tasks.push(tokio::spawn(monitor.run()));
        }
        if let Some(monitor) = self.poly_monitor.take() {
            self.tasks.push(tokio::spawn(monitor.run()));
            self.tasks.push(tokio::spawn(Arc::clone(&self.nonces).run(
                self.config.relayer.nonce_update_interval(),
                self.shutdown.child_token(),
            )));
        }
        info!("Relayer started with {} tasks", self.tasks.len());
    }

    /// Cancels every task and waits for it to exit.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        for result in futures::future::join_all(self.tasks.drain(..)).await {
            if let Err(e) = result {
                warn!("Relayer task ended abnormally: {}", e);
            }
        }
        info!("Relayer stopped");
    }

    /// Starts the relayer and runs it until ctrl-c.
    pub async fn run_until_shutdown(mut self) -> Result<()> {
        self.start();
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Shutdown signal received");
        self.stop().await;
        Ok(())
    }
}
