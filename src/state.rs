use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use crate::{
    config::{AppConfig, StoreLocation},
    db::SqliteStore,
    error::AppError,
    models::actor::Actor,
    services::{
        actions::SessionActions,
        connectivity::{Connectivity, HttpProbe},
        kv::{FileStore, KeyValueStore},
        reconcile::Reconciler,
        remote::{HttpRemote, RemoteApi},
        session_store::SessionStore,
    },
};

/// Everything a screen needs, handed to it explicitly instead of living in globals.
#[derive(Clone)]
pub struct SessionContext {
    pub config: AppConfig,
    pub store: SessionStore,
    pub reconciler: Reconciler,
    pub actions: SessionActions,
}

impl SessionContext {
    pub fn new(
        config: AppConfig,
        store: SessionStore,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let reconciler = Reconciler::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
            config.sync.clone(),
        );
        let actions = SessionActions::new(store.clone(), remote, connectivity, config.fares.clone());
        Self {
            config,
            store,
            reconciler,
            actions,
        }
    }

    /// Opens the configured device store and wires the HTTP backend client and the
    /// reachability probe.
    pub async fn from_config(config: AppConfig) -> Result<Self, AppError> {
        let kv = open_store(&config.store).await?;
        let store = SessionStore::new(kv)
            .with_counterpart_placeholder(config.counterpart_placeholder.clone());
        store.hydrate().await?;

        let remote = HttpRemote::new(
            config.api_base_url.clone(),
            config.request_timeout,
            store.clone(),
        )?;
        let probe = HttpProbe::new(config.api_base_url.clone(), config.request_timeout)
            .context("build connectivity probe")?;

        Ok(Self::new(config, store, Arc::new(remote), Arc::new(probe)))
    }

    pub fn current_actor(&self) -> Option<Actor> {
        self.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Actor>> {
        self.store.subscribe()
    }
}

pub async fn open_store(location: &StoreLocation) -> Result<Arc<dyn KeyValueStore>, AppError> {
    match location {
        StoreLocation::Directory(root) => {
            let files = FileStore::new(root.clone());
            files.ensure_structure().await?;
            Ok(Arc::new(files))
        }
        StoreLocation::Sqlite(url) => Ok(Arc::new(SqliteStore::open(url).await?)),
    }
}
