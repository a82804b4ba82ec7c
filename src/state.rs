use crate::core::models::AppConfig;
use crate::core::panel::{ClientFactory, PanelClientFactory};
use crate::core::services::{ClientService, PanelRegistrar, TrafficReconciler};
use crate::core::storage::ConfigStorage;
use crate::core::traits::{DefaultStorageConfig, StorageConfig};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Web 应用状态
pub struct AppState {
    pub storage: DefaultStorageConfig,
    pub db_pool: sqlx::SqlitePool,
    pub config: RwLock<AppConfig>,
    pub factory: Arc<dyn ClientFactory>,
    pub registrar: PanelRegistrar,
    pub reconciler: Arc<TrafficReconciler>,
    pub clients: ClientService,
}

impl AppState {
    pub async fn new() -> Result<Self, String> {
        Self::init(DefaultStorageConfig::new()?).await
    }

    pub async fn with_data_dir(data_dir: std::path::PathBuf) -> Result<Self, String> {
        Self::init(DefaultStorageConfig::with_path(data_dir)?).await
    }

    async fn init(storage: DefaultStorageConfig) -> Result<Self, String> {
        let db_pool = crate::core::db::init_db(&storage.data_dir()).await?;
        let config = ConfigStorage::load(&db_pool, &storage).await?;
        let factory: Arc<dyn ClientFactory> = Arc::new(PanelClientFactory::from_config(&config));
        Ok(Self::assemble(storage, db_pool, config, factory))
    }

    /// Wire services around an existing pool and factory.
    pub fn assemble(
        storage: DefaultStorageConfig,
        db_pool: sqlx::SqlitePool,
        config: AppConfig,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let reconciler = Arc::new(TrafficReconciler::new(
            db_pool.clone(),
            factory.clone(),
            &config,
        ));
        Self {
            registrar: PanelRegistrar::new(db_pool.clone(), factory.clone()),
            clients: ClientService::new(db_pool.clone(), factory.clone(), reconciler.clone()),
            storage,
            db_pool,
            config: RwLock::new(config),
            factory,
            reconciler,
        }
    }
}
