//! Shared application state and bootstrap.

use std::sync::Arc;

use arta_governor::RateLimiter;
use arta_identity::{ScopeStore, TokenVerifier};
use arta_insight::kpi::INTERNAL_EMBEDDING_DIM;
use arta_orchestrator::Orchestrator;
use arta_providers::{ModelGateway, ProviderRouter, ReqwestTransport};
use arta_storage::{CoreStorage, InMemoryStorage, PostgresStorage, TenantStore};
use arta_tools::ToolRegistry;
use arta_types::Customer;

use crate::config::{Config, EXTERNAL_EMBEDDING_DIM};

/// Everything the handlers share. Cloning is cheap; all fields are Arcs.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn CoreStorage>,
    pub gateway: Arc<dyn ModelGateway>,
    pub tools: Arc<ToolRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub limiter: Arc<RateLimiter>,
    pub verifier: TokenVerifier,
    /// True when an external embedding provider is configured; decides the
    /// vector dimension at startup.
    pub external_embedder: bool,
}

impl AppState {
    /// Wire the production collaborators: provider router with env keys,
    /// Postgres when a database URL is configured, in-memory otherwise.
    pub async fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let router = ProviderRouter::new(
            Arc::new(ReqwestTransport::default()),
            config.default_chat_provider,
            config.default_embed_provider,
        )
        .with_env_keys();
        let external_embedder = router.has_embedding_provider();
        let dimension = if external_embedder {
            EXTERNAL_EMBEDDING_DIM
        } else {
            INTERNAL_EMBEDDING_DIM
        };

        let storage: Arc<dyn CoreStorage> = match &config.database_url {
            Some(url) => {
                let store = PostgresStorage::connect(url, dimension).await?;
                tracing::info!(dimension, "connected to postgres storage");
                Arc::new(store)
            }
            None => {
                tracing::warn!(
                    dimension,
                    "no database configured, using in-memory storage"
                );
                Arc::new(InMemoryStorage::new(dimension))
            }
        };

        let gateway: Arc<dyn ModelGateway> = Arc::new(router);
        Ok(Self::assemble(config, storage, gateway, external_embedder))
    }

    /// Assemble state from explicit collaborators (tests inject scripted
    /// gateways and fresh in-memory stores here).
    pub fn assemble(
        config: Config,
        storage: Arc<dyn CoreStorage>,
        gateway: Arc<dyn ModelGateway>,
        external_embedder: bool,
    ) -> Self {
        let tools = Arc::new(ToolRegistry::with_builtin());
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&gateway), Arc::clone(&tools)));
        let verifier = TokenVerifier::new(&config.auth_secret);
        Self {
            config: Arc::new(config),
            storage,
            gateway,
            tools,
            orchestrator,
            limiter: Arc::new(RateLimiter::new()),
            verifier,
            external_embedder,
        }
    }
}

/// Adapter exposing the storage layer to the identity resolver.
pub struct StorageScope(pub Arc<dyn CoreStorage>);

#[async_trait::async_trait]
impl ScopeStore for StorageScope {
    async fn ensure_tenant(&self, tenant_id: &str) -> Result<String, String> {
        self.0
            .ensure_tenant(tenant_id)
            .await
            .map(|tenant| tenant.id)
            .map_err(|e| e.to_string())
    }

    async fn ensure_customer(
        &self,
        tenant_id: &str,
        external_reference: &str,
    ) -> Result<Customer, String> {
        self.0
            .ensure_customer(tenant_id, external_reference)
            .await
            .map_err(|e| e.to_string())
    }
}
