//! Configuration cache with bounded staleness.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reactivation_core::{
    ConfigurationStore, ReactivationSettings, ReactivationStep, Result, TenantConfiguration,
};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedTenant {
    configuration: TenantConfiguration,
    loaded_at: Instant,
}

/// Caches each tenant's settings and steps for at most `ttl`.
///
/// Settings and steps are loaded together and served through
/// [`ConfigurationStore::tenant`] from one entry, so one evaluation never sees
/// a mix of old and new configuration. Load failures are not cached.
pub struct CachedConfigurationStore {
    inner: Arc<dyn ConfigurationStore>,
    ttl: Duration,
    tenants: RwLock<HashMap<String, CachedTenant>>,
}

impl CachedConfigurationStore {
    pub fn new(inner: Arc<dyn ConfigurationStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Drop a tenant's cached configuration, e.g. after an edit.
    pub async fn invalidate(&self, tenant_id: &str) {
        self.tenants.write().await.remove(tenant_id);
    }

    pub async fn invalidate_all(&self) {
        self.tenants.write().await.clear();
    }

    async fn load(&self, tenant_id: &str) -> Result<TenantConfiguration> {
        if let Some(cached) = self.tenants.read().await.get(tenant_id) {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.configuration.clone());
            }
        }

        let configuration = self.inner.tenant(tenant_id).await?;
        debug!(
            tenant_id,
            steps = configuration.steps.len(),
            "Loaded reactivation configuration"
        );

        self.tenants.write().await.insert(
            tenant_id.to_string(),
            CachedTenant {
                configuration: configuration.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(configuration)
    }
}

#[async_trait]
impl ConfigurationStore for CachedConfigurationStore {
    async fn settings(&self, tenant_id: &str) -> Result<Option<ReactivationSettings>> {
        Ok(self.load(tenant_id).await?.settings)
    }

    async fn steps(&self, tenant_id: &str) -> Result<Vec<ReactivationStep>> {
        Ok(self.load(tenant_id).await?.steps)
    }

    async fn tenant(&self, tenant_id: &str) -> Result<TenantConfiguration> {
        self.load(tenant_id).await
    }
}
