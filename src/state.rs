use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cqrs_es::Query;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::LoggingQuery;
use crate::config::{ConfigError, FunnelConfig, PaymentSettings, funnel_services};
use crate::controller::{FunnelController, FunnelQueries};
use crate::domain::funnel::{BookingFunnel, FunnelError, FunnelServices};

/// Live funnel runs keyed by id.
pub struct FunnelRegistry {
    services: Arc<FunnelServices>,
    queries: FunnelQueries,
    funnels: RwLock<HashMap<Uuid, Arc<FunnelController>>>,
}

impl FunnelRegistry {
    #[must_use]
    pub fn new(services: Arc<FunnelServices>) -> Self {
        // Every committed event is also written to the log.
        let queries: Vec<Box<dyn Query<BookingFunnel>>> = vec![Box::new(LoggingQuery {})];
        Self {
            services,
            queries: Arc::new(queries),
            funnels: RwLock::new(HashMap::new()),
        }
    }

    /// Starts a new funnel run and registers it.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot be started.
    pub async fn start(&self) -> Result<Arc<FunnelController>, FunnelError> {
        let controller =
            FunnelController::start(Uuid::new_v4(), self.services.clone(), self.queries.clone())
                .await?;
        self.funnels
            .write()
            .await
            .insert(controller.id(), controller.clone());
        Ok(controller)
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<FunnelController>> {
        self.funnels.read().await.get(id).cloned()
    }

    /// Drops every run that has been idle for at least `timeout`, along with
    /// its events. Returns how many were dropped.
    pub async fn evict_idle(&self, timeout: Duration) -> usize {
        let mut funnels = self.funnels.write().await;
        let before = funnels.len();
        funnels.retain(|id, controller| {
            let idle = controller.idle_for();
            if idle < timeout {
                return true;
            }
            info!(funnel_id = %id, idle_secs = idle.as_secs(), "evicting idle funnel");
            false
        });
        before - funnels.len()
    }

    pub async fn live_count(&self) -> usize {
        self.funnels.read().await.len()
    }

    #[must_use]
    pub fn services(&self) -> &Arc<FunnelServices> {
        &self.services
    }
}

#[derive(Clone)]
pub struct ApplicationState {
    pub funnels: Arc<FunnelRegistry>,
    pub payment: PaymentSettings,
}

impl ApplicationState {
    #[must_use]
    pub fn new(services: Arc<FunnelServices>) -> Self {
        let payment = services.payment().clone();
        Self {
            funnels: Arc::new(FunnelRegistry::new(services)),
            payment,
        }
    }
}

/// Builds the application state from configuration.
///
/// # Errors
///
/// Returns an error if the HTTP collaborators cannot be built.
pub fn new_application_state(config: &FunnelConfig) -> Result<ApplicationState, ConfigError> {
    let services = funnel_services(config)?;
    Ok(ApplicationState::new(services))
}
