//! Infrastructure wiring for the HTTP layer.
//!
//! The guest service is synchronous (the Postgres store bridges to async with
//! `Handle::block_on`), so every call from a handler goes through
//! [`AppServices::run`] on the blocking pool.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::info;

use staydesk_events::{EventEnvelope, InMemoryEventBus};
use staydesk_infra::GuestError;
use staydesk_infra::GuestService;
use staydesk_infra::event_store::{EventStore, InMemoryEventStore, PostgresEventStore};

use crate::config::StoreConfig;

pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Guests = GuestService<Arc<dyn EventStore>, Bus>;

pub struct AppServices {
    guests: Guests,
    backend: &'static str,
}

impl AppServices {
    /// Fresh in-memory backend (dev mode and tests).
    pub fn in_memory() -> Self {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        Self {
            guests: GuestService::new(store, Arc::new(InMemoryEventBus::new())),
            backend: "in_memory",
        }
    }

    pub fn guests(&self) -> &Guests {
        &self.guests
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Run a guest-service call on the blocking pool.
    pub async fn run<T, F>(self: &Arc<Self>, f: F) -> Result<T, GuestError>
    where
        T: Send + 'static,
        F: FnOnce(&Guests) -> Result<T, GuestError> + Send + 'static,
    {
        let services = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&services.guests))
            .await
            .map_err(|e| GuestError::Internal(format!("guest task failed: {e}")))?
    }
}

/// Build the services for the configured backend.
///
/// Persistent mode creates the schema if needed and rebuilds the guest
/// directory from the stored events before the server takes traffic.
pub async fn build_services(store: &StoreConfig) -> anyhow::Result<Arc<AppServices>> {
    match store {
        StoreConfig::InMemory => {
            info!(backend = "in_memory", "using in-memory event store");
            Ok(Arc::new(AppServices::in_memory()))
        }
        StoreConfig::Postgres { database_url } => {
            let pool = PgPool::connect(database_url)
                .await
                .context("failed to connect to DATABASE_URL")?;

            let pg = PostgresEventStore::new(pool);
            pg.ensure_schema().await.context("failed to create event store schema")?;

            let store: Arc<dyn EventStore> = Arc::new(pg);
            let services = Arc::new(AppServices {
                guests: GuestService::new(store, Arc::new(InMemoryEventBus::new())),
                backend: "postgres",
            });

            services
                .run(|guests| guests.rebuild_directory())
                .await
                .context("failed to rebuild the guest directory")?;
            info!(backend = "postgres", "using postgres event store");

            Ok(services)
        }
    }
}
