//! Storefront inventory stock ledger
//!
//! Keeps each product's `total_stock`, `available_stock` and `quantity_sold`
//! counters consistent with an append-only history of stock movements.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod models;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Shared application state: configuration, pool, event channel and services.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub services: services::AppServices,
}

impl AppState {
    /// Wires the services around an existing pool. The returned receiver must be
    /// drained (see [`events::process_events`]) or publishing stalls once the
    /// channel is full.
    pub fn new(
        db: DatabaseConnection,
        config: config::AppConfig,
    ) -> (Self, mpsc::Receiver<events::Event>) {
        let (sender, rx) = events::channel(config.event_channel_capacity);
        let db = Arc::new(db);
        let config = Arc::new(config);
        let event_sender = Arc::new(sender);
        let services =
            services::AppServices::new(db.clone(), event_sender.clone(), config.clone());

        (
            Self {
                db,
                config,
                event_sender,
                services,
            },
            rx,
        )
    }

    /// Connects using `config`, optionally migrates, and spawns the event consumer.
    pub async fn bootstrap(config: config::AppConfig) -> Result<Self, errors::ServiceError> {
        let pool = db::establish_connection_from_app_config(&config).await?;
        if config.auto_migrate {
            db::run_migrations(&pool).await?;
        }

        let (state, rx) = Self::new(pool, config);
        tokio::spawn(events::process_events(rx));

        info!(environment = %state.config.environment, "Stock ledger ready");
        Ok(state)
    }
}

pub mod prelude {
    pub use crate::common::*;
    pub use crate::config::{AppConfig, LedgerPolicyConfig};
    pub use crate::entities::stock_movement::{MovementClass, MovementKind};
    pub use crate::errors::*;
    pub use crate::events::{Event, EventSender};
    pub use crate::models::*;
    pub use crate::services::products::{CreateProductInput, ProductChanges, ProductFilter};
    pub use crate::services::stock_ledger::{
        MovementDetail, MovementFilter, MovementRequest, RecordMovementInput,
        ReconciliationReport, ReviseMovementInput,
    };
    pub use crate::services::vendors::CreateVendorInput;
    pub use crate::services::*;
    pub use crate::AppState;
}
