#![allow(dead_code)]

use rust_decimal::Decimal;
use storefront_inventory::{
    config::{AppConfig, LedgerPolicyConfig},
    db,
    entities::{product, stock_movement, stock_movement::MovementKind, vendor},
    events,
    models::StockCounters,
    services::{
        products::CreateProductInput, stock_ledger::RecordMovementInput,
        vendors::CreateVendorInput,
    },
    AppState,
};
use uuid::Uuid;

/// Application state backed by a private in-memory SQLite database.
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_policy(LedgerPolicyConfig::default()).await
    }

    pub async fn with_policy(policy: LedgerPolicyConfig) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:", "test");
        // one connection: every handle must see the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_acquire_timeout_secs = 30;
        cfg.ledger = policy;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (state, rx) = AppState::new(pool, cfg);
        let event_task = tokio::spawn(events::process_events(rx));

        Self {
            state,
            _event_task: event_task,
        }
    }

    pub async fn vendor(&self, store_name: &str) -> vendor::Model {
        self.state
            .services
            .vendors
            .create_vendor(CreateVendorInput {
                store_name: store_name.to_string(),
                is_active: true,
            })
            .await
            .expect("create vendor")
    }

    pub async fn product(&self, vendor_id: Uuid, name: &str) -> product::Model {
        self.state
            .services
            .products
            .create_product(CreateProductInput {
                vendor_id,
                name: name.to_string(),
                description: None,
                price: Decimal::new(1999, 2),
                is_active: true,
            })
            .await
            .expect("create product")
    }

    /// A vendor and one product with zero stock.
    pub async fn seeded(&self) -> (vendor::Model, product::Model) {
        let vendor = self.vendor("Acme Supplies").await;
        let product = self.product(vendor.id, "Widget").await;
        (vendor, product)
    }

    pub async fn record(
        &self,
        product: &product::Model,
        kind: MovementKind,
        quantity: i32,
    ) -> Result<stock_movement::Model, storefront_inventory::errors::ServiceError> {
        self.state
            .services
            .stock_ledger
            .record_movement(movement(product, kind, Decimal::ONE, quantity))
            .await
    }

    pub async fn counters(&self, product_id: Uuid) -> StockCounters {
        self.state
            .services
            .products
            .get_product(product_id)
            .await
            .expect("product exists")
            .counters()
    }
}

pub fn movement(
    product: &product::Model,
    kind: MovementKind,
    unit_price: Decimal,
    quantity: i32,
) -> RecordMovementInput {
    RecordMovementInput {
        product_id: product.id,
        vendor_id: product.vendor_id,
        movement_type: kind,
        unit_price,
        quantity,
        invoice_number: format!("INV-{}", &Uuid::new_v4().simple().to_string()[..8]),
        notes: None,
    }
}

pub fn counters(total_stock: i32, available_stock: i32, quantity_sold: i32) -> StockCounters {
    StockCounters {
        total_stock,
        available_stock,
        quantity_sold,
    }
}
