pub mod products;
pub mod slug;
pub mod stock_ledger;
pub mod vendors;

use crate::{config::AppConfig, events::EventSender};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub use products::ProductService;
pub use stock_ledger::StockLedgerService;
pub use vendors::VendorService;

/// Service container built once at startup and shared by clone.
#[derive(Clone)]
pub struct AppServices {
    pub stock_ledger: Arc<StockLedgerService>,
    pub products: Arc<ProductService>,
    pub vendors: Arc<VendorService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            stock_ledger: Arc::new(StockLedgerService::new(
                db.clone(),
                event_sender.clone(),
                config.clone(),
            )),
            products: Arc::new(ProductService::new(
                db.clone(),
                event_sender.clone(),
                config,
            )),
            vendors: Arc::new(VendorService::new(db, event_sender)),
        }
    }
}
