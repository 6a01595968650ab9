use crate::{
    entities::vendor,
    errors::ServiceError,
    events::{Event, EventSender},
    services::slug::{conflict_on_duplicate, unique_slug},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateVendorInput {
    #[validate(length(min = 1, max = 255))]
    pub store_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Vendors that own products and appear on stock movements.
#[derive(Clone)]
pub struct VendorService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl VendorService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn create_vendor(
        &self,
        input: CreateVendorInput,
    ) -> Result<vendor::Model, ServiceError> {
        input.validate()?;

        let slug =
            unique_slug::<vendor::Entity, _>(&*self.db, vendor::Column::Slug, &input.store_name)
                .await?;
        let now = Utc::now();
        let vendor_id = Uuid::new_v4();

        let created = vendor::ActiveModel {
            id: Set(vendor_id),
            store_name: Set(input.store_name),
            slug: Set(slug),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Vendor slug"))?;

        self.event_sender
            .send_or_log(Event::VendorCreated(vendor_id))
            .await;

        info!(vendor_id = %vendor_id, slug = %created.slug, "Created vendor");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_vendor(&self, vendor_id: Uuid) -> Result<vendor::Model, ServiceError> {
        vendor::Entity::find_by_id(vendor_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Vendor {} not found", vendor_id)))
    }
}
