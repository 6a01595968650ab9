use crate::{
    common::{PaginatedResponse, PaginationParams},
    config::AppConfig,
    entities::{product, vendor},
    errors::ServiceError,
    events::{Event, EventSender},
    services::slug::{conflict_on_duplicate, unique_slug},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductInput {
    pub vendor_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 511))]
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Catalog fields a caller may change. Stock counters are deliberately absent;
/// they move only through the stock ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProductChanges {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    /// `Some(None)` clears the description
    #[validate(length(max = 511))]
    pub description: Option<Option<String>>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
}

impl ProductChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    pub vendor_id: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        let mut err = ValidationError::new("price");
        err.message = Some("price must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Product catalog operations. Renaming a product keeps its slug.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl ProductService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Creates a product with zeroed stock counters and a unique slug derived from its name.
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let db = &*self.db;
        vendor::Entity::find_by_id(input.vendor_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Vendor {} not found", input.vendor_id))
            })?;

        let slug = unique_slug::<product::Entity, _>(db, product::Column::Slug, &input.name).await?;
        let now = Utc::now();
        let product_id = Uuid::new_v4();

        let created = product::ActiveModel {
            id: Set(product_id),
            vendor_id: Set(input.vendor_id),
            name: Set(input.name),
            slug: Set(slug),
            description: Set(input.description),
            price: Set(input.price),
            is_active: Set(input.is_active),
            total_stock: Set(0),
            available_stock: Set(0),
            quantity_sold: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Product slug"))?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!(product_id = %product_id, slug = %created.slug, "Created product");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Applies the given catalog changes. An empty change set returns the product unchanged.
    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        changes: ProductChanges,
    ) -> Result<product::Model, ServiceError> {
        changes.validate()?;

        let existing = self.get_product(product_id).await?;
        if changes.is_empty() {
            return Ok(existing);
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        if let Some(price) = changes.price {
            active.price = Set(price);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;

        info!(product_id = %product_id, "Updated product");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: ProductFilter,
        pagination: PaginationParams,
    ) -> Result<PaginatedResponse<product::Model>, ServiceError> {
        let (page, limit) = pagination.resolve(&self.config);

        let mut query = product::Entity::find();
        if let Some(vendor_id) = filter.vendor_id {
            query = query.filter(product::Column::VendorId.eq(vendor_id));
        }
        let paginator = query
            .order_by_asc(product::Column::CreatedAt)
            .order_by_asc(product::Column::Id)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Database error when counting products");
            ServiceError::db_error(e)
        })?;

        let products = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(page = %page, limit = %limit, error = %e, "Database error when fetching products");
            ServiceError::db_error(e)
        })?;

        Ok(PaginatedResponse::new(products, page, limit, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_price_is_rejected() {
        let input = CreateProductInput {
            vendor_id: Uuid::new_v4(),
            name: "Widget".into(),
            description: None,
            price: dec!(-0.01),
            is_active: true,
        };
        assert!(input.validate().is_err());
        assert!(validate_price(&dec!(0)).is_ok());
    }

    #[test]
    fn empty_changes_are_detected() {
        assert!(ProductChanges::default().is_empty());
        let changes = ProductChanges {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }

    #[test]
    fn overlong_description_change_is_rejected() {
        let changes = ProductChanges {
            description: Some(Some("x".repeat(512))),
            ..Default::default()
        };
        assert!(changes.validate().is_err());
    }
}
