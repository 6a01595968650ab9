use crate::{
    common::{PaginatedResponse, PaginationParams},
    config::{AppConfig, LedgerPolicyConfig},
    entities::{
        product,
        stock_movement::{self, MovementKind},
        vendor,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::stock_counters::{CounterError, StockCounters, StockDelta},
};
use chrono::Utc;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Typed input for recording a movement.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordMovementInput {
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub movement_type: MovementKind,
    #[validate(custom = "validate_unit_price")]
    pub unit_price: Decimal,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 50))]
    pub invoice_number: String,
    #[validate(length(max = 511))]
    pub notes: Option<String>,
}

/// Movement as received from an outer boundary, with the kind still a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub movement_type: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub invoice_number: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TryFrom<MovementRequest> for RecordMovementInput {
    type Error = ServiceError;

    fn try_from(req: MovementRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: req.product_id,
            vendor_id: req.vendor_id,
            movement_type: req.movement_type.parse()?,
            unit_price: req.unit_price,
            quantity: req.quantity,
            invoice_number: req.invoice_number,
            notes: req.notes,
        })
    }
}

/// Replacement values for an existing movement.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReviseMovementInput {
    pub movement_type: MovementKind,
    #[validate(custom = "validate_unit_price")]
    pub unit_price: Decimal,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 50))]
    pub invoice_number: String,
    #[validate(length(max = 511))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
}

/// A movement together with the product and vendor it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementDetail {
    #[serde(flatten)]
    pub movement: stock_movement::Model,
    pub product: Option<product::Model>,
    pub vendor: Option<vendor::Model>,
}

/// Live counters of a product compared with a replay of its movement history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub product_id: Uuid,
    pub live: StockCounters,
    pub replayed: StockCounters,
    pub matches: bool,
    pub movements_replayed: usize,
    /// Set when a movement in the history could not be applied; `replayed`
    /// then holds the counters reached just before it.
    pub replay_error: Option<String>,
}

fn validate_unit_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() || price.is_zero() {
        let mut err = ValidationError::new("unit_price");
        err.message = Some("unit_price must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

fn total_price(unit_price: Decimal, quantity: i32) -> Result<Decimal, ServiceError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| ServiceError::ValidationError("total_price overflows".to_string()))
}

/// Stock ledger: applies movements to product counters and keeps the movement history.
///
/// Every mutation runs in one database transaction that locks the product row,
/// writes the movement and updates the counters with a guarded `UPDATE`.
/// Dropping the transaction on any error rolls everything back.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl StockLedgerService {
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

    fn policy(&self) -> LedgerPolicyConfig {
        self.config.ledger
    }

    /// Records a movement and applies it to the product's counters.
    ///
    /// # Errors
    ///
    /// * `ValidationError` - quantity, unit price, invoice number or notes out of range
    /// * `NotFound` - the product or vendor does not exist
    /// * `InsufficientStock` - an outbound movement exceeds available stock; nothing is written
    /// * `TransactionFailure` - the datastore failed; nothing is written
    #[instrument(skip(self, input), fields(product_id = %input.product_id, kind = %input.movement_type, quantity = input.quantity))]
    pub async fn record_movement(
        &self,
        input: RecordMovementInput,
    ) -> Result<stock_movement::Model, ServiceError> {
        input.validate()?;
        let total_price = total_price(input.unit_price, input.quantity)?;
        let start = Instant::now();

        let txn = self.db.begin().await?;

        let product = lock_product(&txn, input.product_id).await?;
        ensure_vendor(&txn, input.vendor_id).await?;

        let delta = StockDelta::of(input.movement_type, input.quantity);
        let after = product
            .counters()
            .apply_delta(delta)
            .map_err(|e| rejected(e, product.id))?;

        let now = Utc::now();
        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(input.product_id),
            vendor_id: Set(input.vendor_id),
            movement_type: Set(input.movement_type),
            unit_price: Set(input.unit_price),
            quantity: Set(input.quantity),
            total_price: Set(total_price),
            invoice_number: Set(input.invoice_number),
            notes: Set(input.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        apply_counter_delta(&txn, product.id, delta).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit stock movement");
            ServiceError::db_error(e)
        })?;

        histogram!(
            "stock_ledger.transaction.duration",
            start.elapsed().as_secs_f64()
        );
        counter!("stock_ledger.movement.recorded", 1, "kind" => movement.movement_type.as_str());

        self.event_sender
            .send_or_log(Event::StockMovementRecorded {
                movement_id: movement.id,
                product_id: movement.product_id,
                kind: movement.movement_type,
                quantity: movement.quantity,
            })
            .await;
        self.publish_if_depleted(product.id, delta, after).await;

        info!(
            movement_id = %movement.id,
            total_stock = after.total_stock,
            available_stock = after.available_stock,
            quantity_sold = after.quantity_sold,
            "Recorded stock movement"
        );
        Ok(movement)
    }

    /// Parses a boundary request and records it. Unknown kinds fail with
    /// `InvalidMovementKind` before any transaction is opened.
    pub async fn record_request(
        &self,
        request: MovementRequest,
    ) -> Result<stock_movement::Model, ServiceError> {
        let input = RecordMovementInput::try_from(request).map_err(|e| {
            warn!(error = %e, "Rejected stock movement request");
            e
        })?;
        self.record_movement(input).await
    }

    /// Overwrites a movement's kind, price, quantity and references.
    ///
    /// With the default policy the new movement's delta is applied on top of
    /// the current counters without undoing the original one. When
    /// `ledger.reverse_on_revise` is set the original delta is netted out first
    /// and only the resulting counters must stay non-negative.
    #[instrument(skip(self, input), fields(movement_id = %movement_id))]
    pub async fn revise_movement(
        &self,
        movement_id: Uuid,
        input: ReviseMovementInput,
    ) -> Result<stock_movement::Model, ServiceError> {
        input.validate()?;
        let total_price = total_price(input.unit_price, input.quantity)?;
        let start = Instant::now();

        let txn = self.db.begin().await?;

        let existing = find_movement(&txn, movement_id).await?;
        let product = lock_product(&txn, existing.product_id).await?;

        let applied = StockDelta::of(input.movement_type, input.quantity);
        let delta = if self.policy().reverse_on_revise {
            StockDelta::of(existing.movement_type, existing.quantity)
                .inverse()
                .combine(applied)
                .map_err(|e| e.for_product(product.id))?
        } else {
            applied
        };
        let after = product
            .counters()
            .apply_delta(delta)
            .map_err(|e| rejected(e, product.id))?;

        let mut active: stock_movement::ActiveModel = existing.into();
        active.movement_type = Set(input.movement_type);
        active.unit_price = Set(input.unit_price);
        active.quantity = Set(input.quantity);
        active.total_price = Set(total_price);
        active.invoice_number = Set(input.invoice_number);
        active.notes = Set(input.notes);
        active.updated_at = Set(Utc::now());
        let revised = active.update(&txn).await?;

        apply_counter_delta(&txn, product.id, delta).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit stock movement revision");
            ServiceError::db_error(e)
        })?;

        histogram!(
            "stock_ledger.transaction.duration",
            start.elapsed().as_secs_f64()
        );
        counter!("stock_ledger.movement.revised", 1, "kind" => revised.movement_type.as_str());

        self.event_sender
            .send_or_log(Event::StockMovementRevised {
                movement_id,
                product_id: revised.product_id,
                kind: revised.movement_type,
                quantity: revised.quantity,
            })
            .await;
        self.publish_if_depleted(product.id, delta, after).await;

        info!(
            available_stock = after.available_stock,
            reversed_original = self.policy().reverse_on_revise,
            "Revised stock movement"
        );
        Ok(revised)
    }

    /// Deletes a movement.
    ///
    /// Counters are left as they are unless `ledger.reverse_on_remove` is set,
    /// in which case the movement's delta is undone in the same transaction.
    #[instrument(skip(self))]
    pub async fn remove_movement(&self, movement_id: Uuid) -> Result<(), ServiceError> {
        let reverse = self.policy().reverse_on_remove;
        let txn = self.db.begin().await?;

        let existing = find_movement(&txn, movement_id).await?;

        if reverse {
            let product = lock_product(&txn, existing.product_id).await?;
            let delta = StockDelta::of(existing.movement_type, existing.quantity).inverse();
            product
                .counters()
                .apply_delta(delta)
                .map_err(|e| rejected(e, product.id))?;
            apply_counter_delta(&txn, product.id, delta).await?;
        }

        stock_movement::Entity::delete_by_id(movement_id)
            .exec(&txn)
            .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit stock movement removal");
            ServiceError::db_error(e)
        })?;

        counter!("stock_ledger.movement.removed", 1);
        self.event_sender
            .send_or_log(Event::StockMovementRemoved {
                movement_id,
                product_id: existing.product_id,
                counters_reversed: reverse,
            })
            .await;

        info!(counters_reversed = reverse, "Removed stock movement");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_movement(
        &self,
        movement_id: Uuid,
    ) -> Result<stock_movement::Model, ServiceError> {
        find_movement(&*self.db, movement_id).await
    }

    /// Lists movements in creation order.
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        filter: MovementFilter,
        pagination: PaginationParams,
    ) -> Result<PaginatedResponse<stock_movement::Model>, ServiceError> {
        let (page, limit) = pagination.resolve(&self.config);
        let paginator = movement_query(filter).paginate(&*self.db, limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Database error when counting stock movements");
            ServiceError::db_error(e)
        })?;
        let movements = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(page = %page, limit = %limit, error = %e, "Database error when fetching stock movements");
            ServiceError::db_error(e)
        })?;

        Ok(PaginatedResponse::new(movements, page, limit, total))
    }

    /// Same page as [`list_movements`](Self::list_movements), with each
    /// movement's product joined in and its vendor batch-loaded.
    #[instrument(skip(self))]
    pub async fn list_movement_details(
        &self,
        filter: MovementFilter,
        pagination: PaginationParams,
    ) -> Result<PaginatedResponse<MovementDetail>, ServiceError> {
        let (page, limit) = pagination.resolve(&self.config);
        let db = &*self.db;
        let paginator = movement_query(filter)
            .find_also_related(product::Entity)
            .paginate(db, limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Database error when counting stock movements");
            ServiceError::db_error(e)
        })?;
        let rows = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(page = %page, limit = %limit, error = %e, "Database error when fetching stock movements");
            ServiceError::db_error(e)
        })?;

        let mut vendor_ids: Vec<Uuid> = rows.iter().map(|(m, _)| m.vendor_id).collect();
        vendor_ids.sort_unstable();
        vendor_ids.dedup();
        let vendors: HashMap<Uuid, vendor::Model> = if vendor_ids.is_empty() {
            HashMap::new()
        } else {
            vendor::Entity::find()
                .filter(vendor::Column::Id.is_in(vendor_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|v| (v.id, v))
                .collect()
        };

        let items = rows
            .into_iter()
            .map(|(movement, product)| MovementDetail {
                vendor: vendors.get(&movement.vendor_id).cloned(),
                movement,
                product,
            })
            .collect();

        Ok(PaginatedResponse::new(items, page, limit, total))
    }

    /// Replays a product's movements from zero and compares the result with its live counters.
    #[instrument(skip(self))]
    pub async fn reconcile_product(
        &self,
        product_id: Uuid,
    ) -> Result<ReconciliationReport, ServiceError> {
        let db = &*self.db;
        let product = product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let history = stock_movement::Entity::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .order_by_asc(stock_movement::Column::CreatedAt)
            .order_by_asc(stock_movement::Column::Id)
            .all(db)
            .await?;

        let live = product.counters();
        let movements_replayed = history.len();
        let (replayed, replay_error) =
            match StockCounters::replay(history.iter().map(|m| (m.movement_type, m.quantity))) {
                Ok(counters) => (counters, None),
                Err(failure) => {
                    let movement_id = history
                        .get(failure.index)
                        .map(|m| m.id.to_string())
                        .unwrap_or_default();
                    (
                        failure.counters,
                        Some(format!("movement {}: {}", movement_id, failure)),
                    )
                }
            };

        let matches = replay_error.is_none() && replayed == live;
        if !matches {
            warn!(
                ?live,
                ?replayed,
                replay_error = replay_error.as_deref().unwrap_or(""),
                "Stock counters diverge from movement history"
            );
            counter!("stock_ledger.reconciliation.mismatch", 1);
        }

        Ok(ReconciliationReport {
            product_id,
            live,
            replayed,
            matches,
            movements_replayed,
            replay_error,
        })
    }

    async fn publish_if_depleted(&self, product_id: Uuid, delta: StockDelta, after: StockCounters) {
        if delta.available_stock < 0 && after.available_stock == 0 {
            self.event_sender
                .send_or_log(Event::StockDepleted { product_id })
                .await;
        }
    }
}

fn movement_query(filter: MovementFilter) -> Select<stock_movement::Entity> {
    let mut query = stock_movement::Entity::find();
    if let Some(product_id) = filter.product_id {
        query = query.filter(stock_movement::Column::ProductId.eq(product_id));
    }
    if let Some(vendor_id) = filter.vendor_id {
        query = query.filter(stock_movement::Column::VendorId.eq(vendor_id));
    }
    query
        .order_by_asc(stock_movement::Column::CreatedAt)
        .order_by_asc(stock_movement::Column::Id)
}

fn rejected(err: CounterError, product_id: Uuid) -> ServiceError {
    if let CounterError::Insufficient {
        available,
        requested,
    } = &err
    {
        warn!(
            product_id = %product_id,
            available,
            requested,
            "Rejected stock movement: insufficient stock"
        );
        counter!("stock_ledger.movement.rejected", 1, "reason" => "insufficient_stock");
    }
    err.for_product(product_id)
}

async fn lock_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    product::Entity::find_by_id(product_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
}

async fn ensure_vendor<C: ConnectionTrait>(conn: &C, vendor_id: Uuid) -> Result<(), ServiceError> {
    vendor::Entity::find_by_id(vendor_id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| ServiceError::NotFound(format!("Vendor {} not found", vendor_id)))
}

async fn find_movement<C: ConnectionTrait>(
    conn: &C,
    movement_id: Uuid,
) -> Result<stock_movement::Model, ServiceError> {
    stock_movement::Entity::find_by_id(movement_id)
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Stock movement {} not found", movement_id))
        })
}

/// Adds `delta` to the product's counters in a single guarded `UPDATE`.
///
/// When the delta removes available stock the row only matches while
/// `available_stock` still covers it, so a concurrent writer that got there
/// first turns this into `InsufficientStock` instead of a negative balance.
async fn apply_counter_delta<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    delta: StockDelta,
) -> Result<(), ServiceError> {
    if delta.is_zero() {
        return Ok(());
    }

    let mut update = product::Entity::update_many()
        .col_expr(
            product::Column::TotalStock,
            Expr::col(product::Column::TotalStock).add(delta.total_stock),
        )
        .col_expr(
            product::Column::AvailableStock,
            Expr::col(product::Column::AvailableStock).add(delta.available_stock),
        )
        .col_expr(
            product::Column::QuantitySold,
            Expr::col(product::Column::QuantitySold).add(delta.quantity_sold),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id));

    let requested = delta.requested();
    if requested > 0 {
        update = update.filter(product::Column::AvailableStock.gte(requested));
    }

    let result = update.exec(conn).await?;
    if result.rows_affected == 0 {
        let current = product::Entity::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        return Err(rejected(
            CounterError::Insufficient {
                available: current.available_stock,
                requested,
            },
            product_id,
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn request(kind: &str) -> MovementRequest {
        MovementRequest {
            product_id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            movement_type: kind.to_string(),
            unit_price: dec!(5.00),
            quantity: 2,
            invoice_number: "INV-1".to_string(),
            notes: None,
        }
    }

    #[test]
    fn request_with_known_kind_converts() {
        let input = RecordMovementInput::try_from(request("restock")).unwrap();
        assert_eq!(input.movement_type, MovementKind::Restock);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn request_with_unknown_kind_is_rejected() {
        assert_matches!(
            RecordMovementInput::try_from(request("transfer")),
            Err(ServiceError::InvalidMovementKind(kind)) if kind == "transfer"
        );
    }

    #[test]
    fn input_bounds_are_validated() {
        let valid = RecordMovementInput::try_from(request("sell")).unwrap();

        let zero_quantity = RecordMovementInput {
            quantity: 0,
            ..valid.clone()
        };
        assert!(zero_quantity.validate().is_err());

        let free = RecordMovementInput {
            unit_price: Decimal::ZERO,
            ..valid.clone()
        };
        assert!(free.validate().is_err());

        let long_invoice = RecordMovementInput {
            invoice_number: "I".repeat(51),
            ..valid.clone()
        };
        assert!(long_invoice.validate().is_err());

        let empty_invoice = RecordMovementInput {
            invoice_number: String::new(),
            ..valid
        };
        assert!(empty_invoice.validate().is_err());
    }

    #[test]
    fn total_price_is_unit_price_times_quantity() {
        assert_eq!(total_price(dec!(2.50), 4).unwrap(), dec!(10.00));
        assert_eq!(total_price(dec!(0.01), 3).unwrap(), dec!(0.03));
    }
}
