use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One recorded change to a product's stock.
///
/// `total_price` is computed as `unit_price * quantity` when the row is written
/// and is never used to derive the other two.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub movement_type: MovementKind,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub unit_price: Decimal,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub total_price: Decimal,
    pub invoice_number: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::vendor::Entity",
        from = "Column::VendorId",
        to = "super::vendor::Column::Id"
    )]
    Vendor,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::vendor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vendor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Kind of stock movement, stored as its lowercase name
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "sell")]
    Sell,
    #[sea_orm(string_value = "return")]
    Return,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "damage")]
    Damage,
    #[sea_orm(string_value = "restock")]
    Restock,
}

/// Direction in which a movement kind moves stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementClass {
    /// Adds to total and available stock
    Inbound,
    /// Takes from available stock and counts as sold
    Outbound,
}

impl MovementKind {
    pub const ALL: [MovementKind; 6] = [
        MovementKind::Purchase,
        MovementKind::Sell,
        MovementKind::Return,
        MovementKind::Adjustment,
        MovementKind::Damage,
        MovementKind::Restock,
    ];

    pub fn class(self) -> MovementClass {
        match self {
            MovementKind::Purchase | MovementKind::Return | MovementKind::Restock => {
                MovementClass::Inbound
            }
            // adjustment is outbound-only; there is no positive adjustment
            MovementKind::Sell | MovementKind::Damage | MovementKind::Adjustment => {
                MovementClass::Outbound
            }
        }
    }

    pub fn is_outbound(self) -> bool {
        self.class() == MovementClass::Outbound
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Purchase => "purchase",
            MovementKind::Sell => "sell",
            MovementKind::Return => "return",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Damage => "damage",
            MovementKind::Restock => "restock",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ServiceError::InvalidMovementKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sea_orm::Iterable;

    #[test]
    fn every_kind_has_exactly_one_class() {
        let inbound: Vec<_> = MovementKind::iter()
            .filter(|k| k.class() == MovementClass::Inbound)
            .collect();
        let outbound: Vec<_> = MovementKind::iter().filter(|k| k.is_outbound()).collect();

        assert_eq!(
            inbound,
            vec![
                MovementKind::Purchase,
                MovementKind::Return,
                MovementKind::Restock
            ]
        );
        assert_eq!(
            outbound,
            vec![
                MovementKind::Sell,
                MovementKind::Adjustment,
                MovementKind::Damage
            ]
        );
    }

    #[test]
    fn parses_stored_names() {
        for kind in MovementKind::iter() {
            assert_eq!(kind.as_str().parse::<MovementKind>().unwrap(), kind);
            assert_eq!(kind.to_value(), kind.as_str());
        }
    }

    #[test]
    fn rejects_unknown_and_mixed_case_names() {
        assert_matches!(
            "transfer".parse::<MovementKind>(),
            Err(ServiceError::InvalidMovementKind(s)) if s == "transfer"
        );
        assert_matches!(
            "Sell".parse::<MovementKind>(),
            Err(ServiceError::InvalidMovementKind(_))
        );
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(
            serde_json::to_string(&MovementKind::Restock).unwrap(),
            "\"restock\""
        );
        let kind: MovementKind = serde_json::from_str("\"damage\"").unwrap();
        assert_eq!(kind, MovementKind::Damage);
    }
}
