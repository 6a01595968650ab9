//! Stock counter arithmetic, independent of any datastore.
//!
//! A product's counters are the left fold of its movements, starting from
//! [`StockCounters::ZERO`]. The ledger applies one [`StockDelta`] per movement
//! and reconciliation replays the whole history through the same code.

use crate::entities::stock_movement::{MovementClass, MovementKind};
use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCounters {
    pub total_stock: i32,
    pub available_stock: i32,
    pub quantity_sold: i32,
}

/// Signed change to each counter produced by one or more movements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockDelta {
    pub total_stock: i32,
    pub available_stock: i32,
    pub quantity_sold: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    #[error("available {available}, requested {requested}")]
    Insufficient { available: i32, requested: i32 },

    #[error("{field} would become negative")]
    Negative { field: &'static str },

    #[error("{field} overflowed")]
    Overflow { field: &'static str },
}

impl CounterError {
    /// Attaches the product the counters belong to.
    pub fn for_product(self, product_id: Uuid) -> ServiceError {
        match self {
            CounterError::Insufficient {
                available,
                requested,
            } => ServiceError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            other => ServiceError::InternalError(format!(
                "Stock counters for product {} inconsistent: {}",
                product_id, other
            )),
        }
    }
}

impl StockDelta {
    /// Effect of a single movement of `quantity` units.
    pub fn of(kind: MovementKind, quantity: i32) -> Self {
        match kind.class() {
            MovementClass::Inbound => StockDelta {
                total_stock: quantity,
                available_stock: quantity,
                quantity_sold: 0,
            },
            MovementClass::Outbound => StockDelta {
                total_stock: 0,
                available_stock: -quantity,
                quantity_sold: quantity,
            },
        }
    }

    /// Delta that exactly undoes `self`.
    pub fn inverse(self) -> Self {
        StockDelta {
            total_stock: -self.total_stock,
            available_stock: -self.available_stock,
            quantity_sold: -self.quantity_sold,
        }
    }

    /// Sum of two deltas, checked.
    pub fn combine(self, other: StockDelta) -> Result<Self, CounterError> {
        Ok(StockDelta {
            total_stock: checked(self.total_stock, other.total_stock, "total_stock")?,
            available_stock: checked(
                self.available_stock,
                other.available_stock,
                "available_stock",
            )?,
            quantity_sold: checked(self.quantity_sold, other.quantity_sold, "quantity_sold")?,
        })
    }

    /// Units this delta takes out of available stock, zero when it adds stock.
    pub fn requested(self) -> i32 {
        if self.available_stock < 0 {
            self.available_stock.saturating_neg()
        } else {
            0
        }
    }

    pub fn is_zero(self) -> bool {
        self == StockDelta::default()
    }
}

impl StockCounters {
    pub const ZERO: StockCounters = StockCounters {
        total_stock: 0,
        available_stock: 0,
        quantity_sold: 0,
    };

    /// Applies one movement, refusing outbound movements larger than available stock.
    pub fn apply(self, kind: MovementKind, quantity: i32) -> Result<Self, CounterError> {
        self.apply_delta(StockDelta::of(kind, quantity))
    }

    /// Undoes one movement previously applied with [`StockCounters::apply`].
    pub fn reverse(self, kind: MovementKind, quantity: i32) -> Result<Self, CounterError> {
        self.apply_delta(StockDelta::of(kind, quantity).inverse())
    }

    pub fn apply_delta(self, delta: StockDelta) -> Result<Self, CounterError> {
        let available = checked(
            self.available_stock,
            delta.available_stock,
            "available_stock",
        )?;
        if available < 0 {
            return Err(CounterError::Insufficient {
                available: self.available_stock,
                requested: delta.requested(),
            });
        }

        let total = checked(self.total_stock, delta.total_stock, "total_stock")?;
        let sold = checked(self.quantity_sold, delta.quantity_sold, "quantity_sold")?;
        if total < 0 {
            return Err(CounterError::Negative {
                field: "total_stock",
            });
        }
        if sold < 0 {
            return Err(CounterError::Negative {
                field: "quantity_sold",
            });
        }

        Ok(StockCounters {
            total_stock: total,
            available_stock: available,
            quantity_sold: sold,
        })
    }

    /// Folds a movement history from zero counters.
    ///
    /// On failure returns the zero-based index of the offending movement, the
    /// counters reached just before it, and the error.
    pub fn replay<I>(movements: I) -> Result<Self, ReplayFailure>
    where
        I: IntoIterator<Item = (MovementKind, i32)>,
    {
        let mut counters = StockCounters::ZERO;
        for (index, (kind, quantity)) in movements.into_iter().enumerate() {
            counters = counters
                .apply(kind, quantity)
                .map_err(|error| ReplayFailure {
                    index,
                    counters,
                    error,
                })?;
        }
        Ok(counters)
    }
}

/// Where a replay stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("movement #{index} cannot be applied: {error}")]
pub struct ReplayFailure {
    pub index: usize,
    pub counters: StockCounters,
    pub error: CounterError,
}

fn checked(current: i32, change: i32, field: &'static str) -> Result<i32, CounterError> {
    current
        .checked_add(change)
        .ok_or(CounterError::Overflow { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn counters(total: i32, available: i32, sold: i32) -> StockCounters {
        StockCounters {
            total_stock: total,
            available_stock: available,
            quantity_sold: sold,
        }
    }

    #[test]
    fn purchase_from_zero() {
        let next = StockCounters::ZERO.apply(MovementKind::Purchase, 10).unwrap();
        assert_eq!(next, counters(10, 10, 0));
    }

    #[test]
    fn sell_within_stock() {
        let next = counters(10, 10, 0).apply(MovementKind::Sell, 3).unwrap();
        assert_eq!(next, counters(10, 7, 3));
    }

    #[test]
    fn sell_more_than_available_is_refused() {
        assert_matches!(
            counters(10, 7, 3).apply(MovementKind::Sell, 8),
            Err(CounterError::Insufficient {
                available: 7,
                requested: 8
            })
        );
    }

    #[test]
    fn damage_to_exactly_zero() {
        let next = counters(10, 7, 3).apply(MovementKind::Damage, 7).unwrap();
        assert_eq!(next, counters(10, 0, 10));
    }

    #[test]
    fn return_adds_to_total_and_available() {
        let next = counters(10, 0, 10).apply(MovementKind::Return, 2).unwrap();
        assert_eq!(next, counters(12, 2, 10));
    }

    #[test]
    fn adjustment_is_outbound() {
        assert_matches!(
            StockCounters::ZERO.apply(MovementKind::Adjustment, 1),
            Err(CounterError::Insufficient { .. })
        );
    }

    #[test]
    fn reverse_undoes_apply() {
        let start = counters(12, 2, 10);
        for kind in MovementKind::ALL {
            if let Ok(next) = start.apply(kind, 2) {
                assert_eq!(next.reverse(kind, 2).unwrap(), start, "{kind}");
            }
        }
    }

    #[test]
    fn reversing_consumed_inbound_is_refused() {
        // 10 purchased, 7 sold: undoing the purchase would leave -7 available
        let current = counters(10, 3, 7);
        assert_matches!(
            current.reverse(MovementKind::Purchase, 10),
            Err(CounterError::Insufficient {
                available: 3,
                requested: 10
            })
        );
    }

    #[test]
    fn overflow_is_an_error_not_wraparound() {
        let near_max = counters(i32::MAX - 1, i32::MAX - 1, 0);
        assert_matches!(
            near_max.apply(MovementKind::Purchase, 5),
            Err(CounterError::Overflow { .. })
        );
    }

    #[test]
    fn combined_delta_nets_out() {
        let undo_sell = StockDelta::of(MovementKind::Sell, 3).inverse();
        let net = undo_sell
            .combine(StockDelta::of(MovementKind::Sell, 5))
            .unwrap();
        assert_eq!(
            net,
            StockDelta {
                total_stock: 0,
                available_stock: -2,
                quantity_sold: 2
            }
        );
        assert_eq!(net.requested(), 2);
        assert!(undo_sell.combine(undo_sell.inverse()).unwrap().is_zero());
    }

    #[test]
    fn replay_matches_scenario_sequence() {
        let history = [
            (MovementKind::Purchase, 10),
            (MovementKind::Sell, 3),
            (MovementKind::Damage, 7),
            (MovementKind::Return, 2),
        ];
        assert_eq!(StockCounters::replay(history).unwrap(), counters(12, 2, 10));
    }

    #[test]
    fn replay_reports_first_failing_movement() {
        let history = [
            (MovementKind::Purchase, 2),
            (MovementKind::Sell, 1),
            (MovementKind::Sell, 5),
            (MovementKind::Purchase, 100),
        ];
        let failure = StockCounters::replay(history).unwrap_err();
        assert_eq!(failure.index, 2);
        assert_eq!(failure.counters, counters(2, 1, 1));
    }

    #[test]
    fn insufficient_maps_to_service_error_with_product() {
        let id = Uuid::new_v4();
        let err = CounterError::Insufficient {
            available: 1,
            requested: 4,
        }
        .for_product(id);
        assert_matches!(
            err,
            ServiceError::InsufficientStock { product_id, available: 1, requested: 4 } if product_id == id
        );
        assert_matches!(
            CounterError::Overflow {
                field: "total_stock"
            }
            .for_product(id),
            ServiceError::InternalError(_)
        );
    }
}
