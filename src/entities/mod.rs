//! sea-orm entities for the stock ledger and its catalog collaborators.

pub mod product;
pub mod stock_movement;
pub mod vendor;
