//! Filament entity - A consumable material spool inventory row.
//!
//! `stock_grams` never goes negative: deductions clamp at zero and are
//! serialized by the filament's row lock.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Filament database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "filaments")]
pub struct Model {
    /// Unique identifier for the filament row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Material type (e.g. "PLA", "PETG", "ABS")
    pub material_type: String,
    /// Spool color
    pub color: String,
    /// Remaining stock in grams, never negative
    pub stock_grams: f64,
    /// Stock level at or below which a reorder is suggested
    pub reorder_level_grams: f64,
}

/// Defines relationships between Filament and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
