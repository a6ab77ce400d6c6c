use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One ingredient consumed by a recipe, in base units.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RecipeComponent {
    pub ingredient_id: String,
    pub quantity: Decimal,
}

/// A sellable item. Selling one unit consumes its recipe components; an
/// item with an empty recipe consumes nothing.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct InventoryItem {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub recipe: Vec<RecipeComponent>,
}

/// Stock of a single ingredient, split between already-open packages and
/// sealed stock. Open units are consumed first to minimize waste.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct IngredientStock {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub open_units: Decimal,
    pub sealed_units: Decimal,
    pub min_stock: Decimal,
}

impl IngredientStock {
    pub fn total(&self) -> Decimal {
        self.open_units + self.sealed_units
    }

    /// Consumes `quantity`, drawing from open units before sealed stock.
    /// Sealed stock may go negative; the returned shortfall is the amount
    /// that was not covered by available stock.
    pub fn consume(&mut self, quantity: Decimal) -> Decimal {
        let from_open = quantity.min(self.open_units);
        self.open_units -= from_open;
        let remainder = quantity - from_open;
        let shortfall = (remainder - self.sealed_units).max(Decimal::ZERO);
        self.sealed_units -= remainder;
        shortfall
    }
}

/// An ingredient that could not be fully covered during deduction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Shortage {
    pub ingredient_id: String,
    pub name: String,
    pub requested: Decimal,
    pub shortfall: Decimal,
}

/// Outcome of a stock deduction for an order.
#[derive(Debug, PartialEq, Clone)]
pub enum StockDeduction {
    /// Deduction ran; `shortages` lists ingredients that went below zero.
    Applied { shortages: Vec<Shortage> },
    /// The order's stock was already deducted by an earlier call.
    AlreadyDeducted,
}
