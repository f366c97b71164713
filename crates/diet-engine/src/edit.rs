use crate::{compose::LineItem, Nutrient, Nutrients};

pub const MIN_QUANTITY: f64 = 1.0;

/// Rescales `item` to `new_quantity` (clamped to at least 1), with every
/// nutrient rounded to a whole unit.
///
/// `rates` are the per-100 rates captured when editing began. Without them
/// the rates are derived from the item as it is now.
pub fn rescale_on_quantity_change(
    item: &LineItem, new_quantity: f64,
    rates: Option<&Nutrients>,
) -> LineItem {
    let rates = rates.copied()
        .unwrap_or_else(|| item.nutrients.per_100(item.quantity));
    let quantity = new_quantity.max(MIN_QUANTITY);

    LineItem {
        quantity,
        nutrients: rates.scale(quantity / 100.0).round_whole(),
        ..item.clone()
    }
}

/// Editing state for one line item.
///
/// Captures the item's per-100 rates up front so repeated quantity changes
/// don't compound rounding.
#[derive(Debug, Clone)]
pub struct EditSession {
    item: LineItem,
    rates: Option<Nutrients>,
}

impl EditSession {
    pub fn begin(item: LineItem) -> Self {
        let rates = if item.quantity > 0.0 {
            Some(item.nutrients.per_100(item.quantity))
        } else {
            tracing::warn!("editing {} with quantity {}, rates unavailable", item.name, item.quantity);
            None
        };
        Self { item, rates }
    }

    pub fn item(&self) -> &LineItem { &self.item }

    pub fn rates(&self) -> Option<&Nutrients> { self.rates.as_ref() }

    /// Sets the quantity, rounded to whole grams, and recomputes all
    /// nutrients from the captured rates.
    pub fn set_quantity(&mut self, quantity: f64) -> &mut Self {
        if !quantity.is_finite() {
            tracing::warn!("ignoring non-finite quantity for {}", self.item.name);
            return self;
        }
        self.item = rescale_on_quantity_change(&self.item, quantity.round(), self.rates.as_ref());
        self
    }

    /// Overrides a single nutrient, nothing else changes.
    pub fn set_nutrient(&mut self, nutrient: Nutrient, value: f64) -> &mut Self {
        if value.is_finite() {
            self.item.nutrients.set(nutrient, value.round());
        }
        self
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.item.name = name.into();
        self
    }

    pub fn finish(self) -> LineItem { self.item }
}
