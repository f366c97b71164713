use serde::{Deserialize, Serialize};

use crate::{FoodRecord, Nutrients};

pub const DEFAULT_UNIT: &str = "g";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role { Principal, Equivalent }

/// One food placed into a meal, with absolute nutrient values for `quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// id of the food record this was made from, not unique within a meal
    pub food_id: i64,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub nutrients: Nutrients,
    pub role: Role,
    pub selected: bool,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ComposeError {
    #[error("food {food_id} has no calorie value, cannot be used as an equivalent")]
    NotSubstitutable { food_id: i64 },
}

impl LineItem {
    /// Scales the per-100g values of `food` to `quantity`.
    ///
    /// Unknown nutrients count as zero. Callers keep `quantity` at 1 or above,
    /// nothing is clamped here.
    pub fn from_food(food: &FoodRecord, quantity: f64, role: Role) -> Self {
        Self {
            food_id: food.id,
            name: food.name.clone(),
            quantity,
            unit: DEFAULT_UNIT.to_string(),
            nutrients: food.rates().scale(quantity / 100.0),
            role,
            selected: role == Role::Principal,
        }
    }

    /// Builds an equivalent of `food` matching `target_kcal`, with the
    /// quantity rounded to whole grams and at least 1.
    pub fn equivalent_for(
        food: &FoodRecord, target_kcal: f64,
    ) -> Result<Self, ComposeError> {
        let quantity = equivalent_quantity_for(food, target_kcal);
        if quantity == 0.0 {
            return Err(ComposeError::NotSubstitutable { food_id: food.id });
        }

        Ok(Self::from_food(food, quantity.round().max(1.0), Role::Equivalent))
    }

    pub fn kcal(&self) -> f64 { self.nutrients.kcal }
}

/// Grams of `food` needed to reach `target_kcal`.
///
/// Returns `0` when the food's calorie rate is unknown or zero, which means
/// the food cannot stand in for anything.
pub fn equivalent_quantity_for(food: &FoodRecord, target_kcal: f64) -> f64 {
    match food.kcal {
        Some(kcal) if kcal != 0.0 => target_kcal / kcal * 100.0,
        _ => 0.0,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn food(id: i64, kcal: f64, protein: f64, fat: f64, carbohydrate: f64, fiber: f64) -> FoodRecord {
        FoodRecord {
            id,
            name: format!("food {id}"),
            kcal: Some(kcal),
            protein: Some(protein),
            fat: Some(fat),
            carbohydrate: Some(carbohydrate),
            fiber: Some(fiber),
            source: None,
        }
    }

    fn unknown(id: i64) -> FoodRecord {
        FoodRecord {
            id, name: "mystery".into(),
            kcal: None, protein: None, fat: None, carbohydrate: None, fiber: None,
            source: None,
        }
    }

    #[test]
    fn scales_to_quantity() {
        let item = LineItem::from_food(&food(1, 200.0, 10.0, 5.0, 20.0, 2.0), 150.0, Role::Principal);
        assert_eq!(item.nutrients, Nutrients {
            kcal: 300.0, protein: 15.0, fat: 7.5, carbohydrate: 30.0, fiber: 3.0,
        });
        assert_eq!(item.unit, "g");
        assert!(item.selected);
    }

    #[test]
    fn unknown_values_scale_to_zero() {
        for q in [1.0, 37.5, 100.0, 2500.0] {
            let item = LineItem::from_food(&unknown(2), q, Role::Principal);
            assert_eq!(item.nutrients, Nutrients::ZERO);
        }
    }

    #[test]
    fn scaling_matches_formula() {
        let f = food(3, 123.0, 4.5, 6.7, 8.9, 1.2);
        for q in [1.0, 33.0, 100.0, 250.0] {
            let item = LineItem::from_food(&f, q, Role::Principal);
            assert_eq!(item.nutrients.kcal, 123.0 * (q / 100.0));
            assert_eq!(item.nutrients.fiber, 1.2 * (q / 100.0));
        }
    }

    #[test]
    fn equivalents_start_unselected() {
        let item = LineItem::from_food(&food(4, 100.0, 1.0, 1.0, 1.0, 1.0), 80.0, Role::Equivalent);
        assert_eq!(item.role, Role::Equivalent);
        assert!(!item.selected);
    }

    #[test]
    fn no_equivalent_without_calories() {
        assert_eq!(equivalent_quantity_for(&unknown(5), 300.0), 0.0);
        assert_eq!(equivalent_quantity_for(&food(6, 0.0, 1.0, 1.0, 1.0, 1.0), 300.0), 0.0);
        assert_eq!(
            LineItem::equivalent_for(&unknown(5), 300.0),
            Err(ComposeError::NotSubstitutable { food_id: 5 }),
        );
    }

    #[test]
    fn equivalent_quantity_inverts_scaling() {
        for (rate, target) in [(200.0, 300.0), (37.0, 120.0), (884.0, 45.0)] {
            let f = food(7, rate, 0.0, 0.0, 0.0, 0.0);
            let q = equivalent_quantity_for(&f, target);
            let item = LineItem::from_food(&f, q, Role::Equivalent);
            assert!((item.kcal() - target).abs() < 1e-9);
        }
    }

    #[test]
    fn rounded_equivalent_is_at_least_one_gram() {
        let oil = food(8, 900.0, 0.0, 100.0, 0.0, 0.0);
        let item = LineItem::equivalent_for(&oil, 2.0).unwrap();
        assert_eq!(item.quantity, 1.0);

        let bread = food(9, 250.0, 8.0, 1.0, 50.0, 3.0);
        let item = LineItem::equivalent_for(&bread, 300.0).unwrap();
        assert_eq!(item.quantity, 120.0);
        assert_eq!(item.kcal(), 300.0);
    }
}
