//! Diet composition: turning catalogue foods into meal line items, grouping
//! principals with their equivalents and computing meal and daily totals.

pub mod compose;
pub mod edit;
pub mod food;
pub mod nutrients;
pub mod plan;
pub mod raw;
pub mod totals;

pub use compose::{equivalent_quantity_for, ComposeError, LineItem, Role};
pub use edit::{rescale_on_quantity_change, EditSession};
pub use food::{FoodDraft, FoodDraftError, FoodRecord};
pub use nutrients::{Nutrient, Nutrients};
pub use plan::{DailyDiet, ItemPath, Meal, MealEntry, MealSlot, PlanError, Selection};
pub use totals::{aggregate_day, aggregate_meal};
