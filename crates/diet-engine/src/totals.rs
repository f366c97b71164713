use crate::{compose::Role, plan::{Meal, MealEntry}, Nutrients};

/// What a single entry adds to its meal's total.
///
/// An entry with equivalents counts as the per-nutrient mean of all its
/// members, no matter which one is selected. A lone principal counts as
/// itself, a lone equivalent only when selected.
pub fn entry_contribution(entry: &MealEntry) -> Nutrients {
    if !entry.equivalents.is_empty() {
        return Nutrients::mean(entry.members().map(|v| &v.nutrients));
    }

    match entry.item.role {
        Role::Principal => entry.item.nutrients,
        Role::Equivalent if entry.item.selected => entry.item.nutrients,
        Role::Equivalent => Nutrients::ZERO,
    }
}

/// Meal total, rounded to one decimal.
pub fn aggregate_meal(entries: &[MealEntry]) -> Nutrients {
    entries.iter()
        .map(entry_contribution)
        .sum::<Nutrients>()
    .round_tenths()
}

/// Sum of the stored meal totals, not re-rounded.
pub fn aggregate_day<'a>(meals: impl IntoIterator<Item = &'a Meal>) -> Nutrients {
    meals.into_iter().map(|v| v.totals).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compose::{tests::food, LineItem},
        plan::{DailyDiet, MealSlot, Selection},
    };

    fn item(kcal: f64, role: Role) -> LineItem {
        LineItem::from_food(&food(1, kcal, kcal / 10.0, kcal / 20.0, kcal / 5.0, 1.0), 100.0, role)
    }

    fn group(principal: f64, equivalents: &[f64]) -> MealEntry {
        let mut entry = MealEntry::new(item(principal, Role::Principal));
        entry.equivalents = equivalents.iter().map(|v| item(*v, Role::Equivalent)).collect();
        entry
    }

    #[test]
    fn group_counts_as_its_mean() {
        let totals = aggregate_meal(&[group(300.0, &[280.0, 320.0])]);
        assert_eq!(totals.kcal, 300.0);
        assert_eq!(totals.protein, 30.0);
    }

    #[test]
    fn selection_does_not_move_the_total() {
        let meal = Meal::default()
            .with_entry(item(100.0, Role::Principal))
            .with_entry(item(300.0, Role::Principal))
            .with_equivalent(1, item(280.0, Role::Equivalent)).unwrap()
            .with_equivalent(1, item(320.0, Role::Equivalent)).unwrap()
            .with_equivalent(1, item(10.0, Role::Equivalent)).unwrap();

        let base = meal.totals;
        for choice in [Selection::Principal, Selection::Equivalent(0), Selection::Equivalent(1), Selection::Equivalent(2)] {
            let selected = meal.with_selection(1, choice).unwrap();
            assert_eq!(selected.totals, base);
        }
        assert_eq!(base.kcal, 100.0 + (300.0 + 280.0 + 320.0 + 10.0) / 4.0);
    }

    #[test]
    fn orphan_equivalents_count_only_when_selected() {
        let mut chosen = MealEntry::new(item(50.0, Role::Equivalent));
        chosen.item.selected = true;
        let ignored = MealEntry::new(item(70.0, Role::Equivalent));

        let totals = aggregate_meal(&[MealEntry::new(item(100.0, Role::Principal)), chosen, ignored]);
        assert_eq!(totals.kcal, 150.0);
    }

    #[test]
    fn order_does_not_matter() {
        let entries = vec![
            group(123.4, &[111.1]),
            MealEntry::new(item(77.7, Role::Principal)),
            group(250.0, &[200.0, 260.0, 300.0]),
            MealEntry::new(item(33.32, Role::Principal)),
        ];
        let forward = aggregate_meal(&entries);
        let mut reversed = entries.clone();
        reversed.reverse();
        let mut rotated = entries.clone();
        rotated.rotate_left(1);

        assert_eq!(aggregate_meal(&reversed), forward);
        assert_eq!(aggregate_meal(&rotated), forward);
    }

    #[test]
    fn meal_totals_round_to_tenths() {
        let totals = aggregate_meal(&[group(100.0, &[100.0, 100.1])]);
        assert_eq!(totals.kcal, 100.0);
        let totals = aggregate_meal(&[MealEntry::new(item(33.36, Role::Principal))]);
        assert_eq!(totals.kcal, 33.4);
    }

    #[test]
    fn empty_day_is_zero() {
        let diet = DailyDiet::empty();
        assert_eq!(aggregate_day(diet.meals().map(|(_, m)| m)), Nutrients::ZERO);
        assert_eq!(diet.totals, Nutrients::ZERO);
    }

    #[test]
    fn day_is_sum_of_meals() {
        let lunch = Meal::default()
            .with_entry(item(300.0, Role::Principal))
            .with_entry(item(120.0, Role::Principal));
        let dinner = Meal::default()
            .with_entry(item(250.0, Role::Principal))
            .with_equivalent(0, item(270.0, Role::Equivalent)).unwrap();

        let diet = DailyDiet::empty()
            .with_meal(MealSlot::Lunch, lunch.clone())
            .with_meal(MealSlot::Dinner, dinner.clone());

        let expected = aggregate_meal(&lunch.entries) + aggregate_meal(&dinner.entries);
        assert_eq!(diet.totals, expected);
        assert_eq!(diet.totals.kcal, 680.0);
    }
}
