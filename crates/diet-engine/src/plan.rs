use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    compose::{ComposeError, LineItem, Role},
    totals::{aggregate_day, aggregate_meal},
    FoodRecord, Nutrients,
};

/// A principal line item together with the equivalents that may replace it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealEntry {
    pub item: LineItem,
    #[serde(default)]
    pub equivalents: Vec<LineItem>,
}

impl MealEntry {
    pub fn new(item: LineItem) -> Self {
        Self { item, equivalents: Vec::new() }
    }

    /// The principal followed by all its equivalents.
    pub fn members(&self) -> impl Iterator<Item = &LineItem> {
        std::iter::once(&self.item).chain(self.equivalents.iter())
    }

    /// The member currently in effect, if any.
    pub fn selected(&self) -> Option<&LineItem> {
        self.members().find(|v| v.selected)
    }

    fn select(&mut self, selection: Selection) -> Result<(), PlanError> {
        if let Selection::Equivalent(i) = selection {
            if i >= self.equivalents.len() {
                return Err(PlanError::EquivalentOutOfRange { index: i, len: self.equivalents.len() });
            }
        }

        self.item.selected = selection == Selection::Principal;
        for (i, eq) in self.equivalents.iter_mut().enumerate() {
            eq.selected = selection == Selection::Equivalent(i);
        }
        Ok(())
    }
}

/// Which member of an entry is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Principal,
    Equivalent(usize),
}

impl From<Option<usize>> for Selection {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Selection::Principal, Selection::Equivalent)
    }
}

/// Addresses a single line item within a meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPath {
    Principal(usize),
    Equivalent { entry: usize, index: usize },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlanError {
    #[error("no entry at {index} (meal has {len})")]
    EntryOutOfRange { index: usize, len: usize },
    #[error("no equivalent at {index} (entry has {len})")]
    EquivalentOutOfRange { index: usize, len: usize },
    #[error("entry {index} is not a principal item")]
    NotAPrincipal { index: usize },
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub entries: Vec<MealEntry>,
    pub totals: Nutrients,
    #[serde(default)]
    pub notes: String,
}

impl Meal {
    pub fn new(entries: Vec<MealEntry>, notes: String) -> Self {
        Self { entries, totals: Nutrients::ZERO, notes }.recalculated()
    }

    pub fn recalculated(mut self) -> Self {
        self.totals = aggregate_meal(&self.entries);
        self
    }

    fn edit(
        &self, f: impl FnOnce(&mut Vec<MealEntry>) -> Result<(), PlanError>,
    ) -> Result<Self, PlanError> {
        let mut meal = self.clone();
        f(&mut meal.entries)?;
        Ok(meal.recalculated())
    }

    fn entry_mut(
        entries: &mut [MealEntry], index: usize,
    ) -> Result<&mut MealEntry, PlanError> {
        let len = entries.len();
        entries.get_mut(index).ok_or(PlanError::EntryOutOfRange { index, len })
    }

    pub fn entry(&self, index: usize) -> Result<&MealEntry, PlanError> {
        self.entries.get(index)
            .ok_or(PlanError::EntryOutOfRange { index, len: self.entries.len() })
    }

    pub fn item(&self, path: ItemPath) -> Result<&LineItem, PlanError> {
        match path {
            ItemPath::Principal(i) => Ok(&self.entry(i)?.item),
            ItemPath::Equivalent { entry, index } => {
                let target = self.entry(entry)?;
                target.equivalents.get(index)
                    .ok_or(PlanError::EquivalentOutOfRange { index, len: target.equivalents.len() })
            },
        }
    }

    /// Appends `item` as a new principal entry.
    pub fn with_entry(&self, mut item: LineItem) -> Self {
        item.role = Role::Principal;
        let mut meal = self.clone();
        meal.entries.push(MealEntry::new(item));
        meal.recalculated()
    }

    /// Appends `item` to the equivalents of entry `entry`, unselected.
    pub fn with_equivalent(
        &self, entry: usize, mut item: LineItem,
    ) -> Result<Self, PlanError> {
        item.role = Role::Equivalent;
        item.selected = false;

        self.edit(|entries| {
            let target = Self::entry_mut(entries, entry)?;
            if target.item.role != Role::Principal {
                return Err(PlanError::NotAPrincipal { index: entry });
            }
            target.equivalents.push(item);
            Ok(())
        })
    }

    /// Adds `food` as an equivalent of entry `entry`, sized to match the
    /// principal's current calories.
    pub fn with_equivalent_food(
        &self, entry: usize, food: &FoodRecord,
    ) -> Result<Self, PlanError> {
        let target_kcal = self.entry(entry)?.item.kcal();
        let item = LineItem::equivalent_for(food, target_kcal)?;
        self.with_equivalent(entry, item)
    }

    /// Replaces the item at `path`. Role, selection and a principal's
    /// equivalents stay as they were.
    pub fn with_item(&self, path: ItemPath, mut item: LineItem) -> Result<Self, PlanError> {
        self.edit(|entries| {
            let slot = match path {
                ItemPath::Principal(i) => &mut Self::entry_mut(entries, i)?.item,
                ItemPath::Equivalent { entry, index } => {
                    let target = Self::entry_mut(entries, entry)?;
                    let len = target.equivalents.len();
                    target.equivalents.get_mut(index)
                        .ok_or(PlanError::EquivalentOutOfRange { index, len })?
                },
            };
            item.role = slot.role;
            item.selected = slot.selected;
            *slot = item;
            Ok(())
        })
    }

    /// Removes the item at `path`. Removing a principal drops its equivalents
    /// too. If the removed equivalent was selected the principal takes over.
    pub fn without(&self, path: ItemPath) -> Result<Self, PlanError> {
        self.edit(|entries| {
            match path {
                ItemPath::Principal(i) => {
                    let len = entries.len();
                    if i >= len {
                        return Err(PlanError::EntryOutOfRange { index: i, len });
                    }
                    entries.remove(i);
                },
                ItemPath::Equivalent { entry, index } => {
                    let target = Self::entry_mut(entries, entry)?;
                    let len = target.equivalents.len();
                    if index >= len {
                        return Err(PlanError::EquivalentOutOfRange { index, len });
                    }
                    if target.equivalents.remove(index).selected {
                        target.item.selected = true;
                    }
                },
            }
            Ok(())
        })
    }

    /// Marks one member of entry `entry` as selected and clears the rest.
    pub fn with_selection(
        &self, entry: usize, selection: Selection,
    ) -> Result<Self, PlanError> {
        self.edit(|entries| Self::entry_mut(entries, entry)?.select(selection))
    }

    pub fn with_notes(&self, notes: impl Into<String>) -> Self {
        Self { notes: notes.into(), ..self.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealSlot {
    #[serde(alias = "colazione")]
    Breakfast,
    #[serde(alias = "spuntino")]
    MorningSnack,
    #[serde(alias = "pranzo")]
    Lunch,
    #[serde(alias = "merenda")]
    AfternoonSnack,
    #[serde(alias = "cena")]
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 5] = [
        MealSlot::Breakfast, MealSlot::MorningSnack, MealSlot::Lunch,
        MealSlot::AfternoonSnack, MealSlot::Dinner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::MorningSnack => "morning_snack",
            MealSlot::Lunch => "lunch",
            MealSlot::AfternoonSnack => "afternoon_snack",
            MealSlot::Dinner => "dinner",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five-meal plan of one patient.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDiet {
    pub breakfast: Meal,
    pub morning_snack: Meal,
    pub lunch: Meal,
    pub afternoon_snack: Meal,
    pub dinner: Meal,
    pub totals: Nutrients,
    #[serde(default)]
    pub notes: String,
}

impl DailyDiet {
    /// Five empty meals, all totals zero.
    pub fn empty() -> Self { Self::default() }

    pub fn meal(&self, slot: MealSlot) -> &Meal {
        match slot {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::MorningSnack => &self.morning_snack,
            MealSlot::Lunch => &self.lunch,
            MealSlot::AfternoonSnack => &self.afternoon_snack,
            MealSlot::Dinner => &self.dinner,
        }
    }

    fn meal_mut(&mut self, slot: MealSlot) -> &mut Meal {
        match slot {
            MealSlot::Breakfast => &mut self.breakfast,
            MealSlot::MorningSnack => &mut self.morning_snack,
            MealSlot::Lunch => &mut self.lunch,
            MealSlot::AfternoonSnack => &mut self.afternoon_snack,
            MealSlot::Dinner => &mut self.dinner,
        }
    }

    pub fn meals(&self) -> impl Iterator<Item = (MealSlot, &Meal)> {
        MealSlot::ALL.into_iter().map(|v| (v, self.meal(v)))
    }

    /// Recomputes every meal total and the daily total.
    pub fn recalculated(mut self) -> Self {
        for slot in MealSlot::ALL {
            let meal = std::mem::take(self.meal_mut(slot));
            *self.meal_mut(slot) = meal.recalculated();
        }
        self.totals = aggregate_day(self.meals().map(|(_, m)| m));
        self
    }

    pub fn with_meal(&self, slot: MealSlot, meal: Meal) -> Self {
        let mut diet = self.clone();
        *diet.meal_mut(slot) = meal.recalculated();
        diet.totals = aggregate_day(diet.meals().map(|(_, m)| m));
        diet
    }

    /// Applies a fallible edit to the meal in `slot`.
    pub fn try_with_meal(
        &self, slot: MealSlot,
        f: impl FnOnce(&Meal) -> Result<Meal, PlanError>,
    ) -> Result<Self, PlanError> {
        Ok(self.with_meal(slot, f(self.meal(slot))?))
    }

    pub fn with_notes(&self, notes: impl Into<String>) -> Self {
        Self { notes: notes.into(), ..self.clone() }
    }

    /// Copies `slot` from `source`. The current notes are kept when the
    /// imported meal has none.
    pub fn with_imported_meal(&self, slot: MealSlot, source: &DailyDiet) -> Self {
        let mut meal = source.meal(slot).clone();
        if meal.notes.trim().is_empty() {
            meal.notes = self.meal(slot).notes.clone();
        }
        self.with_meal(slot, meal)
    }

    /// Imports from another patient's diet. With no `slots` the whole diet
    /// is taken, otherwise only the listed meals are copied and the others
    /// are left empty.
    pub fn with_imported_diet(&self, source: &DailyDiet, slots: &[MealSlot]) -> Self {
        let mut diet = if slots.is_empty() {
            source.clone()
        } else {
            let mut diet = DailyDiet::empty();
            for slot in slots {
                *diet.meal_mut(*slot) = source.meal(*slot).clone();
            }
            diet
        };

        diet.notes = if self.notes.trim().is_empty() {
            source.notes.clone()
        } else {
            self.notes.clone()
        };

        diet.recalculated()
    }
}
