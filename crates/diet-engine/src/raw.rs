//! Lenient shapes for diet documents coming from storage or from another
//! patient's plan.
//!
//! Accepts the current field names as well as the older Italian ones
//! (`colazione`, `alimenti`, `quantita`, `tipo`, `equivalenti`, ...). Missing
//! or mistyped values fall back to zero / empty, stored totals are ignored
//! and recomputed on conversion.

use std::fmt;

use serde::{
    de::{value::MapAccessDeserializer, MapAccess, Visitor},
    Deserialize, Deserializer,
};

use crate::{
    compose::{LineItem, Role, DEFAULT_UNIT},
    plan::{DailyDiet, Meal, MealEntry},
    Nutrients,
};

/// Either a well-typed value or anything else, which is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Loose<T> {
    Valid(T),
    Invalid(serde::de::IgnoredAny),
}

impl<T> Loose<T> {
    pub fn valid(self) -> Option<T> {
        match self {
            Loose::Valid(v) => Some(v),
            Loose::Invalid(_) => None,
        }
    }
}

trait LooseExt<T> {
    fn valid(self) -> Option<T>;
}

impl<T> LooseExt<T> for Option<Loose<T>> {
    fn valid(self) -> Option<T> { self.and_then(Loose::valid) }
}

fn number(v: Option<Loose<f64>>) -> f64 {
    v.valid().filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn list<T>(v: Option<Loose<Vec<Loose<T>>>>) -> Vec<T> {
    v.valid().unwrap_or_default().into_iter().flat_map(Loose::valid).collect()
}

/// A whole diet document. Unlike the nested shapes it has to be an object,
/// anything else is an error rather than an empty diet.
#[derive(Debug, Default, Deserialize)]
#[serde(default, remote = "Self")]
pub struct RawDiet {
    #[serde(alias = "colazione")]
    pub breakfast: Option<Loose<RawMeal>>,
    #[serde(alias = "spuntino")]
    pub morning_snack: Option<Loose<RawMeal>>,
    #[serde(alias = "pranzo")]
    pub lunch: Option<Loose<RawMeal>>,
    #[serde(alias = "merenda")]
    pub afternoon_snack: Option<Loose<RawMeal>>,
    #[serde(alias = "cena")]
    pub dinner: Option<Loose<RawMeal>>,
    #[serde(alias = "note")]
    pub notes: Option<Loose<String>>,
}

impl<'de> Deserialize<'de> for RawDiet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DietVisitor;

        impl<'de> Visitor<'de> for DietVisitor {
            type Value = RawDiet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a diet object")
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<RawDiet, A::Error> {
                RawDiet::deserialize(MapAccessDeserializer::new(map))
            }
        }

        deserializer.deserialize_map(DietVisitor)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawMeal {
    #[serde(alias = "alimenti")]
    pub entries: Option<Loose<Vec<Loose<RawEntry>>>>,
    #[serde(alias = "note")]
    pub notes: Option<Loose<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    /// `{ "item": {..}, "equivalents": [..] }`
    Nested {
        item: RawLineItem,
        #[serde(default)]
        equivalents: Option<Loose<Vec<Loose<RawLineItem>>>>,
    },
    /// a single item, equivalents nested under `equivalenti`
    Flat(RawLineItem),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawRole {
    #[serde(alias = "principale")]
    Principal,
    #[serde(alias = "equivalente")]
    Equivalent,
}

impl From<RawRole> for Role {
    fn from(value: RawRole) -> Self {
        match value {
            RawRole::Principal => Role::Principal,
            RawRole::Equivalent => Role::Equivalent,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawNutrients {
    pub kcal: Option<Loose<f64>>,
    #[serde(alias = "proteine")]
    pub protein: Option<Loose<f64>>,
    #[serde(alias = "lipidi")]
    pub fat: Option<Loose<f64>>,
    #[serde(alias = "carboidrati")]
    pub carbohydrate: Option<Loose<f64>>,
    #[serde(alias = "fibre")]
    pub fiber: Option<Loose<f64>>,
}

impl From<RawNutrients> for Nutrients {
    fn from(v: RawNutrients) -> Self {
        Nutrients {
            kcal: number(v.kcal),
            protein: number(v.protein),
            fat: number(v.fat),
            carbohydrate: number(v.carbohydrate),
            fiber: number(v.fiber),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawLineItem {
    #[serde(alias = "id")]
    pub food_id: Option<Loose<i64>>,
    #[serde(alias = "nome")]
    pub name: Option<Loose<String>>,
    #[serde(alias = "quantita")]
    pub quantity: Option<Loose<f64>>,
    #[serde(alias = "unita")]
    pub unit: Option<Loose<String>>,
    pub nutrients: Option<Loose<RawNutrients>>,
    pub kcal: Option<Loose<f64>>,
    #[serde(alias = "proteine")]
    pub protein: Option<Loose<f64>>,
    #[serde(alias = "lipidi")]
    pub fat: Option<Loose<f64>>,
    #[serde(alias = "carboidrati")]
    pub carbohydrate: Option<Loose<f64>>,
    #[serde(alias = "fibre")]
    pub fiber: Option<Loose<f64>>,
    #[serde(alias = "tipo")]
    pub role: Option<Loose<RawRole>>,
    #[serde(alias = "parentId")]
    pub parent_id: Option<Loose<f64>>,
    pub selected: Option<Loose<bool>>,
    #[serde(alias = "equivalenti")]
    pub equivalents: Option<Loose<Vec<Loose<RawLineItem>>>>,
}

impl RawLineItem {
    fn into_item(self, role: Role) -> LineItem {
        let nutrients = match self.nutrients.valid() {
            Some(nested) => nested.into(),
            None => Nutrients {
                kcal: number(self.kcal),
                protein: number(self.protein),
                fat: number(self.fat),
                carbohydrate: number(self.carbohydrate),
                fiber: number(self.fiber),
            },
        };

        LineItem {
            food_id: self.food_id.valid().unwrap_or(0),
            name: self.name.valid().unwrap_or_default(),
            quantity: number(self.quantity),
            unit: self.unit.valid()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            nutrients,
            role,
            selected: self.selected.valid().unwrap_or(role == Role::Principal),
        }
    }
}

/// Leaves exactly one selected member in an entry, preferring the first
/// selected one and falling back to the principal.
fn normalize_selection(entry: &mut MealEntry) {
    if entry.equivalents.is_empty() { return }

    let first = entry.members().position(|v| v.selected).unwrap_or(0);
    entry.item.selected = first == 0;
    for (i, eq) in entry.equivalents.iter_mut().enumerate() {
        eq.selected = first == i + 1;
    }
}

impl RawEntry {
    fn into_entry(self) -> Option<MealEntry> {
        let (item, equivalents) = match self {
            RawEntry::Nested { item, equivalents } => (item, equivalents),
            RawEntry::Flat(mut item) => {
                let equivalents = item.equivalents.take();
                (item, equivalents)
            },
        };

        let role = item.role.clone().valid().map(Role::from).unwrap_or(Role::Principal);
        let linked = item.parent_id.clone().valid().is_some();
        let item = item.into_item(role);

        if role == Role::Equivalent && linked {
            tracing::warn!("dropping loose equivalent '{}', it belongs inside its principal", item.name);
            return None;
        }

        let equivalents = list(equivalents);
        let mut entry = MealEntry::new(item);
        if role == Role::Equivalent {
            if !equivalents.is_empty() {
                tracing::warn!("dropping {} equivalents nested under equivalent '{}'", equivalents.len(), entry.item.name);
            }
        } else {
            entry.equivalents = equivalents.into_iter()
                .map(|v| v.into_item(Role::Equivalent))
            .collect();
            normalize_selection(&mut entry);
        }

        Some(entry)
    }
}

impl From<RawMeal> for Meal {
    fn from(value: RawMeal) -> Self {
        let entries = list(value.entries).into_iter()
            .flat_map(RawEntry::into_entry)
        .collect();
        Meal::new(entries, value.notes.valid().unwrap_or_default())
    }
}

fn meal(v: Option<Loose<RawMeal>>) -> Meal {
    v.valid().map(Meal::from).unwrap_or_default()
}

impl From<RawDiet> for DailyDiet {
    fn from(value: RawDiet) -> Self {
        DailyDiet {
            breakfast: meal(value.breakfast),
            morning_snack: meal(value.morning_snack),
            lunch: meal(value.lunch),
            afternoon_snack: meal(value.afternoon_snack),
            dinner: meal(value.dinner),
            totals: Nutrients::ZERO,
            notes: value.notes.valid().unwrap_or_default(),
        }.recalculated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::MealSlot;

    fn parse(json: &str) -> DailyDiet {
        serde_json::from_str::<RawDiet>(json).unwrap().into()
    }

    #[test]
    fn legacy_document() {
        let diet = parse(r#"{
            "colazione": {
                "alimenti": [
                    { "id": 3, "nome": "Latte", "quantita": 200, "unita": "ml",
                      "kcal": 120, "proteine": 6.8, "lipidi": 6.4, "carboidrati": 9.6, "fibre": 0,
                      "tipo": "principale", "selected": false,
                      "equivalenti": [
                        { "id": 4, "nome": "Yogurt", "quantita": 190, "unita": "g",
                          "kcal": 130, "proteine": 7, "lipidi": 6, "carboidrati": 10, "fibre": 0,
                          "tipo": "equivalente", "parentId": 3, "selected": true }
                      ] },
                    { "id": 4, "nome": "Yogurt", "tipo": "equivalente", "parentId": 3, "kcal": 999 }
                ],
                "totale_kcal": 12345,
                "note": "senza zucchero"
            },
            "pranzo": "not a meal",
            "totale_giornaliero": { "totale_kcal": 1 },
            "note": "generale"
        }"#);

        let entry = &diet.breakfast.entries[0];
        assert_eq!(diet.breakfast.entries.len(), 1);
        assert_eq!(entry.item.name, "Latte");
        assert_eq!(entry.item.unit, "ml");
        assert_eq!(entry.item.role, Role::Principal);
        assert_eq!(entry.equivalents[0].role, Role::Equivalent);
        assert!(entry.equivalents[0].selected);
        assert!(!entry.item.selected);
        assert_eq!(diet.breakfast.notes, "senza zucchero");
        assert_eq!(diet.breakfast.totals.kcal, 125.0);
        assert_eq!(diet.lunch, Meal::default());
        assert_eq!(diet.totals.kcal, 125.0);
        assert_eq!(diet.notes, "generale");
    }

    #[test]
    fn mistyped_values_become_zero() {
        let diet = parse(r#"{
            "cena": { "alimenti": [
                { "id": 1, "nome": "Pane", "quantita": "tanto", "kcal": "250", "proteine": null,
                  "lipidi": 2, "tipo": "principale" },
                42
            ] }
        }"#);
        let item = &diet.dinner.entries[0].item;
        assert_eq!(diet.dinner.entries.len(), 1);
        assert_eq!(item.quantity, 0.0);
        assert_eq!(item.nutrients, Nutrients { fat: 2.0, ..Nutrients::ZERO });
        assert!(item.selected);
        assert_eq!(item.unit, "g");
    }

    #[test]
    fn missing_everything_is_an_empty_diet() {
        assert_eq!(parse("{}"), DailyDiet::empty());
    }

    #[test]
    fn diet_must_be_an_object() {
        for json in ["[]", "null", "3", r#""colazione""#] {
            assert!(serde_json::from_str::<RawDiet>(json).is_err(), "{json}");
        }
        assert!(serde_json::from_str::<Option<RawDiet>>("null").unwrap().is_none());
    }

    #[test]
    fn orphan_equivalent_keeps_its_flag() {
        let diet = parse(r#"{ "merenda": { "alimenti": [
            { "id": 9, "nome": "Mela", "kcal": 52, "tipo": "equivalente", "selected": true },
            { "id": 10, "nome": "Pera", "kcal": 57, "tipo": "equivalente" }
        ] } }"#);
        let meal = diet.meal(MealSlot::AfternoonSnack);
        assert_eq!(meal.entries.len(), 2);
        assert_eq!(meal.totals.kcal, 52.0);
    }

    #[test]
    fn selection_is_repaired() {
        let diet = parse(r#"{ "lunch": { "entries": [
            { "item": { "food_id": 1, "name": "Riso", "quantity": 80,
                        "nutrients": { "kcal": 280 }, "role": "principal", "selected": true },
              "equivalents": [
                { "food_id": 2, "name": "Pasta", "nutrients": { "kcal": 290 }, "selected": true },
                { "food_id": 3, "name": "Farro", "nutrients": { "kcal": 270 } }
              ] }
        ] } }"#);
        let entry = &diet.lunch.entries[0];
        assert_eq!(entry.members().filter(|v| v.selected).count(), 1);
        assert!(entry.item.selected);
        assert_eq!(diet.lunch.totals.kcal, 280.0);
    }

    #[test]
    fn canonical_document_survives() {
        let food = crate::compose::tests::food(1, 200.0, 10.0, 5.0, 20.0, 2.0);
        let diet = DailyDiet::empty()
            .try_with_meal(MealSlot::Lunch, |m| {
                m.with_entry(LineItem::from_food(&food, 150.0, Role::Principal))
                    .with_equivalent_food(0, &crate::compose::tests::food(2, 100.0, 1.0, 1.0, 1.0, 1.0))
            }).unwrap()
            .with_notes("ok");

        let json = serde_json::to_string(&diet).unwrap();
        assert_eq!(parse(&json), diet);
    }
}
