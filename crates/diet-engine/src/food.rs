use serde::{Deserialize, Serialize};

use crate::Nutrients;

/// A catalogued food. Nutrient values are per 100g, `None` means unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRecord {
    pub id: i64,
    pub name: String,
    pub kcal: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbohydrate: Option<f64>,
    pub fiber: Option<f64>,
    /// where the values were taken from
    pub source: Option<String>,
}

impl FoodRecord {
    /// Per-100g rates with unknown values read as zero.
    pub fn rates(&self) -> Nutrients {
        Nutrients {
            kcal: self.kcal.unwrap_or(0.0),
            protein: self.protein.unwrap_or(0.0),
            fat: self.fat.unwrap_or(0.0),
            carbohydrate: self.carbohydrate.unwrap_or(0.0),
            fiber: self.fiber.unwrap_or(0.0),
        }
    }
}

/// Request to add a food to the catalogue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoodDraft {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub kcal: Option<f64>,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub fat: Option<f64>,
    #[serde(default)]
    pub carbohydrate: Option<f64>,
    #[serde(default)]
    pub fiber: Option<f64>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FoodDraftError {
    #[error("food name must not be empty")]
    EmptyName,
    #[error("{field} must be a finite, non-negative number (got {value})")]
    InvalidNutrient { field: &'static str, value: f64 },
}

impl FoodDraft {
    pub fn validate(&self) -> Result<(), FoodDraftError> {
        if self.name.trim().is_empty() {
            return Err(FoodDraftError::EmptyName);
        }

        let fields = [
            ("kcal", self.kcal),
            ("protein", self.protein),
            ("fat", self.fat),
            ("carbohydrate", self.carbohydrate),
            ("fiber", self.fiber),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(FoodDraftError::InvalidNutrient { field, value });
                }
            }
        }

        Ok(())
    }

    /// Turns a validated draft into a record under `id`.
    pub fn into_record(self, id: i64) -> Result<FoodRecord, FoodDraftError> {
        self.validate()?;
        let source = self.source
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(FoodRecord {
            id,
            name: self.name.trim().to_string(),
            kcal: self.kcal,
            protein: self.protein,
            fat: self.fat,
            carbohydrate: self.carbohydrate,
            fiber: self.fiber,
            source,
        })
    }
}
