use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// The five tracked nutrient values.
///
/// Depending on context these are either per-100g rates (see
/// [`Nutrients::per_100`]) or absolute amounts for a given quantity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nutrients {
    pub kcal: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbohydrate: f64,
    pub fiber: f64,
}

/// Names a single nutrient field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient { Kcal, Protein, Fat, Carbohydrate, Fiber }

impl Nutrient {
    pub const ALL: [Nutrient; 5] = [
        Nutrient::Kcal, Nutrient::Protein, Nutrient::Fat,
        Nutrient::Carbohydrate, Nutrient::Fiber,
    ];
}

impl Nutrients {
    pub const ZERO: Nutrients = Nutrients {
        kcal: 0.0, protein: 0.0, fat: 0.0, carbohydrate: 0.0, fiber: 0.0,
    };

    pub fn get(&self, n: Nutrient) -> f64 {
        match n {
            Nutrient::Kcal => self.kcal,
            Nutrient::Protein => self.protein,
            Nutrient::Fat => self.fat,
            Nutrient::Carbohydrate => self.carbohydrate,
            Nutrient::Fiber => self.fiber,
        }
    }

    pub fn set(&mut self, n: Nutrient, value: f64) {
        let field = match n {
            Nutrient::Kcal => &mut self.kcal,
            Nutrient::Protein => &mut self.protein,
            Nutrient::Fat => &mut self.fat,
            Nutrient::Carbohydrate => &mut self.carbohydrate,
            Nutrient::Fiber => &mut self.fiber,
        };
        *field = value;
    }

    pub fn map(self, mut f: impl FnMut(f64) -> f64) -> Self {
        Self {
            kcal: f(self.kcal),
            protein: f(self.protein),
            fat: f(self.fat),
            carbohydrate: f(self.carbohydrate),
            fiber: f(self.fiber),
        }
    }

    pub fn scale(self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }

    /// Derives per-100 rates from absolute values at `quantity`.
    /// A zero quantity yields zero rates instead of dividing by zero.
    pub fn per_100(self, quantity: f64) -> Self {
        if quantity == 0.0 { return Self::ZERO }
        self.map(|v| v / quantity * 100.0)
    }

    /// Per-field arithmetic mean. Empty input yields zeros.
    pub fn mean<'a>(values: impl IntoIterator<Item = &'a Nutrients>) -> Self {
        let (sum, count) = values.into_iter()
            .fold((Self::ZERO, 0usize), |(sum, n), v| (sum + *v, n + 1));

        if count == 0 { Self::ZERO } else { sum.map(|v| v / count as f64) }
    }

    /// Rounds every field to one decimal place, half away from zero.
    pub fn round_tenths(self) -> Self {
        self.map(round_tenths)
    }

    /// Rounds every field to a whole unit, half away from zero.
    pub fn round_whole(self) -> Self {
        self.map(f64::round)
    }
}

pub fn round_tenths(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl Add for Nutrients {
    type Output = Nutrients;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            kcal: self.kcal + rhs.kcal,
            protein: self.protein + rhs.protein,
            fat: self.fat + rhs.fat,
            carbohydrate: self.carbohydrate + rhs.carbohydrate,
            fiber: self.fiber + rhs.fiber,
        }
    }
}

impl AddAssign for Nutrients {
    fn add_assign(&mut self, rhs: Self) { *self = *self + rhs }
}

impl std::iter::Sum for Nutrients {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}
