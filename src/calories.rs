//! Food label to calorie/category lookup.
//!
//! Lookups are total: unknown labels resolve to `0` calories and the
//! `"Unknown"` category instead of failing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category reported for labels the table does not know.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// One row of the calorie table (calories per average serving).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodInfo {
    pub label: String,
    pub calories: i64,
    pub category: String,
}

impl FoodInfo {
    pub fn new(label: &str, calories: i64, category: &str) -> Self {
        Self {
            label: label.to_string(),
            calories,
            category: category.to_string(),
        }
    }
}

/// Per-category totals produced by [`CalorieTable::nutritional_summary`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotals {
    pub count: usize,
    pub calories: i64,
    pub foods: Vec<String>,
}

/// Category groups in order of first occurrence.
pub type NutritionalSummary = Vec<(String, CategoryTotals)>;

#[derive(Clone, Debug)]
pub struct CalorieTable {
    foods: Vec<FoodInfo>,
}

impl CalorieTable {
    /// Built-in table covering the default model classes.
    pub fn builtin() -> Self {
        Self {
            foods: vec![
                FoodInfo::new("Apple", 95, "Fruit"),
                FoodInfo::new("Orange", 85, "Fruit"),
                FoodInfo::new("Banana", 105, "Fruit"),
                FoodInfo::new("Strawberry", 50, "Fruit"),
                FoodInfo::new("Cucumber", 16, "Vegetable"),
                FoodInfo::new("Pizza", 285, "Fast Food"),
                FoodInfo::new("Watermelon", 46, "Fruit"),
                FoodInfo::new("Bread", 80, "Grain"),
                FoodInfo::new("Broccoli", 25, "Vegetable"),
                FoodInfo::new("Carrot", 25, "Vegetable"),
            ],
        }
    }

    /// Builtin table with `overrides` replacing rows of the same label and
    /// appending new ones.
    pub fn with_overrides(overrides: &[FoodInfo]) -> Self {
        let mut table = Self::builtin();
        for info in overrides {
            match table.foods.iter_mut().find(|f| f.label == info.label) {
                Some(existing) => *existing = info.clone(),
                None => table.foods.push(info.clone()),
            }
        }
        table
    }

    fn lookup(&self, label: &str) -> Option<&FoodInfo> {
        self.foods.iter().find(|f| f.label == label)
    }

    pub fn get_calories(&self, label: &str) -> i64 {
        self.lookup(label).map(|f| f.calories).unwrap_or(0)
    }

    pub fn get_category(&self, label: &str) -> &str {
        self.lookup(label)
            .map(|f| f.category.as_str())
            .unwrap_or(UNKNOWN_CATEGORY)
    }

    pub fn all_foods(&self) -> BTreeMap<String, i64> {
        self.foods
            .iter()
            .map(|f| (f.label.clone(), f.calories))
            .collect()
    }

    pub fn entries(&self) -> &[FoodInfo] {
        &self.foods
    }

    pub fn calculate_total_calories<S: AsRef<str>>(&self, labels: &[S]) -> i64 {
        labels.iter().map(|l| self.get_calories(l.as_ref())).sum()
    }

    /// Group labels by category, accumulating count, calories and the labels
    /// themselves. Categories keep the order in which they first appear.
    pub fn nutritional_summary<S: AsRef<str>>(&self, labels: &[S]) -> NutritionalSummary {
        let mut summary: NutritionalSummary = Vec::new();
        for label in labels {
            let label = label.as_ref();
            let category = self.get_category(label);
            let calories = self.get_calories(label);
            let idx = match summary.iter().position(|(c, _)| c == category) {
                Some(idx) => idx,
                None => {
                    summary.push((category.to_string(), CategoryTotals::default()));
                    summary.len() - 1
                }
            };
            let totals = &mut summary[idx].1;
            totals.count += 1;
            totals.calories += calories;
            totals.foods.push(label.to_string());
        }
        summary
    }
}

impl Default for CalorieTable {
    fn default() -> Self {
        Self::builtin()
    }
}
