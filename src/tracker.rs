//! Calorie tracking surface used by the API and CLI.
//!
//! `FoodTracker` is the only write path into the food log: it resolves
//! calories from the calorie table at the moment a detection is confirmed.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

use crate::calories::{CalorieTable, NutritionalSummary};
use crate::store::{AllTimeStats, DailySummary, DetectionRecord, FoodLog, WeeklySummary};

/// Result of confirming a detection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoggedFood {
    pub food: String,
    pub calories: i64,
    /// Id of the stored record, usable for deletion.
    pub timestamp: String,
}

pub struct FoodTracker {
    calories: CalorieTable,
    log: FoodLog,
}

impl FoodTracker {
    pub fn new(calories: CalorieTable, log: FoodLog) -> Self {
        Self { calories, log }
    }

    pub fn shared(calories: CalorieTable, log: FoodLog) -> Arc<Self> {
        Arc::new(Self::new(calories, log))
    }

    pub fn calorie_table(&self) -> &CalorieTable {
        &self.calories
    }

    /// Record a user-confirmed detection. Unknown foods are logged with 0 kcal.
    pub fn confirm(&self, food: &str, confidence: f64) -> Result<LoggedFood> {
        let food = food.trim();
        if food.is_empty() {
            return Err(anyhow!("no food item specified"));
        }
        let calories = self.calories.get_calories(food);
        let record = self.log.log_detection(food, confidence, calories)?;
        Ok(LoggedFood {
            food: record.food,
            calories: record.calories,
            timestamp: record.timestamp,
        })
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.log.delete_detection(id)
    }

    pub fn daily_summary(&self, date: Option<NaiveDate>) -> Result<DailySummary> {
        self.log.get_daily_summary(date)
    }

    pub fn todays_items(&self) -> Result<Vec<DetectionRecord>> {
        self.log.get_todays_detections()
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<DetectionRecord>> {
        self.log.get_recent_detections(limit)
    }

    pub fn weekly_summary(&self) -> Result<WeeklySummary> {
        self.log.get_weekly_summary()
    }

    pub fn all_time_stats(&self) -> Result<AllTimeStats> {
        self.log.get_all_time_stats()
    }

    /// Today's items grouped by food category.
    pub fn todays_nutrition(&self) -> Result<NutritionalSummary> {
        let labels: Vec<String> = self
            .log
            .get_todays_detections()?
            .into_iter()
            .map(|r| r.food)
            .collect();
        Ok(self.calories.nutritional_summary(&labels))
    }
}
