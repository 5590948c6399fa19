use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// One confirmed detection. `timestamp` is the record's unique id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub timestamp: String,
    pub food: String,
    pub confidence: f64,
    /// Resolved when logged; later calorie table changes do not apply.
    pub calories: i64,
}

/// Aggregates for one calendar date.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    #[serde(default)]
    pub total_calories: i64,
    #[serde(default)]
    pub foods: BTreeMap<String, i64>,
    #[serde(default)]
    pub detection_count: i64,
}

impl DailySummary {
    pub(crate) fn add(&mut self, food: &str, calories: i64) {
        self.total_calories += calories;
        self.detection_count += 1;
        *self.foods.entry(food.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn remove(&mut self, food: &str, calories: i64) {
        self.total_calories -= calories;
        self.detection_count -= 1;
        if let Some(count) = self.foods.get_mut(food) {
            *count -= 1;
            if *count <= 0 {
                self.foods.remove(food);
            }
        }
    }
}

/// Date (`YYYY-MM-DD`) to summary.
pub type DailyLog = BTreeMap<String, DailySummary>;

/// Daily summaries for the last seven days, today first. Serializes as a
/// JSON object keyed by date in that order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeeklySummary {
    days: Vec<(String, DailySummary)>,
}

impl WeeklySummary {
    pub(crate) fn push(&mut self, date: String, summary: DailySummary) {
        self.days.push((date, summary));
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn get(&self, date: &str) -> Option<&DailySummary> {
        self.days
            .iter()
            .find(|(d, _)| d == date)
            .map(|(_, summary)| summary)
    }

    pub fn dates(&self) -> impl Iterator<Item = &str> {
        self.days.iter().map(|(d, _)| d.as_str())
    }
}

impl Serialize for WeeklySummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.days.len()))?;
        for (date, summary) in &self.days {
            map.serialize_entry(date, summary)?;
        }
        map.end()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AllTimeStats {
    pub total_calories: i64,
    pub total_detections: usize,
    pub days_tracked: usize,
    pub avg_calories_per_day: f64,
    pub most_detected_food: String,
    pub most_detected_count: usize,
}

/// Round to `places` decimal places.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_drops_exhausted_food_entries() {
        let mut day = DailySummary::default();
        day.add("Apple", 95);
        day.add("Apple", 95);
        day.add("Pizza", 285);
        day.remove("Apple", 95);
        assert_eq!(day.foods.get("Apple"), Some(&1));
        day.remove("Apple", 95);
        assert!(!day.foods.contains_key("Apple"));
        assert_eq!(day.total_calories, 285);
        assert_eq!(day.detection_count, 1);
    }

    #[test]
    fn summary_tolerates_missing_fields() {
        let day: DailySummary = serde_json::from_str(r#"{"total_calories": 12}"#).unwrap();
        assert_eq!(day.total_calories, 12);
        assert_eq!(day.detection_count, 0);
        assert!(day.foods.is_empty());
    }

    #[test]
    fn weekly_summary_serializes_in_insertion_order() {
        let mut week = WeeklySummary::default();
        week.push("2026-05-03".to_string(), DailySummary::default());
        week.push("2026-05-02".to_string(), DailySummary::default());
        let json = serde_json::to_string(&week).unwrap();
        let newer = json.find("2026-05-03").unwrap();
        let older = json.find("2026-05-02").unwrap();
        assert!(newer < older);
        assert_eq!(week.dates().collect::<Vec<_>>(), vec!["2026-05-03", "2026-05-02"]);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.876, 2), 0.88);
        assert_eq!(round_to(128.33333, 1), 128.3);
    }
}
