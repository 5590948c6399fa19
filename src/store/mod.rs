//! Persistence and aggregation of confirmed detections.
//!
//! Two documents are kept: the detection history (a list of records) and the
//! daily log (date to [`DailySummary`]). Every mutation reads both documents,
//! changes them in memory and writes them back whole.
//!
//! A single mutex in [`FoodLog`] covers the full read-modify-write span of both
//! documents. Logging and deleting therefore update history and summary as
//! one unit, and concurrent writers cannot overwrite each other's changes.
//! Readers take the same lock so they never observe a half-applied mutation.

mod documents;
mod records;

pub use documents::{Document, DocumentStore, FsDocuments, MemoryDocuments};
pub use records::{AllTimeStats, DailyLog, DailySummary, DetectionRecord, WeeklySummary};

use anyhow::{anyhow, Result};
use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::{Clock, LocalClock};
use records::round_to;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const NO_FOOD: &str = "None";
const WEEK_DAYS: u64 = 7;

pub struct FoodLog {
    docs: Box<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl FoodLog {
    /// Open a log over `docs`, creating missing documents as empty.
    pub fn open<D: DocumentStore + 'static>(docs: D, clock: Arc<dyn Clock>) -> Result<Self> {
        let log = Self {
            docs: Box::new(docs),
            clock,
            lock: Mutex::new(()),
        };
        for doc in [Document::DailyLog, Document::History] {
            if log.docs.read(doc)?.is_none() {
                log.docs.write(doc, doc.empty_contents())?;
            }
        }
        Ok(log)
    }

    /// File-backed log in `data_dir` using local time.
    pub fn open_dir<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        Self::open(FsDocuments::new(data_dir)?, Arc::new(LocalClock))
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open(MemoryDocuments::new(), clock)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Append a record stamped with the current time and fold it into that
    /// day's summary. Returns the stored record; its timestamp is its id.
    pub fn log_detection(&self, food: &str, confidence: f64, calories: i64) -> Result<DetectionRecord> {
        let _guard = self.guard()?;
        let previous_history = self.docs.read(Document::History)?;
        let mut history: Vec<DetectionRecord> =
            self.parse(Document::History, previous_history.as_deref());
        let mut daily: DailyLog = self.load(Document::DailyLog)?;

        let mut at = self.clock.now();
        let mut timestamp = format_timestamp(at);
        while history.iter().any(|r| r.timestamp == timestamp) {
            at += chrono::Duration::microseconds(1);
            timestamp = format_timestamp(at);
        }

        let record = DetectionRecord {
            timestamp,
            food: food.to_string(),
            confidence: round_to(confidence, 2),
            calories,
        };
        history.push(record.clone());
        daily
            .entry(at.date().to_string())
            .or_default()
            .add(food, calories);

        self.commit(previous_history.as_deref(), &history, &daily)?;
        log::info!(
            "logged {} ({} kcal, conf {:.2}) as {}",
            record.food,
            record.calories,
            record.confidence,
            record.timestamp
        );
        Ok(record)
    }

    /// Remove the record whose timestamp equals `id` and reverse its effect on
    /// the summary of the record's own date. Returns false if no record matches.
    pub fn delete_detection(&self, id: &str) -> Result<bool> {
        let _guard = self.guard()?;
        let previous_history = self.docs.read(Document::History)?;
        let mut history: Vec<DetectionRecord> =
            self.parse(Document::History, previous_history.as_deref());
        let Some(index) = history.iter().position(|r| r.timestamp == id) else {
            log::debug!("delete of unknown detection {}", id);
            return Ok(false);
        };
        let record = history.remove(index);

        let mut daily: DailyLog = self.load(Document::DailyLog)?;
        match record_date(&record.timestamp).and_then(|d| daily.get_mut(&d.to_string())) {
            Some(day) => {
                day.remove(&record.food, record.calories);
                self.commit(previous_history.as_deref(), &history, &daily)?;
            }
            None => {
                log::warn!(
                    "deleted detection {} has no daily summary to adjust",
                    record.timestamp
                );
                self.save(Document::History, &history)?;
            }
        }
        log::info!("deleted {} ({} kcal) {}", record.food, record.calories, id);
        Ok(true)
    }

    /// Summary for `date` (today when `None`); zero-valued if nothing logged.
    pub fn get_daily_summary(&self, date: Option<NaiveDate>) -> Result<DailySummary> {
        let date = date.unwrap_or_else(|| self.today());
        let _guard = self.guard()?;
        let daily: DailyLog = self.load(Document::DailyLog)?;
        Ok(daily.get(&date.to_string()).cloned().unwrap_or_default())
    }

    /// The last `limit` records in stored order.
    pub fn get_recent_detections(&self, limit: usize) -> Result<Vec<DetectionRecord>> {
        let _guard = self.guard()?;
        let history: Vec<DetectionRecord> = self.load(Document::History)?;
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }

    /// Records stamped with today's date, newest first.
    pub fn get_todays_detections(&self) -> Result<Vec<DetectionRecord>> {
        let today = self.today();
        let _guard = self.guard()?;
        let history: Vec<DetectionRecord> = self.load(Document::History)?;
        let mut items: Vec<DetectionRecord> = history
            .into_iter()
            .filter(|r| record_date(&r.timestamp) == Some(today))
            .collect();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(items)
    }

    /// Summaries for today and the six days before it, always seven entries.
    pub fn get_weekly_summary(&self) -> Result<WeeklySummary> {
        let today = self.today();
        let _guard = self.guard()?;
        let daily: DailyLog = self.load(Document::DailyLog)?;
        let mut week = WeeklySummary::default();
        for offset in 0..WEEK_DAYS {
            let Some(day) = today.checked_sub_days(Days::new(offset)) else {
                break;
            };
            let key = day.to_string();
            let summary = daily.get(&key).cloned().unwrap_or_default();
            week.push(key, summary);
        }
        Ok(week)
    }

    pub fn get_all_time_stats(&self) -> Result<AllTimeStats> {
        let _guard = self.guard()?;
        let daily: DailyLog = self.load(Document::DailyLog)?;
        let history: Vec<DetectionRecord> = self.load(Document::History)?;

        let total_calories: i64 = daily.values().map(|d| d.total_calories).sum();
        let days_tracked = daily.len();
        let (most_detected_food, most_detected_count) = most_detected(&history)
            .map(|(food, count)| (food.to_string(), count))
            .unwrap_or_else(|| (NO_FOOD.to_string(), 0));

        Ok(AllTimeStats {
            total_calories,
            total_detections: history.len(),
            days_tracked,
            avg_calories_per_day: round_to(total_calories as f64 / days_tracked.max(1) as f64, 1),
            most_detected_food,
            most_detected_count,
        })
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow!("food log lock poisoned"))
    }

    fn load<T: DeserializeOwned + Default>(&self, doc: Document) -> Result<T> {
        let raw = self.docs.read(doc)?;
        Ok(self.parse(doc, raw.as_deref()))
    }

    /// Parse a document, treating a missing or malformed one as empty.
    fn parse<T: DeserializeOwned + Default>(&self, doc: Document, raw: Option<&str>) -> T {
        let Some(raw) = raw else {
            return T::default();
        };
        match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    "{} is malformed, treating it as empty: {}",
                    doc.file_name(),
                    e
                );
                T::default()
            }
        }
    }

    /// Write both documents, history first. If the daily log cannot be
    /// written, `previous_history` is put back so neither document runs
    /// ahead of the other.
    fn commit(
        &self,
        previous_history: Option<&str>,
        history: &[DetectionRecord],
        daily: &DailyLog,
    ) -> Result<()> {
        self.save(Document::History, &history)?;
        if let Err(e) = self.save(Document::DailyLog, daily) {
            let restore = previous_history.unwrap_or(Document::History.empty_contents());
            if let Err(restore_err) = self.docs.write(Document::History, restore) {
                log::error!(
                    "failed to restore {} after a failed update: {}",
                    Document::History.file_name(),
                    restore_err
                );
            }
            return Err(e);
        }
        Ok(())
    }

    fn save<T: Serialize>(&self, doc: Document, value: &T) -> Result<()> {
        let contents = serde_json::to_string_pretty(value)?;
        self.docs.write(doc, &contents)
    }
}

fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Calendar date of an ISO-8601 timestamp.
fn record_date(timestamp: &str) -> Option<NaiveDate> {
    timestamp
        .get(..10)
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
}

/// Most frequent food; ties go to the food seen first.
fn most_detected(history: &[DetectionRecord]) -> Option<(&str, usize)> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in history {
        let count = counts.entry(record.food.as_str()).or_insert(0);
        if *count == 0 {
            order.push(record.food.as_str());
        }
        *count += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for food in order {
        let count = counts[food];
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((food, count));
        }
    }
    best
}
