use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;
use tempfile::tempdir;

use food_lens::store::{Document, FsDocuments};
use food_lens::{FixedClock, FoodLog};

fn noon(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn open(dir: &std::path::Path, clock: Arc<FixedClock>) -> Result<FoodLog> {
    FoodLog::open(FsDocuments::new(dir)?, clock)
}

#[test]
fn open_creates_empty_documents() -> Result<()> {
    let dir = tempdir()?;
    let data_dir = dir.path().join("nested").join("data");
    let _log = FoodLog::open_dir(&data_dir)?;

    let history = std::fs::read_to_string(data_dir.join("detection_history.json"))?;
    let daily = std::fs::read_to_string(data_dir.join("calorie_logs.json"))?;
    assert_eq!(serde_json::from_str::<Value>(&history)?, serde_json::json!([]));
    assert_eq!(serde_json::from_str::<Value>(&daily)?, serde_json::json!({}));
    Ok(())
}

#[test]
fn records_survive_reopen() -> Result<()> {
    let dir = tempdir()?;
    let clock = Arc::new(FixedClock::new(noon(10)));
    {
        let log = open(dir.path(), clock.clone())?;
        log.log_detection("Apple", 0.912, 95)?;
        log.log_detection("Pizza", 0.88, 285)?;
    }

    let log = open(dir.path(), clock)?;
    let recent = log.get_recent_detections(10)?;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].food, "Apple");
    assert_eq!(recent[0].confidence, 0.91);
    let summary = log.get_daily_summary(None)?;
    assert_eq!(summary.total_calories, 380);
    assert_eq!(summary.detection_count, 2);
    Ok(())
}

#[test]
fn documents_are_pretty_printed_json() -> Result<()> {
    let dir = tempdir()?;
    let log = open(dir.path(), Arc::new(FixedClock::new(noon(11))))?;
    log.log_detection("Banana", 0.7, 105)?;

    let docs = FsDocuments::new(dir.path())?;
    let history = std::fs::read_to_string(docs.path(Document::History))?;
    assert!(history.contains('\n'));
    let value: Value = serde_json::from_str(&history)?;
    assert_eq!(value[0]["food"], "Banana");
    assert_eq!(value[0]["calories"], 105);
    assert!(value[0]["timestamp"]
        .as_str()
        .unwrap()
        .starts_with("2026-03-11T12:00:00"));

    let daily: Value =
        serde_json::from_str(&std::fs::read_to_string(docs.path(Document::DailyLog))?)?;
    assert_eq!(daily["2026-03-11"]["total_calories"], 105);
    assert_eq!(daily["2026-03-11"]["foods"]["Banana"], 1);
    Ok(())
}

#[test]
fn malformed_history_is_treated_as_empty() -> Result<()> {
    let dir = tempdir()?;
    let docs = FsDocuments::new(dir.path())?;
    std::fs::write(docs.path(Document::History), "{ not json")?;
    std::fs::write(docs.path(Document::DailyLog), "[1, 2, 3]")?;

    let log = open(dir.path(), Arc::new(FixedClock::new(noon(12))))?;
    assert!(log.get_recent_detections(5)?.is_empty());
    assert_eq!(log.get_all_time_stats()?.total_detections, 0);

    log.log_detection("Carrot", 0.8, 25)?;
    assert_eq!(log.get_recent_detections(5)?.len(), 1);
    assert_eq!(log.get_daily_summary(None)?.total_calories, 25);
    Ok(())
}

#[test]
fn delete_persists_and_reverses_summary() -> Result<()> {
    let dir = tempdir()?;
    let clock = Arc::new(FixedClock::new(noon(13)));
    let id = {
        let log = open(dir.path(), clock.clone())?;
        log.log_detection("Bread", 0.9, 80)?;
        log.log_detection("Bread", 0.9, 80)?.timestamp
    };

    let log = open(dir.path(), clock.clone())?;
    assert!(log.delete_detection(&id)?);
    assert!(!log.delete_detection(&id)?);
    drop(log);

    let log = open(dir.path(), clock)?;
    let summary = log.get_daily_summary(None)?;
    assert_eq!(summary.total_calories, 80);
    assert_eq!(summary.detection_count, 1);
    assert_eq!(summary.foods.get("Bread"), Some(&1));
    Ok(())
}
