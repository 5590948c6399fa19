//! food_log - inspect and edit the persisted food log
//!
//! Reads the same data directory as the daemon. Output is pretty JSON.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::{CalorieTable, FoodLensConfig, FoodLog, FoodTracker};

#[derive(Parser, Debug)]
#[command(name = "food_log", about = "Inspect and edit the food log")]
struct Args {
    /// Data directory (defaults to the configured data_dir)
    #[arg(long, env = "FOOD_LENS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the calorie table
    Foods,

    /// Log a confirmed food
    Log {
        food: String,
        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
    },

    /// Delete a logged food by its timestamp id
    Delete { id: String },

    /// Today's items, newest first
    Today,

    /// Most recent items in logged order
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Daily summary (today unless --date YYYY-MM-DD)
    Summary {
        #[arg(long)]
        date: Option<String>,
    },

    /// Summaries for the last seven days
    Weekly,

    /// All-time statistics
    Stats,

    /// Today's items grouped by category
    Nutrition,
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = FoodLensConfig::load()?;
    let data_dir = args.data_dir.unwrap_or_else(|| config.data_dir.clone());
    let tracker = FoodTracker::new(
        CalorieTable::with_overrides(&config.foods),
        FoodLog::open_dir(&data_dir)?,
    );

    match args.command {
        Command::Foods => print_json(&tracker.calorie_table().entries()),
        Command::Log { food, confidence } => print_json(&tracker.confirm(&food, confidence)?),
        Command::Delete { id } => {
            if tracker.delete(&id)? {
                println!("deleted {}", id);
                Ok(())
            } else {
                Err(anyhow!("no detection with id {}", id))
            }
        }
        Command::Today => print_json(&tracker.todays_items()?),
        Command::Recent { limit } => print_json(&tracker.recent(limit)?),
        Command::Summary { date } => {
            let date = date.as_deref().map(parse_date).transpose()?;
            print_json(&tracker.daily_summary(date)?)
        }
        Command::Weekly => print_json(&tracker.weekly_summary()?),
        Command::Stats => print_json(&tracker.all_time_stats()?),
        Command::Nutrition => print_json(&crate::api::nutrition_json(tracker.todays_nutrition()?)),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| anyhow!("invalid date '{}' (expected YYYY-MM-DD): {}", raw, e))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
