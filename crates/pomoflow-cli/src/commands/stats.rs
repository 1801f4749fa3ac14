use chrono::NaiveDate;
use clap::Subcommand;
use pomoflow_core::storage::{Database, StoredDailyStat};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's stats
    Today,
    /// All-time stats
    All,
    /// Stats for one day
    Day {
        /// Date as YYYY-MM-DD
        date: NaiveDate,
    },
    /// Recent interval records, newest first
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        StatsAction::Today => {
            let stats = db.stats_today()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::All => {
            let stats = db.stats_all()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::Day { date } => {
            let stats = db
                .daily_stat(date)?
                .unwrap_or_else(|| StoredDailyStat::empty(date));
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::History { limit } => {
            let records = db.recent_records(limit)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}
