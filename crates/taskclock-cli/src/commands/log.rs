use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::error::Error;

use taskclock_core::timer::format_hms;
use taskclock_core::{Config, EntryId, TaskId, TimeEntry, UserId};

use super::{print_json, Context};

#[derive(Serialize)]
struct LogLine {
    id: EntryId,
    user_id: UserId,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    /// `HH:MM:SS` wall-clock span; absent while the entry is open.
    duration: Option<String>,
    estimated_secs: Option<u64>,
}

impl From<TimeEntry> for LogLine {
    fn from(entry: TimeEntry) -> Self {
        let duration = entry
            .duration_secs()
            .map(|secs| format_hms(Duration::seconds(secs as i64)));
        Self {
            id: entry.id,
            user_id: entry.user_id,
            started_at: entry.started_at,
            ended_at: entry.ended_at,
            duration,
            estimated_secs: entry.estimated_secs,
        }
    }
}

pub fn run(ctx: &Context, task: String) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let gateway = ctx.open_gateway(&config)?;
    let entries = gateway.entries_for_task(&TaskId::from(task))?;
    let lines: Vec<LogLine> = entries.into_iter().map(LogLine::from).collect();
    print_json(&lines)
}
