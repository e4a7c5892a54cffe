use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use taskwatch_core::model::{BatchDownloadSummary, EntityId, TaskRecord};
use taskwatch_core::{BusySet, StreamHealth};

/// Plain lines for people, JSON lines for pipes.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn record(&self, record: &TaskRecord) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!("{}", record_line(record));
        }
        Ok(())
    }

    pub fn tasks(&self, records: &[Arc<TaskRecord>]) -> Result<()> {
        if self.json {
            let records: Vec<&TaskRecord> =
                records.iter().map(|record| record.as_ref()).collect();
            println!("{}", serde_json::to_string(&records)?);
            return Ok(());
        }
        if records.is_empty() {
            println!("(no tasks)");
        }
        for record in records {
            println!("{}", record_line(record));
        }
        println!();
        Ok(())
    }

    pub fn busy(&self, set: &BusySet) -> Result<()> {
        let ids: Vec<&str> = set.iter().map(EntityId::as_str).collect();
        if self.json {
            println!("{}", serde_json::to_string(&ids)?);
        } else if ids.is_empty() {
            println!("busy: (none)");
        } else {
            println!("busy: {}", ids.join(", "));
        }
        Ok(())
    }

    pub fn summary(&self, summary: &BatchDownloadSummary) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(summary)?);
            return Ok(());
        }
        println!(
            "{} ({} queued, {} failed of {})",
            summary.message,
            summary.success_count,
            summary.failed_count,
            summary.total
        );
        for title in summary.failed_titles.iter().flatten() {
            println!("  failed: {}", title);
        }
        Ok(())
    }
}

/// Health transitions go to stderr so stdout stays parseable.
pub fn health(health: StreamHealth) {
    match health {
        StreamHealth::Healthy => eprintln!("-- live updates connected"),
        StreamHealth::Degraded => {
            eprintln!("-- live updates unavailable, polling")
        }
    }
}

pub fn record_line(record: &TaskRecord) -> String {
    let task_type = if record.task_type.is_unknown() {
        "?"
    } else {
        record.task_type.as_str()
    };
    let mut line = format!(
        "{:<10} {:<20} {:<9} {:>3}%",
        record.id.as_str(),
        task_type,
        record.status.as_str(),
        record.progress
    );
    if let (Some(done), Some(total)) =
        (record.completed_items, record.total_items)
    {
        line.push_str(&format!(" {}/{}", done, total));
    }
    if let Some(at) = record.updated_at {
        line.push_str(&format!(" @{}", local_time(at)));
    }
    if let Some(message) = record.message.as_deref().filter(|m| !m.is_empty())
    {
        line.push_str("  ");
        line.push_str(message);
    }
    line
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use taskwatch_core::model::{TaskStatus, TaskUpdate};

    use super::*;

    #[test]
    fn line_shows_counts_and_message() {
        let mut update = TaskUpdate::new("t1")
            .with_type("download")
            .with_status(TaskStatus::Running)
            .with_progress(40.0);
        update.completed_items = Some(2);
        update.total_items = Some(5);
        update.message = Some("Chapter 3".into());
        let record = TaskRecord::from_update(&update);

        let line = record_line(&record);
        assert!(line.starts_with("t1         download"), "{line}");
        assert!(line.contains("running    40% 2/5"), "{line}");
        assert!(line.ends_with("  Chapter 3"), "{line}");
    }

    #[test]
    fn unknown_type_is_marked() {
        let record = TaskRecord::from_update(&TaskUpdate::new("t2"));
        let line = record_line(&record);
        assert!(line.contains(" ? "), "{line}");
        assert!(line.contains("pending"), "{line}");
    }
}
