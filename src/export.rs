use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::warn;

use crate::extract::Record;

/// Output file name: the two resolved filter ids plus a timestamp, so
/// successive runs over different lessons never clobber each other.
pub fn artifact_name(
    module_id: Option<i64>,
    lesson_id: Option<i64>,
    now: DateTime<Local>,
) -> String {
    format!(
        "{}--{}--{}.csv",
        module_id.unwrap_or(0),
        lesson_id.unwrap_or(0),
        now.format("%d_%m_%Y_%H_%M")
    )
}

/// Write the result set as a semicolon-delimited CSV. Absent fields become
/// empty cells.
pub fn write_csv(records: &[Record], dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    let path = dir.join(name);

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    writer.write_record(Record::FIELD_NAMES)?;
    for record in records {
        writer.write_record(record.row())?;
    }
    writer.flush()?;

    Ok(path)
}

/// Compact terminal table of the collected records. The full field set goes
/// to the CSV; here only the columns an operator eyeballs.
pub fn print_table(records: &[Record]) {
    if records.is_empty() {
        warn!("no records to display");
        return;
    }

    println!(
        "{:>3} | {:<28} | {:<24} | {:<10} | {:>5} | {:<12}",
        "#", "Email", "Lesson", "Level", "Test", "Status"
    );
    println!("{}", "-".repeat(95));

    for (i, record) in records.iter().enumerate() {
        println!(
            "{:>3} | {:<28} | {:<24} | {:<10} | {:>5} | {:<12}",
            i + 1,
            truncate(record.user_email.as_deref().unwrap_or("-"), 28),
            truncate(record.lesson.as_deref().unwrap_or("-"), 24),
            truncate(record.level.as_deref().unwrap_or("-"), 10),
            record.test_score.as_deref().unwrap_or("-"),
            truncate(record.status.as_deref().unwrap_or("-"), 12),
        );
    }

    println!("\n{} record(s)", records.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{truncated}...")
    }
}
