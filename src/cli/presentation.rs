//! CLI presentation: text formatters for queue, sync and threshold output.

use crate::queue::QueuedMutation;
use crate::sync::SyncSummary;
use crate::threshold::{ThresholdBreach, ThresholdConfig, UsageStats};
use chrono::{TimeZone, Utc};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;

fn format_section_heading(title: &str) -> String {
    format!("{}\n{}", title, "-".repeat(title.len()))
}

fn format_timestamp(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn format_minutes(millis: u64) -> String {
    let minutes = millis / 60_000;
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

pub fn format_queue_list_text(mutations: &[QueuedMutation]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Offline queue")));
    if mutations.is_empty() {
        out.push_str("No pending mutations.\n");
        return out;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Id", "Priority", "Method", "URL", "Retries", "Queued at"]);
    for m in mutations {
        table.add_row(vec![
            m.id.clone(),
            m.priority.as_str().to_string(),
            m.method.clone(),
            m.url.clone(),
            format!("{}/{}", m.retry_count, m.max_retries),
            format_timestamp(m.enqueued_at),
        ]);
    }
    out.push_str(&format!("{}\n", table));
    out.push_str(&format!("Total: {}\n", mutations.len()));
    out
}

pub fn format_sync_summary_text(summary: &SyncSummary) -> String {
    let retained = summary.total - summary.success_count - summary.failure_count;
    format!(
        "Sync complete: {} delivered, {} dropped, {} kept for retry ({} total)",
        summary.success_count, summary.failure_count, retained, summary.total
    )
}

pub fn format_thresholds_text(owner_id: &str, config: Option<&ThresholdConfig>) -> String {
    let Some(config) = config else {
        return format!("No thresholds configured for {}.", owner_id);
    };
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("Thresholds for {}", config.owner_id))
    ));
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Limit", "Minutes"]);
    table.add_row(vec!["Daily".to_string(), config.daily_limit_minutes.to_string()]);
    table.add_row(vec!["Weekly".to_string(), config.weekly_limit_minutes.to_string()]);
    table.add_row(vec![
        "Break reminder".to_string(),
        config.break_reminder_minutes.to_string(),
    ]);
    out.push_str(&format!("{}\n", table));
    out.push_str(&format!(
        "Alerts: {}\n",
        if config.enabled { "enabled" } else { "disabled" }
    ));
    out
}

pub fn format_breaches_text(owner_id: &str, breaches: &[ThresholdBreach]) -> String {
    if breaches.is_empty() {
        return format!("{} is within all limits.", owner_id);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Category", "Observed", "Limit"]);
    for breach in breaches {
        table.add_row(vec![
            breach.category.as_str().to_string(),
            format!("{:.1}m", breach.observed_minutes),
            format!("{}m", breach.limit_minutes),
        ]);
    }
    format!("{}\n\n{}", format_section_heading("Limits reached"), table)
}

pub fn format_stats_text(owner_id: &str, stats: &UsageStats) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Window", "Usage"]);
    table.add_row(vec!["Today".to_string(), format_minutes(stats.today_time)]);
    table.add_row(vec!["This week".to_string(), format_minutes(stats.weekly_time)]);
    table.add_row(vec!["This month".to_string(), format_minutes(stats.monthly_time)]);
    table.add_row(vec!["All time".to_string(), format_minutes(stats.total_time)]);
    table.add_row(vec![
        "Average session".to_string(),
        format_minutes(stats.average_session_duration),
    ]);
    table.add_row(vec![
        "Longest session".to_string(),
        format_minutes(stats.longest_session),
    ]);
    format!(
        "{}\n\n{}\nSessions: {}\n",
        format_section_heading(&format!("Usage for {}", owner_id)),
        table,
        stats.sessions.len()
    )
}
