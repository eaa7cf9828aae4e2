//! Shared formatting helpers.

/// Format bytes in human-readable form.
///
/// # Examples
///
/// ```
/// use etlpipe::utils::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 bytes");
/// assert_eq!(format_bytes(1024), "1.0 KB");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(1048576), "1.0 MB");
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes == 0 {
        "0 bytes".to_string()
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}

/// Transfer progress: `"75.0 MB / 150.0 MB (50.0%)"`, or just the amount
/// when the total is unknown.
///
/// # Examples
///
/// ```
/// use etlpipe::utils::format_progress;
///
/// assert_eq!(format_progress(512, Some(1024)), "512 bytes / 1.0 KB (50.0%)");
/// assert_eq!(format_progress(2048, None), "2.0 KB");
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn format_progress(done: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => format!(
            "{} / {} ({:.1}%)",
            format_bytes(done),
            format_bytes(total),
            done as f64 * 100.0 / total as f64
        ),
        _ => format_bytes(done),
    }
}

/// Format a stage duration.
///
/// # Examples
///
/// ```
/// use chrono::Duration;
/// use etlpipe::utils::format_duration;
///
/// assert_eq!(format_duration(Duration::milliseconds(1500)), "1.5s");
/// assert_eq!(format_duration(Duration::seconds(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::seconds(3660)), "1h 1m");
/// ```
pub fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds();
    if secs < 60 {
        format!("{:.1}s", duration.num_milliseconds() as f64 / 1000.0)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
