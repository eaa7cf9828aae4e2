//! Terminal output shared by the CLI commands.
//!
//! Logs go to stderr through `tracing`; these helpers print the
//! human-facing summaries on stdout and error boxes on stderr.

/// Width of banner and box separators.
const BOX_WIDTH: usize = 60;

/// Print a section banner.
///
/// ```text
/// ============================================================
/// STAGE 1: DOWNLOAD
/// ============================================================
/// ```
pub fn print_banner(title: &str) {
    println!("{}", "=".repeat(BOX_WIDTH));
    println!("{title}");
    println!("{}", "=".repeat(BOX_WIDTH));
}

/// Print an error box with a title, a detail block and optional hints.
pub fn print_error_box(title: &str, detail: &str, hints: &[&str]) {
    eprintln!("\n{}", "=".repeat(BOX_WIDTH));
    eprintln!("{title}");
    eprintln!("{}", "=".repeat(BOX_WIDTH));

    if !detail.is_empty() {
        eprintln!("\n{detail}");
    }

    if !hints.is_empty() {
        eprintln!("\nHints:");
        for (i, hint) in hints.iter().enumerate() {
            eprintln!("  {}. {hint}", i + 1);
        }
    }
    eprintln!();
}

/// `SUCCESS` / `FAILED` label of a unit outcome.
pub fn status_label(ok: bool) -> &'static str {
    if ok { "SUCCESS" } else { "FAILED" }
}

/// Print one aligned `name  STATUS` line per unit and a total.
pub fn print_unit_table<'a>(units: impl IntoIterator<Item = (&'a str, bool)>) {
    let units: Vec<_> = units.into_iter().collect();
    let width = units.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, ok) in &units {
        println!("  {name:<width$}  {}", status_label(*ok));
    }
    let succeeded = units.iter().filter(|(_, ok)| *ok).count();
    println!("  Total: {succeeded}/{}", units.len());
}

/// Print an aligned `key: value` list.
pub fn print_key_values(pairs: &[(&str, String)]) {
    let width = pairs.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, value) in pairs {
        println!("  {key:<width$}  {value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(true), "SUCCESS");
        assert_eq!(status_label(false), "FAILED");
    }
}
