//! Output formatting utilities

use crate::OutputFormat;
use serde::Serialize;

/// Print a value as pretty JSON when asked, otherwise through `Display`
pub fn print_output<T: Serialize + std::fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(value)?,
        OutputFormat::Human | OutputFormat::Table => {
            println!("{}", value);
        }
    }
    Ok(())
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Shorten long values for table cells, keeping the end of the path
pub fn ellipsize_start(value: &str, max: usize) -> String {
    let count = value.chars().count();
    if count <= max || max < 4 {
        return value.to_string();
    }
    let tail: String = value.chars().skip(count - (max - 3)).collect();
    format!("...{}", tail)
}

/// Compact counts such as download numbers
pub fn format_count(n: u64) -> String {
    match n {
        0..=999 => n.to_string(),
        1_000..=999_999 => format!("{:.1}k", n as f64 / 1_000.0),
        _ => format!("{:.1}M", n as f64 / 1_000_000.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipsize_keeps_file_name() {
        assert_eq!(ellipsize_start("short.bin", 20), "short.bin");
        assert_eq!(
            ellipsize_start("very/long/nested/path/model.safetensors", 20),
            "...model.safetensors"
        );
    }

    #[test]
    fn counts_are_compact() {
        assert_eq!(format_count(42), "42");
        assert_eq!(format_count(1_500), "1.5k");
        assert_eq!(format_count(2_300_000), "2.3M");
    }
}
