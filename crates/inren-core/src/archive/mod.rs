//! Exporting renamed invoices: one zip archive or individual copies.

mod names;
mod package;

pub use names::NameRegistry;
pub use package::{DEFAULT_ARCHIVE_NAME, download_as_zip, export_file};

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human-readable size in binary units, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0;
    while exponent + 1 < SIZE_UNITS.len() && bytes >= 1024u64.pow(exponent as u32 + 1) {
        exponent += 1;
    }
    let value = bytes as f64 / 1024u64.pow(exponent as u32) as f64;
    let rounded = (value * 100.0).round() / 100.0;

    format!("{} {}", rounded, SIZE_UNITS[exponent])
}
