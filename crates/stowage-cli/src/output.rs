//! Run summary rendering.

use std::fmt::Write as _;

use stowage_pack::RunReport;

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Humanise a byte count with binary units.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub(crate) fn render_summary(report: &RunReport) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "run {}", report.run_id);
    for set in &report.sets {
        let _ = writeln!(
            text,
            "{:<24} {:>6} files {:>10}  {}",
            set.name,
            set.files,
            format_bytes(set.total_bytes),
            set.archive.display()
        );
        if set.source_deleted {
            let _ = writeln!(text, "{:<24} source removed", "");
        }
    }
    for stats in report.compressions() {
        let _ = writeln!(
            text,
            "{:<24} {} -> {} ({:.1}%){}",
            stats.kind.to_string(),
            format_bytes(stats.source_bytes),
            format_bytes(stats.compressed_bytes),
            stats.ratio() * 100.0,
            if stats.shrank() { "" } else { " not smaller" }
        );
    }
    text
}

pub(crate) fn print_summary(report: &RunReport) {
    print!("{}", render_summary(report));
}
