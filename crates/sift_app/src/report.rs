use anyhow::{Context, Result};
use humansize::{format_size, BINARY};
use serde::Serialize;
use sift_core::{ScanReport, Severity};
use sift_io::StoredArtifact;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

#[derive(Serialize)]
struct Manifest<'a> {
    tool: &'static str,
    version: &'static str,
    source: &'a str,
    output_dir: &'a Path,
    #[serde(flatten)]
    report: &'a ScanReport<StoredArtifact>,
}

pub fn write_manifest(
    path: &Path,
    source: &str,
    output_dir: &Path,
    report: &ScanReport<StoredArtifact>,
) -> Result<()> {
    let manifest = Manifest {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        source,
        output_dir,
        report,
    };
    let file = File::create(path)
        .with_context(|| format!("Failed to create manifest: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &manifest).context("Failed to write manifest")?;
    writer.flush().context("Failed to write manifest")?;
    Ok(())
}

/// Artifact count per format tag.
pub fn count_by_tag(report: &ScanReport<StoredArtifact>) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for extracted in &report.extracted {
        *counts.entry(extracted.tag.as_str()).or_insert(0) += 1;
    }
    counts
}

pub fn print_summary(report: &ScanReport<StoredArtifact>, elapsed: Duration, output_dir: &Path) {
    let stored: u64 = report.extracted.iter().map(|e| e.handle.size).sum();
    let skipped = report.warnings_at_least(Severity::Warning).count();
    let overlaps = report.warnings.len() - skipped;

    println!("\n╔════════════════════════════════════════╗");
    if report.interrupted {
        println!("║       === Scan Interrupted ===         ║");
    } else {
        println!("║         === Scan Finished ===          ║");
    }
    println!("╠════════════════════════════════════════╣");
    println!(
        "║ Elapsed Time:       {:>18} ║",
        format!("{:.1}s", elapsed.as_secs_f64())
    );
    println!(
        "║ Scanned Space:      {:>18} ║",
        format_size(report.bytes_scanned, BINARY)
    );
    for (tag, count) in count_by_tag(report) {
        println!("║ {:<19} {:>18} ║", format!("{tag} Images:"), count);
    }
    println!("║ Recovered Images:   {:>18} ║", report.extracted.len());
    println!("║ Recovered Size:     {:>18} ║", format_size(stored, BINARY));
    println!("║ Skipped Candidates: {:>18} ║", skipped);
    println!("║ Nested Candidates:  {:>18} ║", overlaps);
    println!("╠════════════════════════════════════════╣");
    println!("║ Files saved to:     {:<18} ║", output_dir.display());
    println!("╚════════════════════════════════════════╝");

    for warning in report.warnings_at_least(Severity::Warning) {
        println!("  ! {warning}");
    }
}
