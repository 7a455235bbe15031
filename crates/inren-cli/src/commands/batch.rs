//! Batch command - recognize, rename and export multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use inren_core::pdf::SourceKind;
use inren_core::{
    FieldName, Invoice, InvoiceBatch, InvoiceStatus, PageRasterizer, RecognitionClient,
    SourceFile,
};

use super::{field_selection, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output directory (default: from config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Archive file name inside the output directory (default: from config)
    #[arg(long)]
    zip_name: Option<String>,

    /// Copy renamed files individually instead of writing a zip archive
    #[arg(long)]
    individual: bool,

    /// Fields composing the new names, comma separated (e.g. sellerName,amount,date)
    #[arg(long, value_delimiter = ',')]
    fields: Vec<FieldName>,

    /// Separator placed between name parts
    #[arg(short, long)]
    separator: Option<String>,

    /// Maximum simultaneous recognition requests (1-10)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Also write a summary CSV
    #[arg(long)]
    summary: bool,

    /// Show the new names without exporting anything
    #[arg(long)]
    dry_run: bool,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut config = load_config(config_path)?;
    if let Some(jobs) = args.jobs {
        config.api.max_concurrent = jobs;
    }

    let files = expand_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No matching invoice files found for: {}", args.inputs.join(" "));
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    let rasterizer = Arc::new(PageRasterizer::new(&config.render));
    let client = RecognitionClient::new(config.api.clone(), rasterizer.clone())?
        .with_scale(config.render.recognition_scale);

    let mut batch = InvoiceBatch::new(rasterizer).without_previews();
    for path in files {
        batch.add_file(SourceFile::new(path)).await?;
    }

    let pb = ProgressBar::new(batch.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let summary = batch
        .recognize_all(&client, |invoice| {
            pb.set_message(invoice.original_name().to_string());
            pb.inc(1);
        })
        .await;
    pb.finish_with_message("Complete");

    let fields = field_selection(&args.fields, &config.naming.fields);
    let separator = args.separator.as_deref().unwrap_or(&config.naming.separator);
    batch.apply_names(&fields, separator);

    println!();
    for invoice in batch.invoices() {
        print_outcome(invoice);
    }

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.export.output_dir.clone());

    if args.dry_run {
        println!();
        println!("{} Dry run, nothing exported", style("ℹ").blue());
    } else {
        fs::create_dir_all(&output_dir)?;

        if args.individual {
            let written = batch.export_files(&output_dir).await?;
            println!();
            println!(
                "{} Copied {} files to {}",
                style("✓").green(),
                written.len(),
                output_dir.display()
            );
        } else {
            let zip_name = args.zip_name.as_deref().unwrap_or(&config.export.archive_name);
            let zip_path = batch.export_zip(&output_dir.join(zip_name)).await?;
            let size = fs::metadata(&zip_path).map(|m| m.len()).unwrap_or(0);
            println!();
            println!(
                "{} Archive written to {} ({})",
                style("✓").green(),
                zip_path.display(),
                inren_core::format_file_size(size)
            );
        }
    }

    if args.summary {
        fs::create_dir_all(&output_dir)?;
        let summary_path = output_dir.join("summary.csv");
        write_summary(&summary_path, batch.invoices())?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        summary.total,
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(summary.completed).green(),
        style(summary.failed).red()
    );

    Ok(())
}

/// Expand glob patterns into supported invoice files, keeping first-seen order.
fn expand_inputs(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        for entry in glob(pattern)? {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping unreadable path: {}", e);
                    continue;
                }
            };

            if !path.is_file() || files.contains(&path) {
                continue;
            }
            if !SourceKind::is_supported(&SourceFile::new(&path)) {
                debug!("Skipping unsupported file {}", path.display());
                continue;
            }
            files.push(path);
        }
    }

    Ok(files)
}

fn print_outcome(invoice: &Invoice) {
    match invoice.status() {
        InvoiceStatus::Completed => println!(
            "  {} {} -> {}",
            style("✓").green(),
            invoice.original_name(),
            invoice.output_name()
        ),
        _ => println!(
            "  {} {}: {}",
            style("✗").red(),
            invoice.original_name(),
            invoice.error().unwrap_or("not processed")
        ),
    }
}

fn write_summary(path: &Path, invoices: &[Invoice]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["file", "status", "new_file_name"];
    header.extend(FieldName::ALL.iter().map(|f| f.key()));
    header.push("error");
    wtr.write_record(&header)?;

    for invoice in invoices {
        let mut row = vec![
            invoice.original_name(),
            invoice.status().as_str(),
            invoice.output_name(),
        ];
        row.extend(
            FieldName::ALL
                .iter()
                .map(|f| invoice.data().map(|d| d.get(*f)).unwrap_or("")),
        );
        row.push(invoice.error().unwrap_or(""));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inren_core::InvoiceData;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expand_inputs_filters_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.pdf", "b.PNG", "c.txt", "d.jpeg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let all = format!("{}/*", dir.path().display());
        let pdfs = format!("{}/*.pdf", dir.path().display());

        let files = expand_inputs(&[pdfs, all]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.PNG", "d.jpeg"]);
    }

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();

        let mut ok = Invoice::new(SourceFile::new("a.pdf"));
        ok.start_processing().unwrap();
        ok.complete(InvoiceData {
            seller_name: "ACME".to_string(),
            ..Default::default()
        })
        .unwrap();
        ok.new_file_name = Some("ACME.pdf".to_string());

        let mut failed = Invoice::new(SourceFile::new("b.pdf"));
        failed.start_processing().unwrap();
        failed.fail("timeout").unwrap();

        let path = dir.path().join("summary.csv");
        write_summary(&path, &[ok, failed]).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("file,status,new_file_name,sellerName"));
        assert!(lines[0].ends_with(",error"));
        assert_eq!(lines[1], "a.pdf,completed,ACME.pdf,ACME,,,,,,,");
        assert_eq!(lines[2], "b.pdf,error,b.pdf,,,,,,,,timeout");
    }
}
