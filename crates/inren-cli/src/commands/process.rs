//! Process command - recognize a single invoice file.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info};

use inren_core::pdf::SourceKind;
use inren_core::{
    FieldName, Invoice, InvoiceData, PageRasterizer, RecognitionClient, SourceFile, export_file,
    generate_file_name,
};

use super::{field_selection, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF, JPEG or PNG)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Fields composing the new name, comma separated (e.g. sellerName,amount,date)
    #[arg(long, value_delimiter = ',')]
    fields: Vec<FieldName>,

    /// Separator placed between name parts
    #[arg(short, long)]
    separator: Option<String>,

    /// Copy the file under its new name into this directory
    #[arg(long)]
    copy_to: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessOutput<'a> {
    file: &'a str,
    new_file_name: &'a str,
    data: &'a InvoiceData,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let source = SourceFile::new(&args.input);
    SourceKind::detect(&source)?;

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Recognizing {}...", source.name));

    let rasterizer = Arc::new(PageRasterizer::new(&config.render));
    let client = RecognitionClient::new(config.api.clone(), rasterizer)?
        .with_scale(config.render.recognition_scale);

    let mut invoice = Invoice::new(source);
    invoice.start_processing()?;
    match client.recognize(&invoice.source).await {
        Ok(data) => invoice.complete(data)?,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e.into());
        }
    }
    pb.finish_and_clear();

    let fields = field_selection(&args.fields, &config.naming.fields);
    let separator = args.separator.as_deref().unwrap_or(&config.naming.separator);
    let new_name = generate_file_name(&invoice, &fields, separator);
    invoice.new_file_name = Some(new_name);

    let output = format_invoice(&invoice, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if let Some(dest) = &args.copy_to {
        fs::create_dir_all(dest)?;
        let target = export_file(&invoice, dest).await?;
        println!(
            "{} Copied to {}",
            style("✓").green(),
            target.display()
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

fn format_invoice(invoice: &Invoice, format: OutputFormat) -> anyhow::Result<String> {
    let Some(data) = invoice.data() else {
        anyhow::bail!("Invoice {} has no recognized data", invoice.original_name());
    };

    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&ProcessOutput {
            file: invoice.original_name(),
            new_file_name: invoice.output_name(),
            data,
        })?),
        OutputFormat::Csv => format_csv(invoice, data),
        OutputFormat::Text => Ok(format_text(invoice, data)),
    }
}

fn format_csv(invoice: &Invoice, data: &InvoiceData) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["file", "new_file_name"];
    header.extend(FieldName::ALL.iter().map(|f| f.key()));
    wtr.write_record(&header)?;

    let mut row = vec![invoice.original_name(), invoice.output_name()];
    row.extend(FieldName::ALL.iter().map(|f| data.get(*f)));
    wtr.write_record(&row)?;

    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn format_text(invoice: &Invoice, data: &InvoiceData) -> String {
    let mut output = String::new();

    output.push_str(&format!("File:     {}\n", invoice.original_name()));
    output.push_str(&format!("New name: {}\n", invoice.output_name()));
    output.push('\n');

    for field in FieldName::ALL {
        let value = data.get(field);
        output.push_str(&format!(
            "  {:<16} {}\n",
            format!("{}:", field.label()),
            if value.is_empty() { "-" } else { value }
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn invoice() -> Invoice {
        let mut invoice = Invoice::new(SourceFile::new("in/scan.pdf"));
        invoice.start_processing().unwrap();
        invoice
            .complete(InvoiceData {
                seller_name: "ACME, Corp".to_string(),
                amount: "100.50".to_string(),
                ..Default::default()
            })
            .unwrap();
        invoice.new_file_name = Some("ACME, Corp_100.50.pdf".to_string());
        invoice
    }

    #[test]
    fn test_format_csv_quotes_values() {
        let csv = format_invoice(&invoice(), OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "file,new_file_name,sellerName,sellerTaxId,buyerName,buyerTaxId,amount,date,invoiceNumber"
        );
        assert_eq!(lines[1], "scan.pdf,\"ACME, Corp_100.50.pdf\",\"ACME, Corp\",,,,100.50,,");
    }

    #[test]
    fn test_format_json() {
        let json = format_invoice(&invoice(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["newFileName"], "ACME, Corp_100.50.pdf");
        assert_eq!(value["data"]["sellerName"], "ACME, Corp");
        assert_eq!(value["data"]["date"], "");
    }

    #[test]
    fn test_format_text_marks_empty_fields() {
        let text = format_invoice(&invoice(), OutputFormat::Text).unwrap();
        assert!(text.contains("New name: ACME, Corp_100.50.pdf"));
        assert!(text.contains("100.50"));
        assert!(text.contains(" -\n"));
    }
}
