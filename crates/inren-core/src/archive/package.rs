//! Zip packaging and single-file export.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::names::NameRegistry;
use crate::error::ArchiveError;
use crate::models::invoice::Invoice;

/// Default archive file name.
pub const DEFAULT_ARCHIVE_NAME: &str = "invoices.zip";

/// Write every invoice's source file into one zip archive at `zip_path`.
///
/// Entries are named after each invoice's computed name (or original name),
/// with collisions numbered. The archive only appears on disk once it is
/// complete; on any failure nothing is written.
pub async fn download_as_zip(invoices: &[Invoice], zip_path: &Path) -> Result<PathBuf, ArchiveError> {
    let mut registry = NameRegistry::new();
    let mut entries = Vec::with_capacity(invoices.len());

    for invoice in invoices {
        let name = registry.claim(invoice.output_name());
        let data = invoice
            .source
            .read()
            .await
            .map_err(|source| ArchiveError::Read {
                path: invoice.source.path.clone(),
                source,
            })?;
        debug!("Adding {} as {} ({} bytes)", invoice.original_name(), name, data.len());
        entries.push((name, data));
    }

    let bytes = build_zip(&entries)?;
    write_atomically(zip_path, &bytes)?;

    info!(
        "Wrote {} entries to {} ({})",
        entries.len(),
        zip_path.display(),
        super::format_file_size(bytes.len() as u64)
    );
    Ok(zip_path.to_path_buf())
}

/// Copy one invoice's source file into `dest_dir` under its output name.
///
/// An existing file of the same name is overwritten.
pub async fn export_file(invoice: &Invoice, dest_dir: &Path) -> Result<PathBuf, ArchiveError> {
    let target = dest_dir.join(invoice.output_name());

    let data = invoice
        .source
        .read()
        .await
        .map_err(|source| ArchiveError::Read {
            path: invoice.source.path.clone(),
            source,
        })?;

    tokio::fs::write(&target, &data)
        .await
        .map_err(|source| ArchiveError::Write {
            path: target.clone(),
            source,
        })?;

    debug!("Exported {} -> {}", invoice.original_name(), target.display());
    Ok(target)
}

fn build_zip(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data) in entries {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(data).map_err(ZipError::from)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Write through a temp file in the destination directory, then rename into place.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write_error = |source: std::io::Error| ArchiveError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(write_error)?;
    temp.write_all(bytes).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;
    temp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}
