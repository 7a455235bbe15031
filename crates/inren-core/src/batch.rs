//! A batch of invoice records moving through recognition, naming and export.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive;
use crate::error::Result;
use crate::models::fields::FieldConfig;
use crate::models::invoice::{Invoice, InvoiceStatus, SourceFile};
use crate::naming::generate_file_name;
use crate::pdf::{Rasterizer, SourceKind};
use crate::recognition::RecognitionClient;

/// Default render scale for previews.
pub const PREVIEW_SCALE: f32 = 1.0;

/// Outcome counts of a recognition run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Ordered collection of invoice records.
pub struct InvoiceBatch {
    invoices: Vec<Invoice>,
    rasterizer: Arc<dyn Rasterizer>,
    preview_scale: Option<f32>,
}

impl InvoiceBatch {
    /// Empty batch that renders a preview for each added file.
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            invoices: Vec::new(),
            rasterizer,
            preview_scale: Some(PREVIEW_SCALE),
        }
    }

    pub fn with_preview_scale(mut self, scale: f32) -> Self {
        self.preview_scale = Some(scale);
        self
    }

    /// Skip preview rendering when files are added.
    pub fn without_previews(mut self) -> Self {
        self.preview_scale = None;
        self
    }

    /// Add a pending record for `source`.
    ///
    /// Files that are not PDF, JPEG or PNG are rejected. A preview failure is
    /// logged and leaves the preview empty.
    pub async fn add_file(&mut self, source: SourceFile) -> Result<&Invoice> {
        SourceKind::detect(&source)?;

        let mut invoice = Invoice::new(source);

        if let Some(scale) = self.preview_scale {
            match self.rasterizer.render(&invoice.source, scale).await {
                Ok(preview) => invoice.preview = Some(preview),
                Err(e) => warn!("No preview for {}: {}", invoice.original_name(), e),
            }
        }

        debug!("Added {} as {}", invoice.original_name(), invoice.id);
        self.invoices.push(invoice);
        let index = self.invoices.len() - 1;
        Ok(&self.invoices[index])
    }

    pub fn invoices(&self) -> &[Invoice] {
        &self.invoices
    }

    pub fn get(&self, id: &str) -> Option<&Invoice> {
        self.invoices.iter().find(|i| i.id == id)
    }

    /// Remove a record by id.
    pub fn remove(&mut self, id: &str) -> Option<Invoice> {
        let index = self.invoices.iter().position(|i| i.id == id)?;
        Some(self.invoices.remove(index))
    }

    pub fn clear(&mut self) {
        self.invoices.clear();
    }

    pub fn len(&self) -> usize {
        self.invoices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invoices.is_empty()
    }

    pub fn count(&self, status: InvoiceStatus) -> usize {
        self.invoices.iter().filter(|i| i.status() == status).count()
    }

    /// Recognize every pending record concurrently.
    ///
    /// Concurrency is bounded by the client. Each record is driven by exactly
    /// one future; `on_done` is called as each record reaches a final state.
    pub async fn recognize_all<F>(&mut self, client: &RecognitionClient, on_done: F) -> BatchSummary
    where
        F: Fn(&Invoice),
    {
        let on_done = &on_done;
        let pending = self
            .invoices
            .iter_mut()
            .filter(|invoice| invoice.status() == InvoiceStatus::Pending);

        let tasks = pending.map(|invoice| async move {
            if let Err(e) = invoice.start_processing() {
                warn!("{}", e);
                return;
            }

            let outcome = match client.recognize(&invoice.source).await {
                Ok(data) => invoice.complete(data),
                Err(e) => {
                    warn!("Recognition failed for {}: {}", invoice.original_name(), e);
                    invoice.fail(e.to_string())
                }
            };
            if let Err(e) = outcome {
                warn!("{}", e);
            }

            on_done(invoice);
        });

        let total = join_all(tasks).await.len();

        let summary = BatchSummary {
            total,
            completed: self.count(InvoiceStatus::Completed),
            failed: self.count(InvoiceStatus::Error),
        };
        info!(
            "Recognized {} invoices: {} completed, {} failed overall",
            summary.total, summary.completed, summary.failed
        );
        summary
    }

    /// Compute and store the output name of every record.
    pub fn apply_names(&mut self, fields: &[FieldConfig], separator: &str) {
        for invoice in &mut self.invoices {
            let name = generate_file_name(invoice, fields, separator);
            debug!("{} -> {}", invoice.original_name(), name);
            invoice.new_file_name = Some(name);
        }
    }

    /// Package all records into one zip archive.
    pub async fn export_zip(&self, zip_path: &Path) -> Result<PathBuf> {
        Ok(archive::download_as_zip(&self.invoices, zip_path).await?)
    }

    /// Copy each record into `dest_dir` under its output name.
    pub async fn export_files(&self, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.invoices.len());
        for invoice in &self.invoices {
            written.push(archive::export_file(invoice, dest_dir).await?);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InrenError, RasterError, RecognitionError};
    use crate::models::config::AppConfig;
    use crate::models::fields::FieldName;
    use crate::recognition::{ChatTransport, RetryPolicy};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Renders anything except files whose name contains "broken".
    struct NameRasterizer;

    #[async_trait]
    impl Rasterizer for NameRasterizer {
        async fn render(&self, file: &SourceFile, _scale: f32) -> crate::pdf::Result<String> {
            if file.name.contains("broken") {
                Err(RasterError::NoImage)
            } else {
                Ok(format!("data:image/jpeg;base64,{}", file.name))
            }
        }

        async fn page_count(&self, _file: &SourceFile) -> u32 {
            1
        }
    }

    /// Echoes the image URL back as the seller name.
    struct EchoTransport;

    #[async_trait]
    impl ChatTransport for EchoTransport {
        async fn complete(&self, payload: &Value) -> std::result::Result<String, RecognitionError> {
            let url = payload["messages"][1]["content"][1]["image_url"]["url"]
                .as_str()
                .unwrap_or_default();
            let name = url.trim_start_matches("data:image/jpeg;base64,");
            if name.contains("reject") {
                return Err(RecognitionError::Status {
                    status: 400,
                    body: "bad image".to_string(),
                });
            }
            Ok(format!(r#"{{"sellerName":"{}","amount":"10"}}"#, name.replace('.', "-")))
        }
    }

    fn client() -> RecognitionClient {
        let config = AppConfig {
            api_key: "sk-test".to_string(),
            max_concurrent: 2,
            ..Default::default()
        };
        RecognitionClient::with_transport(config, Arc::new(EchoTransport), Arc::new(NameRasterizer))
            .unwrap()
            .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(1)))
    }

    async fn batch(names: &[&str]) -> InvoiceBatch {
        let mut batch = InvoiceBatch::new(Arc::new(NameRasterizer));
        for name in names {
            batch.add_file(SourceFile::new(*name)).await.unwrap();
        }
        batch
    }

    #[tokio::test]
    async fn test_add_file_validates_type_and_renders_preview() {
        let mut batch = InvoiceBatch::new(Arc::new(NameRasterizer));

        let invoice = batch.add_file(SourceFile::new("a.pdf")).await.unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Pending);
        assert_eq!(invoice.preview.as_deref(), Some("data:image/jpeg;base64,a.pdf"));

        let err = batch.add_file(SourceFile::new("notes.txt")).await.unwrap_err();
        assert!(matches!(err, InrenError::Raster(RasterError::Unsupported(_))));

        let invoice = batch.add_file(SourceFile::new("broken.png")).await.unwrap();
        assert!(invoice.preview.is_none());
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_without_previews() {
        let mut batch = InvoiceBatch::new(Arc::new(NameRasterizer)).without_previews();
        let invoice = batch.add_file(SourceFile::new("a.pdf")).await.unwrap();
        assert!(invoice.preview.is_none());
    }

    #[tokio::test]
    async fn test_recognize_all_mixed_outcomes() {
        let mut batch = batch(&["a.pdf", "reject.pdf", "broken.pdf", "b.jpg"]).await;
        let done = AtomicUsize::new(0);

        let summary = batch
            .recognize_all(&client(), |_| {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(
            summary,
            BatchSummary {
                total: 4,
                completed: 2,
                failed: 2
            }
        );
        assert_eq!(done.load(Ordering::SeqCst), 4);

        let invoices = batch.invoices();
        assert_eq!(invoices[0].data().unwrap().seller_name, "a-pdf");
        assert_eq!(invoices[1].status(), InvoiceStatus::Error);
        assert!(invoices[1].error().unwrap().contains("400"));
        assert!(invoices[1].data().is_none());
        assert!(invoices[2].error().unwrap().contains("no renderable image"));
    }

    #[tokio::test]
    async fn test_recognize_all_skips_finished_records() {
        let mut batch = batch(&["a.pdf"]).await;
        let client = client();
        batch.recognize_all(&client, |_| {}).await;

        batch.add_file(SourceFile::new("b.pdf")).await.unwrap();
        let seen = Mutex::new(Vec::new());
        let summary = batch
            .recognize_all(&client, |i| seen.lock().unwrap().push(i.original_name().to_string()))
            .await;

        assert_eq!(summary.total, 1);
        assert_eq!(*seen.lock().unwrap(), vec!["b.pdf".to_string()]);
        assert_eq!(batch.count(InvoiceStatus::Completed), 2);
    }

    #[tokio::test]
    async fn test_apply_names_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = ["x.pdf", "y.pdf", "reject.pdf"]
            .iter()
            .map(|n| {
                let path = dir.path().join(n);
                std::fs::write(&path, n).unwrap();
                path
            })
            .collect();

        let mut batch = InvoiceBatch::new(Arc::new(NameRasterizer)).without_previews();
        for path in &paths {
            batch.add_file(SourceFile::new(path)).await.unwrap();
        }
        batch.recognize_all(&client(), |_| {}).await;
        batch.apply_names(&FieldConfig::from_names(&[FieldName::Amount]), "_");

        let names: Vec<&str> = batch.invoices().iter().map(|i| i.output_name()).collect();
        assert_eq!(names, vec!["10.pdf", "10.pdf", "reject.pdf"]);

        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let zip_path = batch.export_zip(&out.join("invoices.zip")).await.unwrap();
        assert!(zip_path.exists());

        let written = batch.export_files(&out).await.unwrap();
        assert_eq!(written.len(), 3);
        assert!(out.join("reject.pdf").exists());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let mut batch = batch(&["a.pdf", "b.pdf"]).await;
        let id = batch.invoices()[0].id.clone();

        assert!(batch.get(&id).is_some());
        assert_eq!(batch.remove(&id).unwrap().original_name(), "a.pdf");
        assert!(batch.remove(&id).is_none());
        assert_eq!(batch.len(), 1);

        batch.clear();
        assert!(batch.is_empty());
    }
}
