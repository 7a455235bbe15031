//! Recognition client with admission control and retry.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::http::HttpTransport;
use super::parser::parse_response;
use super::request::ChatRequest;
use super::{ChatTransport, RetryPolicy};
use crate::error::{InrenError, RecognitionError, Result};
use crate::models::config::AppConfig;
use crate::models::invoice::{InvoiceData, SourceFile};
use crate::pdf::Rasterizer;

/// Default render scale for recognition images.
pub const RECOGNITION_SCALE: f32 = 2.0;

/// Sends invoices to a vision model and parses the replies.
///
/// At most `max_concurrent` recognitions are in flight at once; the limit
/// covers rasterization, the remote call and parsing.
pub struct RecognitionClient {
    config: AppConfig,
    transport: Arc<dyn ChatTransport>,
    rasterizer: Arc<dyn Rasterizer>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    custom_params: Map<String, Value>,
    scale: f32,
}

impl RecognitionClient {
    /// Client talking HTTP to the configured endpoint.
    pub fn new(config: AppConfig, rasterizer: Arc<dyn Rasterizer>) -> Result<Self> {
        check_config(&config)?;
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport), rasterizer)
    }

    /// Client using a caller-supplied transport.
    pub fn with_transport(
        config: AppConfig,
        transport: Arc<dyn ChatTransport>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self> {
        check_config(&config)?;

        let custom_params = config.custom_params_map();
        let permits = Arc::new(Semaphore::new(config.max_concurrent));

        info!(
            "Recognition client ready: model={} max_concurrent={}",
            config.model, config.max_concurrent
        );

        Ok(Self {
            config,
            transport,
            rasterizer,
            permits,
            retry: RetryPolicy::default(),
            custom_params,
            scale: RECOGNITION_SCALE,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Render scale used for recognition images.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    /// Recognitions currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.config
            .max_concurrent
            .saturating_sub(self.permits.available_permits())
    }

    /// Recognize one invoice file.
    ///
    /// Waits for an admission permit first. Rasterization failures are
    /// returned as-is; remote and parse failures are retried per the policy.
    pub async fn recognize(&self, file: &SourceFile) -> Result<InvoiceData> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| InrenError::Config("recognition client is closed".to_string()))?;
        debug!("Admitted {} ({} in flight)", file.name, self.in_flight());

        let image = self.rasterizer.render(file, self.scale).await?;
        let data = self.recognize_image(&image).await?;

        info!("Recognized {}", file.name);
        Ok(data)
    }

    /// Run the request/parse cycle for a rendered page, with retry.
    async fn recognize_image(
        &self,
        image_data_uri: &str,
    ) -> std::result::Result<InvoiceData, RecognitionError> {
        let payload = ChatRequest::recognition(&self.config.model, image_data_uri)
            .into_payload(&self.custom_params);

        let mut attempt = 1;
        loop {
            match self.attempt(&payload).await {
                Ok(data) => return Ok(data),
                Err(err) => {
                    warn!(
                        "Recognition attempt {}/{} failed: {}",
                        attempt, self.retry.max_attempts, err
                    );
                    if attempt >= self.retry.max_attempts || !err.is_retryable() {
                        return Err(RecognitionError::Exhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, payload: &Value) -> std::result::Result<InvoiceData, RecognitionError> {
        let content = self.transport.complete(payload).await?;
        if content.is_empty() {
            return Err(RecognitionError::EmptyResponse);
        }
        debug!("Model reply: {}", content);
        Ok(parse_response(&content)?)
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    if !config.is_configured() {
        return Err(InrenError::Config(
            "API key is not set; run `inren config set api.api_key <KEY>`".to_string(),
        ));
    }
    config.validate_connection()?;
    Ok(())
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
}

/// Send a minimal request to check endpoint, key and model. Never fails.
pub async fn test_connection(config: &AppConfig) -> ConnectionReport {
    match HttpTransport::new(config) {
        Ok(transport) => test_connection_with(&transport, &config.model).await,
        Err(e) => ConnectionReport {
            success: false,
            message: e.to_string(),
        },
    }
}

pub(crate) async fn test_connection_with(
    transport: &dyn ChatTransport,
    model: &str,
) -> ConnectionReport {
    let payload = ChatRequest::ping(model).into_payload(&Map::new());
    match transport.complete(&payload).await {
        Ok(_) => ConnectionReport {
            success: true,
            message: "Connection successful".to_string(),
        },
        Err(e) => ConnectionReport {
            success: false,
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RasterError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const REPLY: &str = r#"{"sellerName":"ACME Corp","amount":"100.50","date":"2024/03/05"}"#;

    struct StaticRasterizer;

    #[async_trait]
    impl Rasterizer for StaticRasterizer {
        async fn render(&self, _file: &SourceFile, _scale: f32) -> crate::pdf::Result<String> {
            Ok("data:image/jpeg;base64,AAAA".to_string())
        }

        async fn page_count(&self, _file: &SourceFile) -> u32 {
            1
        }
    }

    struct BrokenRasterizer;

    #[async_trait]
    impl Rasterizer for BrokenRasterizer {
        async fn render(&self, _file: &SourceFile, _scale: f32) -> crate::pdf::Result<String> {
            Err(RasterError::NoImage)
        }

        async fn page_count(&self, _file: &SourceFile) -> u32 {
            0
        }
    }

    /// Replays scripted replies and records payloads.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<std::result::Result<String, RecognitionError>>>,
        payloads: Mutex<Vec<Value>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<std::result::Result<String, RecognitionError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                payloads: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.payloads.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn complete(&self, payload: &Value) -> std::result::Result<String, RecognitionError> {
            self.payloads.lock().unwrap().push(payload.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(RecognitionError::Transport("script exhausted".to_string())))
        }
    }

    /// Tracks how many requests overlap.
    #[derive(Default)]
    struct ProbeTransport {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ChatTransport for ProbeTransport {
        async fn complete(&self, _payload: &Value) -> std::result::Result<String, RecognitionError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(REPLY.to_string())
        }
    }

    fn config(max_concurrent: usize) -> AppConfig {
        AppConfig {
            api_key: "sk-test".to_string(),
            max_concurrent,
            ..Default::default()
        }
    }

    fn client(transport: Arc<dyn ChatTransport>, max_concurrent: usize) -> RecognitionClient {
        RecognitionClient::with_transport(config(max_concurrent), transport, Arc::new(StaticRasterizer))
            .unwrap()
            .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_recognize_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(REPLY.to_string())]));
        let client = client(transport.clone(), 3);

        let data = client.recognize(&SourceFile::new("a.pdf")).await.unwrap();
        assert_eq!(data.seller_name, "ACME Corp");
        assert_eq!(data.date, "2024-03-05");
        assert_eq!(transport.calls(), 1);
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(RecognitionError::Transport("connection reset".to_string())),
            Ok("no json here".to_string()),
            Ok(REPLY.to_string()),
        ]));
        let client = client(transport.clone(), 1);

        let data = client.recognize(&SourceFile::new("a.pdf")).await.unwrap();
        assert_eq!(data.amount, "100.50");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_surfaces_last_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(RecognitionError::Timeout(Duration::from_secs(30))),
            Ok(String::new()),
            Err(RecognitionError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        ]));
        let client = client(transport.clone(), 1);

        let err = client.recognize(&SourceFile::new("a.pdf")).await.unwrap_err();
        let InrenError::Recognition(RecognitionError::Exhausted { attempts, last }) = err else {
            panic!("expected exhausted retries");
        };
        assert_eq!(attempts, 3);
        assert!(matches!(*last, RecognitionError::Status { status: 500, .. }));
        assert_eq!(transport.calls(), 3);
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_empty_reply_is_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(String::new()),
            Ok(REPLY.to_string()),
        ]));
        let client = client(transport.clone(), 1);

        assert!(client.recognize(&SourceFile::new("a.pdf")).await.is_ok());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_raster_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let client = RecognitionClient::with_transport(
            config(1),
            transport.clone(),
            Arc::new(BrokenRasterizer),
        )
        .unwrap();

        let err = client.recognize(&SourceFile::new("a.pdf")).await.unwrap_err();
        assert!(matches!(err, InrenError::Raster(RasterError::NoImage)));
        assert_eq!(transport.calls(), 0);
        assert_eq!(client.in_flight(), 0);
    }

    async fn peak_concurrency(max_concurrent: usize, calls: usize) -> usize {
        let transport = Arc::new(ProbeTransport::default());
        let client = client(transport.clone(), max_concurrent);
        let files: Vec<SourceFile> = (0..calls)
            .map(|i| SourceFile::new(format!("{}.pdf", i)))
            .collect();

        let results =
            futures_util::future::join_all(files.iter().map(|f| client.recognize(f))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(client.in_flight(), 0);
        transport.peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_admission_ceiling() {
        assert_eq!(peak_concurrency(2, 7).await, 2);
    }

    #[tokio::test]
    async fn test_single_slot_serializes_calls() {
        assert_eq!(peak_concurrency(1, 3).await, 1);
    }

    #[tokio::test]
    async fn test_custom_params_merged_into_payload() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(REPLY.to_string())]));
        let config = AppConfig {
            custom_params: Some(r#"{"temperature": 0.7, "top_p": 0.9}"#.to_string()),
            ..config(1)
        };
        let client =
            RecognitionClient::with_transport(config, transport.clone(), Arc::new(StaticRasterizer))
                .unwrap();

        client.recognize(&SourceFile::new("a.pdf")).await.unwrap();

        let payload = transport.payloads.lock().unwrap()[0].clone();
        assert_eq!(payload["temperature"], serde_json::json!(0.7));
        assert_eq!(payload["top_p"], serde_json::json!(0.9));
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(
            payload["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
    }

    #[tokio::test]
    async fn test_malformed_custom_params_are_ignored() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(REPLY.to_string())]));
        let config = AppConfig {
            custom_params: Some("{broken".to_string()),
            ..config(1)
        };
        let client =
            RecognitionClient::with_transport(config, transport.clone(), Arc::new(StaticRasterizer))
                .unwrap();

        let data = client.recognize(&SourceFile::new("a.pdf")).await.unwrap();
        assert_eq!(data.seller_name, "ACME Corp");

        let payload = transport.payloads.lock().unwrap()[0].clone();
        let mut keys: Vec<&str> = payload
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["max_tokens", "messages", "model", "temperature"]);
    }

    #[test]
    fn test_unconfigured_client_fails_fast() {
        let err = RecognitionClient::with_transport(
            AppConfig::default(),
            Arc::new(ScriptedTransport::default()),
            Arc::new(StaticRasterizer),
        )
        .err()
        .unwrap();
        assert!(matches!(err, InrenError::Config(_)));

        let err = RecognitionClient::with_transport(
            config(11),
            Arc::new(ScriptedTransport::default()),
            Arc::new(StaticRasterizer),
        )
        .err()
        .unwrap();
        assert!(matches!(err, InrenError::Validation(_)));
    }

    #[tokio::test]
    async fn test_connection_report() {
        let ok = ScriptedTransport::new(vec![Ok("hi".to_string())]);
        let report = test_connection_with(&ok, "m").await;
        assert!(report.success);
        assert_eq!(ok.payloads.lock().unwrap()[0]["max_tokens"], 5);

        let failing = ScriptedTransport::new(vec![Err(RecognitionError::Status {
            status: 401,
            body: "invalid key".to_string(),
        })]);
        let report = test_connection_with(&failing, "m").await;
        assert!(!report.success);
        assert!(report.message.contains("401"));
    }
}
