//! Chat completion request payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// System instruction for invoice extraction.
pub const SYSTEM_PROMPT: &str = r#"You are an invoice recognition assistant.
Extract the following fields from the invoice image and return them as a single minified JSON object with exactly these keys:
{"sellerName":"seller name","sellerTaxId":"seller tax ID / unified social credit code","buyerName":"buyer name","buyerTaxId":"buyer tax ID / unified social credit code","amount":"invoice amount","date":"invoice date","invoiceNumber":"invoice number"}

Rules:
1. Return the raw JSON string only. Never wrap it in a Markdown code block such as ```json.
2. Do not add any explanation or other text.
3. If a field cannot be recognized, use an empty string "".
4. The date must use the YYYY-MM-DD format.
5. The amount may contain only digits and a decimal point."#;

/// Instruction accompanying the invoice image.
pub const USER_PROMPT: &str =
    "Recognize this invoice image, extract the fields and return them as JSON.";

/// Completion budget for a recognition request.
pub const MAX_TOKENS: u32 = 4000;

/// Sampling temperature for a recognition request.
pub const TEMPERATURE: f64 = 0.1;

/// An OpenAI-compatible chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: String,
}

impl ChatRequest {
    /// Recognition request for one page image.
    pub fn recognition(model: &str, image_data_uri: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: USER_PROMPT.to_string(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: image_data_uri.to_string(),
                                detail: "auto".to_string(),
                            },
                        },
                    ]),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: Some(TEMPERATURE),
        }
    }

    /// Minimal text-only request used to check connectivity.
    pub fn ping(model: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Text("test".to_string()),
            }],
            max_tokens: 5,
            temperature: None,
        }
    }

    /// Serialize, then overlay custom parameters (custom keys win).
    pub fn into_payload(self, custom: &Map<String, Value>) -> Value {
        let mut payload = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Value::Object(map) = &mut payload {
            map.extend(custom.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        payload
    }
}

/// The subset of a chat completion response we read.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Text of the first choice, empty if absent.
    pub fn into_content(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default()
    }
}
