use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use restorer_contracts::image::{EncodedImage, DEFAULT_IMAGE_MIME};
use restorer_contracts::outcome::RestorationOutcome;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{RestorerConfig, RESTORATION_PROMPT};
use crate::RestorationClient;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Restoration client backed by Gemini `generateContent`.
///
/// One POST per call: no retries and no timeout beyond the HTTP client's
/// defaults.
pub struct GeminiRestorer {
    config: RestorerConfig,
    http: HttpClient,
}

impl GeminiRestorer {
    pub fn new(config: RestorerConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    pub fn build_payload(image: &EncodedImage) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": image.mime_type(),
                            "data": image.base64_data(),
                        }
                    },
                    { "text": RESTORATION_PROMPT },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
            },
        })
    }

    fn post(&self, endpoint: &str, payload: &Value) -> Result<String> {
        let response = self
            .http
            .post(endpoint)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_body_or_error("Gemini", response)
    }
}

impl RestorationClient for GeminiRestorer {
    fn name(&self) -> &str {
        "gemini"
    }

    fn restore(&self, image: &EncodedImage) -> RestorationOutcome {
        let endpoint = self.endpoint();
        let payload = Self::build_payload(image);
        log::debug!(
            "posting {} ({} bytes) to {endpoint}",
            image.mime_type(),
            image.len()
        );

        match self.post(&endpoint, &payload) {
            Ok(body) => decode_response(&body),
            Err(err) => {
                let message = error_chain_text(&err, 1024);
                log::error!("Error calling Gemini API: {message}");
                RestorationOutcome::transport(message)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Classifies a `generateContent` response body.
///
/// Only the first candidate is considered and `thought` parts (draft images
/// and reasoning) are skipped. Inline image data wins over text; text-only
/// answers are the model's stated reason for not restoring.
pub fn decode_response(body: &str) -> RestorationOutcome {
    let response: GenerateContentResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            return RestorationOutcome::transport(format!(
                "Gemini returned invalid JSON payload: {err}"
            ))
        }
    };

    let first = response.candidates.first();
    let parts = first
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| content.parts.as_slice())
        .unwrap_or_default();

    if let Some(inline) = parts
        .iter()
        .filter(|part| !part.thought)
        .filter_map(|part| part.inline_data.as_ref())
        .find(|inline| !inline.data.trim().is_empty())
    {
        return match BASE64.decode(inline.data.trim().as_bytes()) {
            Ok(bytes) => RestorationOutcome::Restored(EncodedImage::new(
                inline
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
                bytes,
            )),
            Err(err) => {
                RestorationOutcome::transport(format!("Gemini image base64 decode failed: {err}"))
            }
        };
    }

    let text = parts
        .iter()
        .filter(|part| !part.thought)
        .filter_map(|part| part.text.as_deref())
        .collect::<String>();
    let text = text.trim();
    if !text.is_empty() {
        log::warn!("Gemini API returned a text response instead of an image: {text}");
        return RestorationOutcome::Declined(text.to_string());
    }

    let block_reason = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref());
    let finish_reason = first.and_then(|candidate| candidate.finish_reason.as_deref());
    log::warn!(
        "Gemini response carried no image or text (candidates: {}, block_reason: {}, finish_reason: {})",
        response.candidates.len(),
        block_reason.unwrap_or("none"),
        finish_reason.unwrap_or("none"),
    );
    RestorationOutcome::Empty
}

fn response_body_or_error(provider: &str, response: HttpResponse) -> Result<String> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    Ok(body)
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use restorer_contracts::outcome::GENERIC_RESTORE_FAILURE;
    use serde_json::json;

    use super::*;

    fn config(api_base: &str) -> RestorerConfig {
        RestorerConfig {
            api_key: "test-key".to_string(),
            api_base: api_base.to_string(),
            model: "gemini-2.5-flash-image".to_string(),
        }
    }

    fn jpeg() -> EncodedImage {
        EncodedImage::new("image/jpeg", vec![0xff, 0xd8, 0xff, 0xe0])
    }

    #[test]
    fn payload_pairs_image_with_fixed_instruction() {
        let payload = GeminiRestorer::build_payload(&jpeg());
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(payload["contents"][0]["role"], json!("user"));
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("/9j/4A=="));
        assert_eq!(parts[1]["text"], json!(RESTORATION_PROMPT));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE"])
        );
    }

    #[test]
    fn endpoint_accepts_bare_and_prefixed_models() {
        let mut restorer = GeminiRestorer::new(config("https://example.test/v1beta"));
        assert_eq!(
            restorer.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        restorer.config.model = "models/custom".to_string();
        assert_eq!(
            restorer.endpoint(),
            "https://example.test/v1beta/models/custom:generateContent"
        );
    }

    #[test]
    fn decode_prefers_inline_image_and_keeps_reported_mime() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Here you go"},
                    {"inlineData": {"mimeType": "image/webp", "data": "AQID"}}
                ]}
            }]
        })
        .to_string();
        assert_eq!(
            decode_response(&body),
            RestorationOutcome::Restored(EncodedImage::new("image/webp", vec![1, 2, 3]))
        );
    }

    #[test]
    fn decode_skips_draft_images_from_thinking_models() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [
                    {"inlineData": {"mimeType": "image/png", "data": "CQkJ"}, "thought": true},
                    {"text": "Refining the colors", "thought": true},
                    {"inlineData": {"mimeType": "image/png", "data": "AQID"}}
                ]}
            }]
        })
        .to_string();
        assert_eq!(
            decode_response(&body),
            RestorationOutcome::Restored(EncodedImage::new("image/png", vec![1, 2, 3]))
        );

        let drafts_only = json!({
            "candidates": [{
                "content": {"parts": [
                    {"inlineData": {"mimeType": "image/png", "data": "CQkJ"}, "thought": true}
                ]}
            }]
        })
        .to_string();
        assert_eq!(decode_response(&drafts_only), RestorationOutcome::Empty);
    }

    #[test]
    fn decode_accepts_snake_case_and_missing_mime() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"inline_data": {"data": "AQID"}}]}}]
        })
        .to_string();
        let RestorationOutcome::Restored(image) = decode_response(&body) else {
            panic!("expected restored image");
        };
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.bytes(), &[1, 2, 3]);
    }

    #[test]
    fn decode_text_only_as_declined_verbatim() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "  I can't edit photos of "},
                    {"text": "real people.  "}
                ]},
                "finishReason": "STOP"
            }]
        })
        .to_string();
        assert_eq!(
            decode_response(&body),
            RestorationOutcome::Declined("I can't edit photos of real people.".to_string())
        );
    }

    #[test]
    fn decode_without_image_or_text_is_empty() {
        for body in [
            json!({}),
            json!({"candidates": []}),
            json!({"candidates": [{"finishReason": "IMAGE_SAFETY"}]}),
            json!({"candidates": [{"content": {"parts": [{"text": "   "}]}}]}),
            json!({"promptFeedback": {"blockReason": "PROHIBITED_CONTENT"}}),
        ] {
            assert_eq!(
                decode_response(&body.to_string()),
                RestorationOutcome::Empty,
                "{body}"
            );
        }
    }

    #[test]
    fn decode_malformed_payloads_as_transport_errors() {
        assert!(matches!(
            decode_response("<html>bad gateway</html>"),
            RestorationOutcome::TransportError(message) if message.contains("invalid JSON")
        ));
        let bad_base64 = json!({
            "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "@@@"}}]}}]
        })
        .to_string();
        assert!(matches!(
            decode_response(&bad_base64),
            RestorationOutcome::TransportError(message) if message.contains("base64")
        ));
    }

    #[test]
    fn restore_posts_once_and_decodes_image() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/models/gemini-2.5-flash-image:generateContent")
            .match_header(API_KEY_HEADER, "test-key")
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": {"responseModalities": ["IMAGE"]}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{"content": {"parts": [
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw=="}}
                    ]}}]
                })
                .to_string(),
            )
            .expect(1)
            .create();

        let restorer = GeminiRestorer::new(config(&server.url()));
        let outcome = restorer.restore(&jpeg());
        mock.assert();
        let RestorationOutcome::Restored(image) = outcome else {
            panic!("expected restored image, got {outcome:?}");
        };
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.bytes(), &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn restore_surfaces_http_errors_with_status() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/models/gemini-2.5-flash-image:generateContent")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Resource has been exhausted"}}"#)
            .expect(1)
            .create();

        let outcome = GeminiRestorer::new(config(&server.url())).restore(&jpeg());
        mock.assert();
        let RestorationOutcome::TransportError(message) = outcome else {
            panic!("expected transport error, got {outcome:?}");
        };
        assert!(message.starts_with("Gemini request failed (429)"));
        assert!(message.contains("Resource has been exhausted"));
    }

    #[test]
    fn restore_reports_connection_failures() {
        let outcome = GeminiRestorer::new(config("http://127.0.0.1:1")).restore(&jpeg());
        let RestorationOutcome::TransportError(message) = outcome else {
            panic!("expected transport error, got {outcome:?}");
        };
        assert!(message.starts_with("Gemini request failed"));
        assert!(!message.contains("test-key"));
        assert_ne!(message, GENERIC_RESTORE_FAILURE);
    }

    #[test]
    fn truncate_text_marks_cut_content() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
