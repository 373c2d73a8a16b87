use async_trait::async_trait;
use reqwest::Client;

use super::{GatewayError, TranslationGateway};
use crate::localize::Language;

/// Client for the public Google Translate `gtx` endpoint. No key required;
/// the endpoint rate-limits aggressively, so callers must treat every
/// result as optional.
pub struct GoogleTranslate {
    endpoint: String,
    http: Client,
}

impl GoogleTranslate {
    pub fn new(endpoint: &str) -> Result<Self, GatewayError> {
        let http = Client::builder().build()?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            http,
        })
    }
}

#[async_trait]
impl TranslationGateway for GoogleTranslate {
    async fn translate(&self, text: &str, target: Language) -> Result<String, GatewayError> {
        // Only two languages exist, so the source is whichever one isn't the target.
        let source = target.opposite();

        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", source.code()),
                ("tl", target.code()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_translation(&body)
            .ok_or_else(|| GatewayError::Decode("no translated segments in response".into()))
    }
}

/// Join the translated segments of a `translate_a/single` response.
///
/// The payload is positional: `[[["<translated>", "<original>", ...], ...], ...]`,
/// one inner array per sentence.
pub fn parse_translation(body: &serde_json::Value) -> Option<String> {
    let segments = body.get(0)?.as_array()?;
    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0)?.as_str())
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

/// Translate `text`, showing the original whenever the gateway fails or
/// answers with nothing. Blank input is returned as-is without a request.
pub async fn translate_or_original(
    gateway: &dyn TranslationGateway,
    text: &str,
    target: Language,
) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    match gateway.translate(text, target).await {
        Ok(translated) if !translated.trim().is_empty() => translated,
        Ok(_) => text.to_string(),
        Err(e) => {
            log::warn!("Translation to {} failed, showing original: {}", target, e);
            text.to_string()
        }
    }
}

/// Translate a batch concurrently, each item falling back independently.
pub async fn translate_all(
    gateway: &dyn TranslationGateway,
    texts: &[String],
    target: Language,
) -> Vec<String> {
    futures::future::join_all(
        texts
            .iter()
            .map(|text| translate_or_original(gateway, text, target)),
    )
    .await
}
