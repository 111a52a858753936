//! Webhook messenger
//!
//! A [`Messenger`] implementation that POSTs JSON to a configured HTTP
//! endpoint. Useful for bridging into chat platforms that accept incoming
//! webhooks; platform-specific senders live outside this crate and plug in
//! through the same trait.

use crate::config::WebhookConfig;
use crate::deliver::{render_interaction, Delivery, Messenger};
use crate::error::{Error, Result};
use crate::types::Interaction;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

/// HTTP messenger for incoming-webhook style endpoints.
pub struct WebhookMessenger {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookMessenger {
    /// Create a new messenger from configuration.
    ///
    /// Returns an error if the configuration is invalid or missing
    /// required fields.
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        config.validate()?;

        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("webhook.url is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &config.token {
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid token: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client, url })
    }

    async fn post(&self, body: serde_json::Value) -> Delivery {
        match self.http_client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => Delivery::ok(),
            Ok(response) => Delivery::failed(format!("HTTP {}", response.status())),
            Err(e) => Delivery::failed(format!("HTTP request failed: {}", e)),
        }
    }
}

/// Build the plain-text payload.
fn text_payload(text: &str) -> serde_json::Value {
    serde_json::json!({ "text": text })
}

/// Build the question payload: rendered text for dumb receivers plus the
/// structured interaction for receivers that can do better.
fn question_payload(question: &Interaction) -> serde_json::Value {
    serde_json::json!({
        "text": render_interaction(question),
        "question": question,
    })
}

#[async_trait]
impl Messenger for WebhookMessenger {
    async fn send_text(&self, text: &str) -> Delivery {
        self.post(text_payload(text)).await
    }

    async fn send_question(&self, question: &Interaction) -> Delivery {
        self.post(question_payload(question)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InteractionKind, QuestionOption};

    #[test]
    fn test_rejects_missing_url() {
        let config = WebhookConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(WebhookMessenger::new(&config).is_err());
    }

    #[test]
    fn test_builds_with_url_and_token() {
        let config = WebhookConfig {
            enabled: true,
            url: Some("https://hooks.example.com/notify".to_string()),
            token: Some("wh_live_test".to_string()),
            timeout_secs: 5,
        };
        assert!(WebhookMessenger::new(&config).is_ok());
    }

    #[test]
    fn test_question_payload_shape() {
        let question = Interaction {
            kind: InteractionKind::Question,
            header: String::new(),
            body: "Proceed?".to_string(),
            options: vec![QuestionOption {
                label: "Yes".to_string(),
                description: None,
            }],
            multi_select: false,
            plan_path: None,
            plan_excerpt: None,
        };
        let payload = question_payload(&question);
        assert!(payload["text"].as_str().unwrap().contains("Proceed?"));
        assert_eq!(payload["question"]["kind"], "question");
        assert_eq!(payload["question"]["options"][0]["label"], "Yes");
    }
}
