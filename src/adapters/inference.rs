use crate::config::toml_config::InferenceConfig;
use crate::domain::model::DamageImage;
use crate::domain::ports::{InferenceClient, VisionRequest};
use crate::utils::error::{AssessmentError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible endpoints.
///
/// Every request is sent once with temperature 0; failures come back as
/// `InferenceError` carrying the HTTP status (0 when no response arrived).
pub struct OpenAiGateway {
    client: Client,
    api_base: String,
    api_key: String,
    vision_model: String,
    vision_max_tokens: u32,
    text_max_tokens: u32,
}

impl OpenAiGateway {
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AssessmentError::config(format!("cannot build inference client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            vision_model: config.vision_model.clone(),
            vision_max_tokens: config.vision_max_tokens,
            text_max_tokens: config.text_max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    async fn complete(&self, payload: Value) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        tracing::debug!("Inference response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssessmentError::InferenceError {
                status: status.as_u16(),
                message: if body.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body
                },
            });
        }

        let completion: ChatCompletion = response.json().await.map_err(transport_error)?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AssessmentError::InferenceError {
                status: status.as_u16(),
                message: "response carried no completion choice".to_string(),
            })
    }
}

fn transport_error(error: reqwest::Error) -> AssessmentError {
    AssessmentError::InferenceError {
        status: error.status().map(|s| s.as_u16()).unwrap_or(0),
        message: error.to_string(),
    }
}

fn image_part(image: &DamageImage) -> Value {
    json!({
        "type": "image_url",
        "image_url": {
            "url": format!("data:{};base64,{}", image.mime_type, BASE64.encode(&image.bytes)),
        },
    })
}

/// User content for a multimodal call: the text, then subject images, then
/// reference images.
pub fn vision_content(request: &VisionRequest<'_>) -> Vec<Value> {
    let mut content = vec![json!({"type": "text", "text": request.user_prompt})];
    content.extend(
        request
            .subject_images
            .iter()
            .chain(request.reference_images)
            .map(image_part),
    );
    content
}

#[async_trait]
impl InferenceClient for OpenAiGateway {
    async fn vision_completion(&self, request: VisionRequest<'_>) -> Result<String> {
        tracing::debug!(
            "📡 Vision call with {} subject and {} reference image(s)",
            request.subject_images.len(),
            request.reference_images.len()
        );
        let payload = json!({
            "model": self.vision_model,
            "temperature": 0,
            "max_tokens": self.vision_max_tokens,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": vision_content(&request)},
            ],
        });
        self.complete(payload).await
    }

    async fn text_completion(&self, model: &str, system_prompt: &str, user_prompt: &str) -> Result<String> {
        tracing::debug!("📡 Text call to {}", model);
        let payload = json!({
            "model": model,
            "temperature": 0,
            "max_tokens": self.text_max_tokens,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });
        self.complete(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_images_precede_references() {
        let subjects = vec![DamageImage::new("claim.png", vec![1, 2, 3])];
        let references = vec![DamageImage::new("golf.jpg", vec![4, 5])];
        let request = VisionRequest {
            subject_images: &subjects,
            reference_images: &references,
            system_prompt: "system",
            user_prompt: "user",
        };

        let content = vision_content(&request);
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["text"], "user");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AQID");
        assert_eq!(content[2]["image_url"]["url"], "data:image/jpeg;base64,BAU=");
    }
}
