//! Gemini document service (Files API + generateContent).
//!
//! Uploads use the resumable protocol: a `start` request announces the
//! file and returns an upload URL, then a single `upload, finalize`
//! request sends the bytes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DocumentService, FileState, RemoteFile, Result};
use crate::error::RemoteError;
use crate::models::config::{Credentials, GenerationConfig, RemoteConfig};
use crate::prompts::SYSTEM_INSTRUCTION;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// [`DocumentService`] backed by the Gemini REST API.
#[derive(Clone)]
pub struct GeminiService {
    client: Client,
    base_url: String,
    model: String,
    credentials: Credentials,
    generation: GenerationConfig,
    system_instruction: String,
}

impl GeminiService {
    /// Build a service with its own HTTP client. The client is shared by
    /// every clone, so all workers reuse one connection pool.
    pub fn new(remote: &RemoteConfig, generation: GenerationConfig, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(remote.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            model: remote.model.clone(),
            credentials,
            generation,
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/v1beta/files", self.base_url)
    }

    fn file_url(&self, name: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, name)
    }

    fn generate_url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    fn generate_request<'a>(&'a self, file: &'a RemoteFile, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: &self.system_instruction,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![
                    Part::File {
                        file_data: FileData {
                            mime_type: &file.mime_type,
                            file_uri: &file.uri,
                        },
                    },
                    Part::Text { text: prompt },
                ],
            }],
            generation_config: WireGenerationConfig {
                temperature: self.generation.temperature,
                top_p: self.generation.top_p,
                top_k: self.generation.top_k,
                max_output_tokens: self.generation.max_output_tokens,
                response_mime_type: &self.generation.response_mime_type,
            },
        }
    }
}

/// Turn non-success statuses into [`RemoteError::Status`].
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl DocumentService for GeminiService {
    async fn upload(&self, data: Vec<u8>, mime_type: &str, display_name: &str) -> Result<RemoteFile> {
        let start = self
            .client
            .post(self.upload_url())
            .header(API_KEY_HEADER, self.credentials.api_key())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RemoteError::Decode("upload start response has no upload URL".to_string()))?
            .to_string();

        let size = data.len();
        let finished = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await?;
        let finished = check_status(finished).await?;

        let uploaded: UploadResponse = finished
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        debug!("Uploaded {} bytes as {}", size, uploaded.file.name);

        Ok(RemoteFile {
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
            name: uploaded.file.name,
            uri: uploaded.file.uri,
        })
    }

    async fn file_state(&self, file: &RemoteFile) -> Result<FileState> {
        let response = self
            .client
            .get(self.file_url(&file.name))
            .header(API_KEY_HEADER, self.credentials.api_key())
            .send()
            .await?;
        let response = check_status(response).await?;

        let resource: FileResource = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(FileState::parse(
            resource.state.as_deref().unwrap_or("STATE_UNSPECIFIED"),
        ))
    }

    async fn generate(&self, file: &RemoteFile, prompt: &str) -> Result<String> {
        let request = self.generate_request(file, prompt);
        let response = self
            .client
            .post(self.generate_url())
            .header(API_KEY_HEADER, self.credentials.api_key())
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        response_text(body)
    }

    fn service_name(&self) -> &'static str {
        "Gemini"
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(response: GenerateResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(RemoteError::EmptyResponse);
    }
    Ok(text)
}

// API request/response types

#[derive(Deserialize)]
struct UploadResponse {
    file: FileResource,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}
