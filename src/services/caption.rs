//! Caption stage: transcribe the clip's audio with Groq Whisper, then ask a
//! Llama model for a short viral caption with hashtags.

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;

use crate::services::editor::{run_ffmpeg, FfmpegFailure};
use crate::services::stages::{CaptionError, Captioner};

/// Client for Groq's OpenAI-compatible API.
pub struct GroqCaptioner {
    http: Client,
    api_key: Option<String>,
    base_url: String,
    transcription_model: String,
    caption_model: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub fn caption_prompt(transcript: &str) -> String {
    format!(
        "You are an expert TikTok/Reels growth marketer. Below is the transcript of a short video. \
         Write a highly engaging caption of at most two sentences, followed by exactly 5 trending \
         hashtags.\n\nTranscript: \"{}\"\n\nOutput ONLY the caption and hashtags.",
        transcript.trim()
    )
}

impl GroqCaptioner {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        transcription_model: impl Into<String>,
        caption_model: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transcription_model: transcription_model.into(),
            caption_model: caption_model.into(),
        }
    }

    async fn extract_audio(&self, media: &Path) -> Result<std::path::PathBuf, CaptionError> {
        let audio = media.with_extension("mp3");
        let args: Vec<String> = vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            media.to_string_lossy().into_owned(),
            "-vn".into(),
            "-acodec".into(),
            "libmp3lame".into(),
            "-q:a".into(),
            "4".into(),
            audio.to_string_lossy().into_owned(),
        ];
        run_ffmpeg(&args).await.map_err(|e| match e {
            FfmpegFailure::NotFound => CaptionError::Audio("ffmpeg not found in PATH".to_string()),
            FfmpegFailure::Io(e) => CaptionError::Io(e),
            FfmpegFailure::Exited(msg) => CaptionError::Audio(msg),
        })?;
        Ok(audio)
    }

    async fn transcribe(&self, api_key: &str, audio: &Path) -> Result<String, CaptionError> {
        let bytes = tokio::fs::read(audio).await?;
        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(bytes)
                    .file_name("audio.mp3")
                    .mime_str("audio/mpeg")?,
            )
            .text("model", self.transcription_model.clone());

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let body: TranscriptionResponse = check(response).await?.json().await?;
        Ok(body.text)
    }

    async fn write_caption(&self, api_key: &str, transcript: &str) -> Result<String, CaptionError> {
        let request = serde_json::json!({
            "model": self.caption_model,
            "messages": [{ "role": "user", "content": caption_prompt(transcript) }],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let body: ChatResponse = check(response).await?.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(CaptionError::Empty)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, CaptionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CaptionError::Api {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

#[async_trait]
impl Captioner for GroqCaptioner {
    async fn caption(&self, media: &Path) -> Result<String, CaptionError> {
        let api_key = self.api_key.as_deref().ok_or(CaptionError::MissingApiKey)?;

        let audio = self.extract_audio(media).await?;
        tracing::debug!(model = %self.transcription_model, "Transcribing audio");
        let transcript = self.transcribe(api_key, &audio).await;
        if let Err(e) = tokio::fs::remove_file(&audio).await {
            tracing::warn!(error = %e, "Failed to remove extracted audio");
        }
        let transcript = transcript?;

        tracing::info!(
            transcript_chars = transcript.len(),
            model = %self.caption_model,
            "Generating caption"
        );
        self.write_caption(api_key, &transcript).await
    }
}
