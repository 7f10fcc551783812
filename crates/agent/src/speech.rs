use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::process::Command;
use tokio::sync::Mutex;

use tablebook_core::config::{LlmConfig, LlmProvider, SpeechConfig};

// tts-1 streams raw 16-bit mono pcm at this rate.
const TTS_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("audio device error: {0}")]
    Device(#[from] std::io::Error),
    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: String },
    #[error("speech api transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("speech api error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("input stream closed")]
    InputClosed,
    #[error("speech channel misconfigured: {0}")]
    Configuration(String),
}

/// Where utterances come from and replies go to.
#[async_trait]
pub trait SpeechChannel: Send + Sync {
    async fn record_utterance(&self) -> Result<String, SpeechError>;
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Text console used in debug mode: one line per utterance.
pub struct ConsoleSpeech<R, W> {
    input: Mutex<Lines<R>>,
    output: Mutex<W>,
}

impl ConsoleSpeech<tokio::io::BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> ConsoleSpeech<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input: Mutex::new(input.lines()), output: Mutex::new(output) }
    }

    pub fn into_output(self) -> W {
        self.output.into_inner()
    }
}

#[async_trait]
impl<R, W> SpeechChannel for ConsoleSpeech<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn record_utterance(&self) -> Result<String, SpeechError> {
        {
            let mut output = self.output.lock().await;
            output.write_all(b"USER: ").await?;
            output.flush().await?;
        }

        let mut input = self.input.lock().await;
        match input.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(SpeechError::InputClosed),
        }
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let mut output = self.output.lock().await;
        output.write_all(format!("SYSTEM: {text}\n").as_bytes()).await?;
        output.flush().await?;
        Ok(())
    }
}

/// Live audio: records with an external capture command, transcribes with
/// the OpenAI audio API, and plays synthesized speech through an external
/// playback command.
pub struct VoiceSpeech {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    config: SpeechConfig,
    scratch_dir: PathBuf,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl VoiceSpeech {
    pub fn from_config(
        speech: &SpeechConfig,
        llm: &LlmConfig,
        timeout: Duration,
    ) -> Result<Self, SpeechError> {
        let api_key = llm.api_key.clone().ok_or_else(|| {
            SpeechError::Configuration("voice mode needs llm.api_key for the audio api".to_string())
        })?;
        let base_url = match (llm.provider, llm.base_url.as_deref()) {
            (LlmProvider::OpenAi, Some(url)) if !url.trim().is_empty() => url.to_string(),
            _ => LlmProvider::OpenAi.default_base_url().to_string(),
        };
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            config: speech.clone(),
            scratch_dir: std::env::temp_dir(),
        })
    }

    fn scratch_file(&self, extension: &str) -> PathBuf {
        self.scratch_dir.join(format!("tablebook-{}.{extension}", uuid::Uuid::new_v4()))
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, SpeechError> {
        let file = reqwest::multipart::Part::bytes(audio)
            .file_name("utterance.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.config.transcription_model.clone())
            .text("language", self.config.language.clone());

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Status { status, body });
        }

        let transcription: TranscriptionResponse = response.json().await?;
        Ok(transcription.text.trim().to_string())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let response = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({
                "model": &self.config.tts_model,
                "voice": &self.config.voice,
                "input": text,
                "response_format": "pcm"
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Status { status, body });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechChannel for VoiceSpeech {
    async fn record_utterance(&self) -> Result<String, SpeechError> {
        let path = self.scratch_file("wav");
        let recorded =
            run_template(&self.config.record_command, &path, self.config.record_secs).await;
        let audio = match recorded {
            Ok(()) => tokio::fs::read(&path).await.map_err(SpeechError::from),
            Err(error) => Err(error),
        };
        let _ = tokio::fs::remove_file(&path).await;

        self.transcribe(audio?).await
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let pcm = self.synthesize(text).await?;
        let path = self.scratch_file("pcm");
        tokio::fs::write(&path, &pcm).await?;

        tracing::debug!(
            event_name = "speech.playback.started",
            bytes = pcm.len(),
            sample_rate = TTS_SAMPLE_RATE,
            "playing synthesized reply"
        );
        let played =
            run_template(&self.config.playback_command, &path, self.config.record_secs).await;
        let _ = tokio::fs::remove_file(&path).await;
        played
    }
}

/// Splits a command template on whitespace and fills `{path}` and `{secs}`.
pub fn expand_command(template: &str, path: &Path, secs: u32) -> Option<(String, Vec<String>)> {
    let path = path.to_string_lossy();
    let secs = secs.to_string();
    let mut parts = template
        .split_whitespace()
        .map(|part| part.replace("{path}", &path).replace("{secs}", &secs));
    let program = parts.next()?;
    Some((program, parts.collect()))
}

async fn run_template(template: &str, path: &Path, secs: u32) -> Result<(), SpeechError> {
    let (program, args) = expand_command(template, path, secs)
        .ok_or_else(|| SpeechError::Configuration("empty audio command".to_string()))?;

    let status = Command::new(&program).args(&args).status().await?;
    if !status.success() {
        return Err(SpeechError::CommandFailed { command: program, status: status.to_string() });
    }
    Ok(())
}
