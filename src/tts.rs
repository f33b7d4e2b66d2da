use crate::error::CallError;

/// Thin adapter over an external text-to-speech provider.
///
/// Returns linear PCM (little-endian i16, mono) at 8 kHz, matching the
/// sample rate the rest of the pipeline (codec, media session) assumes.
pub struct TtsClient {
    client: reqwest::Client,
    api_key: String,
    default_voice: String,
    default_speed: f32,
}

impl TtsClient {
    pub fn new(api_key: String, default_voice: String, default_speed: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            default_voice,
            default_speed,
        }
    }

    /// Synthesize `text` using the configured default voice and speed.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CallError> {
        self.synthesize_with(text, &self.default_voice, self.default_speed)
            .await
    }

    /// Synthesize `text` with an explicit voice and speed multiplier.
    pub async fn synthesize_with(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<Vec<u8>, CallError> {
        let body = serde_json::json!({
            "text": text,
            "voice": voice,
            "speed": speed,
            "sample_rate": 8000,
            "encoding": "pcm_s16le",
        });

        let resp = self
            .client
            .post("https://api.speech-provider.example/v1/tts")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::UpstreamError(format!("TTS request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CallError::UpstreamError(format!(
                "TTS provider returned {status}: {text}"
            )));
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| CallError::UpstreamError(format!("failed to read TTS response: {e}")))
    }
}
