use crate::error::CallError;

/// The reply text substituted when transcription fails, per the Call
/// Manager's downgrade policy rather than propagating `UpstreamError`.
pub const TRANSCRIPTION_FAILED_SENTINEL: &str = "[transcription failed]";

/// Thin adapter over an external speech-to-text provider. Consumes a
/// complete WAV file per call (no partial/streaming transcription).
pub struct SttClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl SttClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    /// Transcribe a complete WAV file to text.
    pub async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String, CallError> {
        let part = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| CallError::UpstreamError(format!("failed to build request: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let resp = self
            .client
            .post("https://api.speech-provider.example/v1/stt")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CallError::UpstreamError(format!("STT request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CallError::UpstreamError(format!(
                "STT provider returned {status}: {text}"
            )));
        }

        let parsed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CallError::UpstreamError(format!("failed to parse STT response: {e}")))?;

        parsed
            .get("text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CallError::UpstreamError("STT response missing 'text'".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_stable() {
        assert_eq!(TRANSCRIPTION_FAILED_SENTINEL, "[transcription failed]");
    }
}
