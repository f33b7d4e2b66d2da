use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use base64::Engine;
use serde::Deserialize;

use crate::error::CallError;

/// One 20 ms frame at 8 kHz mono μ-law.
const FRAME_BYTES: usize = 160;
const FRAME_PACE: Duration = Duration::from_millis(20);
/// Per-character trailing-tail heuristic approximating jitter-buffer drain
/// after the last frame of an utterance has been written to the wire.
const TAIL_MS_PER_CHAR: u64 = 50;

pub const SILENCE_THRESHOLD: Duration = Duration::from_millis(2000);
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(60_000);
/// How long an unclaimed stream is kept open before being closed as spurious.
const SPURIOUS_STREAM_IDLE: Duration = Duration::from_millis(5000);

#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
#[serde(rename_all = "lowercase")]
enum StreamEvent {
    Start {
        #[serde(default)]
        start: serde_json::Value,
    },
    Media {
        media: MediaPayload,
    },
    Stop {
        #[serde(default)]
        stop: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

/// A bound media stream: exactly one WebSocket, exactly one Call, accessed
/// only by that call's currently active turn.
pub struct MediaSession {
    socket: WebSocket,
}

impl MediaSession {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }

    /// Slice `mulaw` into 160-byte (20 ms) frames, pace them onto the wire,
    /// then wait the trailing-tail heuristic before returning.
    pub async fn speak(&mut self, mulaw: &[u8], text: &str) -> Result<(), CallError> {
        for chunk in mulaw.chunks(FRAME_BYTES) {
            let payload = base64::engine::general_purpose::STANDARD.encode(chunk);
            let frame = serde_json::json!({
                "event": "media",
                "media": { "payload": payload },
            });
            self.socket
                .send(Message::Text(frame.to_string().into()))
                .await
                .map_err(|_| CallError::PeerClosed)?;
            tokio::time::sleep(FRAME_PACE).await;
        }

        let tail = Duration::from_millis(TAIL_MS_PER_CHAR * text.chars().count() as u64);
        tokio::time::sleep(tail).await;

        self.drain_queued_frames().await;
        Ok(())
    }

    /// Best-effort, non-blocking drain of any `media` frames that queued up
    /// on the socket while we were speaking. Per the no-barge-in policy these
    /// must not be misattributed as the start of the caller's next utterance.
    async fn drain_queued_frames(&mut self) {
        loop {
            match tokio::time::timeout(Duration::from_millis(0), self.socket.recv()).await {
                Ok(Some(Ok(_))) => continue,
                _ => break,
            }
        }
    }

    /// Accumulate inbound `media` frames until `SILENCE_THRESHOLD` elapses
    /// with no new frame, or fail with `ListenTimeout` if `RESPONSE_TIMEOUT`
    /// elapses first (or the peer closes mid-listen).
    pub async fn listen(&mut self) -> Result<Vec<u8>, CallError> {
        let overall_deadline = Instant::now() + RESPONSE_TIMEOUT;
        let mut last_media_at = Instant::now();
        let mut buffer = Vec::new();

        loop {
            let now = Instant::now();
            if now >= overall_deadline {
                return Err(CallError::ListenTimeout);
            }
            let silence_deadline = last_media_at + SILENCE_THRESHOLD;
            let deadline = overall_deadline.min(silence_deadline);
            let wait = deadline.saturating_duration_since(now);

            match tokio::time::timeout(wait, self.socket.recv()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    match serde_json::from_str::<StreamEvent>(&text) {
                        Ok(StreamEvent::Media { media }) => {
                            match base64::engine::general_purpose::STANDARD.decode(&media.payload)
                            {
                                Ok(bytes) => {
                                    buffer.extend_from_slice(&bytes);
                                    last_media_at = Instant::now();
                                }
                                Err(e) => {
                                    tracing::warn!("failed to decode media payload: {e}");
                                }
                            }
                        }
                        Ok(StreamEvent::Start { .. }) => {
                            tracing::debug!("stream start event during listen");
                        }
                        Ok(StreamEvent::Stop { .. }) => {
                            return Err(CallError::ListenTimeout);
                        }
                        Err(e) => {
                            tracing::warn!("failed to parse stream event: {e}");
                        }
                    }
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                    return Err(CallError::ListenTimeout);
                }
                // Per §7, a peer closing mid-listen surfaces as `ListenTimeout`,
                // not `PeerClosed` — the agent-facing API never exposes that variant.
                Ok(Some(Err(_))) => return Err(CallError::ListenTimeout),
                Ok(Some(Ok(_))) => continue,
                Err(_elapsed) => {
                    if Instant::now() >= silence_deadline {
                        return Ok(buffer);
                    }
                    return Err(CallError::ListenTimeout);
                }
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

/// Read and discard frames from an unclaimed stream for a short idle period,
/// then close it. Used when a media stream arrives with no Call waiting in
/// `PendingStream` to bind to.
pub async fn discard_idle_stream(mut socket: WebSocket) {
    let deadline = Instant::now() + SPURIOUS_STREAM_IDLE;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, socket.recv()).await {
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_threshold_is_two_seconds() {
        assert_eq!(SILENCE_THRESHOLD, Duration::from_millis(2000));
    }

    #[test]
    fn response_timeout_is_sixty_seconds() {
        assert_eq!(RESPONSE_TIMEOUT, Duration::from_millis(60_000));
    }

    #[test]
    fn frame_bytes_is_one_twenty_ms_frame_at_8khz() {
        assert_eq!(FRAME_BYTES, 160);
    }
}
