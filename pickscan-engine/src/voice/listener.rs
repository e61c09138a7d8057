//! Voice listener supervisor
//!
//! Speech recognizers stop on their own (silence, network hiccups, the
//! platform's session limit). The supervisor consumes the recognizer's
//! signals, feeds final transcripts to the session, and restarts listening
//! after an end unless the platform denied microphone permission.

use crate::error::Result;
use crate::session::PickSession;
use async_trait::async_trait;
use pickscan_common::config::VoiceConfig;
use pickscan_common::events::PickEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Speech recognition backend
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Begin (or resume) listening; signals arrive on the supervisor's channel
    async fn start(&self) -> Result<()>;

    /// Stop listening for good
    async fn stop(&self);
}

/// Recognizer error as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerError {
    Aborted,
    NoSpeech,
    NotAllowed,
    ServiceNotAllowed,
    Other(String),
}

impl RecognizerError {
    /// Map a platform error code (`"aborted"`, `"not-allowed"`, ...)
    pub fn from_code(code: &str) -> Self {
        match code {
            "aborted" => RecognizerError::Aborted,
            "no-speech" => RecognizerError::NoSpeech,
            "not-allowed" => RecognizerError::NotAllowed,
            "service-not-allowed" => RecognizerError::ServiceNotAllowed,
            other => RecognizerError::Other(other.to_string()),
        }
    }

    /// Permission denied; listening cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecognizerError::NotAllowed | RecognizerError::ServiceNotAllowed
        )
    }
}

impl std::fmt::Display for RecognizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognizerError::Aborted => write!(f, "aborted"),
            RecognizerError::NoSpeech => write!(f, "no-speech"),
            RecognizerError::NotAllowed => write!(f, "not-allowed"),
            RecognizerError::ServiceNotAllowed => write!(f, "service-not-allowed"),
            RecognizerError::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Signal from the recognizer to the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerSignal {
    Started,
    /// Final transcript
    Transcript(String),
    Error(RecognizerError),
    /// Recognizer stopped listening
    Ended,
}

/// Why the supervisor returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// Signal channel closed
    Closed,
    /// Permission denied
    Denied(RecognizerError),
    /// Restart failed
    StartFailed(String),
}

pub struct VoiceListener {
    recognizer: Arc<dyn Recognizer>,
    session: PickSession,
    restart_delay: Duration,
    aborted_restart_delay: Duration,
}

impl VoiceListener {
    pub fn new(recognizer: Arc<dyn Recognizer>, session: PickSession, config: &VoiceConfig) -> Self {
        Self {
            recognizer,
            session,
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            aborted_restart_delay: Duration::from_millis(config.aborted_restart_delay_ms),
        }
    }

    fn status(&self, listening: bool, error: Option<String>) {
        self.session.publish(PickEvent::VoiceStatus {
            listening,
            error,
            timestamp: pickscan_common::time::now(),
        });
    }

    /// Start the recognizer and supervise it until the channel closes or
    /// permission is denied
    pub async fn run(self, mut signals: mpsc::Receiver<RecognizerSignal>) -> ListenerExit {
        if let Err(e) = self.recognizer.start().await {
            error!("Voice recognizer failed to start: {}", e);
            self.status(false, Some(e.to_string()));
            return ListenerExit::StartFailed(e.to_string());
        }

        let mut next_delay = self.restart_delay;
        while let Some(signal) = signals.recv().await {
            match signal {
                RecognizerSignal::Started => {
                    debug!("Voice recognizer listening");
                    next_delay = self.restart_delay;
                    self.status(true, None);
                }
                RecognizerSignal::Transcript(text) => {
                    let outcome = self.session.handle_transcript(&text).await;
                    debug!("Transcript '{}' -> {:?}", text, outcome);
                }
                RecognizerSignal::Error(e) if e.is_fatal() => {
                    warn!("Voice recognizer permission denied ({}), stopping", e);
                    self.recognizer.stop().await;
                    self.status(false, Some(e.to_string()));
                    return ListenerExit::Denied(e);
                }
                RecognizerSignal::Error(RecognizerError::NoSpeech) => {
                    debug!("Recognizer heard no speech");
                }
                RecognizerSignal::Error(RecognizerError::Aborted) => {
                    debug!("Recognizer aborted, restarting after {:?}", self.aborted_restart_delay);
                    next_delay = self.aborted_restart_delay;
                }
                RecognizerSignal::Error(e) => {
                    warn!("Voice recognizer error: {}", e);
                }
                RecognizerSignal::Ended => {
                    tokio::time::sleep(next_delay).await;
                    next_delay = self.restart_delay;
                    if let Err(e) = self.recognizer.start().await {
                        error!("Voice recognizer failed to restart: {}", e);
                        self.status(false, Some(e.to_string()));
                        return ListenerExit::StartFailed(e.to_string());
                    }
                }
            }
        }

        info!("Voice signal channel closed, listener stopped");
        self.status(false, None);
        ListenerExit::Closed
    }
}
