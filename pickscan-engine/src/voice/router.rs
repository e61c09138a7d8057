//! Voice command routing
//!
//! A transcript is normalized, checked for a wake word, then matched against
//! an ordered list of grammar rules. The first rule that parses wins.

use crate::error::Result;
use crate::text::normalize;
use pickscan_common::config::VoiceConfig;
use regex::{Captures, Regex};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Identical transcripts inside this window are recognizer re-deliveries
const REPEAT_WINDOW: Duration = Duration::from_millis(2000);

/// Primitive produced by a voice transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    /// Same as one scan of `code`
    Register { code: String },
    /// Hand `code` to the fulfillment screen
    Fulfill { code: String },
    /// Resolve `name`, then set the slot's case count to `count`
    AddCases { count: u32, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    MissingWakeWord,
    Repeated,
    /// A modal is open; all input is ignored
    ModalOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Command(VoiceCommand),
    Ignored(IgnoreReason),
    /// No rule matched; carries the normalized command text
    Unrecognized(String),
}

struct GrammarRule {
    name: &'static str,
    pattern: Regex,
    build: fn(&Captures<'_>) -> Option<VoiceCommand>,
}

fn digits(caps: &Captures<'_>, group: usize) -> Option<String> {
    let code: String = caps
        .get(group)?
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    (!code.is_empty()).then_some(code)
}

fn default_rules() -> Result<Vec<GrammarRule>> {
    Ok(vec![
        GrammarRule {
            name: "register",
            pattern: Regex::new(
                r"\b(?:registra|registrar|register)\s+(?:(?:si trata de|codigo|code)\s+)?(\d[\d ]*)",
            )?,
            build: |caps| digits(caps, 1).map(|code| VoiceCommand::Register { code }),
        },
        GrammarRule {
            name: "fulfill",
            pattern: Regex::new(r"\b(?:surte|surtir|fulfill)\s+(?:(?:codigo|code)\s+)?(\d[\d ]*)")?,
            build: |caps| digits(caps, 1).map(|code| VoiceCommand::Fulfill { code }),
        },
        GrammarRule {
            name: "add_cases",
            pattern: Regex::new(
                r"\b(?:agrega|agregar|add)\s+(\d+)\s+(?:caja|cajas|case|cases)\s+(?:de|of)\s+(.+)$",
            )?,
            build: |caps| {
                let count = caps.get(1)?.as_str().parse::<u32>().ok().filter(|n| *n > 0)?;
                let name = caps.get(2)?.as_str().trim().to_string();
                (!name.is_empty()).then_some(VoiceCommand::AddCases { count, name })
            },
        },
    ])
}

pub struct VoiceCommandRouter {
    wake: Option<Regex>,
    require_wake_word: bool,
    rules: Vec<GrammarRule>,
    last: Mutex<Option<(String, Instant)>>,
}

impl VoiceCommandRouter {
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        let words: Vec<String> = config
            .wake_words
            .iter()
            .map(|w| normalize(w))
            .filter(|w| !w.is_empty())
            .map(|w| regex::escape(&w))
            .collect();

        let wake = if words.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"\b(?:{})\b", words.join("|")))?)
        };

        Ok(Self {
            wake,
            require_wake_word: config.require_wake_word,
            rules: default_rules()?,
            last: Mutex::new(None),
        })
    }

    fn last(&self) -> MutexGuard<'_, Option<(String, Instant)>> {
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Text after the wake word, or `None` if a required wake word is missing
    fn command_text<'a>(&self, normalized: &'a str) -> Option<&'a str> {
        match self.wake.as_ref().and_then(|re| re.find(normalized)) {
            Some(m) => Some(normalized[m.end()..].trim()),
            None if self.require_wake_word => None,
            None => Some(normalized),
        }
    }

    /// Route a final transcript
    pub fn route(&self, transcript: &str) -> RouteOutcome {
        let normalized = normalize(transcript);
        if normalized.is_empty() {
            return RouteOutcome::Ignored(IgnoreReason::Empty);
        }

        let now = Instant::now();
        {
            let mut last = self.last();
            if let Some((text, at)) = last.as_ref() {
                if *text == normalized && now.duration_since(*at) < REPEAT_WINDOW {
                    debug!("Repeated transcript ignored: '{}'", normalized);
                    return RouteOutcome::Ignored(IgnoreReason::Repeated);
                }
            }
            *last = Some((normalized.clone(), now));
        }

        let Some(text) = self.command_text(&normalized) else {
            debug!("Transcript without wake word ignored: '{}'", normalized);
            return RouteOutcome::Ignored(IgnoreReason::MissingWakeWord);
        };

        for rule in &self.rules {
            if let Some(command) = rule.pattern.captures(text).and_then(|caps| (rule.build)(&caps)) {
                debug!("Voice rule '{}' matched: {:?}", rule.name, command);
                return RouteOutcome::Command(command);
            }
        }

        RouteOutcome::Unrecognized(text.to_string())
    }
}
