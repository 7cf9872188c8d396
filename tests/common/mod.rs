//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use profile_voicebot::voice::{SessionId, SpeechCapture, SpeechPlayback, UtteranceId};
use profile_voicebot::{CompletionClient, CompletionError, ConversationTurn, VoiceError};

/// Capture adapter that records the commands it receives
#[derive(Debug)]
pub struct FakeCapture {
    pub available: bool,
    /// Returned by every `start` when set
    pub start_error: Option<VoiceError>,
    pub starts: Vec<SessionId>,
    pub stops: usize,
}

impl FakeCapture {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            available: true,
            start_error: None,
            starts: Vec::new(),
            stops: 0,
        }
    }

    #[must_use]
    pub const fn failing(error: VoiceError) -> Self {
        Self {
            available: true,
            start_error: Some(error),
            starts: Vec::new(),
            stops: 0,
        }
    }
}

impl SpeechCapture for FakeCapture {
    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&mut self, session: SessionId) -> Result<(), VoiceError> {
        self.starts.push(session);
        match &self.start_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn stop(&mut self) {
        self.stops += 1;
    }
}

/// Playback adapter that records what it was asked to say
#[derive(Debug)]
pub struct FakePlayback {
    pub available: bool,
    pub spoken: Vec<(UtteranceId, String)>,
    pub cancels: usize,
}

impl FakePlayback {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            available: true,
            spoken: Vec::new(),
            cancels: 0,
        }
    }

    /// Text of every utterance, in order
    #[must_use]
    pub fn texts(&self) -> Vec<&str> {
        self.spoken.iter().map(|(_, text)| text.as_str()).collect()
    }
}

impl SpeechPlayback for FakePlayback {
    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), VoiceError> {
        self.spoken.push((utterance, text.to_string()));
        Ok(())
    }

    fn cancel(&mut self) {
        self.cancels += 1;
    }
}

/// One recorded completion call
#[derive(Debug, Clone)]
pub struct CompletionCall {
    pub history: Vec<ConversationTurn>,
    pub user_text: String,
}

/// Completion client answering from a script
///
/// Replies are consumed in order; once the script runs out every call fails
/// with a network error.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    calls: Mutex<Vec<CompletionCall>>,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = Result<String, CompletionError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        history: &[ConversationTurn],
        user_text: &str,
    ) -> Result<String, CompletionError> {
        self.calls.lock().unwrap().push(CompletionCall {
            history: history.to_vec(),
            user_text: user_text.to_string(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Network("script exhausted".to_string())))
    }
}

/// Completion client whose requests never resolve
#[derive(Debug, Default)]
pub struct PendingClient;

#[async_trait]
impl CompletionClient for PendingClient {
    async fn complete(
        &self,
        _history: &[ConversationTurn],
        _user_text: &str,
    ) -> Result<String, CompletionError> {
        std::future::pending().await
    }
}
