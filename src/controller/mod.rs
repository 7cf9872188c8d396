//! Conversation turn controller
//!
//! The single owner of session state. It turns user intents and adapter
//! events into state transitions, enforces that the bot never records a new
//! question while still forming an answer, and keeps at most one utterance
//! playing at a time.
//!
//! The controller performs no I/O of its own and never awaits: starting a
//! completion returns a [`CompletionRequest`] for the caller to run, and the
//! outcome comes back through [`TurnController::finish_completion`]. Capture
//! and playback adapters are driven synchronously and report back through
//! events.

mod state;

use thiserror::Error;

pub use state::{CaptureState, PlaybackState, ProcessingState, SessionSnapshot};

use crate::conversation::{ConversationLog, ConversationTurn};
use crate::voice::{
    CaptureEvent, PlaybackEvent, SessionId, SpeechCapture, SpeechPlayback, UtteranceId,
};
use crate::{Capability, CompletionError, VoiceError};

/// Identifies one completion request
pub type RequestId = u64;

/// A completion the caller must run and report back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub id: RequestId,
    /// Prior turns, not including the new user turn
    pub history: Vec<ConversationTurn>,
    /// The new user turn's text
    pub text: String,
}

/// Why an intent was refused; state is unchanged when this is returned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("message is empty")]
    EmptyMessage,

    #[error("still working on the previous answer")]
    AwaitingCompletion,

    #[error("already listening")]
    AlreadyListening,

    #[error("not listening")]
    NotListening,

    #[error("nothing is being spoken")]
    NotSpeaking,

    #[error("stop speaking before changing auto-speak")]
    Speaking,

    #[error(transparent)]
    Voice(#[from] VoiceError),
}

/// Orchestrates capture, submission, completion and playback
pub struct TurnController<C, P> {
    capture: C,
    playback: P,
    log: ConversationLog,
    interim: String,
    capture_state: CaptureState,
    processing_state: ProcessingState,
    playback_state: PlaybackState,
    auto_speak: bool,
    capture_available: bool,
    playback_available: bool,
    capture_error: Option<String>,
    playback_error: Option<String>,
    history_limit: Option<usize>,
    last_session: SessionId,
    active_session: Option<SessionId>,
    last_utterance: UtteranceId,
    active_utterance: Option<UtteranceId>,
    last_request: RequestId,
    pending_request: Option<RequestId>,
}

impl<C: SpeechCapture, P: SpeechPlayback> TurnController<C, P> {
    /// Create a controller in the initial (Idle, Idle, Idle) state with auto-speak on
    #[must_use]
    pub fn new(capture: C, playback: P) -> Self {
        let capture_available = capture.is_available();
        let playback_available = playback.is_available();

        Self {
            capture,
            playback,
            log: ConversationLog::new(),
            interim: String::new(),
            capture_state: CaptureState::Idle,
            processing_state: ProcessingState::Idle,
            playback_state: PlaybackState::Idle,
            auto_speak: true,
            capture_available,
            playback_available,
            capture_error: None,
            playback_error: None,
            history_limit: None,
            last_session: 0,
            active_session: None,
            last_utterance: 0,
            active_utterance: None,
            last_request: 0,
            pending_request: None,
        }
    }

    /// Set the initial auto-speak preference
    #[must_use]
    pub fn with_auto_speak(mut self, auto_speak: bool) -> Self {
        self.auto_speak = auto_speak;
        self
    }

    /// Bound the number of prior turns sent with each request
    #[must_use]
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    /// Start a listening session
    ///
    /// # Errors
    ///
    /// Rejected while listening, while a completion is pending, or when the
    /// capture adapter cannot start. An unavailable capability is remembered
    /// so later attempts are refused without touching the adapter.
    pub fn request_listen(&mut self) -> Result<(), Rejection> {
        if self.capture_state == CaptureState::Listening {
            return Err(Rejection::AlreadyListening);
        }
        if self.processing_state == ProcessingState::AwaitingCompletion {
            tracing::debug!("listen rejected while awaiting completion");
            return Err(Rejection::AwaitingCompletion);
        }
        if !self.capture_available {
            return Err(VoiceError::CapabilityUnavailable(Capability::SpeechCapture).into());
        }

        self.interim.clear();
        self.capture_error = None;
        self.last_session += 1;
        let session = self.last_session;

        match self.capture.start(session) {
            Ok(()) => {
                self.active_session = Some(session);
                self.capture_state = CaptureState::Listening;
                tracing::debug!(session, "listening");
                Ok(())
            }
            Err(e) => {
                if matches!(e, VoiceError::CapabilityUnavailable(_)) {
                    tracing::warn!("speech capture unavailable, disabling voice input");
                    self.capture_available = false;
                } else {
                    // Reported through the rejection only; no session existed to stop
                    tracing::warn!(error = %e, "failed to start listening");
                }
                Err(e.into())
            }
        }
    }

    /// End the listening session without submitting
    ///
    /// # Errors
    ///
    /// Rejected when not listening
    pub fn request_stop_listen(&mut self) -> Result<(), Rejection> {
        if self.capture_state != CaptureState::Listening {
            return Err(Rejection::NotListening);
        }

        self.capture.stop();
        self.end_capture();
        tracing::debug!("listening stopped by user");
        Ok(())
    }

    /// Apply an event from the capture adapter
    ///
    /// Events from any session other than the active one are ignored. A
    /// final transcript ends the session and goes through [`submit`]; the
    /// resulting request, if any, is returned.
    ///
    /// [`submit`]: Self::submit
    pub fn handle_capture_event(&mut self, event: CaptureEvent) -> Option<CompletionRequest> {
        if self.active_session != Some(event.session()) {
            tracing::debug!(session = event.session(), "ignoring stale capture event");
            return None;
        }

        match event {
            CaptureEvent::Interim { transcript, .. } => {
                self.interim = transcript;
                None
            }
            CaptureEvent::Final { transcript, .. } => {
                self.end_capture();
                match self.submit(&transcript) {
                    Ok(request) => Some(request),
                    Err(rejection) => {
                        tracing::warn!(%rejection, "final transcript not submitted");
                        None
                    }
                }
            }
            CaptureEvent::Error { error, .. } => {
                tracing::info!(%error, "listening ended with error");
                self.end_capture();
                self.capture_error = Some(error.to_string());
                None
            }
            CaptureEvent::Ended { .. } => {
                self.end_capture();
                None
            }
        }
    }

    /// Submit a question, typed or transcribed
    ///
    /// Appends the user turn and marks a completion as pending. The returned
    /// request carries the history as it was before this turn.
    ///
    /// # Errors
    ///
    /// Rejected if `text` is blank or a completion is already pending; the
    /// log is unchanged in both cases
    pub fn submit(&mut self, text: &str) -> Result<CompletionRequest, Rejection> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejection::EmptyMessage);
        }
        if self.processing_state == ProcessingState::AwaitingCompletion {
            return Err(Rejection::AwaitingCompletion);
        }

        let history = self.log.completion_history(self.history_limit);
        self.log.push(ConversationTurn::user(text));

        self.last_request += 1;
        let id = self.last_request;
        self.pending_request = Some(id);
        self.processing_state = ProcessingState::AwaitingCompletion;

        tracing::debug!(request = id, history = history.len(), "submitted");

        Ok(CompletionRequest {
            id,
            history,
            text: text.to_string(),
        })
    }

    /// Apply the outcome of a completion request
    ///
    /// Success appends the reply; failure appends an `Error: …` assistant
    /// turn. Either way processing returns to idle and the new turn is
    /// spoken. Returns false (and changes nothing) for a request that is not
    /// the pending one.
    pub fn finish_completion(
        &mut self,
        id: RequestId,
        result: Result<String, CompletionError>,
    ) -> bool {
        if self.pending_request != Some(id) {
            tracing::debug!(request = id, "ignoring stale completion");
            return false;
        }

        self.pending_request = None;
        self.processing_state = ProcessingState::Idle;

        let turn = match result {
            Ok(reply) => {
                tracing::info!(request = id, reply_len = reply.len(), "reply received");
                ConversationTurn::assistant(reply)
            }
            Err(e) => {
                tracing::error!(request = id, error = %e, "completion failed");
                ConversationTurn::failure(&e)
            }
        };

        let spoken = turn.content().to_string();
        self.log.push(turn);
        self.speak(&spoken);
        true
    }

    /// Flip the auto-speak preference, returning the new value
    ///
    /// # Errors
    ///
    /// Rejected while an utterance is queued or playing; stop speaking first
    pub fn toggle_auto_speak(&mut self) -> Result<bool, Rejection> {
        if self.playback_state == PlaybackState::Speaking || self.active_utterance.is_some() {
            return Err(Rejection::Speaking);
        }

        self.auto_speak = !self.auto_speak;
        tracing::debug!(auto_speak = self.auto_speak, "auto-speak toggled");
        Ok(self.auto_speak)
    }

    /// Cancel the current utterance; playback is idle on return
    ///
    /// # Errors
    ///
    /// Rejected when nothing is queued or playing
    pub fn request_stop_speaking(&mut self) -> Result<(), Rejection> {
        if self.active_utterance.is_none() && self.playback_state == PlaybackState::Idle {
            return Err(Rejection::NotSpeaking);
        }

        self.playback.cancel();
        self.active_utterance = None;
        self.playback_state = PlaybackState::Idle;
        tracing::debug!("speech stopped by user");
        Ok(())
    }

    /// Apply an event from the playback adapter
    ///
    /// Events for any utterance other than the active one are ignored, so a
    /// terminal event arriving after a cancel changes nothing.
    pub fn handle_playback_event(&mut self, event: PlaybackEvent) {
        if self.active_utterance != Some(event.utterance()) {
            tracing::debug!(utterance = event.utterance(), "ignoring stale playback event");
            return;
        }

        match event {
            PlaybackEvent::Started { .. } => {
                self.playback_state = PlaybackState::Speaking;
            }
            PlaybackEvent::Ended { .. } => {
                self.active_utterance = None;
                self.playback_state = PlaybackState::Idle;
            }
            PlaybackEvent::Failed { error, .. } => {
                tracing::warn!(%error, "playback failed");
                self.active_utterance = None;
                self.playback_state = PlaybackState::Idle;
                self.playback_error = Some(error.to_string());
            }
        }
    }

    /// Read `text` aloud if auto-speak is on, interrupting any current utterance
    fn speak(&mut self, text: &str) {
        if !self.auto_speak || !self.playback_available {
            return;
        }

        if self.active_utterance.is_some() {
            self.playback.cancel();
            self.active_utterance = None;
            self.playback_state = PlaybackState::Idle;
        }

        self.last_utterance += 1;
        let utterance = self.last_utterance;
        self.playback_error = None;

        match self.playback.speak(utterance, text) {
            Ok(()) => self.active_utterance = Some(utterance),
            Err(VoiceError::CapabilityUnavailable(_)) => {
                tracing::warn!("speech synthesis unavailable, replies will not be spoken");
                self.playback_available = false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start playback");
                self.playback_error = Some(e.to_string());
            }
        }
    }

    /// Stop listening and speaking; used when the session ends
    pub fn shutdown(&mut self) {
        if self.capture_state == CaptureState::Listening {
            self.capture.stop();
            self.end_capture();
        }
        if self.active_utterance.is_some() || self.playback_state == PlaybackState::Speaking {
            self.playback.cancel();
            self.active_utterance = None;
            self.playback_state = PlaybackState::Idle;
        }
    }

    fn end_capture(&mut self) {
        self.active_session = None;
        self.capture_state = CaptureState::Idle;
        self.interim.clear();
    }

    /// Copy of everything the presentation surface renders
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            turns: self.log.turns().to_vec(),
            interim_transcript: self.interim.clone(),
            capture: self.capture_state,
            processing: self.processing_state,
            playback: self.playback_state,
            auto_speak: self.auto_speak,
            capture_available: self.capture_available,
            playback_available: self.playback_available,
            capture_error: self.capture_error.clone(),
            playback_error: self.playback_error.clone(),
        }
    }

    #[must_use]
    pub const fn log(&self) -> &ConversationLog {
        &self.log
    }

    #[must_use]
    pub fn interim_transcript(&self) -> &str {
        &self.interim
    }

    #[must_use]
    pub const fn capture_state(&self) -> CaptureState {
        self.capture_state
    }

    #[must_use]
    pub const fn processing_state(&self) -> ProcessingState {
        self.processing_state
    }

    #[must_use]
    pub const fn playback_state(&self) -> PlaybackState {
        self.playback_state
    }

    #[must_use]
    pub const fn auto_speak(&self) -> bool {
        self.auto_speak
    }

    #[must_use]
    pub const fn capture_available(&self) -> bool {
        self.capture_available
    }

    #[must_use]
    pub const fn playback_available(&self) -> bool {
        self.playback_available
    }

    /// The capture adapter
    #[must_use]
    pub const fn capture(&self) -> &C {
        &self.capture
    }

    /// The playback adapter
    #[must_use]
    pub const fn playback(&self) -> &P {
        &self.playback
    }
}
