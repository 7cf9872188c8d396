//! Profile Voicebot - voice and text front-end for questioning a personal profile
//!
//! A visitor asks questions by voice or keyboard; a chat-completion model
//! answers in character using a profile document as its system instruction,
//! and replies can be read aloud.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Presentation Surface                  │
//! │          terminal input  │  snapshot renderer        │
//! └───────────┬─────────────────────────▲───────────────┘
//!         intents                   snapshots
//! ┌───────────▼─────────────────────────┴───────────────┐
//! │                 Session / Turn Controller            │
//! │   capture state │ processing state │ playback state  │
//! └──────┬──────────────────┬─────────────────┬─────────┘
//!        │                  │                 │
//! ┌──────▼──────┐   ┌───────▼──────┐   ┌──────▼────────┐
//! │   Capture   │   │  Completion  │   │   Playback    │
//! │  mic + STT  │   │ chat endpoint│   │  TTS + audio  │
//! └─────────────┘   └──────────────┘   └───────────────┘
//! ```

pub mod completion;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod profile;
pub mod session;
pub mod surface;
pub mod voice;

pub use completion::{ChatCompletionClient, CompletionClient, NO_RESPONSE_FALLBACK};
pub use config::Config;
pub use controller::{
    CaptureState, CompletionRequest, PlaybackState, ProcessingState, Rejection,
    SessionSnapshot, TurnController,
};
pub use conversation::{ConversationLog, ConversationTurn, Role};
pub use error::{
    Capability, CaptureError, CompletionError, Error, PlaybackError, Result, VoiceError,
};
pub use profile::{Profile, ProfileSource};
pub use session::{Intent, Session, SessionUpdate};
