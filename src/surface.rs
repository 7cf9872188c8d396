//! Line-oriented terminal surface
//!
//! Input lines become [`Intent`]s; session updates become printable lines.
//! Rendering is incremental: each snapshot prints only the turns and
//! indicators that changed since the previous one.

use std::fmt::Write as _;

use crate::controller::SessionSnapshot;
use crate::conversation::{ConversationTurn, Role};
use crate::session::{Intent, SessionUpdate};

/// Help text listing the slash commands
pub const HELP: &str = "\
Type a question and press enter, or use a command:
  /listen      ask by voice
  /stop        stop listening
  /hush        stop speaking
  /autospeak   toggle reading replies aloud
  /status      show session state
  /help        show this help
  /quit        exit";

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Intent(Intent),
    Status,
    Help,
    Quit,
}

/// Error for an input line that is not a known command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0} (try /help)")]
pub struct UnknownCommand(pub String);

/// Parse one input line
///
/// Blank lines yield `Ok(None)`. Anything not starting with `/` is a
/// question to submit.
///
/// # Errors
///
/// Returns [`UnknownCommand`] for an unrecognized slash command
pub fn parse_line(line: &str) -> Result<Option<Command>, UnknownCommand> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(Command::Intent(Intent::Submit(line.to_string()))));
    };

    let command = match command.to_ascii_lowercase().as_str() {
        "listen" | "l" => Command::Intent(Intent::StartListening),
        "stop" => Command::Intent(Intent::StopListening),
        "hush" | "quiet" => Command::Intent(Intent::StopSpeaking),
        "autospeak" | "speak" => Command::Intent(Intent::ToggleAutoSpeak),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => return Err(UnknownCommand(line.to_string())),
    };

    Ok(Some(command))
}

/// Turns session updates into terminal lines
#[derive(Debug, Default)]
pub struct Renderer {
    printed_turns: usize,
    last: Option<SessionSnapshot>,
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for `update`
    pub fn render(&mut self, update: &SessionUpdate) -> Vec<String> {
        match update {
            SessionUpdate::Snapshot(snapshot) => self.render_snapshot(snapshot),
            SessionUpdate::Rejected(rejection) => vec![format!("! {rejection}")],
        }
    }

    fn render_snapshot(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let mut lines = Vec::new();
        let previous = self.last.take();

        match &previous {
            None => {
                if !snapshot.capture_available {
                    lines.push("(voice input unavailable, type your questions)".to_string());
                }
                if !snapshot.playback_available {
                    lines.push("(speech output unavailable, replies are text only)".to_string());
                }
            }
            Some(previous) => {
                if previous.capture_available && !snapshot.capture_available {
                    lines.push("(voice input unavailable, type your questions)".to_string());
                }
                if previous.playback_available && !snapshot.playback_available {
                    lines.push("(speech output unavailable, replies are text only)".to_string());
                }
            }
        }

        let was = |f: fn(&SessionSnapshot) -> bool| previous.as_ref().is_some_and(f);

        if snapshot.is_listening() && !was(SessionSnapshot::is_listening) {
            lines.push("... listening".to_string());
        }
        if !snapshot.interim_transcript.is_empty()
            && previous
                .as_ref()
                .is_none_or(|p| p.interim_transcript != snapshot.interim_transcript)
        {
            lines.push(format!("  ~ {}", snapshot.interim_transcript));
        }
        if let Some(error) = &snapshot.capture_error
            && previous.as_ref().is_none_or(|p| p.capture_error.as_ref() != Some(error))
        {
            lines.push(format!("! listening stopped: {error}"));
        }

        for turn in snapshot.turns.iter().skip(self.printed_turns) {
            lines.push(render_turn(turn));
        }
        self.printed_turns = snapshot.turns.len();

        if snapshot.is_processing() && !was(SessionSnapshot::is_processing) {
            lines.push("... thinking".to_string());
        }
        if snapshot.is_speaking() && !was(SessionSnapshot::is_speaking) {
            lines.push("... speaking (/hush to stop)".to_string());
        }
        if let Some(error) = &snapshot.playback_error
            && previous.as_ref().is_none_or(|p| p.playback_error.as_ref() != Some(error))
        {
            lines.push(format!("! speech failed: {error}"));
        }
        if let Some(previous) = &previous
            && previous.auto_speak != snapshot.auto_speak
        {
            let state = if snapshot.auto_speak { "on" } else { "off" };
            lines.push(format!("(auto-speak {state})"));
        }

        self.last = Some(snapshot.clone());
        lines
    }

    /// Status summary of the most recent snapshot
    #[must_use]
    pub fn status(&self) -> String {
        self.last
            .as_ref()
            .map_or_else(|| "no session".to_string(), render_status)
    }
}

/// Format one turn for display
#[must_use]
pub fn render_turn(turn: &ConversationTurn) -> String {
    match turn.role() {
        Role::User => format!("you> {}", turn.content()),
        Role::Assistant => format!("bot> {}", turn.content()),
    }
}

/// Multi-line summary of a snapshot
#[must_use]
pub fn render_status(snapshot: &SessionSnapshot) -> String {
    let on_off = |flag: bool| if flag { "on" } else { "off" };
    let availability = |flag: bool| if flag { "available" } else { "unavailable" };

    let mut status = String::new();
    let _ = writeln!(status, "turns:       {}", snapshot.turns.len());
    let _ = writeln!(
        status,
        "listening:   {} (voice input {})",
        on_off(snapshot.is_listening()),
        availability(snapshot.capture_available)
    );
    let _ = writeln!(status, "thinking:    {}", on_off(snapshot.is_processing()));
    let _ = writeln!(
        status,
        "speaking:    {} (speech output {})",
        on_off(snapshot.is_speaking()),
        availability(snapshot.playback_available)
    );
    let _ = write!(status, "auto-speak:  {}", on_off(snapshot.auto_speak));
    status
}
