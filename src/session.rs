//! Session loop
//!
//! Owns a [`TurnController`] and feeds it everything that can change its
//! state: user intents, capture and playback events, and completion results.
//! All of them arrive on channels and are applied one at a time, so the
//! controller never sees two mutations interleave. Completions run as
//! spawned tasks and report back on an internal channel, which keeps
//! intents such as "stop speaking" responsive while a reply is pending.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::Instrument;

use crate::CompletionError;
use crate::completion::CompletionClient;
use crate::controller::{
    CompletionRequest, Rejection, RequestId, SessionSnapshot, TurnController,
};
use crate::voice::{CaptureEvent, PlaybackEvent, SpeechCapture, SpeechPlayback};

/// Something the user asked for through the presentation surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    StartListening,
    StopListening,
    Submit(String),
    ToggleAutoSpeak,
    StopSpeaking,
}

/// What the session tells the presentation surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// State changed; render this
    Snapshot(SessionSnapshot),
    /// An intent was refused and nothing changed
    Rejected(Rejection),
}

type CompletionOutcome = (RequestId, Result<String, CompletionError>);

/// Drives one conversation until the intent channel closes
pub struct Session<C, P> {
    controller: TurnController<C, P>,
    client: Arc<dyn CompletionClient>,
    capture_events: mpsc::UnboundedReceiver<CaptureEvent>,
    playback_events: mpsc::UnboundedReceiver<PlaybackEvent>,
}

impl<C, P> Session<C, P>
where
    C: SpeechCapture,
    P: SpeechPlayback,
{
    /// Wire a controller to its completion client and adapter event streams
    #[must_use]
    pub fn new(
        controller: TurnController<C, P>,
        client: Arc<dyn CompletionClient>,
        capture_events: mpsc::UnboundedReceiver<CaptureEvent>,
        playback_events: mpsc::UnboundedReceiver<PlaybackEvent>,
    ) -> Self {
        Self {
            controller,
            client,
            capture_events,
            playback_events,
        }
    }

    /// Run until `intents` closes, publishing state on `updates`
    ///
    /// Listening and playback are stopped on exit. The controller is handed
    /// back so callers can inspect the final conversation.
    pub async fn run(
        self,
        mut intents: mpsc::UnboundedReceiver<Intent>,
        updates: mpsc::UnboundedSender<SessionUpdate>,
    ) -> TurnController<C, P> {
        let Self {
            mut controller,
            client,
            mut capture_events,
            mut playback_events,
        } = self;

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<CompletionOutcome>();
        let mut published = controller.snapshot();
        let _ = updates.send(SessionUpdate::Snapshot(published.clone()));

        tracing::debug!("session started");

        loop {
            tokio::select! {
                intent = intents.recv() => {
                    let Some(intent) = intent else {
                        break;
                    };
                    match apply_intent(&mut controller, intent) {
                        Ok(Some(request)) => dispatch(&client, request, &done_tx),
                        Ok(None) => {}
                        Err(rejection) => {
                            tracing::warn!(%rejection, "intent rejected");
                            let _ = updates.send(SessionUpdate::Rejected(rejection));
                        }
                    }
                }
                Some(event) = capture_events.recv() => {
                    if let Some(request) = controller.handle_capture_event(event) {
                        dispatch(&client, request, &done_tx);
                    }
                }
                Some(event) = playback_events.recv() => {
                    controller.handle_playback_event(event);
                }
                Some((id, result)) = done_rx.recv() => {
                    controller.finish_completion(id, result);
                }
            }

            let snapshot = controller.snapshot();
            if snapshot != published {
                published = snapshot;
                let _ = updates.send(SessionUpdate::Snapshot(published.clone()));
            }
        }

        controller.shutdown();
        tracing::debug!(turns = controller.log().len(), "session ended");
        controller
    }
}

/// Apply one intent; a submit yields the request to run
fn apply_intent<C: SpeechCapture, P: SpeechPlayback>(
    controller: &mut TurnController<C, P>,
    intent: Intent,
) -> Result<Option<CompletionRequest>, Rejection> {
    match intent {
        Intent::StartListening => controller.request_listen().map(|()| None),
        Intent::StopListening => controller.request_stop_listen().map(|()| None),
        Intent::Submit(text) => controller.submit(&text).map(Some),
        Intent::ToggleAutoSpeak => controller.toggle_auto_speak().map(|_| None),
        Intent::StopSpeaking => controller.request_stop_speaking().map(|()| None),
    }
}

/// Run a completion in the background and report its outcome on `done`
fn dispatch(
    client: &Arc<dyn CompletionClient>,
    request: CompletionRequest,
    done: &mpsc::UnboundedSender<CompletionOutcome>,
) {
    let client = Arc::clone(client);
    let done = done.clone();
    let span = tracing::info_span!("completion", request = request.id);

    tokio::spawn(
        async move {
            let result = client.complete(&request.history, &request.text).await;
            // Receiver gone means the session has ended
            let _ = done.send((request.id, result));
        }
        .instrument(span),
    );
}
