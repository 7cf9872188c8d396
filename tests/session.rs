//! Session loop integration tests
//!
//! Runs the async session with recording adapters and fake completion
//! clients, feeding adapter events by hand.

use std::sync::Arc;
use std::time::Duration;

use profile_voicebot::voice::{CaptureEvent, PlaybackEvent};
use profile_voicebot::{
    CompletionClient, Intent, Rejection, Session, SessionSnapshot, SessionUpdate, TurnController,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

mod common;

use common::{FakeCapture, FakePlayback, PendingClient, ScriptedClient};

struct Harness {
    intents: mpsc::UnboundedSender<Intent>,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    capture_events: mpsc::UnboundedSender<CaptureEvent>,
    playback_events: mpsc::UnboundedSender<PlaybackEvent>,
    task: JoinHandle<TurnController<FakeCapture, FakePlayback>>,
}

fn start(client: Arc<dyn CompletionClient>) -> Harness {
    let (capture_tx, capture_rx) = mpsc::unbounded_channel();
    let (playback_tx, playback_rx) = mpsc::unbounded_channel();
    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();

    let controller = TurnController::new(FakeCapture::new(), FakePlayback::new());
    let session = Session::new(controller, client, capture_rx, playback_rx);

    Harness {
        intents: intent_tx,
        updates: update_rx,
        capture_events: capture_tx,
        playback_events: playback_tx,
        task: tokio::spawn(session.run(intent_rx, update_tx)),
    }
}

impl Harness {
    fn send(&self, intent: Intent) {
        self.intents.send(intent).unwrap();
    }

    /// Next update of any kind
    async fn next(&mut self) -> SessionUpdate {
        tokio::time::timeout(Duration::from_secs(5), self.updates.recv())
            .await
            .expect("timed out waiting for update")
            .expect("session ended")
    }

    /// Skip updates until a snapshot satisfies `pred`
    async fn wait_for(&mut self, pred: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        loop {
            if let SessionUpdate::Snapshot(snapshot) = self.next().await
                && pred(&snapshot)
            {
                return snapshot;
            }
        }
    }

    /// Skip snapshots until a rejection arrives
    async fn rejection(&mut self) -> Rejection {
        loop {
            if let SessionUpdate::Rejected(rejection) = self.next().await {
                return rejection;
            }
        }
    }

    async fn finish(self) -> TurnController<FakeCapture, FakePlayback> {
        drop(self.intents);
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("session did not stop")
            .unwrap()
    }
}

#[tokio::test]
async fn test_typed_question_round_trip() {
    let client = Arc::new(ScriptedClient::new([Ok("Rapid adaptability.".to_string())]));
    let mut harness = start(client.clone());

    let initial = harness.wait_for(|_| true).await;
    assert!(initial.turns.is_empty());

    harness.send(Intent::Submit("What's your superpower?".to_string()));

    let done = harness.wait_for(|s| s.turns.len() == 2).await;
    assert_eq!(done.turns[1].content(), "Rapid adaptability.");
    assert!(!done.is_processing());

    let controller = harness.finish().await;
    assert_eq!(controller.playback().texts(), vec!["Rapid adaptability."]);

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].history.is_empty());
    assert_eq!(calls[0].user_text, "What's your superpower?");
}

#[tokio::test]
async fn test_failed_completion_becomes_error_turn() {
    let client = Arc::new(ScriptedClient::new([]));
    let mut harness = start(client);

    harness.send(Intent::Submit("Tell me about yourself".to_string()));

    let done = harness.wait_for(|s| s.turns.len() == 2).await;
    assert_eq!(done.turns[1].content(), "Error: network error: script exhausted");
    assert!(!done.is_processing());

    harness.finish().await;
}

#[tokio::test]
async fn test_intents_handled_while_awaiting_completion() {
    let mut harness = start(Arc::new(PendingClient));

    harness.send(Intent::Submit("Hello?".to_string()));
    harness.wait_for(SessionSnapshot::is_processing).await;

    harness.send(Intent::StartListening);
    assert_eq!(harness.rejection().await, Rejection::AwaitingCompletion);

    harness.send(Intent::Submit("Anyone there?".to_string()));
    assert_eq!(harness.rejection().await, Rejection::AwaitingCompletion);

    harness.send(Intent::ToggleAutoSpeak);
    let toggled = harness.wait_for(|s| !s.auto_speak).await;
    assert!(toggled.is_processing());
    assert_eq!(toggled.turns.len(), 1);

    let controller = harness.finish().await;
    assert!(controller.capture().starts.is_empty());
}

#[tokio::test]
async fn test_voice_turn_with_stop_speaking() {
    let client = Arc::new(ScriptedClient::new([Ok("I adapt quickly.".to_string())]));
    let mut harness = start(client);

    harness.send(Intent::StartListening);
    harness.wait_for(SessionSnapshot::is_listening).await;

    // Session ids start at 1
    harness
        .capture_events
        .send(CaptureEvent::Interim {
            session: 1,
            transcript: "What's your".to_string(),
        })
        .unwrap();
    harness
        .wait_for(|s| s.interim_transcript == "What's your")
        .await;

    harness
        .capture_events
        .send(CaptureEvent::Final {
            session: 1,
            transcript: "What's your superpower?".to_string(),
        })
        .unwrap();

    let answered = harness.wait_for(|s| s.turns.len() == 2).await;
    assert!(!answered.is_listening());
    assert!(answered.interim_transcript.is_empty());

    harness
        .playback_events
        .send(PlaybackEvent::Started { utterance: 1 })
        .unwrap();
    harness.wait_for(SessionSnapshot::is_speaking).await;

    harness.send(Intent::StopSpeaking);
    harness.wait_for(|s| !s.is_speaking()).await;

    // Late terminal event from the cancelled utterance
    harness
        .playback_events
        .send(PlaybackEvent::Ended { utterance: 1 })
        .unwrap();

    harness.send(Intent::StopSpeaking);
    assert_eq!(harness.rejection().await, Rejection::NotSpeaking);

    let controller = harness.finish().await;
    assert_eq!(controller.playback().texts(), vec!["I adapt quickly."]);
    assert_eq!(controller.playback().cancels, 1);
}

#[tokio::test]
async fn test_closing_intents_stops_listening() {
    let mut harness = start(Arc::new(PendingClient));

    harness.send(Intent::StartListening);
    harness.wait_for(SessionSnapshot::is_listening).await;

    let controller = harness.finish().await;
    assert_eq!(controller.capture().stops, 1);
    assert!(!controller.snapshot().is_listening());
}
