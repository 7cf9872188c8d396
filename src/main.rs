use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use profile_voicebot::config::VoiceConfig;
use profile_voicebot::surface::{Command as Input, HELP, Renderer, parse_line};
use profile_voicebot::voice::{
    AudioCapture, AudioPlayback, CaptureEventSender, ListenSettings, MicrophoneCapture,
    PLAYBACK_SAMPLE_RATE, PlaybackEventSender, SegmenterState, SpeakerPlayback, SpeechCapture,
    SpeechPlayback, Synthesizer, Transcriber, UnavailableCapture, UnavailablePlayback,
    UtteranceSegmenter,
};
use profile_voicebot::{
    ChatCompletionClient, CompletionClient, Config, Profile, ProfileSource, Session,
    TurnController,
};

/// Voicebot - ask a profile questions by voice or keyboard
#[derive(Parser)]
#[command(name = "voicebot", version, about)]
struct Cli {
    /// Profile document to answer from (defaults to the built-in profile)
    #[arg(short, long, env = "VOICEBOT_PROFILE")]
    profile: Option<PathBuf>,

    /// Completion model
    #[arg(short, long, env = "VOICEBOT_MODEL")]
    model: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (typed questions and text replies only)
    #[arg(long, env = "VOICEBOT_DISABLE_VOICE")]
    disable_voice: bool,

    /// Start with replies not read aloud
    #[arg(long)]
    no_auto_speak: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Ask one question and print the reply
    Ask {
        /// The question
        question: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; logs go to stderr so they stay out of the conversation
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,profile_voicebot=info")),
        1 => EnvFilter::new("info,profile_voicebot=debug"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load_with_options(cli.disable_voice);
    if let Some(path) = cli.profile {
        config.profile_path = Some(path);
    }
    if let Some(model) = cli.model {
        config.completion.model = model;
    }
    if cli.no_auto_speak {
        config.auto_speak = false;
    }
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Ask { question } => ask(&config, &question).await,
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&config.voice, text).await,
        };
    }

    converse(config).await
}

fn load_profile(config: &Config) -> anyhow::Result<Profile> {
    let profile = Profile::load(config.profile_path.as_deref())?;
    match profile.source() {
        ProfileSource::Embedded => tracing::debug!("using embedded profile"),
        ProfileSource::File(path) => tracing::info!(path = %path.display(), "loaded profile"),
    }
    Ok(profile)
}

/// Interactive session on the terminal
async fn converse(config: Config) -> anyhow::Result<()> {
    let profile = load_profile(&config)?;
    let client = ChatCompletionClient::new(&config.completion, profile.system_prompt())?;

    tracing::info!(
        model = client.model(),
        voice = config.voice.enabled,
        auto_speak = config.auto_speak,
        "starting voicebot"
    );

    let (capture_tx, capture_rx) = mpsc::unbounded_channel();
    let (playback_tx, playback_rx) = mpsc::unbounded_channel();

    let controller = TurnController::new(
        build_capture(&config.voice, capture_tx),
        build_playback(&config.voice, playback_tx),
    )
    .with_auto_speak(config.auto_speak)
    .with_history_limit(config.completion.history_limit);

    let session = Session::new(controller, Arc::new(client), capture_rx, playback_rx);

    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let session_task = tokio::spawn(session.run(intent_rx, update_tx));

    let mut lines = spawn_stdin_reader();
    let mut renderer = Renderer::new();

    println!("{HELP}\n");

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(Input::Intent(intent))) => {
                        if intent_tx.send(intent).is_err() {
                            break;
                        }
                    }
                    Ok(Some(Input::Status)) => println!("{}", renderer.status()),
                    Ok(Some(Input::Help)) => println!("{HELP}"),
                    Ok(Some(Input::Quit)) => break,
                    Err(e) => println!("! {e}"),
                }
            }
            update = update_rx.recv() => {
                let Some(update) = update else {
                    break;
                };
                for line in renderer.render(&update) {
                    println!("{line}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    drop(intent_tx);
    let controller = session_task.await?;
    tracing::info!(turns = controller.log().len(), "session closed");

    Ok(())
}

/// Forward stdin lines from a plain thread so a pending read never holds up shutdown
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to spawn stdin reader");
    }
    rx
}

fn build_capture(config: &VoiceConfig, events: CaptureEventSender) -> Box<dyn SpeechCapture> {
    if !config.enabled {
        return Box::new(UnavailableCapture);
    }

    match Transcriber::new(config) {
        Ok(transcriber) => Box::new(MicrophoneCapture::new(
            events,
            transcriber,
            ListenSettings::from(config),
        )),
        Err(e) => {
            tracing::warn!(error = %e, "speech capture disabled");
            Box::new(UnavailableCapture)
        }
    }
}

fn build_playback(config: &VoiceConfig, events: PlaybackEventSender) -> Box<dyn SpeechPlayback> {
    if !config.enabled {
        return Box::new(UnavailablePlayback);
    }

    match Synthesizer::new(config) {
        Ok(synthesizer) => Box::new(SpeakerPlayback::new(events, synthesizer)),
        Err(e) => {
            tracing::warn!(error = %e, "speech playback disabled");
            Box::new(UnavailablePlayback)
        }
    }
}

/// One text turn without voice; prints the reply (or the error turn)
async fn ask(config: &Config, question: &str) -> anyhow::Result<()> {
    let profile = load_profile(config)?;
    let client = ChatCompletionClient::new(&config.completion, profile.system_prompt())?;

    let mut controller = TurnController::new(UnavailableCapture, UnavailablePlayback);
    let request = controller.submit(question)?;

    let result = client.complete(&request.history, &request.text).await;
    let failed = result.is_err();
    controller.finish_completion(request.id, result);

    if let Some(turn) = controller.log().last() {
        println!("{}", turn.content());
    }
    if failed {
        anyhow::bail!("completion failed");
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let mut segmenter = UtteranceSegmenter::new();
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        let complete = segmenter.process(&samples);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        let marker = match (complete, segmenter.state()) {
            (true, _) => "utterance complete",
            (false, SegmenterState::Speaking) => "speech",
            _ => "",
        };

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}] {}",
            i + 1,
            energy,
            peak,
            meter,
            marker
        );

        if complete {
            segmenter.reset();
        }
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        PLAYBACK_SAMPLE_RATE
    );

    tokio::task::spawn_blocking(move || {
        AudioPlayback::new()?.play_until(samples, &AtomicBool::new(false))
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output
async fn test_tts(config: &VoiceConfig, text: String) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let synthesizer = Synthesizer::new(config)?;

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        println!("Synthesizing speech...");
        let mp3_data = synthesizer.synthesize(&text)?;
        println!("Got {} bytes of audio data", mp3_data.len());

        println!("Playing audio...");
        AudioPlayback::new()?.play_mp3_until(&mp3_data, &AtomicBool::new(false))?;
        Ok(())
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
