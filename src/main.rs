use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dialoguer::Input;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use nguru::chat::{DISCOVER_TOPICS, prompt};
use nguru::store::{self, ONBOARDING_QUESTIONS, ProfileField};
use nguru::voice::{
    CAPTURE_SAMPLE_RATE, CaptureEncoder, CpalInput, CpalOutput, PLAYBACK_SAMPLE_RATE,
    PlaybackScheduler, samples_to_wav, sine_tone,
};
use nguru::{
    ChatMessage, ChatService, Config, EncodedAudioChunk, GeminiLiveConnector, GeminiTextClient,
    Profile, Role, SessionController,
};

/// Nguru - talk to a warm, curious teacher friend
#[derive(Parser)]
#[command(name = "nguru", version, about)]
struct Cli {
    /// Learner to act as
    #[arg(short, long, env = "NGURU_USER", default_value = "local")]
    user: String,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a realtime voice conversation
    Voice,
    /// Chat with Nguru by text
    Chat {
        /// Start with a discover topic (see `nguru topics`)
        #[arg(short, long)]
        topic: Option<usize>,
    },
    /// Answer a few questions so Nguru can explain things your way
    Onboard,
    /// Show your learning profile
    Profile,
    /// Show your chat history
    History,
    /// List discover topics
    Topics,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the recording as a WAV file
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,nguru=info",
        1 => "info,nguru=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
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
    match cli.command {
        Command::Topics => {
            list_topics();
            Ok(())
        }
        Command::TestMic { duration, save } => test_mic(duration, save.as_deref()).await,
        Command::TestSpeaker => test_speaker().await,
        command => {
            let config = Config::load()?;
            match command {
                Command::Voice => voice(&config).await,
                Command::Chat { topic } => chat(&config, &cli.user, topic).await,
                Command::Onboard => onboard(&config, &cli.user).await,
                Command::Profile => show_profile(&config, &cli.user).await,
                Command::History => show_history(&config, &cli.user).await,
                Command::Topics | Command::TestMic { .. } | Command::TestSpeaker => Ok(()),
            }
        }
    }
}

/// Run a voice session until Ctrl-C or until the remote side ends it
#[allow(clippy::future_not_send)]
async fn voice(config: &Config) -> anyhow::Result<()> {
    let connector = Arc::new(GeminiLiveConnector::new(
        config.gemini_api_key.clone(),
        config.live_endpoint.clone(),
    ));
    let mut controller = SessionController::new(
        connector,
        Arc::new(CpalInput),
        Arc::new(CpalOutput),
        config.live_setup(),
    );

    let mut status = controller.subscribe();
    let printer = tokio::spawn(async move {
        let mut speaking = false;
        while status.changed().await.is_ok() {
            let now = status.borrow_and_update().speaking;
            if now != speaking {
                speaking = now;
                println!("{}", if speaking { "Nguru is speaking..." } else { "Listening..." });
            }
        }
    });

    println!("Connecting to Nguru...");
    if let Err(e) = controller.connect().await {
        printer.abort();
        anyhow::bail!(e.user_message());
    }

    println!("Connected. Start talking! Press Ctrl-C to end the conversation.\n");
    controller
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    let status = controller.status();
    printer.abort();

    if !status.transcript.is_empty() {
        println!("\n{}", status.transcript.trim());
    }

    if let Some(error) = status.error {
        anyhow::bail!(error);
    }

    println!("\nConversation ended.");
    Ok(())
}

/// Interactive text chat
async fn chat(config: &Config, user: &str, topic: Option<usize>) -> anyhow::Result<()> {
    let topic = topic
        .map(|n| {
            n.checked_sub(1)
                .and_then(|i| DISCOVER_TOPICS.get(i))
                .map(|t| t.question)
                .with_context(|| format!("no topic {n}, see `nguru topics`"))
        })
        .transpose()?;

    let store = store::open(config)?;
    if store.get_profile(user).await?.is_none() {
        anyhow::bail!("No profile yet. Run `nguru onboard` first.");
    }

    let generator = GeminiTextClient::new(
        config.require_gemini_key()?.clone(),
        config.chat_model.clone(),
    );
    let service = ChatService::new(Arc::new(generator), store);

    for message in service.start(user, topic).await? {
        print_message(&message);
    }

    println!("(type 'exit' to leave)\n");
    loop {
        let Ok(line) = Input::<String>::new()
            .with_prompt("you")
            .allow_empty(true)
            .interact_text()
        else {
            break;
        };

        if matches!(line.trim(), "exit" | "quit") {
            break;
        }

        match service.send(user, &line).await {
            Ok(Some(reply)) => print_message(&reply),
            Ok(None) => {}
            Err(e) => println!("{}", e.user_message()),
        }
    }

    Ok(())
}

fn print_message(message: &ChatMessage) {
    let speaker = match message.role {
        Role::User => "you",
        Role::Model => "nguru",
    };
    println!("{speaker}: {}\n", message.content);
}

/// Ask the onboarding questions and save the answers
async fn onboard(config: &Config, user: &str) -> anyhow::Result<()> {
    let store = store::open(config)?;
    let existing = store.get_profile(user).await?.unwrap_or_default();

    println!("Hi! I'm Nguru, your curious learning friend.\n");
    println!(
        "To make everything we talk about feel perfect for YOU and help us go deeper together, \
         may I ask a few quick, fun questions?\n"
    );

    let mut profile = Profile::default();
    for (i, question) in ONBOARDING_QUESTIONS.iter().enumerate() {
        println!("Question {} of {}", i + 1, ONBOARDING_QUESTIONS.len());
        let mut input = Input::<String>::new().with_prompt(question.text);
        if let Some(previous) = existing.get(question.field) {
            input = input.default(previous.to_string());
        }
        let answer = input.interact_text()?;
        profile.set(question.field, answer.trim());
    }
    profile.is_onboarded = Some(true);

    store.save_profile(user, &profile).await?;
    println!("\nThanks! Nguru is ready. Try `nguru chat` or `nguru voice`.");
    Ok(())
}

async fn show_profile(config: &Config, user: &str) -> anyhow::Result<()> {
    let store = store::open(config)?;
    let Some(profile) = store.get_profile(user).await? else {
        println!("No profile yet for {user}. Run `nguru onboard` to create one.");
        return Ok(());
    };

    println!("Profile for {user} ({} store)", store.name());
    println!("---");
    for field in ProfileField::ALL {
        println!("{:>18}: {}", field.label(), profile.get(field).unwrap_or("-"));
    }
    println!("{:>18}: {}", "Onboarded", if profile.is_onboarded() { "yes" } else { "no" });
    Ok(())
}

async fn show_history(config: &Config, user: &str) -> anyhow::Result<()> {
    let store = store::open(config)?;
    let history = store.list_messages(user).await?;
    if history.is_empty() {
        println!("No conversations yet. {}", prompt::GREETING);
        return Ok(());
    }

    for message in &history {
        println!(
            "[{}] {:>5}: {}",
            message.timestamp.format("%Y-%m-%d %H:%M"),
            message.role,
            message.content
        );
    }
    Ok(())
}

fn list_topics() {
    println!("Discover");
    println!("---");
    for (i, topic) in DISCOVER_TOPICS.iter().enumerate() {
        println!("{}. {} ({})", i + 1, topic.question, topic.subject);
    }
    println!("\nStart one with `nguru chat --topic <n>`.");
}

/// Test microphone input through the capture encoder
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, save: Option<&Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut rx) = mpsc::unbounded_channel::<EncodedAudioChunk>();
    let mut capture = CaptureEncoder::new(Arc::new(CpalInput));
    capture
        .start(move |chunk| {
            let _ = tx.send(chunk);
        })
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    println!("Sample rate: {CAPTURE_SAMPLE_RATE} Hz");
    println!("---");

    let mut recording = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            samples.extend(chunk.decode_samples()?);
        }
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        if save.is_some() {
            recording.extend(samples);
        }
    }

    capture.stop();

    if let Some(path) = save {
        let wav = samples_to_wav(&recording, CAPTURE_SAMPLE_RATE)?;
        std::fs::File::create(path)
            .and_then(|mut f| f.write_all(&wav))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("\nSaved {} samples to {}", recording.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Has the terminal been allowed to use the microphone?");
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

/// Test speaker output by scheduling a tone in chunks through the playback scheduler
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a steady 440Hz tone for 2 seconds\n");

    let mut playback = PlaybackScheduler::new(Arc::new(CpalOutput));
    playback.init()?;

    // Four back-to-back chunks; any gap between them would be audible
    let tone = sine_tone(440.0, 2.0, PLAYBACK_SAMPLE_RATE, 0.3);
    for samples in tone.chunks(tone.len() / 4) {
        let chunk = EncodedAudioChunk::from_samples(samples, PLAYBACK_SAMPLE_RATE);
        playback.play(&chunk);
    }

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", tone.len());
    tokio::time::sleep(Duration::from_millis(2300)).await;
    playback.stop();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
