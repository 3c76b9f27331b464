//! voxcheck
//!
//! Smoke-tests a Wyoming text-to-speech service: connects, lists the voices
//! it reports, synthesizes a sentence and saves the result as a WAV file.
//!
//! Usage:
//!   # Basic test against localhost:10200
//!   cargo run --release -p voxcheck-client
//!
//!   # Custom text and voice
//!   cargo run --release -p voxcheck-client -- --text "Hello!" --voice en_US-amy-medium
//!
//!   # Another server
//!   cargo run --release -p voxcheck-client -- --host 192.168.1.100 --port 10201
//!
//!   # Test and play the result
//!   cargo run --release -p voxcheck-client --features playback -- --play

#[cfg(feature = "playback")]
mod playback;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use voxcheck_client::config::{DEFAULT_HOST, DEFAULT_PORT};
use voxcheck_client::{ServiceInfo, Session, SessionConfig, SynthesisRequest};

const DEFAULT_TEXT: &str = "Hello! This is a test of the Wyoming Piper text to speech system. \
    I am demonstrating the current voice model configuration. \
    Can you hear the difference in voice characteristics?";

/// Voices printed before the list is cut short.
const VOICES_SHOWN: usize = 5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Test Wyoming Piper TTS voice output")]
struct Args {
    /// Wyoming server hostname
    #[arg(long, env = "WYOMING_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Wyoming server port
    #[arg(short, long, env = "WYOMING_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Text to synthesize
    #[arg(short, long, default_value = DEFAULT_TEXT)]
    text: String,

    /// Output WAV file
    #[arg(short, long, default_value = "test_output.wav")]
    output: PathBuf,

    /// Voice model (falls back to PIPER_VOICE, also read from .env)
    #[arg(short, long, env = "PIPER_VOICE")]
    voice: Option<String>,

    /// Speaker name or id for multi-speaker voices
    #[arg(long)]
    speaker: Option<String>,

    /// Speaking rate; higher is slower
    #[arg(long)]
    length_scale: Option<f32>,

    /// Generator noise
    #[arg(long)]
    noise_scale: Option<f32>,

    /// Phoneme width noise
    #[arg(long)]
    noise_w_scale: Option<f32>,

    /// Seconds of silence between sentences
    #[arg(long)]
    sentence_silence: Option<f32>,

    /// Seconds to wait for the whole exchange
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Seconds to wait for the connection
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    /// Only list the voices the server reports
    #[arg(long)]
    list_voices: bool,

    /// Play the generated audio (needs the `playback` feature)
    #[arg(long)]
    play: bool,
}

impl Args {
    fn request(&self) -> SynthesisRequest {
        let mut request = SynthesisRequest::new(&self.text);
        request.voice = self.voice.clone();
        request.speaker = self.speaker.clone();
        request.prosody.length_scale = self.length_scale;
        request.prosody.noise_scale = self.noise_scale;
        request.prosody.noise_w_scale = self.noise_w_scale;
        request.prosody.sentence_silence = self.sentence_silence;
        request
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig::new(&self.host, self.port)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads the environment
    let dotenv = dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voxcheck=info".parse()?)
                .add_directive("voxcheck_client=info".parse()?),
        )
        .init();

    if let Some(path) = dotenv {
        info!("Loaded configuration from {}", path.display());
    }

    let args = Args::parse();

    print_banner();
    if let Err(e) = run(&args).await {
        error!("{:#}", e);
        println!("\n❌ Test failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(args: &Args) -> Result<()> {
    let request = args.request();
    request.validate()?;

    if let Some(voice) = &request.voice {
        println!("🎯 Target voice: {}", voice);
    }
    println!();

    let mut session = Session::new(args.session_config());

    println!("🔍 Checking server information...");
    session.connect().await?;
    println!("✓ Connected to {}", session.config().addr());
    print_service(session.describe().await?);
    println!();

    if args.list_voices {
        session.close().await;
        return Ok(());
    }

    println!("🎵 Synthesizing: \"{}\"", request.text);
    let audio = session.stream(&request).await?.collect_audio().await?;
    session.close().await;

    println!(
        "📊 Audio format: {}Hz, {}-bit, {} channel(s)",
        audio.format.rate,
        audio.bits_per_sample(),
        audio.format.channels
    );
    println!("✓ Received {} audio chunks", audio.chunk_count);

    audio.write_wav(&args.output)?;
    println!("💾 Audio saved to: {}", args.output.display());
    println!(
        "📏 Duration: {:.1}s, Size: {} bytes",
        audio.duration().as_secs_f32(),
        audio.pcm.len()
    );
    if audio.is_empty() {
        println!("⚠️  The server returned no audio samples");
    }

    println!("\n✅ Test completed successfully!");

    if args.play {
        println!();
        play(args)?;
    } else {
        println!("\n💡 To hear the voice, run again with --play");
        println!("   Or manually play: {}", args.output.display());
    }

    Ok(())
}

fn print_banner() {
    println!("{}", "=".repeat(60));
    println!("     Wyoming Piper Voice Test");
    println!("{}", "=".repeat(60));
}

fn print_service(service: &ServiceInfo) {
    println!(
        "📋 Server: {} v{}",
        service.name.as_deref().unwrap_or("unknown"),
        service.version.as_deref().unwrap_or("?")
    );
    if let Some(description) = &service.description {
        println!("   {}", description);
    }

    if service.voices.is_empty() {
        println!("\n⚠️  No voices reported by server");
        return;
    }

    println!("\n🎤 Available voices ({}):", service.voices.len());
    for voice in service.voices.iter().take(VOICES_SHOWN) {
        println!("   • {}", voice);
    }
    if service.voices.len() > VOICES_SHOWN {
        println!("   ... and {} more", service.voices.len() - VOICES_SHOWN);
    }
}

#[cfg(feature = "playback")]
fn play(args: &Args) -> Result<()> {
    println!("🔊 Playing audio...");
    playback::play_wav_file(&args.output)
}

#[cfg(not(feature = "playback"))]
fn play(args: &Args) -> Result<()> {
    println!("✗ Playback is not compiled in; rebuild with --features playback");
    println!("   Or manually play: {}", args.output.display());
    Ok(())
}
