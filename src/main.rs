use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use hark::auth::{SERVICE_TOKEN, TokenStore};
use hark::voice::{AudioCapture, calculate_energy};
use hark::{Config, Daemon};

/// hark - voice-driven mail assistant
#[derive(Parser)]
#[command(name = "hark", version, about)]
struct Cli {
    /// Wake phrase that arms active listening
    #[arg(short, long, env = "HARK_WAKE_PHRASE")]
    wake_phrase: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice input (for headless hosts without audio hardware)
    #[arg(long, env = "HARK_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Store the service API token
    SetToken {
        /// Token value; read from stdin when omitted
        token: Option<String>,
    },
    /// Remove the stored service API token
    ClearToken,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,hark=info",
        1 => "info,hark=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::SetToken { token } => set_token(token),
            Command::ClearToken => clear_token(),
        };
    }

    let mut config = Config::load_with_options(cli.disable_voice)?;
    if let Some(wake_phrase) = cli.wake_phrase {
        let wake_phrase = wake_phrase.trim().to_lowercase();
        if wake_phrase.is_empty() {
            anyhow::bail!("wake phrase must not be empty");
        }
        config.wake_phrase = wake_phrase;
    }
    tracing::debug!(?config, "loaded configuration");

    let mut daemon = Daemon::new(config)?;
    daemon.run().await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        // Clear buffer each second
        capture.clear_buffer();
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

/// Store the service API token in the local credential store
fn set_token(token: Option<String>) -> anyhow::Result<()> {
    let token = match token {
        Some(token) => token,
        None => {
            println!("Paste the service API token and press enter:");
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            line.trim().to_string()
        }
    };

    if token.is_empty() {
        anyhow::bail!("token must not be empty");
    }

    let store = TokenStore::new(&hark::config::data_dir());
    store.set(SERVICE_TOKEN, &SecretString::from(token))?;
    println!("Token stored.");
    Ok(())
}

/// Remove the stored service API token
fn clear_token() -> anyhow::Result<()> {
    let store = TokenStore::new(&hark::config::data_dir());
    store.remove(SERVICE_TOKEN)?;
    println!("Token removed.");
    Ok(())
}
