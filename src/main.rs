use anyhow::{Context, Result};
use clap::Parser;
use doubao_asr::audio::PcmByteDecoder;
use doubao_asr::{AsrClient, AsrConfig, HttpCredentialIssuer, ResponseEvent};
use std::io::Write;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "doubao-asr")]
#[command(about = "Transcribe audio with the Doubao input-method ASR service")]
struct Args {
    /// Config file (TOML, YAML or JSON, extension optional)
    #[arg(short, long)]
    config: Option<String>,

    /// Send audio at real-time speed instead of as fast as possible
    #[arg(short, long)]
    realtime: bool,

    /// Print every event instead of only the final text
    #[arg(short, long)]
    stream: bool,

    /// Audio file to transcribe, or `-` for raw 16-bit PCM on stdin
    audio: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AsrConfig::load(path).context("Failed to load config")?,
        None => AsrConfig::default(),
    };
    config.realtime |= args.realtime;

    let issuer =
        HttpCredentialIssuer::from_config(&config).context("Failed to set up device registration")?;
    let client = AsrClient::from_config(config, Some(&issuer))
        .await
        .context("Failed to set up client")?;
    info!("Device {}", client.credentials().device_id);

    if args.audio == "-" {
        return transcribe_stdin(&client).await;
    }

    if args.stream {
        let samples = client.load_file(args.audio.as_ref()).await?;
        let mut stream = client.transcribe_stream(samples).await?;
        while let Some(event) = stream.next_event().await {
            print_event(&event)?;
        }
        return Ok(());
    }

    let samples = client.load_file(args.audio.as_ref()).await?;
    let text = client
        .transcribe_with(samples, |interim| {
            print!("\r{}", interim);
            std::io::stdout().flush().ok();
        })
        .await?;
    println!("\r{}", text);

    Ok(())
}

/// Live mode: PCM arrives on stdin until EOF.
async fn transcribe_stdin(client: &AsrClient) -> Result<()> {
    let (failed_tx, mut failed_rx) = oneshot::channel::<std::io::Error>();
    let state = (tokio::io::stdin(), PcmByteDecoder::new(), failed_tx);

    let source = futures::stream::unfold(state, |(mut stdin, mut decoder, failed)| async move {
        let mut buf = vec![0u8; 3200];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => {
                    if decoder.has_partial() {
                        warn!("Input ended mid-sample, dropping the last byte");
                    }
                    return None;
                }
                Ok(n) => {
                    let samples = decoder.push(&buf[..n]);
                    if !samples.is_empty() {
                        return Some((samples, (stdin, decoder, failed)));
                    }
                }
                Err(e) => {
                    error!("Failed to read audio from stdin: {}", e);
                    let _ = failed.send(e);
                    return None;
                }
            }
        }
    });

    let mut stream = client.transcribe_realtime(source).await?;
    while let Some(event) = stream.next_event().await {
        print_event(&event)?;
    }

    if let Ok(e) = failed_rx.try_recv() {
        return Err(e).context("Audio input failed");
    }
    Ok(())
}

fn print_event(event: &ResponseEvent) -> Result<()> {
    match event {
        ResponseEvent::InterimResult { text } => {
            print!("\r{}", text);
            std::io::stdout().flush()?;
        }
        ResponseEvent::FinalResult { text, .. } => println!("\r{}", text),
        ResponseEvent::Error { message } => anyhow::bail!("Recognition failed: {}", message),
        other => info!("{}", other.kind()),
    }
    Ok(())
}
