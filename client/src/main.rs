use clap::Parser;
use client::game::ClientView;
use client::input::InputScript;
use client::network::ClientContext;
use log::{debug, error, info};
use shared::{NetConfig, NetError, NetworkMessage, Payload};
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: String,

    /// Host port
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Milliseconds between ticks
    #[arg(short, long, default_value = "16")]
    tick_ms: u64,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value_t = shared::HEARTBEAT_INTERVAL_MS)]
    heartbeat_ms: u64,

    /// Seed for the scripted input; random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = NetConfig {
        port: args.port,
        heartbeat_interval: Duration::from_millis(args.heartbeat_ms),
        ..NetConfig::default()
    };

    let mut client = ClientContext::new(config);
    client.connect(&args.server, args.port).await?;

    let mut view = ClientView::new();
    let mut script = InputScript::new(args.seed);
    let started = Instant::now();

    let mut ticker = interval(Duration::from_millis(args.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received Ctrl+C, disconnecting");
                break;
            }
            _ = ticker.tick() => {}
        }

        match run_tick(&mut client, &mut view, &mut script, started).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                error!("Session lost: {}", e);
                break;
            }
        }
    }

    client.disconnect().await;
    if let Some(score) = view.score() {
        info!("Last known score: {} after {} updates", score, view.updates());
        for line in view.board_lines() {
            info!("|{}|", line);
        }
    }
    Ok(())
}

/// Drain the host's messages, keep the session alive and send this tick's keys.
///
/// Returns `Ok(false)` once the host has ended the session.
async fn run_tick(
    client: &mut ClientContext,
    view: &mut ClientView,
    script: &mut InputScript,
    started: Instant,
) -> Result<bool, NetError> {
    while let Some(message) = client.receive().await? {
        match message.payload {
            Payload::GameState(snapshot) => view.apply(snapshot),
            Payload::Disconnect => {
                info!("Host ended the session");
                return Ok(false);
            }
            Payload::Heartbeat => {}
            other => debug!("Ignoring {:?}", other),
        }
    }

    client.check_liveness()?;

    let batch = script.next_batch(started.elapsed().as_secs_f32());
    client.send(&NetworkMessage::player_input(batch)?)?;
    Ok(true)
}
