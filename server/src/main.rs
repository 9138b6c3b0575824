use clap::Parser;
use log::{error, info, warn};
use server::game::HostGame;
use server::network::HostContext;
use shared::{NetConfig, NetError, NetworkMessage, Simulation};
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind the listening socket to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Number of peer slots
    #[clap(short, long, default_value_t = shared::MAX_PEERS)]
    max_peers: usize,
    /// Milliseconds between ticks
    #[clap(short, long, default_value = "16")]
    tick_ms: u64,
    /// Expected heartbeat interval of clients in milliseconds
    #[clap(long, default_value_t = shared::HEARTBEAT_INTERVAL_MS)]
    heartbeat_ms: u64,
}

impl Args {
    fn config(&self) -> NetConfig {
        NetConfig {
            bind_host: self.host.clone(),
            port: self.port,
            max_peers: self.max_peers,
            heartbeat_interval: Duration::from_millis(self.heartbeat_ms),
            ..NetConfig::default()
        }
    }
}

/// Parses arguments, starts the host and runs the tick loop until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut host = HostContext::bind(args.config()).await?;
    let mut game = HostGame::new();

    let mut ticker = interval(Duration::from_millis(args.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_update = Instant::now();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        if let Err(e) = run_tick(&mut host, &mut game, &mut last_update).await {
            error!("Host tick failed: {}", e);
            break;
        }
    }

    host.shutdown().await;
    Ok(())
}

/// Poll peers, integrate inputs, broadcast the new state and drop silent peers.
async fn run_tick(
    host: &mut HostContext,
    game: &mut HostGame,
    last_update: &mut Instant,
) -> Result<(), NetError> {
    let outcome = host.poll_and_dispatch().await?;

    for &slot in &outcome.accepted {
        game.add_player(slot);
    }
    for inbound in &outcome.inbound {
        if let Some(input) = inbound.input() {
            game.apply_input(inbound.slot, input);
        }
    }
    for &slot in &outcome.disconnected {
        game.remove_player(slot);
    }

    let now = Instant::now();
    game.update((now - *last_update).as_secs_f32());
    *last_update = now;

    if host.peer_count() > 0 {
        let state = NetworkMessage::game_state(game.snapshot())?;
        match host.broadcast(&state) {
            Ok(_) => {}
            Err(NetError::AllSendsFailed { attempted }) => {
                warn!("State update reached none of {} peers", attempted)
            }
            Err(e) => return Err(e),
        }
    }

    let expired = host.check_liveness()?;
    if expired > 0 {
        info!("{} peer(s) timed out", expired);
    }

    game.retain_players(|slot| host.is_connected(slot));
    Ok(())
}
