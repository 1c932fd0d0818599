//! roomsync-watch - follow the room board of a roomsync server from a terminal.

use std::sync::Arc;

use clap::Parser;
use roomsync_client::{ClientConfig, SyncEngine, WsRemote};
use roomsync_engine::RoomList;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "roomsync-watch", version, about = "Watch room statuses live")]
struct Args {
    /// User id whose session to follow
    #[arg(long)]
    user: String,

    /// Server base URL (overrides ROOMSYNC_SERVER_URL)
    #[arg(long)]
    server: Option<String>,

    /// Device id stamped on writes (overrides ROOMSYNC_DEVICE_ID)
    #[arg(long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomsync_client=info,roomsync_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(server) = args.server {
        config.server_url = Some(server);
    }
    if let Some(device) = args.device {
        config.device_id = device;
    }

    let remote = WsRemote::new(config.require_server_url()?, config.token.clone())?;
    tracing::info!(device_id = %config.device_id, user = %args.user, "starting watch");

    let engine = SyncEngine::new(Arc::new(remote), &config);
    engine.start_sync(args.user);

    let mut rooms = engine.observe_rooms();
    let mut status = engine.observe_sync_status();

    loop {
        tokio::select! {
            changed = rooms.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rooms.borrow_and_update().clone();
                print_board(&snapshot, &engine);
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if let Some(error) = current.error {
                    eprintln!("sync error: {error}");
                    engine.clear_error();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    engine.stop_sync();
    Ok(())
}

fn print_board(rooms: &RoomList, engine: &SyncEngine) {
    let tier = engine
        .active_tier()
        .map(|tier| format!("{tier:?}").to_lowercase())
        .unwrap_or_else(|| "idle".to_string());
    println!("== {} rooms ({tier}) ==", rooms.len());

    for (floor, floor_rooms) in rooms.by_floor() {
        let label = floor.map_or_else(|| "-".to_string(), |f| f.to_string());
        let line: Vec<String> = floor_rooms
            .iter()
            .map(|room| {
                let marker = if room.shows_before_930() { "*" } else { "" };
                format!("{}:{}{}", room.number, room.status, marker)
            })
            .collect();
        println!("floor {label}: {}", line.join("  "));
    }

    let counts: Vec<String> = engine
        .room_counts()
        .iter()
        .map(|(status, count)| format!("{status}={count}"))
        .collect();
    println!("{}", counts.join(" "));
}
