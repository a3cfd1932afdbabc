//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p plaza_client --bin client -- [--endpoint 127.0.0.1:2567]
//!       [--room my_room] [--name Player] [--config client.json]
//!       [--transport tcp|loopback]
//!
//! With `--transport loopback` the client hosts an in-process room with a
//! wandering bot, so the whole sync pipeline runs without a server.
//!
//! Console commands:
//!   connect [room]        - Join a room (default: configured room)
//!   disconnect            - Leave the room
//!   status                - Show connection and player state
//!   name <username>       - Change display name
//!   teleport <x> <y> <z>  - Move the local player
//!   quit                  - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use plaza_client::{
    console::{self, ConsoleCommand},
    controller::{ControllerSample, WanderPath},
    transport::{LoopbackRoom, LoopbackTransport, TcpTransport, Transport},
    GameClient,
};
use plaza_shared::{
    animation::AnimationName,
    config::ClientConfig,
    math::{Euler, Vec3},
    net::PlayerState,
};
use tokio::{sync::mpsc, time::Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportKind {
    Tcp,
    Loopback,
}

struct Args {
    cfg: ClientConfig,
    transport: TransportKind,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();

    // Config file first so flags can override it.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            ClientConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => ClientConfig::default(),
    }
    .with_env_overrides();

    let mut transport = TransportKind::Tcp;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" if i + 1 < args.len() => {
                cfg.server_endpoint = args[i + 1].clone();
                i += 2;
            }
            "--room" if i + 1 < args.len() => {
                cfg.room_name = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--transport" if i + 1 < args.len() => {
                transport = match args[i + 1].as_str() {
                    "tcp" => TransportKind::Tcp,
                    "loopback" => TransportKind::Loopback,
                    other => anyhow::bail!("unknown transport {other:?}"),
                };
                i += 2;
            }
            "--config" => i += 2,
            _ => i += 1,
        }
    }
    Ok(Args { cfg, transport })
}

/// Moves a bot around the loopback room until the process exits.
fn spawn_bot(room: LoopbackRoom) {
    tokio::spawn(async move {
        let key = "bot-1";
        let mut path = WanderPath::new(Vec3::new(4.0, 0.0, 4.0), 6.0, 0.6);
        let first = path.step(0.0);
        room.add_player(
            key,
            PlayerState::full("Wanderer", first.position, first.rotation, AnimationName::Idle),
        );

        let step = Duration::from_millis(100);
        let mut interval = tokio::time::interval(step);
        loop {
            interval.tick().await;
            let s = path.step(step.as_secs_f32());
            room.update_player(
                key,
                PlayerState::full(
                    "Wanderer",
                    s.position,
                    s.rotation,
                    AnimationName::from_action(s.active_action.as_deref()),
                ),
            );
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, transport } = parse_args()?;
    info!(
        endpoint = %cfg.server_endpoint,
        room = %cfg.room_name,
        transport = ?transport,
        "Starting client"
    );

    let transport: Arc<dyn Transport> = match transport {
        TransportKind::Tcp => Arc::new(TcpTransport::new()),
        TransportKind::Loopback => {
            let room = LoopbackRoom::new(&cfg.room_name);
            spawn_bot(room.clone());
            Arc::new(LoopbackTransport::new(room))
        }
    };

    let tick_interval = cfg.tick_interval();
    let mut client = GameClient::new(cfg, transport);
    if let Err(e) = client.connect() {
        warn!(error = %e, "Initial connect not started");
    }

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Type 'help' for commands, 'quit' to exit.");
    println!();

    // No physics here: the character stands where the last correction put it.
    let mut controller = ControllerSample::new(Vec3::ZERO, Euler::IDENTITY);
    let mut ticker = tokio::time::interval(tick_interval);
    let mut last_status = Instant::now();
    let status_every = Duration::from_secs(10);

    'run: loop {
        ticker.tick().await;

        while let Ok(line) = console_rx.try_recv() {
            match console::parse(&line) {
                Ok(Some(ConsoleCommand::Quit)) => break 'run,
                Ok(Some(cmd)) => {
                    for out in client.exec_console(cmd).await {
                        println!("{out}");
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{e}"),
            }
        }

        let now = Instant::now();
        let out = client.tick(now, &controller);
        if let Some(correction) = out.correction {
            controller.position = correction.position;
            if let Some(rotation) = correction.rotation {
                controller.rotation = rotation;
            }
        }

        if now.duration_since(last_status) >= status_every {
            last_status = now;
            let state = client.connection_state();
            info!(
                status = %state.status,
                remotes = out.frame.remotes.len(),
                "Status"
            );
        }
    }

    client.disconnect().await;
    info!("Client shut down");
    Ok(())
}
