use clap::Parser;
use client::game::ClientPhase;
use client::input::{InputEvent, InputManager};
use client::network::Client;
use client::status::Scoreboard;
use log::{error, info, warn};
use shared::protocol::truncate_nick;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::{interval, Instant, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about = "Four-player pong client", long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port (TCP and UDP)
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Nickname; prompted for when omitted
    #[arg(short, long)]
    nick: Option<String>,

    /// Milliseconds between status lines
    #[arg(long, default_value_t = 1000)]
    status_ms: u64,
}

async fn prompt(
    lines: &mut Lines<BufReader<Stdin>>,
    message: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    println!("{}", message);
    match lines.next_line().await? {
        Some(line) => Ok(line),
        None => Err("stdin closed".into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let nick = match args.nick {
        Some(nick) => nick,
        None => prompt(&mut lines, "Nickname:").await?,
    };
    let nick = truncate_nick(nick.trim()).to_string();

    let server = format!("{}:{}", args.host, args.port);
    info!("Connecting to {} as '{}'", server, nick);

    let mut client = match Client::connect(&server, &nick).await {
        Ok(client) => client,
        Err(e) => {
            error!("Could not join {}: {}", server, e);
            return Err(e);
        }
    };

    prompt(&mut lines, "Press Enter when ready").await?;
    client.ready().await?;
    info!("Controls: a = left, d = right, s or space = stop, q = quit (then Enter)");

    let state = client.state();
    let mut input = InputManager::new();

    let mut status_timer = interval(Duration::from_millis(args.status_ms.max(1)));
    let mut frame_timer = interval(Duration::from_secs_f64(1.0 / shared::GAME_FPS as f64));
    frame_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();

    'running: loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    for event in input.handle_line(&line) {
                        match event {
                            InputEvent::Action(action) => match client.send_action(action).await {
                                Ok(true) => {}
                                Ok(false) => {
                                    info!("The match has not started yet");
                                    input.reset();
                                }
                                Err(e) => warn!("Failed to send {:?}: {}", action, e),
                            },
                            InputEvent::Quit => break 'running,
                        }
                    }
                }
                Ok(None) => break 'running,
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    break 'running;
                }
            },
            _ = frame_timer.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last_frame).as_secs_f32();
                last_frame = now;
                state.lock().await.integrate(dt);
            }
            _ = status_timer.tick() => {
                let state = state.lock().await;
                info!("{}", Scoreboard(&state));
                if state.phase() == ClientPhase::Finished || !state.is_connected() {
                    break 'running;
                }
            }
        }
    }

    client.leave().await;
    Ok(())
}
