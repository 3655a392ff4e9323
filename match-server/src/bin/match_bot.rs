use clap::Parser;
use rand::Rng;
use shared::{get_timestamp, read_frame, write_frame, InputEvent, MatchMessage};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

const MOVES: [InputEvent; 7] = [
    InputEvent::MoveLeft,
    InputEvent::MoveRight,
    InputEvent::RotateCw,
    InputEvent::RotateCcw,
    InputEvent::SoftDrop,
    InputEvent::HardDrop,
    InputEvent::Hold,
];

/// Headless player that joins a match and mashes random inputs
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Match server address
    #[clap(default_value = "127.0.0.1:16800")]
    addr: String,
    #[clap(short, long, default_value = "bot")]
    name: String,
    #[clap(short, long)]
    user_id: Option<u64>,
    /// Milliseconds between inputs
    #[clap(short, long, default_value = "150")]
    input_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.addr).await?;
    println!("Connected to {}", args.addr);
    let (mut reader, mut writer) = stream.into_split();

    let welcome: MatchMessage = read_frame(&mut reader).await?;
    println!("Received: {:?}", welcome);
    let is_seat = matches!(welcome, MatchMessage::Welcome { player_id: Some(_), .. });

    if is_seat {
        let hello = MatchMessage::Hello {
            name: args.name.clone(),
            user_id: args.user_id,
        };
        write_frame(&mut writer, &hello).await?;
    } else {
        println!("No free seat, watching instead");
    }

    // Frames are read on their own task so the input timer never cuts a read short
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let message = read_frame::<_, MatchMessage>(&mut reader).await;
            let failed = message.is_err();
            if frame_tx.send(message).is_err() || failed {
                break;
            }
        }
    });

    let mut input_timer = interval(Duration::from_millis(args.input_ms.max(1)));
    input_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut started = false;
    let mut snapshots = 0u64;

    loop {
        tokio::select! {
            message = frame_rx.recv() => {
                let Some(message) = message else { break };
                match message? {
                    MatchMessage::Start { seed, t0_server_ms, .. } => {
                        let wait = t0_server_ms.saturating_sub(get_timestamp());
                        println!("Match starts in {} ms (seed {})", wait, seed);
                        started = true;
                    }
                    MatchMessage::Snapshot { players, .. } => {
                        snapshots += 1;
                        if snapshots % 20 == 0 {
                            for p in players {
                                println!(
                                    "  Seat {} {}: score={} level={} lines={} alive={}",
                                    p.id, p.name, p.score, p.level, p.lines, p.alive
                                );
                            }
                        }
                    }
                    MatchMessage::GameOver { reason, winner, result, .. } => {
                        println!("Game over ({}), winner seat {:?}", reason, winner);
                        for (seat, r) in result {
                            println!("  {}: score={} lines={}", seat, r.score, r.lines);
                        }
                        break;
                    }
                    other => println!("Unexpected message: {:?}", other),
                }
            }

            _ = input_timer.tick(), if is_seat && started => {
                let ev = MOVES[rand::thread_rng().gen_range(0..MOVES.len())];
                let input = MatchMessage::Input { when_ms: get_timestamp(), ev };
                write_frame(&mut writer, &input).await?;
            }
        }
    }

    println!("Bot finished");
    Ok(())
}
