use std::{
    io::{self, BufRead},
    net::SocketAddr,
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context as _, Result};
use benor::{ConsensusControl, ConsensusHandle};
use clap::{load_yaml, App};
use config::Node;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use types::ProcessSet;

#[tokio::main]
async fn main() -> Result<()> {
    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml).get_matches();

    let level = match matches.occurrences_of("verbose") {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .map_err(|e| anyhow!("Unable to initialize the logger: {}", e))?;

    let roster = matches
        .value_of("config")
        .ok_or_else(|| anyhow!("Missing roster file"))?;
    let id: usize = matches
        .value_of("id")
        .ok_or_else(|| anyhow!("Missing process id"))?
        .parse()
        .context("Process id must be an integer")?;
    let num_faults: usize = matches
        .value_of("faults")
        .ok_or_else(|| anyhow!("Missing fault bound"))?
        .parse()
        .context("Fault bound must be an integer")?;
    let byz = matches.is_present("byzantine");

    let config = Node::from_roster(roster, id, num_faults)?;
    sanity_check_roster(&config)?;
    log::info!(
        "Process {} of {} starting, tolerating {} crash fault(s)",
        config.id,
        config.num_nodes,
        config.num_faults
    );

    let (handle, exit_tx) = benor::Context::spawn(config, byz)?;
    let signals = spawn_signal_listener()?;
    let commands = spawn_stdin_reader();

    print_help();
    run_shell(handle, signals, commands).await;

    let _ = exit_tx.send(());
    // Give the sub-services a moment to log their shutdown
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

/// Every roster address must resolve back to the process it belongs to.
fn sanity_check_roster(config: &Node) -> Result<()> {
    let mut members = Vec::new();
    for (replica, address) in config.net_map.iter() {
        let address: SocketAddr = address
            .parse()
            .map_err(|e| anyhow!("Unable to parse address {}: {}", address, e))?;
        members.push((*replica, address));
    }
    let processes = ProcessSet::new(members);
    for id in 0..config.num_nodes {
        let process = processes
            .get(id)
            .ok_or_else(|| anyhow!("Roster ids must be contiguous, {} is missing", id))?;
        processes
            .resolve(&process.address)
            .map_err(|e| anyhow!("Roster address clash: {}", e))?;
    }
    if config.num_nodes <= 2 * config.num_faults {
        return Err(anyhow!(
            "{} processes cannot tolerate {} crash faults, a strict majority must survive",
            config.num_nodes,
            config.num_faults
        ));
    }
    Ok(())
}

fn spawn_signal_listener() -> Result<UnboundedReceiver<()>> {
    let (sig_tx, sig_rx) = unbounded_channel();
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if signals.forever().next().is_some() {
            let _ = sig_tx.send(());
        }
    });
    Ok(sig_rx)
}

/// Stdin is blocking; a dedicated thread feeds lines into the reactor.
fn spawn_stdin_reader() -> UnboundedReceiver<String> {
    let (line_tx, line_rx) = unbounded_channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    line_rx
}

async fn run_shell(
    mut handle: ConsensusHandle,
    mut signals: UnboundedReceiver<()>,
    mut commands: UnboundedReceiver<String>,
) {
    let control = handle.control();
    loop {
        tokio::select! {
            _ = signals.recv() => {
                log::info!("Termination signal received. Shutting down.");
                break;
            },
            line = commands.recv() => {
                match line {
                    Some(line) => {
                        if !dispatch_command(&line, &control).await {
                            break;
                        }
                    },
                    None => break,
                }
            },
            decision = handle.next_decision() => {
                match decision {
                    Some((instance, value)) => {
                        println!("Instance {} decided value {}", instance, value);
                    },
                    None => {
                        log::error!("Consensus engine has shut down");
                        break;
                    },
                }
            },
        }
    }
}

/// Returns false when the shell should exit.
async fn dispatch_command(line: &str, control: &ConsensusControl) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => true,
        Some("propose") => {
            let value: i64 = match parts.next().map(str::parse) {
                Some(Ok(value)) => value,
                _ => {
                    println!("Usage: propose <value>");
                    return true;
                }
            };
            if value < 0 {
                println!("Proposals must be non-negative");
                return true;
            }
            let control = control.clone();
            tokio::spawn(async move {
                match control.propose(value).await {
                    Ok(decided) => println!("Proposed {}, group decided {}", value, decided),
                    Err(e) => log::error!("Proposal failed: {}", e),
                }
            });
            true
        }
        Some("startpfd") => {
            if let Err(e) = control.start_detector().await {
                log::error!("Unable to start the failure detector: {}", e);
            }
            true
        }
        Some("quiesce") => {
            let millis: u64 = match parts.next().map(str::parse) {
                Some(Ok(millis)) => millis,
                _ => {
                    println!("Usage: quiesce <milliseconds>");
                    return true;
                }
            };
            if let Err(e) = control.arm_quiescence(Duration::from_millis(millis)).await {
                log::error!("Unable to arm the quiescence window: {}", e);
            }
            true
        }
        Some("help") => {
            print_help();
            true
        }
        Some("exit") | Some("quit") => false,
        Some(other) => {
            println!("Unknown command {:?}, try help", other);
            true
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  propose <value>   propose a non-negative value, print the group decision");
    println!("  startpfd          start the heartbeat failure detector");
    println!("  quiesce <ms>      buffer broadcast deliveries for a window");
    println!("  help              this text");
    println!("  exit              shut the process down");
}
