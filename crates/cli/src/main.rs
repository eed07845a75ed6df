//! CLI binary to run a sequencer and a group of bank replicas in one process.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indexmap::IndexMap;
use ledger_bank::{BankMachine, BankState, RateTable};
use ledger_directory_memory::MemoryDirectory;
use ledger_replica::{Reply, ReplicaConfig, ReplicaNode};
use ledger_sequencer::{BroadcastConfig, Sequencer, SequencerConfig};
use tokio::io::AsyncBufReadExt;
use tokio_util::task::TaskTracker;
use tracing::{Level, info, warn};

type Directory = MemoryDirectory<BankState>;
type Node = ReplicaNode<BankMachine, Sequencer<BankState, Directory>, Directory>;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bank setup error
    #[error(transparent)]
    Bank(#[from] ledger_bank::Error),

    /// Reading input failed
    #[error("input error: {0}")]
    Input(#[from] std::io::Error),

    /// No replicas were given
    #[error("at least one --replica is required")]
    NoReplicas,

    /// Replica error
    #[error(transparent)]
    Replica(#[from] ledger_replica::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Replica ids to start; the first one receives unprefixed commands
    #[arg(long = "replica", required = true, env = "LEDGER_REPLICAS", value_delimiter = ',')]
    replicas: Vec<String>,

    /// Group the replicas join
    #[arg(long, default_value = "group3", env = "LEDGER_GROUP")]
    group: String,

    /// Exchange rate file with `CUR rate` lines
    #[arg(long, env = "LEDGER_RATES")]
    rates: PathBuf,

    /// Command file to run instead of reading stdin
    #[arg(long, env = "LEDGER_SCRIPT")]
    script: Option<PathBuf>,

    /// Queued operations that trigger a send; 0 sends only on `flush`
    #[arg(long, default_value_t = 1, env = "LEDGER_BATCH_SIZE")]
    batch_size: usize,

    /// Per-attempt delivery timeout in milliseconds
    #[arg(long, default_value_t = 2_000, env = "LEDGER_ATTEMPT_TIMEOUT_MS")]
    attempt_timeout_ms: u64,

    /// Overall delivery deadline in milliseconds
    #[arg(long, default_value_t = 5_000, env = "LEDGER_DELIVERY_DEADLINE_MS")]
    delivery_deadline_ms: u64,

    /// Log level
    #[arg(long, default_value_t = Level::INFO, env = "LEDGER_LOG_LEVEL")]
    log_level: Level,
}

/// Splits an input line into its target replica (if prefixed) and command.
///
/// The prefix is either `[R1]` or a bare replica id.
fn route<'a>(line: &'a str, replicas: &IndexMap<String, Node>) -> (Option<&'a str>, &'a str) {
    let line = line.trim();
    let Some((head, rest)) = line.split_once(char::is_whitespace) else {
        return (None, line);
    };

    let name = head
        .strip_prefix('[')
        .and_then(|name| name.strip_suffix(']'))
        .unwrap_or(head);

    if head != name || replicas.contains_key(name) {
        (Some(name), rest.trim_start())
    } else {
        (None, line)
    }
}

async fn handle_line(nodes: &mut IndexMap<String, Node>, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }

    let (target, command) = route(line, nodes);
    let name = match target {
        Some(name) => name.to_string(),
        None => match nodes.keys().next() {
            Some(first) => first.clone(),
            None => return,
        },
    };
    let Some(node) = nodes.get(&name) else {
        println!("[{name}] no such replica");
        return;
    };

    if command.eq_ignore_ascii_case("flush") {
        match node.flush().await {
            Ok(count) => println!("[{name}] flushed {count} operation(s)"),
            Err(error) => println!("[{name}] error: {error}"),
        }
        return;
    }

    match node.execute(command).await {
        Ok(Reply::Exited) => {
            println!("[{name}] exited");
            nodes.shift_remove(&name);
        }
        Ok(reply) => {
            for output in reply.to_string().lines() {
                println!("[{name}] {output}");
            }
        }
        Err(error) => println!("[{name}] error: {error}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    if args.replicas.is_empty() {
        return Err(Error::NoReplicas);
    }

    let machine = Arc::new(BankMachine::new(RateTable::load(&args.rates)?));
    let directory = Arc::new(Directory::new());
    let config = SequencerConfig {
        groups: vec![args.group.clone()],
        cohort_size: args.replicas.len(),
        broadcast: BroadcastConfig {
            attempt_timeout: Duration::from_millis(args.attempt_timeout_ms),
            delivery_deadline: Duration::from_millis(args.delivery_deadline_ms),
            ..BroadcastConfig::default()
        },
    };
    let sequencer = Arc::new(Sequencer::new(config, directory.clone(), machine.clone()));

    let mut nodes: IndexMap<String, Node> = args
        .replicas
        .iter()
        .map(|id| {
            let config = ReplicaConfig {
                batch_size: args.batch_size,
                ..ReplicaConfig::new(id.as_str(), args.group.as_str())
            };
            let node = ReplicaNode::new(config, machine.clone(), sequencer.clone(), directory.clone());
            (id.clone(), node)
        })
        .collect();

    futures::future::try_join_all(nodes.values().map(ReplicaNode::join)).await?;
    info!("{} replica(s) joined group {}", nodes.len(), args.group);

    let task_tracker = TaskTracker::new();
    for (name, node) in &nodes {
        if let Some(mut answers) = node.replica().take_answers() {
            let name = name.clone();
            task_tracker.spawn(async move {
                while let Some(answer) = answers.recv().await {
                    match answer.answer {
                        Ok(text) => println!("[{name}] {} {}", answer.id, text),
                        Err(error) => println!("[{name}] {} error: {}", answer.id, error),
                    }
                }
            });
        }
    }
    task_tracker.close();

    if let Some(script) = &args.script {
        let contents = tokio::fs::read_to_string(script).await?;
        for line in contents.lines() {
            handle_line(&mut nodes, line).await;
            if nodes.is_empty() {
                break;
            }
        }
    } else {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while !nodes.is_empty() {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => handle_line(&mut nodes, &line).await,
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }
    }

    for (name, node) in &nodes {
        if let Err(error) = node.exit().await {
            warn!("Replica {} did not exit cleanly: {}", name, error);
        }
    }
    task_tracker.wait().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ids: &[&str]) -> IndexMap<String, Node> {
        let machine = Arc::new(BankMachine::default());
        let directory = Arc::new(Directory::new());
        let sequencer = Arc::new(Sequencer::new(
            SequencerConfig::default(),
            directory.clone(),
            machine.clone(),
        ));

        ids.iter()
            .map(|id| {
                let node = ReplicaNode::new(
                    ReplicaConfig::new(*id, "default"),
                    machine.clone(),
                    sequencer.clone(),
                    directory.clone(),
                );
                ((*id).to_string(), node)
            })
            .collect()
    }

    #[test]
    fn test_route_prefixes() {
        let nodes = names(&["R1", "R2"]);

        assert_eq!(route("[R2] deposit USD 5", &nodes), (Some("R2"), "deposit USD 5"));
        assert_eq!(route("R2   getQuickBalance USD", &nodes), (Some("R2"), "getQuickBalance USD"));
        assert_eq!(route("deposit USD 5", &nodes), (None, "deposit USD 5"));
        assert_eq!(route("memberInfo", &nodes), (None, "memberInfo"));
        assert_eq!(route("[R9] memberInfo", &nodes), (Some("R9"), "memberInfo"));
    }
}
