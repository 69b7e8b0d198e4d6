//! agora daemon — runs the node or issues single commands against its state.

mod commands;

use std::path::PathBuf;

use agora_governance::Choice;
use agora_node::{init_logging, AgoraNode, NodeConfig};
use agora_types::{CallerId, ExamId, ProposalId, Topic};
use anyhow::Context;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "agora", about = "Proposal voting, exam records and topic counters")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "AGORA_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the proposal and exam snapshots.
    #[arg(long, env = "AGORA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "AGORA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "AGORA_LOG_FORMAT")]
    log_format: Option<String>,

    /// Identity of the node's counter publisher.
    #[arg(long, env = "AGORA_PUBLISHER_ID")]
    publisher_id: Option<String>,

    /// Keep state in memory only.
    #[arg(long, env = "AGORA_NO_PERSIST")]
    no_persist: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the node and wait for SIGINT/SIGTERM.
    Run,
    /// Create, inspect and vote on proposals.
    Proposal {
        #[command(subcommand)]
        action: ProposalAction,
    },
    /// Exam records.
    Exam {
        #[command(subcommand)]
        action: ExamAction,
    },
    /// Per-exam participation values.
    Participation {
        #[command(subcommand)]
        action: ParticipationAction,
    },
    /// Topic counters.
    Counter {
        #[command(subcommand)]
        action: CounterAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ProposalAction {
    /// Create a proposal under the next free id.
    Create {
        #[arg(long)]
        caller: CallerId,
        #[arg(long)]
        description: String,
        /// Store the proposal already closed.
        #[arg(long)]
        inactive: bool,
    },
    /// Store a proposal under a chosen id, replacing any existing one.
    Put {
        #[arg(long)]
        caller: CallerId,
        #[arg(long)]
        id: ProposalId,
        #[arg(long)]
        description: String,
        #[arg(long)]
        inactive: bool,
    },
    Show {
        #[arg(long)]
        id: ProposalId,
    },
    List {
        /// Only open proposals.
        #[arg(long)]
        active: bool,
    },
    /// Replace the description of an open proposal you own.
    Edit {
        #[arg(long)]
        caller: CallerId,
        #[arg(long)]
        id: ProposalId,
        #[arg(long)]
        description: String,
        /// Close the proposal as part of the edit.
        #[arg(long)]
        inactive: bool,
    },
    Vote {
        #[arg(long)]
        caller: CallerId,
        #[arg(long)]
        id: ProposalId,
        /// approve, reject or pass.
        #[arg(long)]
        choice: Choice,
    },
    /// Close a proposal you own.
    End {
        #[arg(long)]
        caller: CallerId,
        #[arg(long)]
        id: ProposalId,
    },
    Tally {
        #[arg(long)]
        id: ProposalId,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ExamAction {
    Insert {
        #[arg(long)]
        id: ExamId,
        #[arg(long)]
        out_of: u32,
        #[arg(long)]
        course: String,
        #[arg(long, default_value_t = 0)]
        curve: u32,
    },
    Show {
        #[arg(long)]
        id: ExamId,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ParticipationAction {
    Set {
        #[arg(long)]
        id: ExamId,
        #[arg(long)]
        value: u64,
    },
    Show {
        #[arg(long)]
        id: ExamId,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CounterAction {
    /// Run a publisher and N subscribers in-process and print the counts
    /// they converge to.
    Demo {
        #[arg(long)]
        topic: Topic,
        /// Value reported to the publisher before any increments.
        #[arg(long)]
        value: Option<u64>,
        #[arg(long, default_value_t = 3)]
        subscribers: usize,
        /// Increments of the configured step applied after the report.
        #[arg(long, default_value_t = 0)]
        increments: u32,
    },
}

/// Start from the config file (or defaults) and apply flag/env overrides.
fn build_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    if let Some(publisher_id) = &cli.publisher_id {
        config.publisher_id = publisher_id.clone();
    }
    if cli.no_persist {
        config.persist_snapshots = false;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    init_logging(
        config.log_format().map_err(anyhow::Error::msg)?,
        &config.log_level,
    );
    if let Some(path) = &cli.config {
        tracing::info!("loaded config from {}", path.display());
    }

    let node = AgoraNode::new(config).await?;

    let output = match cli.command {
        Command::Run => {
            node.start().await?;
            tracing::info!("shutdown signal received, stopping node");
            node.stop().await?;
            tracing::info!("agora daemon exited cleanly");
            return Ok(());
        }
        Command::Proposal { action } => commands::proposal(&node, action).await,
        Command::Exam { action } => commands::exam(&node, action).await,
        Command::Participation { action } => commands::participation(&node, action).await,
        Command::Counter { action } => commands::counter(&node, action).await,
    };

    // Commands that changed nothing still snapshot; the files are small.
    node.stop().await?;
    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("agora").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_vote() {
        let cli = parse(&["proposal", "vote", "--caller", "bob", "--id", "3", "--choice", "Approve"]);
        match cli.command {
            Command::Proposal {
                action: ProposalAction::Vote { caller, id, choice },
            } => {
                assert_eq!(caller.as_str(), "bob");
                assert_eq!(id.get(), 3);
                assert_eq!(choice, Choice::Approve);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_arguments() {
        let cases: [&[&str]; 4] = [
            &["proposal", "vote", "--caller", "bob", "--id", "3", "--choice", "maybe"],
            &["proposal", "show", "--id", "-1"],
            &["proposal", "end", "--caller", "", "--id", "1"],
            &["counter", "demo", "--topic", "two words"],
        ];
        for args in cases {
            let argv = std::iter::once("agora").chain(args.iter().copied());
            assert!(Cli::try_parse_from(argv).is_err(), "{args:?}");
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agora.toml");
        std::fs::write(&path, "log_level = \"debug\"\nmailbox_capacity = 8\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let cli = parse(&["--config", &path, "--log-level", "warn", "--no-persist", "run"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.mailbox_capacity, 8);
        assert!(!config.persist_snapshots);
    }

    #[test]
    fn invalid_override_is_an_error() {
        let cli = parse(&["--log-format", "xml", "run"]);
        assert!(build_config(&cli).is_err());
    }
}
