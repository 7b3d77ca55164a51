// Command-line front end for the transfer session manager
//
// Starts sends or receives, prints every status change as a JSON line and
// keeps serving until all sessions settle or Ctrl-C is pressed.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use kodegen_p2p_transfer::{
    JsonSessionStore, SendOptions, SessionSnapshot, TerminalWrapper, TransferManager,
    TransferOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const STATUS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "kodegen-p2p-transfer", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Path to the transfer binary (default: search PATH for `sendme`)
    #[arg(long, global = true)]
    binary: Option<PathBuf>,

    /// Directory for archives, batch folders and logs
    #[arg(long, global = true)]
    staging_dir: Option<PathBuf>,

    /// Directory holding the persisted session lists
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Maximum number of concurrently running transfers
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// Spawn the binary directly instead of through `script`
    #[arg(long, global = true)]
    no_pty: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Share files or folders
    Send {
        /// Files or folders to share
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Always compress into one archive
        #[arg(long, conflicts_with = "no_archive")]
        archive: bool,

        /// Never archive; several paths become a batch folder
        #[arg(long)]
        no_archive: bool,
    },
    /// Download using a ticket
    Receive {
        /// Ticket printed by the sending side
        ticket: String,

        /// Directory to download into
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Resume sessions persisted by a previous run
    Restore,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let options = build_options(&cli.global)?;
    let state_dir = cli
        .global
        .state_dir
        .clone()
        .unwrap_or_else(|| options.staging_dir.join("state"));
    let store = Arc::new(JsonSessionStore::new(state_dir));
    let manager = TransferManager::new(options, store).context("failed to start manager")?;

    match cli.command {
        Command::Send {
            paths,
            archive,
            no_archive,
        } => {
            let send_options = match (archive, no_archive) {
                (true, _) => SendOptions::archive(),
                (_, true) => SendOptions::no_archive(),
                _ => SendOptions::default(),
            };
            manager.start_send(paths, send_options).await?;
        }
        Command::Receive { ticket, out } => {
            manager.start_receive(&ticket, out).await?;
        }
        Command::Restore => {
            let report = manager.restore().await?;
            if report.reshared.is_empty() && report.requeued.is_empty() {
                bail!("nothing to restore");
            }
        }
    }

    watch(&manager).await?;
    manager.flush().await;
    Ok(())
}

fn build_options(args: &GlobalArgs) -> Result<TransferOptions> {
    let mut builder = TransferOptions::builder();
    if let Some(binary) = &args.binary {
        builder = builder.binary_path(binary);
    }
    if let Some(dir) = &args.staging_dir {
        builder = builder.staging_dir(dir);
    }
    if let Some(limit) = args.max_concurrent {
        builder = builder.max_concurrent(limit);
    }
    if args.no_pty {
        builder = builder.terminal_wrapper(TerminalWrapper::None);
    }
    let options = builder.build();
    options.validate()?;
    Ok(options)
}

/// Print snapshots as they change until nothing is running
async fn watch(manager: &TransferManager) -> Result<()> {
    let mut interval = tokio::time::interval(STATUS_INTERVAL);
    let mut last: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshots = manager.status();
                let lines = snapshots
                    .iter()
                    .map(serde_json::to_string)
                    .collect::<serde_json::Result<Vec<_>>>()?;
                for line in lines.iter().filter(|l| !last.contains(l)) {
                    println!("{line}");
                }
                last = lines;

                if snapshots.iter().all(is_settled) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping transfers");
                manager.shutdown().await;
                break;
            }
        }
    }
    Ok(())
}

fn is_settled(snapshot: &SessionSnapshot) -> bool {
    snapshot.state.is_terminal() && !snapshot.has_process
}
