mod replay;

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comments_core::{load_options, CommentViewModel, CommentsContext, EventKind, OfflineGateway};
use shared::{domain::SortKey, protocol::CommentPayload};

use crate::replay::EchoGateway;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "comments.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the top-level order of a JSON thread.
    Sort {
        file: PathBuf,
        #[arg(long)]
        by: Option<SortKey>,
    },
    /// Apply a JSON-lines mutation script to a thread and print every event.
    Replay {
        file: PathBuf,
        script: PathBuf,
        /// Make the server refuse every mutation, optionally with this error body.
        #[arg(long, value_name = "BODY", num_args = 0..=1, default_missing_value = "simulated failure")]
        fail: Option<String>,
    },
}

fn read_thread(path: &PathBuf) -> Result<Vec<CommentPayload>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read thread '{}'", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("'{}' is not a JSON array of comments", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let options = load_options(&cli.config)?;

    match cli.command {
        Command::Sort { file, by } => {
            let key = by.unwrap_or(options.default_sort);
            let context = CommentsContext::new(options)?;
            let vm = CommentViewModel::new(context, Arc::new(OfflineGateway));
            vm.load(&read_thread(&file)?)?;

            for comment in vm.sorted_top_level(key) {
                println!(
                    "{}\t{}\treplies={}\tupvotes={}\t{}",
                    comment.id,
                    comment.created_at.to_rfc3339(),
                    comment.reply_count(),
                    comment.upvote_count,
                    comment.content
                );
            }
        }
        Command::Replay { file, script, fail } => {
            let steps = replay::parse_script(
                &fs::read_to_string(&script)
                    .with_context(|| format!("failed to read script '{}'", script.display()))?,
            )?;
            let context = CommentsContext::new(options)?;
            let mut gateway = EchoGateway::new(context.mapping().id.clone());
            if let Some(body) = fail {
                gateway = gateway.failing(body);
            }
            let vm = CommentViewModel::new(context, Arc::new(gateway));
            vm.load(&read_thread(&file)?)?;

            for kind in [
                EventKind::CommentAdded,
                EventKind::CommentUpdated,
                EventKind::CommentDeleted,
                EventKind::ActionBarRefresh,
            ] {
                let _ = vm.subscribe(kind, |event| println!("{}", replay::describe(event)));
            }
            for step in steps {
                replay::run_step(&vm, step).await?;
            }
            println!("{} comments", vm.len());
        }
    }

    Ok(())
}
