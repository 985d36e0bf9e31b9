use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "organizer-cli", version, about = "Organizer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Item management
    Item {
        #[command(subcommand)]
        action: commands::item::ItemAction,
    },
    /// Pull remote changes into the local store
    Pull {
        /// Re-pull a bounded window of days instead of the incremental cursor
        #[arg(long)]
        window_days: Option<i64>,
    },
    /// Drain the outbox to the remote calendar
    Push {
        /// Maximum entries to process in this batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Conflict inspection and resolution
    Conflict {
        #[command(subcommand)]
        action: commands::conflict::ConflictAction,
    },
    /// Sync status overview
    Status,
    /// Run the sync scheduler until interrupted
    Run,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Item { action } => commands::item::run(action),
        Commands::Pull { window_days } => commands::pull::run(window_days).await,
        Commands::Push { batch_size } => commands::push::run(batch_size).await,
        Commands::Conflict { action } => commands::conflict::run(action),
        Commands::Status => commands::status::run(),
        Commands::Run => commands::run::run().await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
