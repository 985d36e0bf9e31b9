//! Conflict inspection and resolution commands.

use clap::Subcommand;

use super::common::open_database;

#[derive(Subcommand)]
pub enum ConflictAction {
    /// List open conflicts, oldest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Resolve a conflict: keep_local or accept_remote
    Resolve { id: String, choice: String },
}

pub fn run(action: ConflictAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database()?;
    match action {
        ConflictAction::List { limit } => {
            let conflicts = db.list_open_conflicts(limit)?;
            if conflicts.is_empty() {
                println!("no open conflicts");
                return Ok(());
            }
            for conflict in conflicts {
                println!(
                    "{}  item={}  {}: local={:?} remote={:?}  ({})",
                    conflict.id,
                    conflict.item_id,
                    conflict.field.as_str(),
                    conflict.local_value.as_deref().unwrap_or(""),
                    conflict.remote_value.as_deref().unwrap_or(""),
                    conflict.source.as_str(),
                );
            }
        }
        ConflictAction::Resolve { id, choice } => {
            let resolved = db.apply_conflict_choice(&id, &choice)?;
            println!(
                "resolved {} with {}",
                resolved.id,
                resolved
                    .resolution
                    .map(|r| r.as_str())
                    .unwrap_or("(unchanged)")
            );
        }
    }
    Ok(())
}
