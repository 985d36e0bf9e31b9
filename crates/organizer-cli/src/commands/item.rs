//! Item management commands.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use organizer_core::{Item, ItemKind, ItemStatus};

use super::common::open_database;

#[derive(Subcommand)]
pub enum ItemAction {
    /// Add a new item (queued for outbound sync)
    Add {
        title: String,
        /// task or meeting
        #[arg(long, default_value = "task")]
        kind: String,
        /// Scheduled time, RFC3339 (e.g. 2026-03-02T10:00:00Z)
        #[arg(long)]
        at: Option<String>,
        /// Duration in minutes
        #[arg(long)]
        duration: Option<i64>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List items
    List,
    /// Mark an item done
    Done { id: String },
    /// Cancel an item (also retracts the remote event on next push)
    Cancel { id: String },
}

pub fn run(action: ItemAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database()?;
    match action {
        ItemAction::Add {
            title,
            kind,
            at,
            duration,
            description,
        } => {
            let kind = match kind.as_str() {
                "task" => ItemKind::Task,
                "meeting" => ItemKind::Meeting,
                other => return Err(format!("unknown kind: {other} (task|meeting)").into()),
            };
            let mut item = Item::new(kind, title);
            if let Some(at) = at {
                let scheduled = DateTime::parse_from_rfc3339(&at)
                    .map_err(|e| format!("invalid --at timestamp: {e}"))?
                    .with_timezone(&Utc);
                item.scheduled_at = Some(scheduled);
            }
            item.duration_min = duration;
            item.description = description;
            db.insert_item(&item)?;
            db.mark_item_dirty(&item.id)?;
            println!("created {}", item.id);
        }
        ItemAction::List => {
            for item in db.list_items()? {
                let when = item
                    .scheduled_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "unscheduled".to_string());
                println!(
                    "{}  [{:?}/{:?}]  {}  ({})",
                    item.id, item.status, item.sync_state, item.title, when
                );
            }
        }
        ItemAction::Done { id } => {
            let mut item = db.require_item(&id)?;
            item.status = ItemStatus::Done;
            item.updated_at = Utc::now();
            db.update_item(&item)?;
            db.mark_item_dirty(&id)?;
            println!("done {id}");
        }
        ItemAction::Cancel { id } => {
            let mut item = db.require_item(&id)?;
            item.status = ItemStatus::Canceled;
            item.updated_at = Utc::now();
            db.update_item(&item)?;
            db.mark_item_dirty(&id)?;
            println!("canceled {id}");
        }
    }
    Ok(())
}
