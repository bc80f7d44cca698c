//! `logbook`: maintenance utility for a Logbook store.
//!
//! # Usage
//!
//! ```
//! logbook consistency
//! logbook rename-topic --id 4 --name "Garden"
//! logbook backlinks --kind topic --id 4
//! logbook --config ~/.config/logbook/logbook.toml show --kind entry --id 12
//! ```

mod settings;

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use logbook_core::{
  actions::Actions,
  cascade::CascadeReport,
  entity::{EntityId, EntityKind, EntityRef},
  store::LogStore,
};
use logbook_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "logbook", author, version, about = "Logbook store maintenance")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "logbook.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Relabel every mention and resynchronise every edge set.
  Consistency,

  /// Rename a topic and propagate the new name to every mention of it.
  RenameTopic {
    #[arg(long)]
    id:   EntityId,
    #[arg(long)]
    name: String,
  },

  /// List the entities whose documents mention an entity.
  Backlinks {
    #[arg(long, default_value = "topic")]
    kind: EntityKind,
    #[arg(long)]
    id:   EntityId,
  },

  /// Print an entity as JSON.
  Show {
    #[arg(long)]
    kind: EntityKind,
    #[arg(long)]
    id:   EntityId,
  },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;
  let store_path = settings.store_path();

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let actions = Actions::new(store);

  match cli.command {
    Command::Consistency => consistency(&actions).await,
    Command::RenameTopic { id, name } => rename_topic(&actions, id, name).await,
    Command::Backlinks { kind, id } => backlinks(&actions, EntityRef::new(kind, id)).await,
    Command::Show { kind, id } => show(&actions, EntityRef::new(kind, id)).await,
  }
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn consistency(actions: &Actions<SqliteStore>) -> anyhow::Result<()> {
  let report = actions
    .consistency_check()
    .await
    .context("consistency check failed")?;

  println!(
    "checked {}, repaired {}, failed {}",
    report.checked,
    report.repaired.len(),
    report.failures.len()
  );
  for entity in &report.repaired {
    println!("  repaired {entity}");
  }
  for failure in &report.failures {
    println!("  failed   {}: {}", failure.entity, failure.error);
  }

  if !report.failures.is_empty() {
    bail!("{} entities could not be checked", report.failures.len());
  }
  Ok(())
}

async fn rename_topic(
  actions: &Actions<SqliteStore>,
  id: EntityId,
  name: String,
) -> anyhow::Result<()> {
  let topic = actions
    .store()
    .load(EntityRef::topic(id))
    .await
    .context("failed to load topic")?
    .and_then(|e| e.into_topic())
    .with_context(|| format!("no topic with id {id}"))?;

  let mut renamed = topic;
  renamed.name = name;
  let upserted = actions
    .upsert_topic(renamed)
    .await
    .context("failed to save topic")?;

  match upserted.cascade {
    Some(report) => print_cascade(&report),
    None => println!("name unchanged; nothing to propagate"),
  }
  Ok(())
}

fn print_cascade(report: &CascadeReport) {
  println!(
    "renamed {} to {:?}: {} updated, {} unchanged, {} failed",
    report.renamed.entity,
    report.renamed.label,
    report.updated.len(),
    report.unchanged.len(),
    report.failures.len()
  );
  for failure in &report.failures {
    println!("  failed {}: {}", failure.entity, failure.error);
  }
}

async fn backlinks(actions: &Actions<SqliteStore>, target: EntityRef) -> anyhow::Result<()> {
  for kind in EntityKind::ALL {
    let ids = actions
      .store()
      .backlinks(target, kind)
      .await
      .with_context(|| format!("failed to list {kind} backlinks of {target}"))?;
    for id in ids {
      println!("{}", EntityRef::new(kind, id));
    }
  }
  Ok(())
}

async fn show(actions: &Actions<SqliteStore>, entity: EntityRef) -> anyhow::Result<()> {
  let Some(found) = actions
    .store()
    .load(entity)
    .await
    .with_context(|| format!("failed to load {entity}"))?
  else {
    bail!("{entity} not found");
  };
  println!("{}", serde_json::to_string_pretty(&found)?);
  Ok(())
}
