//! Muster CLI
//!
//! Thin wrapper around muster-core for command-line roster building.
//!
//! ## Usage
//!
//! ```bash
//! # Show engine information
//! muster info
//!
//! # Create a new force
//! muster force new "Fox Company"
//!
//! # List saved forces
//! muster force list
//!
//! # Open a saved force
//! muster force open <force_id>
//!
//! # Add a unit to the current force
//! muster unit add "Locust LCT-1V"
//!
//! # Set crew skills on a unit
//! muster unit skills <unit_id> 3 4
//!
//! # Move a unit between groups of the current force
//! muster move unit 0 1 1 0
//!
//! # Split a unit out into its own group
//! muster move split 0 1
//!
//! # Show the shareable link query for the current force
//! muster link show
//!
//! # Load a force from a link query
//! muster link open "name=Fox%20Company&units=Locust%20LCT-1V"
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use muster_core::{
    ConfirmPrompt, Confirmer, Force, ForceId, GameSystem, GroupId, LoopbackPush, MemoryStore,
    MoveReport, MusterEngine, StaticCatalog, UnitId,
};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

/// Muster - Force Roster Builder
#[derive(Parser)]
#[command(name = "muster")]
#[command(version = "0.1.0")]
#[command(about = "Muster - Force Roster Builder")]
#[command(
    long_about = "A local-first force roster builder for tabletop play: build forces, drag units across groups and rule systems, and share rosters as compact link queries."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.muster/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine information
    Info,

    /// Force management
    Force {
        #[command(subcommand)]
        action: ForceAction,
    },

    /// Unit management on the current force
    Unit {
        #[command(subcommand)]
        action: UnitAction,
    },

    /// Group management on the current force
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Reorganization moves on the current force
    Move {
        #[command(subcommand)]
        action: MoveAction,
    },

    /// Shareable link queries
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// List catalog units available for a rule system
    Catalog {
        /// Rule system (classic, alpha-strike)
        #[arg(short, long, default_value = "classic")]
        system: String,
    },
}

#[derive(Subcommand)]
enum ForceAction {
    /// Create a new force, save it, and make it current
    New {
        /// Name of the force
        name: String,
        /// Rule system (classic, alpha-strike)
        #[arg(short, long, default_value = "classic")]
        system: String,
    },
    /// List saved forces
    List,
    /// Open a saved force and make it current
    Open {
        /// Force ID (force_<ulid> or bare ULID)
        force_id: String,
    },
    /// Show a force's roster
    Show {
        /// Force ID (defaults to the current force)
        force_id: Option<String>,
    },
    /// Save the current force
    Save,
    /// Rename the current force
    Rename {
        /// New name
        name: String,
    },
    /// Close the current force without deleting it
    Close,
    /// Delete a saved force
    Delete {
        /// Force ID (force_<ulid> or bare ULID)
        force_id: String,
    },
}

#[derive(Subcommand)]
enum UnitAction {
    /// Add a catalog unit to the current force
    Add {
        /// Unit display name, e.g. "Locust LCT-1V"
        name: String,
        /// Group index to add into (defaults to the last group)
        #[arg(short, long)]
        group: Option<usize>,
    },
    /// Remove a unit
    Remove {
        /// Unit ID (unit_<ulid> or bare ULID)
        unit_id: String,
    },
    /// Set a crew member's skills
    Skills {
        /// Unit ID (unit_<ulid> or bare ULID)
        unit_id: String,
        /// Gunnery skill
        gunnery: u8,
        /// Piloting skill
        piloting: u8,
        /// Crew slot index
        #[arg(short, long, default_value = "0")]
        crew: usize,
    },
    /// Record per-unit play state (damage, heat)
    State {
        /// Unit ID (unit_<ulid> or bare ULID)
        unit_id: String,
        /// Accumulated damage
        #[arg(long, default_value = "0")]
        damage: u32,
        /// Current heat
        #[arg(long, default_value = "0")]
        heat: i32,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// Append a new empty group to the current force
    New,
    /// Rename a group, locking its name against auto-regeneration
    Rename {
        /// Group index in the current force
        group: usize,
        /// New name
        name: String,
    },
}

#[derive(Subcommand)]
enum MoveAction {
    /// Move a unit between groups of the current force
    Unit {
        /// Source group index
        from_group: usize,
        /// Unit position in the source group
        from_index: usize,
        /// Target group index
        to_group: usize,
        /// Position in the target group
        to_index: usize,
    },
    /// Pull a unit out into its own fresh group
    Split {
        /// Source group index
        from_group: usize,
        /// Unit position in the source group
        from_index: usize,
    },
    /// Reorder a whole group within the current force
    Group {
        /// Group index to move
        group: usize,
        /// Position to move it to
        to_index: usize,
    },
}

#[derive(Subcommand)]
enum LinkAction {
    /// Show the shareable link query for the current force
    Show,
    /// Load a force from a link query
    Open {
        /// Link query string (name=...&units=...)
        query: String,
        /// Rule system for decoded units (classic, alpha-strike)
        #[arg(short, long, default_value = "classic")]
        system: String,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.muster/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".muster")
        .join("data")
}

/// Parse a force ID from its prefixed or bare ULID form
fn parse_force_id(s: &str) -> Result<ForceId> {
    ForceId::from_string(s).map_err(|e| anyhow::anyhow!("Invalid force ID '{}': {}", s, e))
}

/// Parse a unit ID from its prefixed or bare ULID form
fn parse_unit_id(s: &str) -> Result<UnitId> {
    UnitId::from_string(s).map_err(|e| anyhow::anyhow!("Invalid unit ID '{}': {}", s, e))
}

/// Parse a rule system from string
fn parse_system(s: &str) -> Result<GameSystem> {
    GameSystem::from_str(s)
        .map_err(|_| anyhow::anyhow!("Invalid rule system '{}'. Must be one of: classic, alpha-strike", s))
}

/// Answer confirmation prompts from stdin
fn spawn_prompt_responder(mut prompts: mpsc::UnboundedReceiver<ConfirmPrompt>) {
    tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let mut lines = tokio::io::BufReader::new(stdin).lines();
        while let Some(prompt) = prompts.recv().await {
            println!("{}", prompt.message);
            println!("[y/N]");
            match lines.next_line().await {
                Ok(Some(line)) => {
                    prompt.answer(matches!(line.trim(), "y" | "Y" | "yes" | "Yes"));
                }
                _ => {
                    tracing::warn!("Confirmation input closed, declining");
                    prompt.decline();
                }
            }
        }
    });
}

/// The current force's index, or a hint to create one
fn current_index(engine: &MusterEngine<MemoryStore>) -> Result<usize> {
    engine.current_index().ok_or_else(|| {
        anyhow::anyhow!("No current force. Create one with 'muster force new' or open one with 'muster force open'.")
    })
}

/// Resolve a group index on a loaded force to its GroupId
fn group_id_at(
    engine: &MusterEngine<MemoryStore>,
    force_index: usize,
    group_index: usize,
) -> Result<GroupId> {
    let force = engine
        .force(force_index)
        .ok_or_else(|| anyhow::anyhow!("No loaded force at index {}", force_index))?;
    force
        .groups
        .get(group_index)
        .map(|g| g.id.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "\"{}\" has no group {} ({} groups)",
                force.name,
                group_index,
                force.groups.len()
            )
        })
}

fn print_force(force: &Force) {
    println!("Force: {} [{}]", force.name, force.system);
    match &force.instance_id {
        Some(id) => println!("  ID: {}", id),
        None => println!("  ID: (unsaved)"),
    }
    println!("  Owned: {}", if force.owned { "Yes" } else { "No" });
    println!("  Updated: {}", force.timestamp.to_rfc3339());
    println!("  Groups: {}, Units: {}", force.groups.len(), force.unit_count());

    for (gi, group) in force.groups.iter().enumerate() {
        println!();
        let lock = if group.name_locked { "" } else { " (auto)" };
        println!("  [{}] {}{}", gi, group.name, lock);
        for (ui, unit) in group.units.iter().enumerate() {
            let (gunnery, piloting) = unit.primary_skills();
            let damage = if unit.damage > 0 {
                format!(", {} damage", unit.damage)
            } else {
                String::new()
            };
            println!(
                "    [{}] {} ({}/{}{})",
                ui, unit.name, gunnery, piloting, damage
            );
            println!("        ID: {}", unit.id);
        }
    }
}

fn print_move_report(report: &MoveReport) {
    for name in &report.failed_conversions {
        println!("Could not convert: {}", name);
    }
    if report.mutated {
        println!("Move applied.");
        if report.deleted.is_some() {
            println!("The source force was emptied and deleted.");
        }
    } else {
        println!("Move was not applied.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let catalog = StaticCatalog::standard();
    let remote = MemoryStore::new();
    let push = Arc::new(LoopbackPush::new());
    let confirmer = if cli.yes {
        Confirmer::always(true)
    } else {
        let (confirmer, prompts) = Confirmer::channel();
        spawn_prompt_responder(prompts);
        confirmer
    };

    let mut engine = MusterEngine::new(
        &data_dir,
        remote.clone(),
        Arc::new(catalog.clone()),
        push,
        confirmer,
    )?;

    // The in-process remote starts from what the cache knows, so saved
    // forces survive across invocations.
    for force in engine.cache().list_forces()? {
        remote.insert(force);
    }
    engine.load_cached()?;

    match cli.command {
        Commands::Info => {
            let saved = engine.list_saved().await?;

            println!("Muster v0.1.0");
            println!();
            println!("Data directory: {}", data_dir.display());
            println!("Saved forces: {}", saved.len());
            match engine.current_force() {
                Some(force) => println!("Current force: {} [{}]", force.name, force.system),
                None => println!("Current force: (none)"),
            }
            println!();
            println!("Status: Local mode (in-process remote store)");
        }

        Commands::Force { action } => match action {
            ForceAction::New { name, system } => {
                let system = parse_system(&system)?;
                let index = engine.new_force(&name, system);
                let id = engine.save_force(index).await?;
                println!("Created force: {}", name);
                println!("  ID: {}", id);
            }

            ForceAction::List => {
                let forces = engine.list_saved().await?;
                if forces.is_empty() {
                    println!("No saved forces.");
                } else {
                    println!("Saved forces ({}):", forces.len());
                    println!();
                    for summary in forces {
                        let borrowed = if summary.owned { "" } else { " [borrowed]" };
                        let updated = summary
                            .timestamp
                            .with_timezone(&chrono::Local)
                            .format("%Y-%m-%d %H:%M");
                        println!(
                            "  {} {} [{}] {} units, updated {}{}",
                            summary.instance_id,
                            summary.name,
                            summary.system,
                            summary.unit_count,
                            updated,
                            borrowed
                        );
                    }
                }
            }

            ForceAction::Open { force_id } => {
                let id = parse_force_id(&force_id)?;
                let index = engine.load_force(&id).await?;
                if let Some(force) = engine.force(index) {
                    println!("Opened force: {}", force.name);
                    println!("  ID: {}", id);
                    println!("  Units: {}", force.unit_count());
                }
            }

            ForceAction::Show { force_id } => {
                let index = match force_id {
                    Some(raw) => {
                        let id = parse_force_id(&raw)?;
                        engine.load_force(&id).await?
                    }
                    None => current_index(&engine)?,
                };
                match engine.force(index) {
                    Some(force) => print_force(force),
                    None => anyhow::bail!("No loaded force at index {}", index),
                }
            }

            ForceAction::Save => {
                let index = current_index(&engine)?;
                let id = engine.save_force(index).await?;
                let name = engine.force(index).map(|f| f.name.clone()).unwrap_or_default();
                println!("Saved force: {}", name);
                println!("  ID: {}", id);
            }

            ForceAction::Rename { name } => {
                let index = current_index(&engine)?;
                engine.rename_force(index, &name)?;
                println!("Renamed force: {}", name);
            }

            ForceAction::Close => {
                let index = current_index(&engine)?;
                let name = engine.force(index).map(|f| f.name.clone()).unwrap_or_default();
                engine.unload_force(index)?;
                println!("Closed force: {}", name);
            }

            ForceAction::Delete { force_id } => {
                let id = parse_force_id(&force_id)?;
                let index = engine.load_force(&id).await?;
                engine.delete_force(index).await?;
                println!("Deleted force: {}", force_id);
            }
        },

        Commands::Unit { action } => match action {
            UnitAction::Add { name, group } => {
                let index = current_index(&engine)?;
                let group_id = match group {
                    Some(gi) => Some(group_id_at(&engine, index, gi)?),
                    None => None,
                };
                let unit_id = engine.add_unit(index, group_id.as_ref(), &name)?;
                println!("Added unit: {}", name);
                println!("  ID: {}", unit_id);
            }

            UnitAction::Remove { unit_id } => {
                let id = parse_unit_id(&unit_id)?;
                engine.remove_unit(&id)?;
                println!("Removed unit: {}", unit_id);
            }

            UnitAction::Skills {
                unit_id,
                gunnery,
                piloting,
                crew,
            } => {
                let id = parse_unit_id(&unit_id)?;
                engine.set_crew_skills(&id, crew, Some(gunnery), Some(piloting))?;
                println!("Set crew {} skills: gunnery {}, piloting {}", crew, gunnery, piloting);
            }

            UnitAction::State { unit_id, damage, heat } => {
                let id = parse_unit_id(&unit_id)?;
                engine.record_unit_state(&id, damage, heat)?;
                println!("Recorded unit state: {} damage, {} heat", damage, heat);
            }
        },

        Commands::Group { action } => match action {
            GroupAction::New => {
                let index = current_index(&engine)?;
                let group_id = engine.new_group(index)?;
                let name = engine
                    .force(index)
                    .and_then(|f| f.groups.last())
                    .map(|g| g.name.clone())
                    .unwrap_or_default();
                println!("Created group: {}", name);
                println!("  ID: {}", group_id);
            }

            GroupAction::Rename { group, name } => {
                let index = current_index(&engine)?;
                let group_id = group_id_at(&engine, index, group)?;
                engine.rename_group(&group_id, &name)?;
                println!("Renamed group {}: {}", group, name);
            }
        },

        Commands::Move { action } => match action {
            MoveAction::Unit {
                from_group,
                from_index,
                to_group,
                to_index,
            } => {
                let index = current_index(&engine)?;
                let source = group_id_at(&engine, index, from_group)?;
                let target = group_id_at(&engine, index, to_group)?;
                let report = engine.move_unit(&source, from_index, &target, to_index).await;
                print_move_report(&report);
            }

            MoveAction::Split { from_group, from_index } => {
                let index = current_index(&engine)?;
                let source = group_id_at(&engine, index, from_group)?;
                let report = engine
                    .move_unit_to_new_group(&source, from_index, index)
                    .await;
                print_move_report(&report);
            }

            MoveAction::Group { group, to_index } => {
                let index = current_index(&engine)?;
                let source = group_id_at(&engine, index, group)?;
                let key = match engine.force(index) {
                    Some(force) => force
                        .instance_id
                        .as_ref()
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| force.name.clone()),
                    None => anyhow::bail!("No loaded force at index {}", index),
                };
                let report = engine
                    .drop_group(
                        &format!("group-{}", source),
                        &format!("force-groups-{}", key),
                        to_index,
                    )
                    .await;
                print_move_report(&report);
            }
        },

        Commands::Link { action } => match action {
            LinkAction::Show => match engine.current_link() {
                Some(query) => {
                    println!("Shareable link query:");
                    println!();
                    println!("{}", query);
                    println!();
                    println!("Anyone can load this force with 'muster link open'.");
                }
                None => {
                    println!("Current force has nothing to share.");
                }
            },

            LinkAction::Open { query, system } => {
                let system = parse_system(&system)?;
                match engine.load_from_link(&query, system).await? {
                    Some(index) => {
                        if let Some(force) = engine.force(index) {
                            println!("Opened force: {}", force.name);
                            match &force.instance_id {
                                Some(id) => println!("  ID: {}", id),
                                None => println!("  ID: (unsaved)"),
                            }
                            println!("  Units: {}", force.unit_count());
                        }
                    }
                    None => {
                        anyhow::bail!("Link carries nothing loadable");
                    }
                }
            }
        },

        Commands::Catalog { system } => {
            let system = parse_system(&system)?;
            let units: Vec<_> = catalog.units_for(system).collect();
            println!("Catalog units [{}] ({}):", system, units.len());
            println!();
            for unit in units {
                println!("  {} ({})", unit.name, unit.catalog_id);
            }
        }
    }

    Ok(())
}
