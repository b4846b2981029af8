use crate::{
    app::{App, EntryView},
    config::{self, AppConfig},
    deploy::DeployReport,
    library::{name_key, CollectionKind},
    logging::{self, Verbosity},
};
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "linksmith",
    version,
    about = "Hardlink overlay mod manager for Skyrim Special Edition"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalOptions {
    /// Output format for list and report commands.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// More output; repeat for trace.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use this config file instead of the one in the app data dir.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record where the game and its plugin order file live.
    Setup(SetupArgs),
    /// Show every resolved path.
    Paths,
    /// Inspect or edit the mod order.
    Mods {
        #[command(subcommand)]
        action: EntryAction,
    },
    /// Inspect or edit the plugin order.
    Plugins {
        #[command(subcommand)]
        action: EntryAction,
    },
    /// Rebuild the hardlinked game tree from the active mods.
    Deploy,
    /// Deploy, then start the game from the deployed tree.
    Run,
    /// Install archives (.zip, .7z, .rar) or folders as mods.
    Install {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct SetupArgs {
    /// Game install folder (contains SkyrimSE.exe).
    #[arg(long, value_name = "DIR")]
    game_dir: Option<PathBuf>,
    /// The game's plugins.txt.
    #[arg(long, value_name = "FILE")]
    plugin_order: Option<PathBuf>,
    /// Folder holding mods, mods.txt and the deployed game.
    #[arg(long, value_name = "DIR")]
    manager_dir: Option<PathBuf>,
    /// Deployment target, defaults to <manager-dir>/Game.
    #[arg(long, value_name = "DIR")]
    target_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum EntryAction {
    /// List entries, lowest priority first.
    List {
        /// Only show names containing this text.
        #[arg(long)]
        filter: Option<String>,
        /// Only show active entries.
        #[arg(long)]
        active: bool,
    },
    Enable {
        name: String,
    },
    Disable {
        name: String,
    },
    /// Move an entry to a priority (0 = lowest). Out-of-range values are clamped.
    Move {
        name: String,
        priority: usize,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.global.quiet, cli.global.verbose);
    let log_dir = config::base_data_dir().ok();
    let _log_guard = logging::init(verbosity, log_dir.as_deref())?;

    let mut config = match &cli.global.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load_or_create()?,
    };
    let format = cli.global.format;

    match cli.command {
        Command::Setup(args) => run_setup(&mut config, args, format),
        Command::Paths => print_paths(&config, format),
        Command::Mods { action } => {
            let mut app = App::initialize(&config)?;
            run_entry_action(&mut app, CollectionKind::Mods, action, format)
        }
        Command::Plugins { action } => {
            let mut app = App::initialize(&config)?;
            run_entry_action(&mut app, CollectionKind::Plugins, action, format)
        }
        Command::Deploy => {
            let app = App::initialize(&config)?;
            let report = app.deploy()?;
            print_report(&report, format)
        }
        Command::Run => {
            let app = App::initialize(&config)?;
            let report = app.run_game()?;
            print_report(&report, format)
        }
        Command::Install { paths } => {
            let mut app = App::initialize(&config)?;
            let mut installed = Vec::new();
            for path in paths {
                installed.push(app.install_mod(&path)?);
            }
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&installed)?),
                OutputFormat::Text => {
                    for path in installed {
                        println!("Installed {}", path.display());
                    }
                }
            }
            Ok(())
        }
    }
}

fn run_setup(config: &mut AppConfig, args: SetupArgs, format: OutputFormat) -> Result<()> {
    if let Some(dir) = args.game_dir {
        config.set_game_source_dir(dir)?;
    }
    if let Some(file) = args.plugin_order {
        config.plugin_order_file = Some(file);
    }
    if let Some(dir) = args.manager_dir {
        config.manager_dir = Some(dir);
    }
    if let Some(dir) = args.target_dir {
        config.target_dir = Some(dir);
    }
    config.save()?;
    if format == OutputFormat::Text {
        println!("Saved {}", config.path().display());
    }
    print_paths(config, format)
}

fn print_paths(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let paths = config.paths()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&paths)?),
        OutputFormat::Text => {
            println!("Game: {}", paths.game.display_name());
            println!("Config: {}", config.path().display());
            println!("Game dir: {}", paths.game_source_dir.display());
            println!("Plugin order: {}", paths.plugin_order_file.display());
            println!("Mods dir: {}", paths.mods_dir.display());
            println!("Mod order: {}", paths.mod_order_file.display());
            println!("Deploy target: {}", paths.target_dir.display());
        }
    }
    Ok(())
}

fn run_entry_action(
    app: &mut App,
    kind: CollectionKind,
    action: EntryAction,
    format: OutputFormat,
) -> Result<()> {
    match action {
        EntryAction::List { filter, active } => {
            let order = app.collection(kind);
            let needle = filter.as_deref().map(name_key);
            let items: Vec<EntryView> = EntryView::list(order)
                .into_iter()
                .filter(|item| !active || item.active)
                .filter(|item| {
                    needle
                        .as_deref()
                        .map_or(true, |needle| name_key(&item.name).contains(needle))
                })
                .collect();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
                OutputFormat::Text => {
                    if order.is_empty() {
                        println!("No {} found.", kind.label());
                    }
                    for item in items {
                        let marker = if item.active { '*' } else { ' ' };
                        println!("{:>4} {marker} {}", item.priority, item.name);
                    }
                }
            }
            Ok(())
        }
        EntryAction::Enable { name } => toggle(app, kind, &name, true, format),
        EntryAction::Disable { name } => toggle(app, kind, &name, false, format),
        EntryAction::Move { name, priority } => {
            let change = move_entry(app, kind, name, priority)?;
            print_change(&change, format)
        }
    }
}

fn move_entry(
    app: &mut App,
    kind: CollectionKind,
    name: String,
    priority: usize,
) -> Result<ChangeOutput> {
    let before = app.collection(kind).position(&name);
    let landed = app.set_priority(kind, &name, priority)?;
    Ok(ChangeOutput {
        collection: kind,
        name,
        changed: before != Some(landed),
        priority: landed,
    })
}

fn toggle(
    app: &mut App,
    kind: CollectionKind,
    name: &str,
    active: bool,
    format: OutputFormat,
) -> Result<()> {
    let changed = app.set_active(kind, name, active)?;
    let priority = app.collection(kind).position(name).unwrap_or_default();
    print_change(
        &ChangeOutput {
            collection: kind,
            name: name.to_string(),
            changed,
            priority,
        },
        format,
    )
}

#[derive(Serialize)]
struct ChangeOutput {
    collection: CollectionKind,
    name: String,
    changed: bool,
    priority: usize,
}

fn print_change(change: &ChangeOutput, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(change)?),
        OutputFormat::Text if change.changed => {
            println!("{} {} -> priority {}", change.collection.label(), change.name, change.priority)
        }
        OutputFormat::Text => println!("{} {} unchanged", change.collection.label(), change.name),
    }
    Ok(())
}

fn print_report(report: &DeployReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!("{}", report.summary());
            for warning in &report.warnings {
                println!("Warning: {warning}");
            }
        }
    }
    Ok(())
}
