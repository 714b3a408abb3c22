use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use log::LevelFilter;

use terrace_core::migrate::MigratorRegistry;
use terrace_core::provider::ResourceType;
use terrace_core::schema::ResourceSchema;
use terrace_provider_google::GoogleProvider;
use terrace_state::{
    BackendConfig, LocalBackend, ResourceState, StateBackend, Upgrade, create_backend,
    upgrade_backend,
};

#[derive(Parser)]
#[command(name = "terrace")]
#[command(about = "Inspect and upgrade Terrace infrastructure state", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// State management commands
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// List known resource types and their schema versions
    Schemas,
}

#[derive(Subcommand)]
enum StateCommands {
    /// Show resources in the state and their schema versions
    Show {
        #[command(flatten)]
        location: StateLocation,
    },
    /// Migrate every resource to the current schema version of its type
    Upgrade {
        #[command(flatten)]
        location: StateLocation,

        /// Report what would change without writing the state
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove a stale state lock
    ForceUnlock {
        /// ID of the lock to remove
        lock_id: String,

        #[command(flatten)]
        location: StateLocation,
    },
}

#[derive(Args)]
struct StateLocation {
    /// Path to the state file
    #[arg(long = "state", env = "TERRACE_STATE", default_value = LocalBackend::DEFAULT_STATE_FILE)]
    path: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::State { command } => run_state_command(command).await,
        Commands::Schemas => run_schemas(),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    // RUST_LOG takes precedence over the flag
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

async fn run_state_command(command: StateCommands) -> Result<(), String> {
    match command {
        StateCommands::Show { location } => run_show(&location.path).await,
        StateCommands::Upgrade { location, dry_run } => run_upgrade(&location.path, dry_run).await,
        StateCommands::ForceUnlock { lock_id, location } => {
            run_force_unlock(&location.path, &lock_id).await
        }
    }
}

/// Resource types of every provider
fn resource_types() -> Vec<Box<dyn ResourceType>> {
    let mut types = GoogleProvider::new().resource_types();
    types.extend(terrace_provider_aws::resources::resource_types());
    types.sort_by_key(|t| t.name());
    types
}

fn get_migrators() -> Result<MigratorRegistry, String> {
    let mut registry = MigratorRegistry::new();
    for resource_type in resource_types() {
        registry
            .register_resource_type(resource_type.as_ref())
            .map_err(|e| format!("Invalid migrations for {}: {}", resource_type.name(), e))?;
    }
    Ok(registry)
}

fn open_backend(path: &Path) -> Result<Box<dyn StateBackend>, String> {
    let config = BackendConfig::local(path.to_string_lossy());
    create_backend(&config).map_err(|e| e.to_string())
}

async fn run_show(path: &Path) -> Result<(), String> {
    let registry = get_migrators()?;
    let backend = open_backend(path)?;

    let Some(state) = backend.read_state().await.map_err(|e| e.to_string())? else {
        println!(
            "{}",
            format!("No state found at {}", path.display()).yellow()
        );
        return Ok(());
    };

    println!(
        "{} {} (serial {})",
        "State".cyan().bold(),
        state.lineage,
        state.serial
    );

    if state.resources.is_empty() {
        println!("{}", "No resources.".green());
        return Ok(());
    }

    let schemas: HashMap<&'static str, ResourceSchema> = resource_types()
        .iter()
        .map(|t| (t.name(), t.schema()))
        .collect();

    for resource in &state.resources {
        let mut line = format!(
            "  {} {}",
            resource.id().to_string().bold(),
            format_version_status(resource, &registry)
        );
        if let Some(summary) = summarize_attributes(resource, &schemas) {
            line.push_str(&format!(" {}", summary));
        }
        println!("{}", line);
    }

    Ok(())
}

/// Schema version of a resource and whether it is current
fn format_version_status(resource: &ResourceState, registry: &MigratorRegistry) -> String {
    let version = resource.schema_version;
    match registry.get(&resource.resource_type) {
        None => format!("v{}", version),
        Some(migrator) if version == migrator.current_version() => {
            format!("v{} {}", version, "(current)".green())
        }
        Some(migrator) if migrator.supports(version) => format!(
            "v{} {}",
            version,
            format!("(upgrade to v{})", migrator.current_version()).yellow()
        ),
        Some(migrator) => format!(
            "v{} {}",
            version,
            format!(
                "(unsupported, known versions v{}..v{})",
                migrator.oldest_version(),
                migrator.current_version()
            )
            .red()
        ),
    }
}

/// Decode attributes already at the current schema version
///
/// Older state has to be upgraded before it can be read.
fn summarize_attributes(
    resource: &ResourceState,
    schemas: &HashMap<&'static str, ResourceSchema>,
) -> Option<String> {
    let schema = schemas.get(resource.resource_type.as_str())?;
    if resource.schema_version != schema.version {
        return None;
    }
    Some(match resource.to_state(schema) {
        Ok(state) => format!("{} attribute(s)", state.attributes.len()),
        Err(e) => format!("unreadable: {}", e).red().to_string(),
    })
}

async fn run_upgrade(path: &Path, dry_run: bool) -> Result<(), String> {
    let registry = get_migrators()?;
    let backend = open_backend(path)?;

    let upgrade = upgrade_backend(backend.as_ref(), &registry, dry_run)
        .await
        .map_err(|e| e.to_string())?;

    match upgrade {
        None => println!(
            "{}",
            format!("No state found at {}", path.display()).yellow()
        ),
        Some(upgrade) => print_upgrade(&upgrade, dry_run),
    }

    Ok(())
}

fn print_upgrade(upgrade: &Upgrade, dry_run: bool) {
    if upgrade.is_noop() {
        println!(
            "{}",
            "No changes. State is at current schema versions.".green()
        );
        return;
    }

    let heading = if dry_run {
        "Resources to upgrade (dry run):"
    } else {
        "Upgraded resources:"
    };
    println!("{}", heading.cyan().bold());

    let marker = if dry_run { "~".yellow() } else { "✓".green() };
    for migrated in &upgrade.migrated {
        println!("  {} {}", marker, migrated);
    }

    if !dry_run {
        println!(
            "{}",
            format!(
                "Upgrade complete! {} resource(s) migrated, state serial {}.",
                upgrade.migrated.len(),
                upgrade.state.serial
            )
            .green()
            .bold()
        );
    }
}

async fn run_force_unlock(path: &Path, lock_id: &str) -> Result<(), String> {
    let backend = open_backend(path)?;
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("Lock {} removed.", lock_id).green());
    Ok(())
}

fn run_schemas() -> Result<(), String> {
    let registry = get_migrators()?;

    for resource_type in resource_types() {
        let schema = resource_type.schema();
        let oldest = registry
            .get(resource_type.name())
            .map(|m| m.oldest_version())
            .unwrap_or(schema.version);

        let versions = if oldest == schema.version {
            format!("v{}", schema.version)
        } else {
            format!("v{} (upgrades from v{})", schema.version, oldest)
        };
        println!("{} {}", resource_type.name().cyan().bold(), versions);

        if let Some(description) = &schema.description {
            println!("  {}", description);
        }
        println!("  attributes: {}", schema.attribute_names().join(", "));
    }

    Ok(())
}
