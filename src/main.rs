use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use sourced::catalog::{DescriptorCatalog, load_view_manifests};
use sourced::connector::{LogSink, heartbeat_descriptor, heartbeat_view};
use sourced::dashboards::{DashboardController, DeleteOutcome};
use sourced::domain::InstanceStatus;
use sourced::keys::{IdentityResolver, KeyRegistry, StaticRenameTable};
use sourced::manager::InstanceManager;
use sourced::storage::JsonlStorage;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging(level: &str) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sourced")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("sourced.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    env_logger::Builder::new()
        .parse_filters(level)
        .parse_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Build the catalog, storage and manager, then load persisted instances.
fn bootstrap(config: &Config) -> Result<DashboardController> {
    let registry = Arc::new(KeyRegistry::new());

    let mut views = vec![heartbeat_view()];
    if let Some(dir) = &config.catalog.views_dir {
        views.extend(load_view_manifests(dir).context("Failed to load view manifests")?);
    }
    let connectors = vec![heartbeat_descriptor(Arc::new(LogSink))];
    let catalog = DescriptorCatalog::build(&registry, connectors, views).context("Failed to build catalog")?;
    info!("Catalog contains {} descriptors", catalog.len());

    let renames = match &config.catalog.renames_file {
        Some(path) => StaticRenameTable::from_file(path).context("Failed to load rename table")?,
        None => StaticRenameTable::new(),
    };
    let resolver = IdentityResolver::new(Arc::clone(&registry), Arc::new(renames));

    let storage = JsonlStorage::new(&config.storage.data_dir).context("Failed to open storage")?;

    let manager = InstanceManager::new(
        Arc::new(catalog),
        Arc::new(resolver),
        Arc::new(storage),
        config.manager_config(),
    );
    let loaded = manager.load_from_storage().context("Failed to load instances")?;
    info!("Loaded {} instances", loaded);

    Ok(DashboardController::load(manager)?)
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let controller = bootstrap(config)?;
    let outcome = match cli.command.clone().unwrap_or(Commands::Run { no_start: false }) {
        Commands::Run { no_start } => handle_run(&controller, config.startup.start_all && !no_start),
        Commands::Descriptors => handle_descriptors(&controller),
        Commands::Instances => handle_instances(&controller),
        Commands::Create { key, user } => handle_create(&controller, &key, &user),
        Commands::Resolve { key } => handle_resolve(&controller, &key),
        Commands::Enable { id } => handle_enable(&controller, &id, true),
        Commands::Disable { id } => handle_enable(&controller, &id, false),
        Commands::Delete { id, force } => handle_delete(&controller, &id, force),
    };

    controller.manager().shutdown();
    outcome
}

fn handle_run(controller: &DashboardController, start_all: bool) -> Result<()> {
    let manager = controller.manager();
    if start_all {
        let failures = manager.start_all();
        for (id, e) in &failures {
            println!("{} {}: {}", "Failed:".red(), id, e);
        }
        println!(
            "{} {} instances running",
            "Started:".green(),
            manager.running_ids().len()
        );
    }

    println!("{}", "Running, press Ctrl-C to stop".cyan());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to listen for Ctrl-C")?;

    info!("Interrupted, stopping all instances");
    println!("{}", "Stopping...".yellow());
    for (id, e) in manager.stop_all() {
        warn!("Failed to stop {}: {}", id, e);
    }
    Ok(())
}

fn handle_descriptors(controller: &DashboardController) -> Result<()> {
    for descriptor in controller.manager().catalog().all() {
        let kind = if descriptor.has_implementation() {
            "connector".green()
        } else {
            "widget".blue()
        };
        println!(
            "{:<45} {:<10} {} (view {})",
            descriptor.key().key().bold(),
            kind,
            descriptor.display_name(),
            descriptor.view()
        );
        for property in descriptor.properties() {
            let default = property.default.as_deref().unwrap_or("-");
            println!("    {:<20} {:?} default={}", property.name, property.kind, default);
        }
    }
    Ok(())
}

fn handle_instances(controller: &DashboardController) -> Result<()> {
    let manager = controller.manager();
    let instances = manager.instances();
    if instances.is_empty() {
        println!("{}", "No instances configured".yellow());
        return Ok(());
    }
    for instance in instances {
        let status = match manager.status(&instance.id)? {
            InstanceStatus::Running => "running".green(),
            InstanceStatus::Failed => "failed".red(),
            InstanceStatus::Stopped => "stopped".normal(),
        };
        let enabled = if instance.enabled { "enabled" } else { "disabled" };
        println!(
            "{:<50} {:<8} {:<9} {} [{}]",
            instance.id.bold(),
            status,
            enabled,
            instance.name,
            instance.descriptor.key()
        );
    }
    Ok(())
}

fn handle_create(controller: &DashboardController, key: &str, user: &str) -> Result<()> {
    let manager = controller.manager();
    let descriptor_key = manager.resolver().resolve(key)?;
    let instance = manager.create_instance(&descriptor_key, user)?;
    println!("{} {} ({})", "Created:".green(), instance.id, instance.name);
    Ok(())
}

fn handle_resolve(controller: &DashboardController, key: &str) -> Result<()> {
    let resolution = controller.manager().resolver().resolve_detailed(key)?;
    match &resolution.renamed_from {
        Some(old) => println!("{} {} -> {}", "Renamed:".yellow(), old, resolution.key.key()),
        None => println!("{} {}", "Resolved:".green(), resolution.key.key()),
    }
    Ok(())
}

fn handle_enable(controller: &DashboardController, id: &str, enable: bool) -> Result<()> {
    let manager = controller.manager();
    if enable {
        manager.enable(id, "cli")?;
        println!("{} {}", "Enabled:".green(), id);
    } else {
        manager.disable(id, "cli")?;
        println!("{} {}", "Disabled:".yellow(), id);
    }
    Ok(())
}

fn handle_delete(controller: &DashboardController, id: &str, force: bool) -> Result<()> {
    match controller.delete_instance(id, force)? {
        DeleteOutcome::Deleted(instance) => {
            println!("{} {} ({})", "Deleted:".red(), instance.id, instance.name);
        }
        DeleteOutcome::InUse(dashboards) => {
            println!(
                "{} {} is shown on dashboards: {}",
                "In use:".yellow(),
                id,
                dashboards.join(", ")
            );
            println!("  Use --force to remove the widgets and delete anyway");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let level = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    setup_logging(level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
