//! Subcommand handlers.

use std::path::{Path, PathBuf};

use cryosamba_core::accelerator::{CommandDeviceReporter, DeviceReporter};
use cryosamba_core::config::{self, ConfigOverrides, WizardConfig};
use cryosamba_core::error::WizardError;
use cryosamba_core::launcher::{RunLauncher, SystemProcessRunner};
use cryosamba_core::navigator::{FAREWELL, Navigator, Screen, Services};
use cryosamba_core::store::ExperimentStore;
use tracing::info;

use crate::terminal::DialoguerTerminal;
use crate::{Commands, ConfigAction};

/// Resolved workspace plus command-line overrides.
pub struct Context {
    workspace: PathBuf,
    overrides: ConfigOverrides,
}

impl Context {
    pub fn new(workspace: PathBuf, runs_dir: Option<PathBuf>) -> Self {
        Self {
            workspace,
            overrides: ConfigOverrides { runs_dir },
        }
    }

    fn load_config(&self) -> anyhow::Result<WizardConfig> {
        config::load_config(Some(&self.workspace), Some(&self.overrides))
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    fn open_store(&self, config: &WizardConfig) -> anyhow::Result<ExperimentStore> {
        let root = config.resolve_runs_dir(&self.workspace);
        Ok(ExperimentStore::open(root)?)
    }

    fn services(&self, config: &WizardConfig) -> anyhow::Result<Services> {
        Ok(Services {
            store: self.open_store(config)?,
            reporter: Box::new(CommandDeviceReporter::new(&config.devices)),
            runner: Box::new(SystemProcessRunner),
            launcher: RunLauncher::new(
                &config.launcher,
                config.resolve_scripts_dir(&self.workspace),
            )
            .with_working_dir(self.workspace.clone()),
        })
    }
}

pub async fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::New { name } => new_experiment(&name, ctx),
        Commands::List => list_experiments(ctx),
        Commands::Devices => show_devices(ctx).await,
        Commands::Config { action } => handle_config(action, &ctx.workspace),
    }
}

/// The interactive menu.
pub async fn run_menu(ctx: &Context) -> anyhow::Result<()> {
    if !config::config_exists(Some(&ctx.workspace)) {
        info!("No settings file found, using built-in defaults");
    }
    let config = ctx.load_config()?;
    let services = ctx.services(&config)?;
    info!(workspace = %ctx.workspace.display(), "Starting wizard");

    let mut term = DialoguerTerminal::new();
    let mut navigator = Navigator::new(&mut term, services, config.ui.clone(), &ctx.workspace);
    navigator.run(Screen::MainMenu).await?;
    Ok(())
}

fn new_experiment(name: &str, ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let services = ctx.services(&config)?;
    services.store.ensure_available(name)?;

    let mut term = DialoguerTerminal::new();
    let mut navigator = Navigator::new(&mut term, services, config.ui.clone(), &ctx.workspace);
    match navigator.create_experiment(name) {
        Ok(layout) => {
            println!("Experiment stored at: {}", layout.dir().display());
            Ok(())
        }
        Err(WizardError::Interrupted) => {
            println!();
            println!("{FAREWELL}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn list_experiments(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let store = ctx.open_store(&config)?;
    let names = store.list()?;

    println!("Your experiments are stored at: {}", store.root().display());
    if names.is_empty() {
        println!("No experiments yet. Run `cryosamba new <name>` to create one.");
    } else {
        println!("Experiments ({}):", names.len());
        for name in &names {
            println!("  {}", name);
        }
    }
    Ok(())
}

async fn show_devices(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let reporter = CommandDeviceReporter::new(&config.devices);

    match reporter.detailed_report().await {
        Some(report) => println!("{}", report.trim_end()),
        None => println!("GPU information is not available ({} failed).", config.devices.program),
    }

    let available = reporter.query_available().await;
    if available.is_empty() {
        println!("No GPUs available.");
    } else {
        println!("Available GPUs: [{}]", available.join(", "));
    }
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = config::workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = config::write_default_config(workspace)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = config::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
