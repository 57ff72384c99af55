//! Accelerator discovery and interactive selection.
//!
//! Devices are discovered by running a reporting tool (`nvidia-smi` by
//! default) and reading the first column of its CSV report. The operator then
//! moves devices one at a time from the available set to the selected set.

use std::fmt;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::DevicesConfig;
use crate::error::{Result, WizardError};
use crate::terminal::Terminal;

/// Token that ends interactive selection.
pub const FINISH_TOKEN: &str = "F";

/// Source of accelerator identifiers.
#[async_trait]
pub trait DeviceReporter: Send + Sync {
    /// Device identifiers in report order. Failures yield an empty list.
    async fn query_available(&self) -> Vec<String>;

    /// Human-readable report, if the tool can produce one.
    async fn detailed_report(&self) -> Option<String>;
}

/// Runs the configured reporting tool as a subprocess.
pub struct CommandDeviceReporter {
    program: String,
    query_args: Vec<String>,
}

impl CommandDeviceReporter {
    pub fn new(config: &DevicesConfig) -> Self {
        Self {
            program: config.program.clone(),
            query_args: config.query_args.clone(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(program = %self.program, ?args, "Querying devices");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| WizardError::ExternalProcess {
                program: self.program.clone(),
                message: format!("failed to spawn: {e}"),
            })?;
        if !output.status.success() {
            return Err(WizardError::ExternalProcess {
                program: self.program.clone(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DeviceReporter for CommandDeviceReporter {
    async fn query_available(&self) -> Vec<String> {
        match self.run(&self.query_args).await {
            Ok(stdout) => parse_device_report(&stdout),
            Err(e) => {
                warn!(error = %e, "Device query failed, treating as no devices");
                Vec::new()
            }
        }
    }

    async fn detailed_report(&self) -> Option<String> {
        match self.run(&[]).await {
            Ok(stdout) => Some(stdout),
            Err(e) => {
                warn!(error = %e, "Detailed device report unavailable");
                None
            }
        }
    }
}

/// Parse the CSV report: skip the header row and blank lines, keep the first column.
pub fn parse_device_report(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split(',').next())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Why a device could not be added to the selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectRejection {
    #[error("Device {0} is already selected")]
    AlreadySelected(String),

    #[error("Device {0} is not available")]
    Unknown(String),
}

/// The reported devices, split into available and selected.
///
/// The two lists are disjoint and together hold every reported device.
/// `selected` keeps the order in which devices were chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceleratorSet {
    available: Vec<String>,
    selected: Vec<String>,
}

impl AcceleratorSet {
    /// Start with everything available. Duplicate identifiers are dropped.
    pub fn new(universe: impl IntoIterator<Item = String>) -> Self {
        let mut available: Vec<String> = Vec::new();
        for id in universe {
            if !available.contains(&id) {
                available.push(id);
            }
        }
        Self {
            available,
            selected: Vec::new(),
        }
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn select(&mut self, id: &str) -> std::result::Result<(), SelectRejection> {
        if self.selected.iter().any(|s| s == id) {
            return Err(SelectRejection::AlreadySelected(id.to_string()));
        }
        let pos = self
            .available
            .iter()
            .position(|a| a == id)
            .ok_or_else(|| SelectRejection::Unknown(id.to_string()))?;
        let id = self.available.remove(pos);
        self.selected.push(id);
        Ok(())
    }

    /// Close the selection. Nothing selected is [`WizardError::NoSelection`].
    pub fn finish(self) -> Result<DeviceSelection> {
        if self.selected.is_empty() {
            Err(WizardError::NoSelection)
        } else {
            Ok(DeviceSelection(self.selected))
        }
    }
}

/// A non-empty, ordered, duplicate-free list of chosen devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelection(Vec<String>);

impl DeviceSelection {
    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-joined identifiers in selection order, e.g. `0,1`.
    pub fn visible_devices(&self) -> String {
        self.0.join(",")
    }
}

impl TryFrom<Vec<String>> for DeviceSelection {
    type Error = WizardError;

    fn try_from(ids: Vec<String>) -> Result<Self> {
        let mut set = AcceleratorSet::new(ids.clone());
        for id in &ids {
            // duplicates are rejected the same way interactive selection rejects them
            let _ = set.select(id);
        }
        set.finish()
    }
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Prompt for devices one at a time until the finish token.
pub fn interactive_select(term: &mut dyn Terminal, available: Vec<String>) -> Result<DeviceSelection> {
    let mut set = AcceleratorSet::new(available);
    if set.available().is_empty() {
        term.error("No GPUs were reported on this machine.");
        return Err(WizardError::NoSelection);
    }

    loop {
        term.say("");
        term.say(&format!(
            "You have these GPUs left available now: [{}] and have currently selected these GPUs: [{}]",
            set.available().join(", "),
            set.selected().join(", ")
        ));
        let answer = term.input(
            &format!("Add a GPU number: (or Enter {FINISH_TOKEN} to finish selection)"),
            None,
        )?;
        let answer = answer.trim();
        if answer == FINISH_TOKEN {
            break;
        }
        if let Err(rejection) = set.select(answer) {
            debug!(%rejection, "Device choice rejected");
            term.error("Invalid choice!");
        }
    }

    term.say("");
    match set.finish() {
        Ok(selection) => {
            term.say(&format!("You have selected the following GPUs: {selection}"));
            Ok(selection)
        }
        Err(e) => {
            term.error("You didn't select any GPUs");
            Err(e)
        }
    }
}

/// Full selection screen: hardware note, optional detailed report, then selection.
pub async fn select_devices(
    term: &mut dyn Terminal,
    reporter: &dyn DeviceReporter,
) -> Result<DeviceSelection> {
    term.header("GPU Selection");
    term.warn(
        "Please note that you need a nvidia GPU to run CryoSamba. If you cannot see GPU information, your machine may not support CryoSamba.",
    );

    if term.confirm("Do you want to see detailed GPU information?", false)? {
        match reporter.detailed_report().await {
            Some(report) => {
                term.say("");
                for line in report.lines() {
                    term.say(line);
                }
            }
            None => term.error("GPU information is not available."),
        }
    }

    let available = reporter.query_available().await;
    interactive_select(term, available)
}
