//! # CryoSamba Core
//!
//! Core library for the CryoSamba experiment wizard.
//! Provides validated input collection, accelerator selection, the
//! experiment store, configuration document generation, the run launcher and
//! the menu navigator that ties them together.

pub mod accelerator;
pub mod config;
pub mod documents;
pub mod error;
pub mod generator;
pub mod input;
pub mod launcher;
pub mod navigator;
pub mod store;
pub mod terminal;

// Re-export commonly used types at the crate root.
pub use accelerator::{
    AcceleratorSet, CommandDeviceReporter, DeviceReporter, DeviceSelection, FINISH_TOKEN,
};
pub use config::{ConfigOverrides, WizardConfig, load_config};
pub use documents::{InferenceConfig, Parameters, TrainingConfig};
pub use error::{ConfigError, Result, ValidationError, WizardError};
pub use generator::{CollectedInputs, collect_inputs, generate};
pub use input::{FloatRule, InputCollector, IntRule};
pub use launcher::{LaunchPlan, ProcessRunner, RunLauncher, RunMode, RunOutcome, SystemProcessRunner};
pub use navigator::{Menu, Navigator, Screen, Services};
pub use store::{EXIT_TOKEN, ExperimentLayout, ExperimentStore};
pub use terminal::{ScriptedTerminal, Terminal, Tone};
