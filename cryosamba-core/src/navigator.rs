//! Menu navigation.
//!
//! The wizard is a loop over [`Screen`]s. Each screen runs to completion and
//! returns the next one; menu choices go through [`transition`], a pure table
//! from (menu, token) to the next screen. No screen calls another.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::accelerator::{DeviceReporter, select_devices};
use crate::config::UiConfig;
use crate::error::{Result, WizardError};
use crate::generator::{collect_inputs, generate};
use crate::input::InputCollector;
use crate::launcher::{ProcessRunner, RunLauncher, RunMode, launch};
use crate::store::{DeleteOutcome, EXIT_TOKEN, ExperimentLayout, ExperimentStore};
use crate::terminal::{Terminal, Tone};

const BANNER: [&str; 6] = [
    " ██████╗██████╗ ██╗   ██╗ ██████╗ ███████╗ █████╗ ███╗   ███╗██████╗  █████╗",
    "██╔════╝██╔══██╗╚██╗ ██╔╝██╔═══██╗██╔════╝██╔══██╗████╗ ████║██╔══██╗██╔══██╗",
    "██║     ██████╔╝ ╚████╔╝ ██║   ██║███████╗███████║██╔████╔██║██████╔╝███████║",
    "██║     ██╔══██╗  ╚██╔╝  ██║   ██║╚════██║██╔══██║██║╚██╔╝██║██╔══██╗██╔══██║",
    "╚██████╗██║  ██║   ██║   ╚██████╔╝███████║██║  ██║██║ ╚═╝ ██║██████╔╝██║  ██║",
    " ╚═════╝╚═╝  ╚═╝   ╚═╝    ╚═════╝ ╚══════╝╚═╝  ╚═╝╚═╝     ╚═╝╚═════╝ ╚═╝  ╚═╝",
];

pub const FAREWELL: &str = "Thank you for using CryoSamba. Goodbye!";

/// Screens that offer a numbered menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    Main,
    ExperimentManager,
}

impl Menu {
    fn return_question(self) -> &'static str {
        match self {
            Self::Main => "Return to main menu?",
            Self::ExperimentManager => "Return to experiment manager?",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    MainMenu,
    ExperimentManager,
    CreateExperiment,
    DeleteExperiment,
    Run(RunMode),
    /// Ask whether to go back to the given menu; "no" exits.
    ReturnPrompt(Menu),
    Exit,
}

impl From<Menu> for Screen {
    fn from(menu: Menu) -> Self {
        match menu {
            Menu::Main => Screen::MainMenu,
            Menu::ExperimentManager => Screen::ExperimentManager,
        }
    }
}

/// Result of a menu choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Go(Screen),
    /// Unknown token; stay on the menu.
    Invalid,
    /// Delete was chosen with nothing to delete; stay on the menu.
    NothingToDelete,
}

pub fn transition(menu: Menu, token: &str, has_experiments: bool) -> Transition {
    match (menu, token.trim()) {
        (Menu::Main, "1") => Transition::Go(Screen::ExperimentManager),
        (Menu::Main, "2") => Transition::Go(Screen::Run(RunMode::Training)),
        (Menu::Main, "3") => Transition::Go(Screen::Run(RunMode::Inference)),
        (Menu::Main, "4") => Transition::Go(Screen::Exit),
        (Menu::ExperimentManager, "1") => Transition::Go(Screen::CreateExperiment),
        (Menu::ExperimentManager, "2") if has_experiments => {
            Transition::Go(Screen::DeleteExperiment)
        }
        (Menu::ExperimentManager, "2") => Transition::NothingToDelete,
        (Menu::ExperimentManager, "3") => Transition::Go(Screen::MainMenu),
        _ => Transition::Invalid,
    }
}

/// Where a return prompt leads.
pub fn after_return_prompt(parent: Menu, go_back: bool) -> Screen {
    if go_back { parent.into() } else { Screen::Exit }
}

/// Collaborators the navigator drives.
pub struct Services {
    pub store: ExperimentStore,
    pub reporter: Box<dyn DeviceReporter>,
    pub runner: Box<dyn ProcessRunner>,
    pub launcher: RunLauncher,
}

/// The interactive wizard.
pub struct Navigator<'t> {
    term: &'t mut dyn Terminal,
    services: Services,
    ui: UiConfig,
    /// Relative data paths are checked against this directory.
    data_base: PathBuf,
}

impl<'t> Navigator<'t> {
    pub fn new(
        term: &'t mut dyn Terminal,
        services: Services,
        ui: UiConfig,
        data_base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            term,
            services,
            ui,
            data_base: data_base.into(),
        }
    }

    pub fn store(&self) -> &ExperimentStore {
        &self.services.store
    }

    /// Drive the wizard from `start` until it exits.
    pub async fn run(&mut self, start: Screen) -> Result<()> {
        let mut screen = start;
        self.clear();
        loop {
            debug!(?screen, "Entering screen");
            let next = match self.step(screen).await {
                Ok(next) => next,
                Err(WizardError::Interrupted) => {
                    info!(?screen, "Prompt interrupted, exiting");
                    self.term.say("");
                    Screen::Exit
                }
                Err(e) => return Err(e),
            };
            match next {
                Screen::Exit => {
                    self.term.print(Tone::Emphasis, FAREWELL);
                    return Ok(());
                }
                Screen::ReturnPrompt(_) => {}
                _ => self.clear(),
            }
            screen = next;
        }
    }

    async fn step(&mut self, screen: Screen) -> Result<Screen> {
        match screen {
            Screen::MainMenu => self.main_menu(),
            Screen::ExperimentManager => self.experiment_manager(),
            Screen::CreateExperiment => self.create_screen(),
            Screen::DeleteExperiment => self.delete_screen(),
            Screen::Run(mode) => self.run_screen(mode).await,
            Screen::ReturnPrompt(parent) => {
                let go_back = self.term.confirm(parent.return_question(), true)?;
                Ok(after_return_prompt(parent, go_back))
            }
            Screen::Exit => Ok(Screen::Exit),
        }
    }

    fn clear(&mut self) {
        if self.ui.clear_screen {
            self.term.clear();
        }
    }

    fn has_experiments(&self) -> Result<bool> {
        Ok(!self.services.store.list()?.is_empty())
    }

    fn show_listing(&mut self) -> Result<bool> {
        let names = self.services.store.list()?;
        let any = !names.is_empty();
        self.term.say(&format!(
            "Your experiments are stored at {}",
            self.services.store.root().display()
        ));
        if !any {
            self.term.say("You have no existing experiments.");
        } else {
            let joined = names.into_iter().collect::<Vec<_>>().join(", ");
            self.term
                .say(&format!("You have the following experiments: [{joined}]"));
        }
        Ok(any)
    }

    fn banner(&mut self) {
        self.term.say("");
        for line in BANNER {
            self.term.print(Tone::Success, line);
        }
        self.term.say("");
        self.term.print(
            Tone::Emphasis,
            &format!("Welcome to CryoSamba v{}", env!("CARGO_PKG_VERSION")),
        );
        self.term
            .say("by Kirchhausen Lab (https://kirchhausen.hms.harvard.edu/)");
        self.term.say("");
        self.term.say(
            "Please read the instructions carefully. If you experience any issues reach out to",
        );
        self.term.say("Jose Costa-Filho @ joseinacio@tklab.hms.harvard.edu");
        self.term.say("Arkash Jain @ arkash@tklab.hms.harvard.edu");
        self.term.say("We appreciate all feedback!");
    }

    fn choose(&mut self, menu: Menu, prompt: &str, invalid: &str) -> Result<Screen> {
        loop {
            let token = self.term.input(prompt, None)?;
            let has_experiments = self.has_experiments()?;
            match transition(menu, &token, has_experiments) {
                Transition::Go(next) => return Ok(next),
                Transition::Invalid => self.term.error(invalid),
                Transition::NothingToDelete => {
                    self.term.say("You have no existing experiments to delete.")
                }
            }
        }
    }

    fn main_menu(&mut self) -> Result<Screen> {
        if self.ui.show_banner {
            self.banner();
        }
        self.term.header("MAIN MENU");

        let first = if self.has_experiments()? {
            "|1| Manage experiments"
        } else {
            "|1| Manage experiments (start here!)"
        };
        for option in [first, "|2| Run training", "|3| Run inference", "|4| Exit"] {
            self.term.print(Tone::Emphasis, option);
        }
        self.term.say("");

        self.choose(
            Menu::Main,
            "Choose an option [1/2/3/4]",
            "Invalid option. Please choose either 1, 2, 3 or 4.",
        )
    }

    fn experiment_manager(&mut self) -> Result<Screen> {
        self.term.header("Experiment Manager");
        self.show_listing()?;
        self.term.say("");
        for option in [
            "|1| Create a new experiment",
            "|2| Delete an experiment",
            "|3| Return to Main Menu",
        ] {
            self.term.print(Tone::Emphasis, option);
        }
        self.term.say("");

        self.choose(
            Menu::ExperimentManager,
            "Choose an option [1/2/3]",
            "Invalid option. Please choose either 1, 2 or 3.",
        )
    }

    fn create_screen(&mut self) -> Result<Screen> {
        self.term.header("New Experiment Setup");
        loop {
            let name = self
                .term
                .input("Please enter the new experiment name (or enter E to Exit)", None)?;
            if name.trim() == EXIT_TOKEN {
                break;
            }
            match self.services.store.ensure_available(&name) {
                Ok(()) => {
                    self.create_experiment(&name)?;
                    break;
                }
                Err(WizardError::AlreadyExists { .. }) => self.term.error(&format!(
                    "Experiment {name} already exists. Please choose a new name."
                )),
                Err(WizardError::Validation(rejection)) => self.term.error(&rejection.to_string()),
                Err(e) => return Err(e),
            }
        }
        Ok(Screen::ReturnPrompt(Menu::ExperimentManager))
    }

    /// Interview, generate and persist a new experiment named `name`.
    pub fn create_experiment(&mut self, name: &str) -> Result<ExperimentLayout> {
        self.services.store.ensure_available(name)?;
        self.term
            .print(Tone::Emphasis, &format!("Setting up new experiment {name}"));
        self.term.say(
            "Please choose experiment parameters below. Values inside brackets will be chosen by default if you press Enter without providing any input.",
        );

        let mut collector = InputCollector::new(&mut *self.term);
        let inputs = collect_inputs(&mut collector, &self.data_base)?;
        let (training, inference) = generate(&self.services.store.layout(name), &inputs);
        let layout = self.services.store.create(name, &training, &inference)?;

        self.term.header(&format!("Experiment {name} created"));
        Ok(layout)
    }

    fn delete_screen(&mut self) -> Result<Screen> {
        self.term.header("Experiment Deletion (be careful!)");
        loop {
            self.show_listing()?;
            let name = self.term.input(
                "Please enter the name of the experiment you want to delete (or enter E to Exit)",
                None,
            )?;
            if name.trim() == EXIT_TOKEN {
                break;
            }

            let term = &mut *self.term;
            let outcome = self.services.store.delete(&name, |name| {
                term.say(&format!("Experiment {name} found."));
                term.confirm(
                    &format!(
                        "Do you really want to delete experiment {name} and all its contents (config files, trained models, denoised results)?"
                    ),
                    false,
                )
            });
            match outcome {
                Ok(DeleteOutcome::Deleted) => {
                    self.term
                        .success(&format!("Experiment {name} successfully deleted."));
                    break;
                }
                Ok(DeleteOutcome::Declined) => {
                    self.term.say(&format!("Experiment {name} was not deleted."));
                    break;
                }
                Err(WizardError::NotFound { .. } | WizardError::Validation(_)) => {
                    self.term.error(&not_found_message(&name));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Screen::ReturnPrompt(Menu::ExperimentManager))
    }

    async fn run_screen(&mut self, mode: RunMode) -> Result<Screen> {
        let back = Screen::ReturnPrompt(Menu::Main);
        self.term.header(&format!("CryoSamba {mode}"));

        if !self.show_listing()? {
            self.term.error(
                "You have no existing experiments. Set up a new experiment via the main menu.",
            );
            return Ok(back);
        }

        let layout = loop {
            let name = self
                .term
                .input("Please enter the experiment name (or enter E to Exit)", None)?;
            if name.trim() == EXIT_TOKEN {
                return Ok(back);
            }
            match self.services.store.resolve(&name) {
                Ok(layout) => {
                    self.term
                        .print(Tone::Success, &format!("* Experiment {name} selected *"));
                    break layout;
                }
                Err(WizardError::NotFound { .. } | WizardError::Validation(_)) => {
                    self.term.error(&not_found_message(&name));
                }
                Err(e) => return Err(e),
            }
        };

        let config_path = mode.config_path(&layout);
        if !config_path.is_file() {
            warn!(path = %config_path.display(), "Experiment document missing");
            self.term.error(&format!(
                "{} is missing. Set up the experiment again via the experiment manager.",
                config_path.display()
            ));
            return Ok(back);
        }

        let devices = match select_devices(&mut *self.term, self.services.reporter.as_ref()).await {
            Ok(devices) => devices,
            Err(WizardError::NoSelection) => return Ok(back),
            Err(e) => return Err(e),
        };

        let plan = self.services.launcher.plan(mode, &layout, &devices);
        launch(&mut *self.term, self.services.runner.as_ref(), mode, &plan).await?;
        Ok(back)
    }
}

fn not_found_message(name: &str) -> String {
    format!("Experiment {name} not found. Please check the experiment name and try again.")
}
