//! Training and inference launcher.
//!
//! A run is described by a [`LaunchPlan`]: an argument vector plus extra
//! environment. Plans are executed by a [`ProcessRunner`]; the system runner
//! hands the terminal to the child and kills it on Ctrl+C.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::accelerator::DeviceSelection;
use crate::config::LauncherConfig;
use crate::error::{Result, WizardError};
use crate::store::ExperimentLayout;
use crate::terminal::{Terminal, Tone};

/// What a run does with the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    Training,
    Inference,
}

impl RunMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Training => "Training",
            Self::Inference => "Inference",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Inference => "inference",
        }
    }

    /// Which experiment document the run is pointed at.
    pub fn config_path(self, layout: &ExperimentLayout) -> PathBuf {
        match self {
            Self::Training => layout.train_config_path(),
            Self::Inference => layout.inference_config_path(),
        }
    }

    /// Lines shown before the launch confirmation.
    pub fn instructions(self) -> &'static [&'static str] {
        match self {
            Self::Training => &[
                "* You can interrupt training at any time by pressing CTRL + C, and you can resume it later by running CryoSamba again *",
                "* Training will run until your specified maximum number of iterations is reached. However, you can monitor the training and validation losses and halt training when you think they have converged/stabilized *",
                "* You can monitor the losses through here, through the .log file in the experiment training folder, or through TensorBoard *",
                "* The output of the training run will be checkpoint files containing the trained model weights. There is no denoised data output at this point yet. You can use the trained model weights to run inference on your data and then get the denoised outputs. *",
            ],
            Self::Inference => &[
                "* You can interrupt inference at any time by pressing CTRL + C, and you can resume it later by running CryoSamba again *",
                "* You should have previously run a training session on this experiment in order to run inference *",
                "* The denoised volume will be generated after the final iteration *",
            ],
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A fully resolved external command. Arguments are passed as-is, never
/// through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Working directory; relative data paths in the documents resolve here.
    pub cwd: Option<PathBuf>,
}

impl fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a launched process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Non-zero exit; `code` is `None` when the process died from a signal.
    Failed { code: Option<i32> },
    /// The operator pressed Ctrl+C and the child was terminated.
    Interrupted,
}

/// Executes launch plans.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, plan: &LaunchPlan) -> Result<RunOutcome>;
}

/// Runs plans as child processes sharing the operator's terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, plan: &LaunchPlan) -> Result<RunOutcome> {
        let spawn_error = |message: String| WizardError::ExternalProcess {
            program: plan.program.clone(),
            message,
        };

        let mut command = Command::new(&plan.program);
        if let Some(cwd) = &plan.cwd {
            command.current_dir(cwd);
        }
        let mut child = command
            .args(&plan.args)
            .envs(plan.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(format!("Failed to start: {e}")))?;
        info!(command = %plan, pid = child.id(), "Process started");

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| spawn_error(format!("Failed to wait: {e}")))?;
                if status.success() {
                    Ok(RunOutcome::Completed)
                } else {
                    Ok(RunOutcome::Failed { code: status.code() })
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(program = %plan.program, "Interrupted, terminating child process");
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "Failed to signal child process");
                }
                let _ = child.wait().await;
                Ok(RunOutcome::Interrupted)
            }
        }
    }
}

/// Builds launch plans from the launcher settings.
#[derive(Debug, Clone)]
pub struct RunLauncher {
    program: String,
    scripts_dir: PathBuf,
    train_script: String,
    inference_script: String,
    omp_num_threads: u32,
    working_dir: Option<PathBuf>,
}

impl RunLauncher {
    /// `scripts_dir` is the already-resolved location of the entry-point scripts.
    pub fn new(config: &LauncherConfig, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: config.program.clone(),
            scripts_dir: scripts_dir.into(),
            train_script: config.train_script.clone(),
            inference_script: config.inference_script.clone(),
            omp_num_threads: config.omp_num_threads,
            working_dir: None,
        }
    }

    /// Run launched processes from `dir`, the directory relative data paths
    /// were validated against.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn script_path(&self, mode: RunMode) -> PathBuf {
        let script = match mode {
            RunMode::Training => &self.train_script,
            RunMode::Inference => &self.inference_script,
        };
        self.scripts_dir.join(script)
    }

    pub fn plan(
        &self,
        mode: RunMode,
        layout: &ExperimentLayout,
        devices: &DeviceSelection,
    ) -> LaunchPlan {
        LaunchPlan {
            program: self.program.clone(),
            args: vec![
                "--standalone".to_string(),
                format!("--nproc_per_node={}", devices.len()),
                path_arg(&self.script_path(mode)),
                "--config".to_string(),
                path_arg(&mode.config_path(layout)),
            ],
            env: vec![
                ("OMP_NUM_THREADS".to_string(), self.omp_num_threads.to_string()),
                ("CUDA_VISIBLE_DEVICES".to_string(), devices.visible_devices()),
            ],
            cwd: self.working_dir.clone(),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Show the instructions, confirm, and run.
///
/// Returns `None` when the operator declines. Failures to start the process
/// are reported to the operator rather than propagated.
pub async fn launch(
    term: &mut dyn Terminal,
    runner: &dyn ProcessRunner,
    mode: RunMode,
    plan: &LaunchPlan,
) -> Result<Option<RunOutcome>> {
    let label = mode.label();
    let noun = mode.noun();

    term.print(
        Tone::Warning,
        &format!("!!! {label} instructions, read before proceeding !!!"),
    );
    for line in mode.instructions() {
        term.print(Tone::Emphasis, line);
    }
    term.say("");

    if !term.confirm(&format!("Do you want to start {noun}?"), false)? {
        term.error(&format!("{label} aborted"));
        return Ok(None);
    }

    term.say("");
    term.print(Tone::Header, "***********************************************");
    term.say("");

    let outcome = match runner.run(plan).await {
        Ok(outcome) => outcome,
        Err(e @ WizardError::ExternalProcess { .. }) => {
            error!(error = %e, command = %plan, "{label} could not be started");
            term.error(&e.to_string());
            return Ok(Some(RunOutcome::Failed { code: None }));
        }
        Err(e) => return Err(e),
    };

    term.say("");
    match outcome {
        RunOutcome::Completed => {
            info!(command = %plan, "{label} finished");
            term.success(&format!("{label} finished"));
        }
        RunOutcome::Failed { code } => {
            let status = code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"));
            error!(command = %plan, ?code, "{label} exited with non-zero status");
            term.error(&format!("{label} exited with {status}"));
        }
        RunOutcome::Interrupted => {
            term.warn(&format!("{label} interrupted"));
        }
    }
    Ok(Some(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::ScriptedTerminal;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        plans: Mutex<Vec<LaunchPlan>>,
        outcome: Option<RunOutcome>,
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(&self, plan: &LaunchPlan) -> Result<RunOutcome> {
            self.plans.lock().unwrap().push(plan.clone());
            Ok(self.outcome.unwrap_or(RunOutcome::Completed))
        }
    }

    fn launcher() -> RunLauncher {
        RunLauncher::new(&LauncherConfig::default(), "/opt/cryosamba")
    }

    fn selection(ids: &[&str]) -> DeviceSelection {
        DeviceSelection::try_from(ids.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_training_plan() {
        let layout = ExperimentLayout::new("/runs/e1");
        let plan = launcher().plan(RunMode::Training, &layout, &selection(&["0", "1"]));
        assert_eq!(plan.program, "torchrun");
        assert_eq!(
            plan.args,
            [
                "--standalone",
                "--nproc_per_node=2",
                "/opt/cryosamba/train.py",
                "--config",
                "/runs/e1/train_config.json",
            ]
        );
        assert_eq!(
            plan.env,
            [
                ("OMP_NUM_THREADS".to_string(), "1".to_string()),
                ("CUDA_VISIBLE_DEVICES".to_string(), "0,1".to_string()),
            ]
        );
    }

    #[test]
    fn test_inference_plan_uses_inference_document() {
        let layout = ExperimentLayout::new("/runs/e1");
        let plan = launcher().plan(RunMode::Inference, &layout, &selection(&["3"]));
        assert_eq!(plan.args[1], "--nproc_per_node=1");
        assert_eq!(plan.args[2], "/opt/cryosamba/inference.py");
        assert_eq!(plan.args[4], "/runs/e1/inference_config.json");
    }

    #[test]
    fn test_plan_runs_from_working_dir() {
        let layout = ExperimentLayout::new("/runs/e1");
        let devices = selection(&["0"]);
        assert_eq!(launcher().plan(RunMode::Training, &layout, &devices).cwd, None);

        let plan = launcher()
            .with_working_dir("/proj")
            .plan(RunMode::Inference, &layout, &devices);
        assert_eq!(plan.cwd, Some(PathBuf::from("/proj")));
    }

    #[test]
    fn test_plan_display() {
        let plan = LaunchPlan {
            program: "torchrun".into(),
            args: vec!["--standalone".into()],
            env: vec![("CUDA_VISIBLE_DEVICES".into(), "0".into())],
            cwd: None,
        };
        assert_eq!(plan.to_string(), "CUDA_VISIBLE_DEVICES=0 torchrun --standalone");
    }

    #[tokio::test]
    async fn test_launch_declined_runs_nothing() {
        let runner = RecordingRunner::default();
        let mut term = ScriptedTerminal::new(["n"]);
        let plan = launcher().plan(RunMode::Training, &ExperimentLayout::new("/r/e"), &selection(&["0"]));
        let outcome = launch(&mut term, &runner, RunMode::Training, &plan).await.unwrap();
        assert_eq!(outcome, None);
        assert!(runner.plans.lock().unwrap().is_empty());
        assert_eq!(term.lines_with(Tone::Error), ["Training aborted"]);
        assert_eq!(term.prompts(), ["Do you want to start training?"]);
    }

    #[tokio::test]
    async fn test_launch_confirmed_runs_plan() {
        let runner = RecordingRunner::default();
        let mut term = ScriptedTerminal::new(["y"]);
        let plan = launcher().plan(RunMode::Inference, &ExperimentLayout::new("/r/e"), &selection(&["0"]));
        let outcome = launch(&mut term, &runner, RunMode::Inference, &plan).await.unwrap();
        assert_eq!(outcome, Some(RunOutcome::Completed));
        assert_eq!(*runner.plans.lock().unwrap(), [plan]);
        assert!(term.output().contains("Inference instructions"));
    }

    #[tokio::test]
    async fn test_launch_reports_failure() {
        let runner = RecordingRunner {
            outcome: Some(RunOutcome::Failed { code: Some(2) }),
            ..Default::default()
        };
        let mut term = ScriptedTerminal::new(["y"]);
        let plan = launcher().plan(RunMode::Training, &ExperimentLayout::new("/r/e"), &selection(&["0"]));
        let outcome = launch(&mut term, &runner, RunMode::Training, &plan).await.unwrap();
        assert_eq!(outcome, Some(RunOutcome::Failed { code: Some(2) }));
        assert_eq!(term.lines_with(Tone::Error), ["Training exited with status 2"]);
    }

    #[tokio::test]
    async fn test_launch_missing_program_is_reported() {
        let plan = LaunchPlan {
            program: "cryosamba-test-no-such-launcher".into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        };
        let mut term = ScriptedTerminal::new(["y"]);
        let outcome = launch(&mut term, &SystemProcessRunner, RunMode::Training, &plan)
            .await
            .unwrap();
        assert_eq!(outcome, Some(RunOutcome::Failed { code: None }));
        assert_eq!(term.lines_with(Tone::Error).len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_exit_status() {
        let ok = LaunchPlan {
            program: "sh".into(),
            args: vec!["-c".into(), "test \"$CUDA_VISIBLE_DEVICES\" = 0,1".into()],
            env: vec![("CUDA_VISIBLE_DEVICES".into(), "0,1".into())],
            cwd: None,
        };
        assert_eq!(SystemProcessRunner.run(&ok).await.unwrap(), RunOutcome::Completed);

        let failing = LaunchPlan {
            program: "sh".into(),
            args: vec!["-c".into(), "exit 3".into()],
            env: Vec::new(),
            cwd: None,
        };
        assert_eq!(
            SystemProcessRunner.run(&failing).await.unwrap(),
            RunOutcome::Failed { code: Some(3) }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_uses_working_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("sample.rec"), b"volume").unwrap();
        let mut plan = LaunchPlan {
            program: "sh".into(),
            args: vec!["-c".into(), "test -f sample.rec".into()],
            env: Vec::new(),
            cwd: Some(dir.path().to_path_buf()),
        };
        assert_eq!(SystemProcessRunner.run(&plan).await.unwrap(), RunOutcome::Completed);

        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        plan.cwd = Some(empty);
        assert_eq!(
            SystemProcessRunner.run(&plan).await.unwrap(),
            RunOutcome::Failed { code: Some(1) }
        );
    }
}
