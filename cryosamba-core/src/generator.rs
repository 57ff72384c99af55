//! Experiment configuration generator.
//!
//! Runs the setup interview, then turns the collected answers into the
//! training and inference documents. [`generate`] is pure: the same inputs and
//! layout always produce the same documents.

use std::path::Path;

use crate::documents::{
    BiFlowNetConfig, DEFAULT_BATCH_SIZE, DEFAULT_DATA_PATH, DEFAULT_NUM_ITERS,
    DEFAULT_TRAIN_MAX_FRAME_GAP, FusionNetConfig, InferenceConfig, InferenceData,
    InferenceSettings, InferenceTunables, OptimizerConfig, Parameters, TrainData, TrainSchedule,
    TrainTunables, TrainingConfig, rules,
};
use crate::error::{Result, ValidationError};
use crate::input::InputCollector;
use crate::store::ExperimentLayout;
use crate::terminal::Tone;

/// Extensions accepted for a single-file volume.
pub const VOLUME_EXTENSIONS: [&str; 3] = ["mrc", "rec", "tif"];
/// Extension of 2-D slices when the data path is a folder.
pub const SLICE_EXTENSION: &str = ".tif";

/// Everything the operator decided during the interview.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedInputs {
    pub data_path: String,
    pub train_max_frame_gap: i64,
    pub num_iters: i64,
    pub batch_size: i64,
    pub inference_max_frame_gap: i64,
    pub tta: bool,
    pub early_stopping: bool,
    pub parameters: Parameters,
}

impl CollectedInputs {
    /// Default answers for the given data path, as if Enter were pressed at every prompt.
    pub fn new(data_path: impl Into<String>) -> Self {
        Self {
            data_path: data_path.into(),
            train_max_frame_gap: DEFAULT_TRAIN_MAX_FRAME_GAP,
            num_iters: DEFAULT_NUM_ITERS,
            batch_size: DEFAULT_BATCH_SIZE,
            inference_max_frame_gap: default_inference_max_frame_gap(DEFAULT_TRAIN_MAX_FRAME_GAP),
            tta: false,
            early_stopping: false,
            parameters: Parameters::default(),
        }
    }
}

/// Inference looks twice as far as training unless the operator says otherwise.
pub fn default_inference_max_frame_gap(train_max_frame_gap: i64) -> i64 {
    train_max_frame_gap * 2
}

/// Check a data path: it must exist; a file needs a supported volume
/// extension; a folder must contain at least one `.tif` slice.
///
/// Relative paths are resolved against `base`. The path is returned as typed.
pub fn validate_data_path(raw: &str, base: &Path) -> std::result::Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::Empty);
    }
    let path = base.join(raw);
    if path.is_file() {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !VOLUME_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ValidationError::UnsupportedExtension {
                extension: format!(".{extension}"),
            });
        }
    } else if path.is_dir() {
        if count_slice_files(&path) == 0 {
            return Err(ValidationError::NoSliceFiles { path: raw.into() });
        }
    } else {
        return Err(ValidationError::DataPathMissing { path: raw.into() });
    }
    Ok(raw.to_string())
}

fn count_slice_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(SLICE_EXTENSION))
        .count()
}

fn explain(collector: &mut InputCollector<'_>, title: &str, text: &str) {
    let term = collector.terminal();
    term.say("");
    term.print(Tone::Emphasis, title);
    term.say(text);
}

/// Run the setup interview. Relative data paths are checked against `base`.
pub fn collect_inputs(collector: &mut InputCollector<'_>, base: &Path) -> Result<CollectedInputs> {
    explain(
        collector,
        "DATA PATH",
        "The path to a single (3D) .tif, .mrc or .rec file, or the path to a folder containing a sequence of (2D) .tif files, ordered alphanumerically matching the Z-stack order. You can use the full path or a relative path.",
    );
    let data_path = collector.ask_validated("Enter your data path", Some(DEFAULT_DATA_PATH), |raw| {
        validate_data_path(raw, base)
    })?;

    explain(
        collector,
        "MAXIMUM FRAME GAP FOR TRAINING",
        "Explained in the manuscript. We empirically set values of 3, 6 and 10 for data at resolutions of 15.72, 7.86 and 2.62 Angstroms/voxel, respectively. For different resolutions, try a reasonable value interpolated from the reference ones.",
    );
    let train_max_frame_gap = collector.ask_int_rule(
        "Enter Maximum Frame Gap for Training",
        rules::TRAIN_MAX_FRAME_GAP,
        DEFAULT_TRAIN_MAX_FRAME_GAP,
    )?;

    explain(
        collector,
        "NUMBER OF ITERATIONS",
        "For how many iterations the training session will run. This is an upper limit, and you can halt training before that.",
    );
    let num_iters = collector.ask_int_rule(
        "Enter the number of iterations you want to run",
        rules::NUM_ITERS,
        DEFAULT_NUM_ITERS,
    )?;

    explain(
        collector,
        "BATCH SIZE",
        "Number of data points passed at once to the GPUs. A higher number leads to faster training, but the whole batch might not fit into your GPU's memory, leading to out-of-memory errors or severe slowdowns. If you're getting these, try to decrease the batch size until they disappear. This number should be an even integer.",
    );
    let batch_size =
        collector.ask_int_rule("Enter the batch size", rules::BATCH_SIZE, DEFAULT_BATCH_SIZE)?;

    explain(
        collector,
        "MAXIMUM FRAME GAP FOR INFERENCE",
        "Explained in the manuscript. We recommend using twice the value used for training.",
    );
    let inference_max_frame_gap = collector.ask_int_rule(
        "Enter Maximum Frame Gap for Inference",
        rules::INFERENCE_MAX_FRAME_GAP,
        default_inference_max_frame_gap(train_max_frame_gap),
    )?;

    explain(
        collector,
        "TEST-TIME AUGMENTATION",
        "Explained in the manuscript. Enabling it leads to slightly better denoising quality at the cost of much longer inference times.",
    );
    let tta = collector.ask_bool(
        "Enable Test Time Augmentation (TTA) for inference (disabled by default)?",
        false,
    )?;

    explain(
        collector,
        "TRAINING EARLY STOPPING",
        "If activated, training will be halted if, starting after 20 epochs, the validation loss doesn't decrease for at least 3 consecutive epochs.",
    );
    let early_stopping =
        collector.ask_bool("Enable Early Stopping (disabled by default)?", false)?;

    collector.terminal().say("");
    collector
        .terminal()
        .warn("ADVANCED PARAMETERS: only recommended for experienced users.");
    let advanced =
        collector.ask_bool("Do you want to set up advanced parameters (No by default)?", false)?;

    let defaults = Parameters::default();
    let parameters = if advanced {
        collect_parameters(collector, &defaults)?
    } else {
        defaults
    };

    Ok(CollectedInputs {
        data_path,
        train_max_frame_gap,
        num_iters,
        batch_size,
        inference_max_frame_gap,
        tta,
        early_stopping,
        parameters,
    })
}

/// The advanced path: every tunable, with `defaults` offered at each prompt.
pub fn collect_parameters(
    collector: &mut InputCollector<'_>,
    defaults: &Parameters,
) -> Result<Parameters> {
    collector.terminal().header("Advanced Parameters");
    collector.terminal().say(
        "For explanations, refer to the advanced instructions or the manuscript.",
    );

    let d = &defaults.train;
    let train = TrainTunables {
        patch_shape: [
            collector.ask_int_rule("Enter train_data.patch_shape on Y", rules::PATCH_SHAPE, d.patch_shape[0])?,
            collector.ask_int_rule("Enter train_data.patch_shape on X", rules::PATCH_SHAPE, d.patch_shape[1])?,
        ],
        patch_overlap: [
            collector.ask_int_rule("Enter train_data.patch_overlap on Y", rules::PATCH_OVERLAP, d.patch_overlap[0])?,
            collector.ask_int_rule("Enter train_data.patch_overlap on X", rules::PATCH_OVERLAP, d.patch_overlap[1])?,
        ],
        split_ratio: d.split_ratio,
        num_workers: collector.ask_int_rule("Enter train_data.num_workers", rules::NUM_WORKERS, d.num_workers)?,
        print_freq: collector.ask_int_rule("Enter train.print_freq", rules::FREQUENCY, d.print_freq)?,
        save_freq: collector.ask_int_rule("Enter train.save_freq", rules::FREQUENCY, d.save_freq)?,
        val_freq: collector.ask_int_rule("Enter train.val_freq", rules::FREQUENCY, d.val_freq)?,
        warmup_iters: collector.ask_int_rule("Enter train.warmup_iters", rules::FREQUENCY, d.warmup_iters)?,
        mixed_precision: collector.ask_bool("Enable train.mixed_precision?", d.mixed_precision)?,
        compile: collector.ask_bool("Enable train.compile?", d.compile)?,
    };

    let d = &defaults.optimizer;
    let optimizer = OptimizerConfig {
        lr: collector.ask_float("Enter optimizer.lr", rules::LEARNING_RATE, d.lr)?,
        lr_decay: collector.ask_float("Enter optimizer.lr_decay", rules::LR_DECAY, d.lr_decay)?,
        weight_decay: collector.ask_float("Enter optimizer.weight_decay", rules::WEIGHT_DECAY, d.weight_decay)?,
        epsilon: collector.ask_float("Enter optimizer.epsilon", rules::EPSILON, d.epsilon)?,
        betas: [
            collector.ask_float("Enter optimizer.betas_0", rules::BETA, d.betas[0])?,
            collector.ask_float("Enter optimizer.betas_1", rules::BETA, d.betas[1])?,
        ],
    };

    let d = &defaults.biflownet;
    let biflownet = BiFlowNetConfig {
        pyr_dim: collector.ask_int_rule("Enter biflownet.pyr_dim", rules::CHANNELS, d.pyr_dim)?,
        pyr_level: collector.ask_int_rule("Enter biflownet.pyr_level", rules::SMALL_COUNT, d.pyr_level)?,
        corr_radius: collector.ask_int_rule("Enter biflownet.corr_radius", rules::SMALL_COUNT, d.corr_radius)?,
        kernel_size: collector.ask_int_rule("Enter biflownet.kernel_size", rules::SMALL_COUNT, d.kernel_size)?,
        warp_type: collector.ask_string("Enter biflownet.warp_type", &d.warp_type)?,
        padding_mode: collector.ask_string("Enter biflownet.padding_mode", &d.padding_mode)?,
        fix_params: collector.ask_bool("Enable biflownet.fix_params?", d.fix_params)?,
    };

    let d = &defaults.fusionnet;
    let fusionnet = FusionNetConfig {
        num_channels: collector.ask_int_rule("Enter fusionnet.num_channels", rules::CHANNELS, d.num_channels)?,
        padding_mode: collector.ask_string("Enter fusionnet.padding_mode", &d.padding_mode)?,
        fix_params: collector.ask_bool("Enable fusionnet.fix_params?", d.fix_params)?,
    };

    let d = &defaults.inference;
    let inference = InferenceTunables {
        patch_shape: [
            collector.ask_int_rule("Enter inference_data.patch_shape on Y", rules::PATCH_SHAPE, d.patch_shape[0])?,
            collector.ask_int_rule("Enter inference_data.patch_shape on X", rules::PATCH_SHAPE, d.patch_shape[1])?,
        ],
        patch_overlap: [
            collector.ask_int_rule("Enter inference_data.patch_overlap on Y", rules::PATCH_OVERLAP, d.patch_overlap[0])?,
            collector.ask_int_rule("Enter inference_data.patch_overlap on X", rules::PATCH_OVERLAP, d.patch_overlap[1])?,
        ],
        num_workers: collector.ask_int_rule("Enter inference_data.num_workers", rules::NUM_WORKERS, d.num_workers)?,
        output_format: collector.ask_string("Enter inference.output_format", &d.output_format)?,
        pyr_level: collector.ask_int_rule("Enter inference.pyr_level", rules::SMALL_COUNT, d.pyr_level)?,
        mixed_precision: collector.ask_bool("Enable inference.mixed_precision?", d.mixed_precision)?,
        compile: collector.ask_bool("Enable inference.compile?", d.compile)?,
    };

    Ok(Parameters {
        train,
        optimizer,
        biflownet,
        fusionnet,
        inference,
    })
}

/// Build both documents for the experiment at `layout`.
pub fn generate(
    layout: &ExperimentLayout,
    inputs: &CollectedInputs,
) -> (TrainingConfig, InferenceConfig) {
    let p = &inputs.parameters;

    let training = TrainingConfig {
        train_dir: layout.train_dir(),
        data_path: inputs.data_path.clone(),
        train_data: TrainData {
            max_frame_gap: inputs.train_max_frame_gap,
            patch_shape: p.train.patch_shape,
            patch_overlap: p.train.patch_overlap,
            split_ratio: p.train.split_ratio,
            batch_size: inputs.batch_size,
            num_workers: p.train.num_workers,
        },
        train: TrainSchedule {
            num_iters: inputs.num_iters,
            load_ckpt_path: None,
            print_freq: p.train.print_freq,
            save_freq: p.train.save_freq,
            val_freq: p.train.val_freq,
            warmup_iters: p.train.warmup_iters,
            mixed_precision: p.train.mixed_precision,
            compile: p.train.compile,
            do_early_stopping: inputs.early_stopping,
        },
        optimizer: p.optimizer.clone(),
        biflownet: p.biflownet.clone(),
        fusionnet: p.fusionnet.clone(),
    };

    let inference = InferenceConfig {
        train_dir: layout.train_dir(),
        data_path: inputs.data_path.clone(),
        inference_dir: layout.inference_dir(),
        inference_data: InferenceData {
            max_frame_gap: inputs.inference_max_frame_gap,
            patch_shape: p.inference.patch_shape,
            patch_overlap: p.inference.patch_overlap,
            batch_size: inputs.batch_size,
            num_workers: p.inference.num_workers,
        },
        inference: InferenceSettings {
            output_format: p.inference.output_format.clone(),
            load_ckpt_name: None,
            pyr_level: p.inference.pyr_level,
            mixed_precision: p.inference.mixed_precision,
            tta: inputs.tta,
            compile: p.inference.compile,
        },
    };

    (training, inference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::to_document_bytes;
    use crate::terminal::ScriptedTerminal;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const ADVANCED_PROMPTS: usize = 36;

    fn sample_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("sample.rec"), b"volume").unwrap();
        dir
    }

    #[test]
    fn test_default_scenario_values() {
        let dir = sample_dir();
        // data path, then Enter for every remaining basic prompt
        let mut term = ScriptedTerminal::new(["sample.rec", "", "", "", "", "", "", ""]);
        let inputs = collect_inputs(&mut InputCollector::new(&mut term), dir.path()).unwrap();
        assert_eq!(inputs, CollectedInputs::new("sample.rec"));
        assert_eq!(term.remaining(), 0);

        let (training, inference) = generate(&ExperimentLayout::new("/runs/e1"), &inputs);
        assert_eq!(training.train_data.batch_size, 8);
        assert_eq!(training.train_data.max_frame_gap, 3);
        assert_eq!(inference.inference_data.max_frame_gap, 6);
        assert_eq!(inference.inference_data.batch_size, 8);
        assert_eq!(training.train_dir, Path::new("/runs/e1/train"));
        assert_eq!(inference.inference_dir, Path::new("/runs/e1/inference"));
        assert_eq!(training.train.load_ckpt_path, None);
    }

    #[test]
    fn test_inference_gap_default_follows_training_answer() {
        let dir = sample_dir();
        let mut term = ScriptedTerminal::new(["sample.rec", "10", "", "", "", "", "", ""]);
        let inputs = collect_inputs(&mut InputCollector::new(&mut term), dir.path()).unwrap();
        assert_eq!(inputs.train_max_frame_gap, 10);
        assert_eq!(inputs.inference_max_frame_gap, 20);
    }

    #[test]
    fn test_inference_gap_can_be_overridden() {
        let dir = sample_dir();
        let mut term = ScriptedTerminal::new(["sample.rec", "5", "", "", "7", "y", "y", "n"]);
        let inputs = collect_inputs(&mut InputCollector::new(&mut term), dir.path()).unwrap();
        assert_eq!(inputs.inference_max_frame_gap, 7);
        assert!(inputs.tta);
        assert!(inputs.early_stopping);
    }

    #[test]
    fn test_bad_data_path_reprompts() {
        let dir = sample_dir();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let mut term = ScriptedTerminal::new([
            "missing.rec",
            "notes.txt",
            "sample.rec",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
        ]);
        let inputs = collect_inputs(&mut InputCollector::new(&mut term), dir.path()).unwrap();
        assert_eq!(inputs.data_path, "sample.rec");
        let errors = term.lines_with(Tone::Error);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("invalid"));
        assert!(errors[1].contains("Extension .txt is not supported"));
    }

    #[test]
    fn test_advanced_path_with_defaults_matches_table() {
        let dir = sample_dir();
        let mut answers = vec!["sample.rec", "", "", "", "", "", "", "y"];
        answers.extend(std::iter::repeat_n("", ADVANCED_PROMPTS));
        let mut term = ScriptedTerminal::new(answers);
        let inputs = collect_inputs(&mut InputCollector::new(&mut term), dir.path()).unwrap();
        assert_eq!(inputs.parameters, Parameters::default());
        assert_eq!(term.remaining(), 0);
    }

    #[test]
    fn test_advanced_path_applies_constraints() {
        let mut answers = vec!["100", "96", "128"];
        answers.extend(std::iter::repeat_n("", ADVANCED_PROMPTS - 2));
        let mut term = ScriptedTerminal::new(answers);
        let params =
            collect_parameters(&mut InputCollector::new(&mut term), &Parameters::default()).unwrap();
        assert_eq!(params.train.patch_shape, [96, 128]);
        assert_eq!(
            term.lines_with(Tone::Error),
            ["Please enter an integer value multiple of 32."]
        );
    }

    #[test]
    fn test_validate_data_path_file_extensions() {
        let dir = TempDir::new().unwrap();
        for name in ["a.mrc", "b.rec", "c.tif", "d.tiff", "e"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert!(validate_data_path("a.mrc", dir.path()).is_ok());
        assert!(validate_data_path("b.rec", dir.path()).is_ok());
        assert!(validate_data_path("c.tif", dir.path()).is_ok());
        assert_eq!(
            validate_data_path("d.tiff", dir.path()),
            Err(ValidationError::UnsupportedExtension {
                extension: ".tiff".into()
            })
        );
        assert!(validate_data_path("e", dir.path()).is_err());
    }

    #[test]
    fn test_validate_data_path_folder_needs_tif_slices() {
        let dir = TempDir::new().unwrap();
        let slices = dir.path().join("slices");
        std::fs::create_dir(&slices).unwrap();
        for name in ["readme.md", "a.png", "b.mrc"] {
            std::fs::write(slices.join(name), b"x").unwrap();
        }
        // a folder named like a slice does not count
        std::fs::create_dir(slices.join("nested.tif")).unwrap();
        assert!(matches!(
            validate_data_path("slices", dir.path()),
            Err(ValidationError::NoSliceFiles { .. })
        ));

        std::fs::write(slices.join("z000.tif"), b"x").unwrap();
        assert_eq!(validate_data_path("slices", dir.path()).unwrap(), "slices");
    }

    #[test]
    fn test_validate_data_path_absolute_ignores_base() {
        let dir = sample_dir();
        let absolute = dir.path().join("sample.rec");
        let raw = absolute.to_string_lossy().into_owned();
        assert_eq!(validate_data_path(&raw, Path::new("/nonexistent")).unwrap(), raw);
    }

    #[test]
    fn test_generation_differs_only_in_paths() {
        let inputs = CollectedInputs::new("sample.rec");
        let (t1, i1) = generate(&ExperimentLayout::new("/runs/a"), &inputs);
        let (t2, i2) = generate(&ExperimentLayout::new("/runs/b"), &inputs);
        assert_ne!(t1, t2);

        let t1_text = String::from_utf8(to_document_bytes(&t1).unwrap()).unwrap();
        let t2_text = String::from_utf8(to_document_bytes(&t2).unwrap()).unwrap();
        assert_eq!(t1_text.replace("/runs/a", "/runs/b"), t2_text);

        let i1_text = String::from_utf8(to_document_bytes(&i1).unwrap()).unwrap();
        let i2_text = String::from_utf8(to_document_bytes(&i2).unwrap()).unwrap();
        assert_eq!(i1_text.replace("/runs/a", "/runs/b"), i2_text);
    }

    #[test]
    fn test_generation_is_repeatable() {
        let inputs = CollectedInputs::new("sample.rec");
        let layout = ExperimentLayout::new("/runs/e1");
        let first = to_document_bytes(&generate(&layout, &inputs).0).unwrap();
        let second = to_document_bytes(&generate(&layout, &inputs).0).unwrap();
        assert_eq!(first, second);
    }
}
