//! The two configuration documents written for every experiment, plus the
//! parameter schema and default table they are built from.
//!
//! Field declaration order is the key order on disk; do not reorder fields
//! without meaning to change the file layout.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::input::{FloatRule, IntRule};

/// File name of the training document inside an experiment directory.
pub const TRAIN_CONFIG_FILE: &str = "train_config.json";
/// File name of the inference document inside an experiment directory.
pub const INFERENCE_CONFIG_FILE: &str = "inference_config.json";

pub const DEFAULT_DATA_PATH: &str = "data/sample_data.rec";
pub const DEFAULT_TRAIN_MAX_FRAME_GAP: i64 = 3;
pub const DEFAULT_NUM_ITERS: i64 = 50_000;
pub const DEFAULT_BATCH_SIZE: i64 = 8;

/// Constraints applied to operator-supplied values.
pub mod rules {
    use super::{FloatRule, IntRule};

    pub const TRAIN_MAX_FRAME_GAP: IntRule = IntRule::range(1, 40);
    pub const INFERENCE_MAX_FRAME_GAP: IntRule = IntRule::range(1, 80);
    pub const NUM_ITERS: IntRule = IntRule::range(1000, 200_000);
    pub const BATCH_SIZE: IntRule = IntRule::multiple(2, 256, 2);
    pub const PATCH_SHAPE: IntRule = IntRule::multiple(32, 1024, 32);
    pub const PATCH_OVERLAP: IntRule = IntRule::multiple(0, 512, 4);
    pub const NUM_WORKERS: IntRule = IntRule::range(0, 512);
    pub const FREQUENCY: IntRule = IntRule::range(1, 10_000);
    pub const CHANNELS: IntRule = IntRule::multiple(4, 128, 4);
    pub const SMALL_COUNT: IntRule = IntRule::range(1, 20);

    pub const LEARNING_RATE: FloatRule = FloatRule::POSITIVE;
    pub const LR_DECAY: FloatRule = FloatRule::UNIT_OPEN_LOW;
    pub const WEIGHT_DECAY: FloatRule = FloatRule::NON_NEGATIVE;
    pub const EPSILON: FloatRule = FloatRule::POSITIVE;
    pub const BETA: FloatRule = FloatRule::UNIT_OPEN_HIGH;
}

// ---------------------------------------------------------------------------
// Training document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub train_dir: PathBuf,
    pub data_path: String,
    pub train_data: TrainData,
    pub train: TrainSchedule,
    pub optimizer: OptimizerConfig,
    pub biflownet: BiFlowNetConfig,
    pub fusionnet: FusionNetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainData {
    pub max_frame_gap: i64,
    /// `[y, x]`
    pub patch_shape: [i64; 2],
    /// `[y, x]`
    pub patch_overlap: [i64; 2],
    pub split_ratio: f64,
    pub batch_size: i64,
    pub num_workers: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSchedule {
    pub num_iters: i64,
    pub load_ckpt_path: Option<String>,
    pub print_freq: i64,
    pub save_freq: i64,
    pub val_freq: i64,
    pub warmup_iters: i64,
    pub mixed_precision: bool,
    pub compile: bool,
    pub do_early_stopping: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub lr: f64,
    pub lr_decay: f64,
    pub weight_decay: f64,
    pub epsilon: f64,
    pub betas: [f64; 2],
}

/// Flow-estimation network hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiFlowNetConfig {
    pub pyr_dim: i64,
    pub pyr_level: i64,
    pub corr_radius: i64,
    pub kernel_size: i64,
    pub warp_type: String,
    pub padding_mode: String,
    pub fix_params: bool,
}

/// Fusion network hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionNetConfig {
    pub num_channels: i64,
    pub padding_mode: String,
    pub fix_params: bool,
}

// ---------------------------------------------------------------------------
// Inference document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub train_dir: PathBuf,
    pub data_path: String,
    pub inference_dir: PathBuf,
    pub inference_data: InferenceData,
    pub inference: InferenceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceData {
    pub max_frame_gap: i64,
    pub patch_shape: [i64; 2],
    pub patch_overlap: [i64; 2],
    pub batch_size: i64,
    pub num_workers: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub output_format: String,
    pub load_ckpt_name: Option<String>,
    pub pyr_level: i64,
    pub mixed_precision: bool,
    #[serde(rename = "TTA")]
    pub tta: bool,
    pub compile: bool,
}

// ---------------------------------------------------------------------------
// Tunable parameters
// ---------------------------------------------------------------------------

/// Every parameter the advanced path can change.
///
/// `Parameters::default()` is the fixed default table used when the operator
/// skips the advanced path; the advanced path starts from the same values and
/// applies the constraints in [`rules`].
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub train: TrainTunables,
    pub optimizer: OptimizerConfig,
    pub biflownet: BiFlowNetConfig,
    pub fusionnet: FusionNetConfig,
    pub inference: InferenceTunables,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainTunables {
    pub patch_shape: [i64; 2],
    pub patch_overlap: [i64; 2],
    pub split_ratio: f64,
    pub num_workers: i64,
    pub print_freq: i64,
    pub save_freq: i64,
    pub val_freq: i64,
    pub warmup_iters: i64,
    pub mixed_precision: bool,
    pub compile: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceTunables {
    pub patch_shape: [i64; 2],
    pub patch_overlap: [i64; 2],
    pub num_workers: i64,
    pub output_format: String,
    pub pyr_level: i64,
    pub mixed_precision: bool,
    pub compile: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            train: TrainTunables {
                patch_shape: [256, 256],
                patch_overlap: [16, 16],
                split_ratio: 0.95,
                num_workers: 4,
                print_freq: 100,
                save_freq: 1000,
                val_freq: 500,
                warmup_iters: 300,
                mixed_precision: true,
                compile: false,
            },
            optimizer: OptimizerConfig {
                lr: 2e-4,
                lr_decay: 0.99995,
                weight_decay: 0.0001,
                epsilon: 1e-8,
                betas: [0.9, 0.999],
            },
            biflownet: BiFlowNetConfig {
                pyr_dim: 24,
                pyr_level: 3,
                corr_radius: 4,
                kernel_size: 3,
                warp_type: "soft_splat".to_string(),
                padding_mode: "reflect".to_string(),
                fix_params: false,
            },
            fusionnet: FusionNetConfig {
                num_channels: 16,
                padding_mode: "reflect".to_string(),
                fix_params: false,
            },
            inference: InferenceTunables {
                patch_shape: [256, 256],
                patch_overlap: [16, 16],
                num_workers: 4,
                output_format: "same".to_string(),
                pyr_level: 3,
                mixed_precision: true,
                compile: false,
            },
        }
    }
}

/// Serialize a document the way it is stored: 4-space indentation, declaration
/// key order, trailing newline.
pub fn to_document_bytes<T: Serialize>(document: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}
