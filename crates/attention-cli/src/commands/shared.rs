//! Argument groups shared by several commands.

use std::path::PathBuf;

use attention_core::inference::SequenceShape;
use attention_core::training::{SplitConfig, TrainingConfig};
use clap::Args;

use crate::config::{defaults, AppConfig};

/// Parse a strictly positive integer.
pub fn parse_positive(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        Err("must be at least 1".to_string())
    } else {
        Ok(value)
    }
}

/// Parse a strictly positive learning rate.
pub fn parse_learning_rate(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not a positive learning rate"))
    }
}

/// Model artifact location and input shape.
#[derive(Args, Clone, Debug, Default)]
pub struct ModelArgs {
    /// Frames per window (N)
    #[arg(long, env = "SEQUENCE_LENGTH", value_parser = parse_positive)]
    pub sequence_length: Option<usize>,

    /// Model artifact base path (<path>.safetensors + <path>.json)
    #[arg(long, env = "MODEL_PATH", value_name = "PATH")]
    pub model_path: Option<PathBuf>,

    /// Square face-crop side the model expects
    #[arg(long, env = "MODEL_IMG_SIZE", value_parser = parse_positive)]
    pub image_size: Option<usize>,
}

impl ModelArgs {
    /// Fill unset values from the config file.
    pub fn apply_config(&mut self, config: &AppConfig) {
        self.sequence_length = self.sequence_length.or(config.window.sequence_length);
        if self.model_path.is_none() {
            self.model_path.clone_from(&config.model.path);
        }
        self.image_size = self.image_size.or(config.model.image_size);
    }

    /// Window length with fallback to the hardcoded default.
    pub fn sequence_length(&self) -> usize {
        self.sequence_length.unwrap_or(defaults::SEQUENCE_LENGTH)
    }

    /// Artifact path with fallback to the hardcoded default.
    pub fn model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(defaults::MODEL_PATH))
    }

    /// Crop side with fallback to the hardcoded default.
    pub fn image_size(&self) -> usize {
        self.image_size.unwrap_or(defaults::IMAGE_SIZE)
    }

    /// Model input shape.
    pub fn shape(&self) -> SequenceShape {
        SequenceShape::rgb(self.sequence_length(), self.image_size())
    }
}

/// Training hyperparameters and locations.
#[derive(Args, Clone, Debug, Default)]
pub struct TrainingArgs {
    /// Frame-mode dataset (JSON Lines) to train on
    #[arg(long, env = "TRAIN_DATASET", value_name = "PATH")]
    pub dataset: Option<PathBuf>,

    /// Training epochs
    #[arg(long, env = "TRAIN_EPOCHS", value_parser = parse_positive)]
    pub epochs: Option<usize>,

    /// Batch size
    #[arg(long, env = "TRAIN_BATCH_SIZE", value_parser = parse_positive)]
    pub batch_size: Option<usize>,

    /// Learning rate
    #[arg(long, env = "TRAIN_LR", value_parser = parse_learning_rate)]
    pub lr: Option<f64>,

    /// Split and shuffle seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory for the best checkpoint and metrics.json
    #[arg(long, value_name = "DIR")]
    pub checkpoint_dir: Option<PathBuf>,
}

impl TrainingArgs {
    /// Fill unset values from the config file.
    pub fn apply_config(&mut self, config: &AppConfig) {
        let t = &config.training;
        if self.dataset.is_none() {
            self.dataset.clone_from(&t.dataset);
        }
        self.epochs = self.epochs.or(t.epochs);
        self.batch_size = self.batch_size.or(t.batch_size);
        self.lr = self.lr.or(t.lr);
        self.seed = self.seed.or(t.seed);
        if self.checkpoint_dir.is_none() {
            self.checkpoint_dir.clone_from(&t.checkpoint_dir);
        }
    }

    /// Dataset path with fallback to the hardcoded default.
    pub fn dataset(&self) -> PathBuf {
        self.dataset
            .clone()
            .unwrap_or_else(|| PathBuf::from(defaults::DATASET_PATH))
    }

    /// Trainer configuration for `model`.
    pub fn training_config(&self, model: &ModelArgs) -> TrainingConfig {
        let split = SplitConfig::default();
        TrainingConfig {
            epochs: self.epochs.unwrap_or(defaults::EPOCHS),
            batch_size: self.batch_size.unwrap_or(defaults::BATCH_SIZE),
            learning_rate: self.lr.unwrap_or(defaults::LEARNING_RATE),
            shape: model.shape(),
            split: SplitConfig {
                seed: self.seed.unwrap_or(split.seed),
                ..split
            },
            ..TrainingConfig::new(
                self.checkpoint_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(defaults::CHECKPOINT_DIR)),
                model.model_path(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positive() {
        assert_eq!(parse_positive("16"), Ok(16));
        assert!(parse_positive("0").is_err());
        assert!(parse_positive("-1").is_err());
        assert!(parse_positive("x").is_err());
    }

    #[test]
    fn test_parse_learning_rate() {
        assert_eq!(parse_learning_rate("0.001"), Ok(0.001));
        assert!(parse_learning_rate("0").is_err());
        assert!(parse_learning_rate("NaN").is_err());
    }

    #[test]
    fn test_cli_wins_over_config() {
        let mut config = AppConfig::default();
        config.window.sequence_length = Some(8);
        config.model.image_size = Some(112);

        let mut args = ModelArgs {
            sequence_length: Some(4),
            ..ModelArgs::default()
        };
        args.apply_config(&config);

        assert_eq!(args.sequence_length(), 4);
        assert_eq!(args.image_size(), 112);
        assert_eq!(args.model_path(), PathBuf::from(defaults::MODEL_PATH));
    }

    #[test]
    fn test_training_config_defaults() {
        let cfg = TrainingArgs::default().training_config(&ModelArgs::default());
        assert_eq!(cfg.epochs, defaults::EPOCHS);
        assert_eq!(cfg.batch_size, defaults::BATCH_SIZE);
        assert_eq!(cfg.shape, SequenceShape::rgb(16, 224));
        assert_eq!(cfg.checkpoint_dir, PathBuf::from("checkpoints"));
    }
}
