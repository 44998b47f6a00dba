//! Training of the attention sequence model.

mod loss;
mod split;
mod trainer;

pub use loss::{masked_huber, mean_absolute_error, HUBER_DELTA};
pub use split::{split_by_user, SplitConfig, Splits};
pub use trainer::{Trainer, TrainingConfig, TrainingReport, BEST_CHECKPOINT, METRICS_FILE};
