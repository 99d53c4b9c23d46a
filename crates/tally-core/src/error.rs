//! Error types for `tally-core`.

use thiserror::Error;

use crate::feedback::{FeedbackType, TargetType};

#[derive(Debug, Error)]
pub enum Error {
  /// A refund or invoice references a customer id with no customer row.
  /// Detectors treat this as malformed data; the pipeline isolates it.
  #[error("{record_id} references unknown customer {customer_id}")]
  UnknownCustomer {
    record_id:   String,
    customer_id: String,
  },

  #[error("case not found: {0}")]
  CaseNotFound(String),

  #[error("feedback type {feedback_type} is not valid for target type {target_type}")]
  InvalidFeedback {
    target_type:   TargetType,
    feedback_type: FeedbackType,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
