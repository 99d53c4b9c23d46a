//! Feedback types and the threshold-adjustment rules.
//!
//! The rules are a pure function of (feedback, case type, current
//! thresholds) to a list of planned updates; the pipeline applies them
//! through the store and surfaces the written entries as an audit trail.
//! Nothing here mutates state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  anomaly::AnomalyType,
  case::CaseStatus,
  memory::{Thresholds, ThresholdValue, keys},
};

/// Penalty ceiling: at most a 50% impact reduction.
const PENALTY_CAP: f64 = 0.5;
/// The duplicate-refund window never narrows below one hour.
const WINDOW_FLOOR_HOURS: f64 = 1.0;

fn round2(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

// ─── Feedback types ──────────────────────────────────────────────────────────

/// What the feedback is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
  Case,
  Analyst,
}

impl TargetType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Case => "case",
      Self::Analyst => "analyst",
    }
  }
}

impl fmt::Display for TargetType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
  Approve,
  Reject,
  FalsePositive,
  Useful,
  NotUseful,
}

impl FeedbackType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Approve => "approve",
      Self::Reject => "reject",
      Self::FalsePositive => "false_positive",
      Self::Useful => "useful",
      Self::NotUseful => "not_useful",
    }
  }
}

impl fmt::Display for FeedbackType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One immutable record in the append-only feedback log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
  pub feedback_id:   String,
  pub target_type:   TargetType,
  pub target_id:     String,
  pub feedback_type: FeedbackType,
  /// The target case's anomaly type, captured when the feedback is
  /// submitted. Cases are cleared on every run, so false-positive
  /// attribution must not depend on the case row outliving the feedback.
  /// `None` for analyst-target feedback.
  pub anomaly_type:  Option<AnomalyType>,
  pub comment:       String,
  pub timestamp:     DateTime<Utc>,
}

/// Input to [`crate::pipeline::Triage::submit_feedback`]. The id and
/// timestamp are assigned by the pipeline.
#[derive(Debug, Clone)]
pub struct NewFeedback {
  pub target_type:   TargetType,
  pub target_id:     String,
  pub feedback_type: FeedbackType,
  pub comment:       String,
}

/// A planned threshold write, not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdUpdate {
  pub key:    &'static str,
  pub value:  ThresholdValue,
  pub reason: String,
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Case targets take review verdicts; analyst targets take usefulness
/// ratings. Anything else is rejected before any memory mutation.
pub fn validate(
  target_type: TargetType,
  feedback_type: FeedbackType,
) -> Result<()> {
  let valid = match target_type {
    TargetType::Case => matches!(
      feedback_type,
      FeedbackType::Approve
        | FeedbackType::Reject
        | FeedbackType::FalsePositive
    ),
    TargetType::Analyst => {
      matches!(feedback_type, FeedbackType::Useful | FeedbackType::NotUseful)
    }
  };
  if valid {
    Ok(())
  } else {
    Err(Error::InvalidFeedback { target_type, feedback_type })
  }
}

/// The status a currently-open case transitions to for this verdict.
pub fn case_status_after(feedback_type: FeedbackType) -> Option<CaseStatus> {
  match feedback_type {
    FeedbackType::Approve => Some(CaseStatus::Approved),
    FeedbackType::Reject => Some(CaseStatus::Rejected),
    FeedbackType::FalsePositive => Some(CaseStatus::FalsePositive),
    FeedbackType::Useful | FeedbackType::NotUseful => None,
  }
}

// ─── Adjustment rules ────────────────────────────────────────────────────────

/// Threshold adjustments for feedback on a case of the given type.
pub fn plan_case_adjustments(
  feedback_type: FeedbackType,
  case_id: &str,
  anomaly_type: AnomalyType,
  thresholds: &Thresholds,
) -> Vec<ThresholdUpdate> {
  let mut updates = Vec::new();
  let penalty = thresholds.false_positive_penalty;

  match feedback_type {
    FeedbackType::FalsePositive => {
      let new_penalty = round2((penalty + 0.15).min(PENALTY_CAP));
      updates.push(ThresholdUpdate {
        key:    keys::FALSE_POSITIVE_PENALTY,
        value:  ThresholdValue::Number(new_penalty),
        reason: format!(
          "Increased from {penalty} to {new_penalty} after false positive on {case_id}"
        ),
      });

      match anomaly_type {
        AnomalyType::DuplicateRefund => {
          // Narrower window means stricter matching, so fewer future
          // duplicates are flagged.
          let window = thresholds.duplicate_refund_window_hours;
          let new_window = round2((window - 0.5).max(WINDOW_FLOOR_HOURS));
          updates.push(ThresholdUpdate {
            key:    keys::DUPLICATE_REFUND_WINDOW_HOURS,
            value:  ThresholdValue::Number(new_window),
            reason: format!(
              "Narrowed from {window}h to {new_window}h after false positive (stricter matching)"
            ),
          });
        }
        AnomalyType::Underbilling => {
          let threshold = thresholds.underbilling_threshold;
          let new_threshold = round2(threshold + 25.0);
          updates.push(ThresholdUpdate {
            key:    keys::UNDERBILLING_THRESHOLD,
            value:  ThresholdValue::Number(new_threshold),
            reason: format!(
              "Raised from ${threshold} to ${new_threshold} after false positive (less sensitive)"
            ),
          });
        }
        AnomalyType::RefundSpike => {
          let multiplier = thresholds.refund_spike_multiplier;
          let new_multiplier = round2(multiplier + 0.5);
          updates.push(ThresholdUpdate {
            key:    keys::REFUND_SPIKE_MULTIPLIER,
            value:  ThresholdValue::Number(new_multiplier),
            reason: format!(
              "Raised from {multiplier}x to {new_multiplier}x after false positive (higher bar for spike detection)"
            ),
          });
        }
        AnomalyType::ManualCredit => {
          let threshold = thresholds.manual_credit_threshold;
          let new_threshold = round2(threshold + 100.0);
          updates.push(ThresholdUpdate {
            key:    keys::MANUAL_CREDIT_THRESHOLD,
            value:  ThresholdValue::Number(new_threshold),
            reason: format!(
              "Raised from ${threshold} to ${new_threshold} after false positive (less sensitive)"
            ),
          });
        }
        // No per-type parameter exists for tier mismatch.
        AnomalyType::TierMismatch => {}
      }
    }

    FeedbackType::Approve => {
      // Positive reinforcement: slow decay of an elevated penalty.
      if penalty > 0.0 {
        let new_penalty = round2((penalty - 0.05).max(0.0));
        updates.push(ThresholdUpdate {
          key:    keys::FALSE_POSITIVE_PENALTY,
          value:  ThresholdValue::Number(new_penalty),
          reason: format!(
            "Reduced from {penalty} to {new_penalty} after case approval (positive reinforcement)"
          ),
        });
      }
    }

    FeedbackType::Reject => {
      // Milder than a false positive.
      let new_penalty = round2((penalty + 0.05).min(PENALTY_CAP));
      updates.push(ThresholdUpdate {
        key:    keys::FALSE_POSITIVE_PENALTY,
        value:  ThresholdValue::Number(new_penalty),
        reason: format!(
          "Slightly increased from {penalty} to {new_penalty} after case rejection"
        ),
      });
    }

    FeedbackType::Useful | FeedbackType::NotUseful => {}
  }

  updates
}

/// Threshold adjustments for feedback on analyst output.
pub fn plan_analyst_adjustments(
  feedback_type: FeedbackType,
  thresholds: &Thresholds,
) -> Vec<ThresholdUpdate> {
  let style = thresholds.explanation_style;
  match feedback_type {
    FeedbackType::NotUseful => {
      let new_style = style.toggled();
      vec![ThresholdUpdate {
        key:    keys::EXPLANATION_STYLE,
        value:  ThresholdValue::Text(new_style.as_str().into()),
        reason: format!(
          "Switched from '{style}' to '{new_style}' after 'not useful' feedback"
        ),
      }]
    }
    // Reinforcement logging only: re-record the current style.
    FeedbackType::Useful => vec![ThresholdUpdate {
      key:    keys::EXPLANATION_STYLE,
      value:  ThresholdValue::Text(style.as_str().into()),
      reason: format!("Reinforced '{style}' style after positive feedback"),
    }],
    _ => Vec::new(),
  }
}
