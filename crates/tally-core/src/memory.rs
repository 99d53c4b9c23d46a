//! Threshold memory — the keyed store of tunable detection parameters.
//!
//! Each entry carries audit metadata (reason, source, timestamp); exactly
//! one live entry exists per key (last-write-wins, no history). The store
//! itself lives behind [`crate::store::TriageStore`]; this module holds the
//! entry types, the six seeded defaults, and the typed [`Thresholds`]
//! snapshot detectors and the scorer consume so they stay pure.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Keys ────────────────────────────────────────────────────────────────────

pub mod keys {
  pub const DUPLICATE_REFUND_WINDOW_HOURS: &str =
    "duplicate_refund_window_hours";
  pub const UNDERBILLING_THRESHOLD: &str = "underbilling_threshold";
  pub const REFUND_SPIKE_MULTIPLIER: &str = "refund_spike_multiplier";
  pub const MANUAL_CREDIT_THRESHOLD: &str = "manual_credit_threshold";
  pub const EXPLANATION_STYLE: &str = "explanation_style";
  pub const FALSE_POSITIVE_PENALTY: &str = "false_positive_penalty";
}

// ─── Entry types ─────────────────────────────────────────────────────────────

/// A threshold value — numeric for detection parameters, text for
/// preferences like `explanation_style`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdValue {
  Number(f64),
  Text(String),
}

impl ThresholdValue {
  pub fn as_number(&self) -> Option<f64> {
    match self {
      Self::Number(n) => Some(*n),
      Self::Text(_) => None,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Number(_) => None,
      Self::Text(s) => Some(s),
    }
  }
}

impl fmt::Display for ThresholdValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Number(n) => write!(f, "{n}"),
      Self::Text(s) => f.write_str(s),
    }
  }
}

impl From<f64> for ThresholdValue {
  fn from(n: f64) -> Self {
    Self::Number(n)
  }
}

impl From<&str> for ThresholdValue {
  fn from(s: &str) -> Self {
    Self::Text(s.to_owned())
  }
}

/// Provenance of the last write to a threshold entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
  SystemDefault,
  Feedback,
  #[serde(rename = "feedback+llm")]
  FeedbackLlm,
  Manual,
}

impl ThresholdSource {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::SystemDefault => "system_default",
      Self::Feedback => "feedback",
      Self::FeedbackLlm => "feedback+llm",
      Self::Manual => "manual",
    }
  }
}

impl fmt::Display for ThresholdSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The single live row for one threshold key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEntry {
  pub key:        String,
  pub value:      ThresholdValue,
  /// Free text explaining the last change.
  pub reason:     String,
  pub source:     ThresholdSource,
  pub updated_at: DateTime<Utc>,
}

// ─── Defaults ────────────────────────────────────────────────────────────────

/// The six seeded defaults. `reset()` on the store re-seeds exactly these
/// with source `system_default`.
pub fn defaults() -> Vec<(&'static str, ThresholdValue, &'static str)> {
  vec![
    (
      keys::DUPLICATE_REFUND_WINDOW_HOURS,
      ThresholdValue::Number(2.0),
      "Initial default: flag refunds from same customer with same amount within 2 hours",
    ),
    (
      keys::UNDERBILLING_THRESHOLD,
      ThresholdValue::Number(10.0),
      "Initial default: flag invoices where expected - billed > $10",
    ),
    (
      keys::REFUND_SPIKE_MULTIPLIER,
      ThresholdValue::Number(2.0),
      "Initial default: flag region/day refund count > 2x rolling average",
    ),
    (
      keys::MANUAL_CREDIT_THRESHOLD,
      ThresholdValue::Number(200.0),
      "Initial default: flag manual credits above $200",
    ),
    (
      keys::EXPLANATION_STYLE,
      ThresholdValue::Text("detailed".into()),
      "Initial default: provide detailed explanations in case summaries",
    ),
    (
      keys::FALSE_POSITIVE_PENALTY,
      ThresholdValue::Number(0.0),
      "Initial default: no confidence penalty for patterns with prior false positives",
    ),
  ]
}

// ─── Explanation style ───────────────────────────────────────────────────────

/// The `explanation_style` preference, toggled by analyst feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationStyle {
  Detailed,
  Concise,
}

impl ExplanationStyle {
  pub fn toggled(self) -> Self {
    match self {
      Self::Detailed => Self::Concise,
      Self::Concise => Self::Detailed,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Detailed => "detailed",
      Self::Concise => "concise",
    }
  }
}

impl fmt::Display for ExplanationStyle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Typed snapshot ──────────────────────────────────────────────────────────

/// Threshold memory materialised into typed fields, with defaults filled in
/// for any key missing from the store. Detectors, the scorer, and the
/// feedback planner read from this; only the feedback processor writes back
/// through the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
  pub duplicate_refund_window_hours: f64,
  pub underbilling_threshold:        f64,
  pub refund_spike_multiplier:       f64,
  pub manual_credit_threshold:       f64,
  pub explanation_style:             ExplanationStyle,
  pub false_positive_penalty:        f64,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      duplicate_refund_window_hours: 2.0,
      underbilling_threshold:        10.0,
      refund_spike_multiplier:       2.0,
      manual_credit_threshold:       200.0,
      explanation_style:             ExplanationStyle::Detailed,
      false_positive_penalty:        0.0,
    }
  }
}

impl Thresholds {
  /// Build from stored entries; unknown keys are ignored, missing or
  /// wrongly-typed keys fall back to their defaults.
  pub fn from_entries(entries: &[ThresholdEntry]) -> Self {
    let mut t = Self::default();
    for entry in entries {
      match entry.key.as_str() {
        keys::DUPLICATE_REFUND_WINDOW_HOURS => {
          if let Some(n) = entry.value.as_number() {
            t.duplicate_refund_window_hours = n;
          }
        }
        keys::UNDERBILLING_THRESHOLD => {
          if let Some(n) = entry.value.as_number() {
            t.underbilling_threshold = n;
          }
        }
        keys::REFUND_SPIKE_MULTIPLIER => {
          if let Some(n) = entry.value.as_number() {
            t.refund_spike_multiplier = n;
          }
        }
        keys::MANUAL_CREDIT_THRESHOLD => {
          if let Some(n) = entry.value.as_number() {
            t.manual_credit_threshold = n;
          }
        }
        keys::EXPLANATION_STYLE => {
          if let Some(s) = entry.value.as_text() {
            if s == "concise" {
              t.explanation_style = ExplanationStyle::Concise;
            } else if s == "detailed" {
              t.explanation_style = ExplanationStyle::Detailed;
            }
          }
        }
        keys::FALSE_POSITIVE_PENALTY => {
          if let Some(n) = entry.value.as_number() {
            t.false_positive_penalty = n;
          }
        }
        _ => {}
      }
    }
    t
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(key: &str, value: ThresholdValue) -> ThresholdEntry {
    ThresholdEntry {
      key: key.into(),
      value,
      reason: String::new(),
      source: ThresholdSource::Feedback,
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn defaults_cover_all_six_keys() {
    let d = defaults();
    assert_eq!(d.len(), 6);
    let t = Thresholds::default();
    assert_eq!(t.duplicate_refund_window_hours, 2.0);
    assert_eq!(t.underbilling_threshold, 10.0);
    assert_eq!(t.refund_spike_multiplier, 2.0);
    assert_eq!(t.manual_credit_threshold, 200.0);
    assert_eq!(t.explanation_style, ExplanationStyle::Detailed);
    assert_eq!(t.false_positive_penalty, 0.0);
  }

  #[test]
  fn from_entries_overrides_known_keys() {
    let t = Thresholds::from_entries(&[
      entry(keys::UNDERBILLING_THRESHOLD, ThresholdValue::Number(35.0)),
      entry(keys::EXPLANATION_STYLE, ThresholdValue::Text("concise".into())),
    ]);
    assert_eq!(t.underbilling_threshold, 35.0);
    assert_eq!(t.explanation_style, ExplanationStyle::Concise);
    // Untouched keys keep their defaults.
    assert_eq!(t.manual_credit_threshold, 200.0);
  }

  #[test]
  fn from_entries_ignores_unknown_and_mistyped_keys() {
    let t = Thresholds::from_entries(&[
      entry("no_such_key", ThresholdValue::Number(1.0)),
      entry(keys::UNDERBILLING_THRESHOLD, ThresholdValue::Text("oops".into())),
    ]);
    assert_eq!(t, Thresholds::default());
  }

  #[test]
  fn threshold_source_round_trips_plus_variant() {
    let json = serde_json::to_string(&ThresholdSource::FeedbackLlm).unwrap();
    assert_eq!(json, "\"feedback+llm\"");
    let back: ThresholdSource = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ThresholdSource::FeedbackLlm);
  }
}
