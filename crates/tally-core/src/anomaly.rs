//! The anomaly taxonomy — the closed set of five billing irregularities.
//!
//! A [`RawAnomaly`] is produced transiently by a detector each run and
//! consumed immediately by the scorer; it is never persisted directly.
//! Per-kind entity fields live in the [`AnomalyDetails`] sum type rather
//! than an open-ended key-value map, so the five-way switch in detection,
//! scoring, and title generation is checked at compile time.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ─── Ordinal ratings ─────────────────────────────────────────────────────────

/// Four-level severity rating attached to a scored anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  /// Sort rank used for ranking: most severe first.
  pub fn rank(self) -> u8 {
    match self {
      Self::Critical => 0,
      Self::High => 1,
      Self::Medium => 2,
      Self::Low => 3,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
      Self::Critical => "critical",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Three-level confidence rating, independent of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
  Low,
  Medium,
  High,
}

impl Confidence {
  /// One-level downgrade; `Low` stays `Low`.
  pub fn downgraded(self) -> Self {
    match self {
      Self::High => Self::Medium,
      Self::Medium | Self::Low => Self::Low,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
    }
  }
}

impl fmt::Display for Confidence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Anomaly type ────────────────────────────────────────────────────────────

/// The five billing-irregularity categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
  DuplicateRefund,
  Underbilling,
  TierMismatch,
  RefundSpike,
  ManualCredit,
}

impl AnomalyType {
  pub const ALL: [AnomalyType; 5] = [
    Self::DuplicateRefund,
    Self::Underbilling,
    Self::TierMismatch,
    Self::RefundSpike,
    Self::ManualCredit,
  ];

  /// The discriminant string stored in the `anomaly_type` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::DuplicateRefund => "duplicate_refund",
      Self::Underbilling => "underbilling",
      Self::TierMismatch => "tier_mismatch",
      Self::RefundSpike => "refund_spike",
      Self::ManualCredit => "manual_credit",
    }
  }

  /// Three-letter code embedded in generated case ids.
  pub fn prefix(self) -> &'static str {
    match self {
      Self::DuplicateRefund => "DUP",
      Self::Underbilling => "UND",
      Self::TierMismatch => "TIE",
      Self::RefundSpike => "REF",
      Self::ManualCredit => "MAN",
    }
  }

  /// Fixed base (severity, confidence) pair the scorer starts from.
  pub fn base_scores(self) -> (Severity, Confidence) {
    match self {
      Self::DuplicateRefund | Self::Underbilling | Self::TierMismatch => {
        (Severity::High, Confidence::High)
      }
      Self::RefundSpike | Self::ManualCredit => {
        (Severity::Medium, Confidence::Medium)
      }
    }
  }

  /// Fixed per-type remediation guidance attached by the scorer.
  pub fn recommended_action(self) -> &'static str {
    match self {
      Self::DuplicateRefund => {
        "Investigate and reverse the duplicate refund. Verify with payment processor."
      }
      Self::Underbilling => {
        "Correct billing amount on next invoice cycle. Notify finance team."
      }
      Self::TierMismatch => {
        "Align invoice tier with subscription tier. Issue corrected invoice."
      }
      Self::RefundSpike => {
        "Review regional refund surge. Check for service outage or policy abuse."
      }
      Self::ManualCredit => {
        "Audit manual credit approval chain. Verify authorization."
      }
    }
  }
}

impl fmt::Display for AnomalyType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Affected entities ───────────────────────────────────────────────────────

/// The entity identifiers relevant to one detected anomaly, tagged by kind.
/// The tag doubles as the `anomaly_type` discriminant when serialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "anomaly_type", rename_all = "snake_case")]
pub enum AnomalyDetails {
  DuplicateRefund {
    customer_id: String,
    refund_ids:  [String; 2],
    payment_id:  Option<String>,
  },
  Underbilling {
    customer_id:   String,
    customer_name: String,
    invoice_id:    String,
  },
  TierMismatch {
    customer_id:       String,
    customer_name:     String,
    invoice_id:        String,
    subscription_tier: String,
    billed_tier:       String,
  },
  RefundSpike {
    region:       String,
    date:         NaiveDate,
    refund_count: u32,
  },
  ManualCredit {
    customer_id:   String,
    customer_name: String,
    refund_id:     String,
  },
}

impl AnomalyDetails {
  pub fn anomaly_type(&self) -> AnomalyType {
    match self {
      Self::DuplicateRefund { .. } => AnomalyType::DuplicateRefund,
      Self::Underbilling { .. } => AnomalyType::Underbilling,
      Self::TierMismatch { .. } => AnomalyType::TierMismatch,
      Self::RefundSpike { .. } => AnomalyType::RefundSpike,
      Self::ManualCredit { .. } => AnomalyType::ManualCredit,
    }
  }
}

// ─── Raw and scored anomalies ────────────────────────────────────────────────

/// A detector finding before scoring. Evidence strings are self-contained:
/// each embeds the entity ids, dates, dollar amounts, and the threshold that
/// was exceeded, so a reviewer never has to consult the source tables.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAnomaly {
  pub details:    AnomalyDetails,
  /// Insertion order is narrative order.
  pub evidence:   Vec<String>,
  /// Non-negative monetary magnitude, before any penalty.
  pub raw_impact: f64,
}

impl RawAnomaly {
  pub fn anomaly_type(&self) -> AnomalyType {
    self.details.anomaly_type()
  }
}

/// A raw anomaly enriched by the scorer. Still transient; the case factory
/// turns these into persisted [`Case`](crate::case::Case) records.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAnomaly {
  pub details:            AnomalyDetails,
  pub evidence:           Vec<String>,
  pub severity:           Severity,
  pub confidence:         Confidence,
  /// Rounded to 2 decimals, possibly reduced by the false-positive penalty.
  pub estimated_impact:   f64,
  pub recommended_action: &'static str,
}

impl ScoredAnomaly {
  pub fn anomaly_type(&self) -> AnomalyType {
    self.details.anomaly_type()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn severity_rank_orders_most_severe_first() {
    assert!(Severity::Critical.rank() < Severity::High.rank());
    assert!(Severity::High.rank() < Severity::Medium.rank());
    assert!(Severity::Medium.rank() < Severity::Low.rank());
  }

  #[test]
  fn confidence_downgrade_saturates_at_low() {
    assert_eq!(Confidence::High.downgraded(), Confidence::Medium);
    assert_eq!(Confidence::Medium.downgraded(), Confidence::Low);
    assert_eq!(Confidence::Low.downgraded(), Confidence::Low);
  }

  #[test]
  fn prefixes_are_distinct() {
    let mut prefixes: Vec<_> =
      AnomalyType::ALL.iter().map(|t| t.prefix()).collect();
    prefixes.sort();
    prefixes.dedup();
    assert_eq!(prefixes.len(), 5);
  }

  #[test]
  fn details_tag_matches_type_discriminant() {
    let details = AnomalyDetails::RefundSpike {
      region:       "EMEA".into(),
      date:         NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
      refund_count: 4,
    };
    let json = serde_json::to_value(&details).unwrap();
    assert_eq!(json["anomaly_type"], "refund_spike");
    assert_eq!(details.anomaly_type().as_str(), "refund_spike");
  }
}
