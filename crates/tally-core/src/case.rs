//! Case construction — scored anomalies become persisted, reviewable cases.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  anomaly::{AnomalyDetails, AnomalyType, Confidence, ScoredAnomaly, Severity},
  sentiment::SentimentReport,
};

// ─── Status ──────────────────────────────────────────────────────────────────

/// One-way state machine: `Open` is initial; the three review verdicts are
/// terminal. No transition is defined out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
  Open,
  Approved,
  Rejected,
  FalsePositive,
}

impl CaseStatus {
  pub fn is_open(self) -> bool {
    matches!(self, Self::Open)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "open",
      Self::Approved => "approved",
      Self::Rejected => "rejected",
      Self::FalsePositive => "false_positive",
    }
  }
}

impl fmt::Display for CaseStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Case ────────────────────────────────────────────────────────────────────

/// The persisted unit of triage output. Immutable once created except for
/// `status`, which the feedback processor advances through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
  pub case_id:            String,
  pub run_id:             String,
  pub title:              String,
  pub anomaly_type:       AnomalyType,
  pub severity:           Severity,
  pub confidence:         Confidence,
  pub estimated_impact:   f64,
  pub evidence:           Vec<String>,
  pub details:            AnomalyDetails,
  pub recommended_action: String,
  pub status:             CaseStatus,
  pub created_at:         DateTime<Utc>,
  /// Opaque enrichment attached once at creation; absent when the
  /// analyzer failed for this case.
  pub sentiment:          Option<SentimentReport>,
}

/// `CASE-` + type prefix + last 6 chars of the run id + zero-padded index.
/// Deterministic given `(run_id, index)`; unique within a run because the
/// index is the anomaly's position in the ranked batch.
pub fn case_id(anomaly_type: AnomalyType, run_id: &str, index: usize) -> String {
  let suffix = &run_id[run_id.len().saturating_sub(6)..];
  format!("CASE-{}-{}-{:02}", anomaly_type.prefix(), suffix, index)
}

/// Human-readable title embedding the most salient affected entities.
pub fn title(details: &AnomalyDetails) -> String {
  match details {
    AnomalyDetails::DuplicateRefund { customer_id, refund_ids, .. } => {
      format!(
        "Duplicate Refund: {customer_id} ({})",
        refund_ids.join(", ")
      )
    }
    AnomalyDetails::Underbilling { customer_name, invoice_id, .. } => {
      format!("Underbilling: {customer_name} ({invoice_id})")
    }
    AnomalyDetails::TierMismatch {
      customer_name,
      subscription_tier,
      billed_tier,
      ..
    } => {
      format!(
        "Tier Mismatch: {customer_name} ({subscription_tier} billed as {billed_tier})"
      )
    }
    AnomalyDetails::RefundSpike { region, date, refund_count } => {
      format!("Refund Spike: {region} region, {refund_count} refunds on {date}")
    }
    AnomalyDetails::ManualCredit { customer_name, refund_id, .. } => {
      format!("Suspicious Manual Credit: {customer_name} ({refund_id})")
    }
  }
}

/// Convert a ranked batch of scored anomalies into cases. Order is
/// preserved; sentiment enrichment happens afterwards in the pipeline.
pub fn build_cases(
  run_id: &str,
  scored: Vec<ScoredAnomaly>,
  created_at: DateTime<Utc>,
) -> Vec<Case> {
  scored
    .into_iter()
    .enumerate()
    .map(|(index, anomaly)| {
      let anomaly_type = anomaly.anomaly_type();
      Case {
        case_id: case_id(anomaly_type, run_id, index),
        run_id: run_id.to_owned(),
        title: title(&anomaly.details),
        anomaly_type,
        severity: anomaly.severity,
        confidence: anomaly.confidence,
        estimated_impact: anomaly.estimated_impact,
        evidence: anomaly.evidence,
        details: anomaly.details,
        recommended_action: anomaly.recommended_action.to_owned(),
        status: CaseStatus::Open,
        created_at,
        sentiment: None,
      }
    })
    .collect()
}
