//! Scoring and ranking of raw anomalies.
//!
//! Scoring is deterministic: the same raw anomaly with the same threshold
//! state always yields the same scored anomaly.

use std::collections::HashSet;

use crate::{
  anomaly::{AnomalyType, RawAnomaly, ScoredAnomaly, Severity},
  memory::Thresholds,
};

/// Impact at or above which severity is forced to high.
const IMPACT_HIGH: f64 = 200.0;
/// Impact below which a high base severity is downgraded to medium.
/// No effect between the two bands, and no downgrade path is defined for
/// severities other than high.
const IMPACT_MEDIUM: f64 = 50.0;

fn round2(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

/// Score one raw anomaly.
///
/// `false_positive_types` holds the anomaly types with a false-positive
/// feedback history; those get a one-level confidence downgrade and, when
/// the penalty is positive, an impact discount of `(1 - penalty)`.
pub fn score(
  raw: RawAnomaly,
  false_positive_types: &HashSet<AnomalyType>,
  false_positive_penalty: f64,
) -> ScoredAnomaly {
  let anomaly_type = raw.anomaly_type();
  let (mut severity, mut confidence) = anomaly_type.base_scores();
  let mut impact = raw.raw_impact;

  // Impact-based severity adjustment.
  if impact >= IMPACT_HIGH {
    severity = Severity::High;
  } else if impact < IMPACT_MEDIUM && severity == Severity::High {
    severity = Severity::Medium;
  }

  // False-positive downgrade.
  if false_positive_types.contains(&anomaly_type) {
    confidence = confidence.downgraded();
    if false_positive_penalty > 0.0 {
      impact *= 1.0 - false_positive_penalty;
    }
  }

  ScoredAnomaly {
    details: raw.details,
    evidence: raw.evidence,
    severity,
    confidence,
    estimated_impact: round2(impact),
    recommended_action: anomaly_type.recommended_action(),
  }
}

/// Score a full batch and rank it: most severe first, ties broken by
/// largest estimated impact. Beyond those two keys the sort is stable, so
/// detector-emission order is preserved.
pub fn score_all(
  raws: Vec<RawAnomaly>,
  false_positive_types: &HashSet<AnomalyType>,
  thresholds: &Thresholds,
) -> Vec<ScoredAnomaly> {
  let mut scored: Vec<ScoredAnomaly> = raws
    .into_iter()
    .map(|raw| {
      score(raw, false_positive_types, thresholds.false_positive_penalty)
    })
    .collect();

  scored.sort_by(|a, b| {
    a.severity
      .rank()
      .cmp(&b.severity.rank())
      .then_with(|| {
        b.estimated_impact
          .partial_cmp(&a.estimated_impact)
          .unwrap_or(std::cmp::Ordering::Equal)
      })
  });
  scored
}
