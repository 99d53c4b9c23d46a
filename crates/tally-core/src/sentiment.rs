//! Sentiment enrichment for case evidence.
//!
//! The analyzer is a capability trait chosen once at composition time; core
//! logic never branches on which implementation is live. The shipped
//! implementation is [`HeuristicAnalyzer`], a deterministic keyword scorer
//! tuned for financial-operations language. Empty evidence yields neutral
//! defaults, and the pipeline treats any analyzer failure as "no sentiment"
//! for that case.

use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyType;

// ─── Report types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
  Low,
  Neutral,
  Elevated,
  High,
}

/// Sentiment scores for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
  /// -1 (very negative) to +1 (very positive).
  pub polarity:     f64,
  /// 0 (objective) to 1 (opinion-based).
  pub subjectivity: f64,
  pub risk_level:   RiskLevel,
  pub assessment:   String,
}

/// Aggregated sentiment across a case's evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReport {
  pub overall_polarity:     f64,
  pub overall_subjectivity: f64,
  pub overall_risk_level:   RiskLevel,
  pub overall_assessment:   String,
  pub evidence_scores:      Vec<SentimentScore>,
  pub title_score:          Option<SentimentScore>,
  pub analyzed_count:       usize,
}

impl SentimentReport {
  /// Neutral defaults for a case with no evidence to analyze.
  pub fn neutral() -> Self {
    Self {
      overall_polarity:     0.0,
      overall_subjectivity: 0.0,
      overall_risk_level:   RiskLevel::Neutral,
      overall_assessment:   "No evidence to analyze".into(),
      evidence_scores:      Vec::new(),
      title_score:          None,
      analyzed_count:       0,
    }
  }
}

// ─── Analyzer trait ──────────────────────────────────────────────────────────

/// Sentiment provider boundary. A live (HTTP-backed) implementation plugs
/// in here; [`HeuristicAnalyzer`] is the deterministic one.
pub trait SentimentAnalyzer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn analyze(
    &self,
    evidence: &[String],
    title: &str,
    anomaly_type: AnomalyType,
  ) -> Result<SentimentReport, Self::Error>;
}

// ─── Heuristic implementation ────────────────────────────────────────────────

const NEGATIVE_KEYWORDS: &[&str] = &[
  "fraud", "suspicious", "duplicate", "error", "mismatch", "spike",
  "unauthorized", "anomaly", "discrepancy", "overcharge", "undercharge",
  "leakage", "loss", "violation", "breach", "irregular", "excessive",
  "unexpected", "abnormal", "critical", "severe", "urgent", "escalate",
  "missing", "failed", "incorrect", "invalid", "rejected",
];

const POSITIVE_KEYWORDS: &[&str] = &[
  "resolved", "approved", "correct", "verified", "confirmed", "normal",
  "expected", "routine", "standard", "compliant", "accurate", "valid",
  "matched", "reconciled", "cleared",
];

const HIGH_RISK_KEYWORDS: &[&str] = &[
  "fraud", "unauthorized", "breach", "violation", "critical", "severe",
  "duplicate refund", "revenue leakage", "manual credit",
];

const OPINION_WORDS: &[&str] = &[
  "seems", "appears", "likely", "possibly", "maybe", "probably", "suspect",
  "believe",
];

fn round3(value: f64) -> f64 {
  (value * 1000.0).round() / 1000.0
}

fn polarity_to_risk(polarity: f64, anomaly_type: Option<AnomalyType>) -> RiskLevel {
  // Certain anomaly types are inherently higher risk.
  let type_boost = match anomaly_type {
    Some(AnomalyType::DuplicateRefund | AnomalyType::ManualCredit) => -0.15,
    Some(AnomalyType::RefundSpike) => -0.1,
    _ => 0.0,
  };
  let adjusted = polarity + type_boost;

  if adjusted < -0.5 {
    RiskLevel::High
  } else if adjusted < -0.2 {
    RiskLevel::Elevated
  } else if adjusted < 0.2 {
    RiskLevel::Neutral
  } else {
    RiskLevel::Low
  }
}

/// Deterministic keyword-based sentiment scorer. Always available; no
/// network, no configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
  fn score_text(&self, text: &str) -> SentimentScore {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
      .split(|c: char| !c.is_alphanumeric())
      .filter(|w| !w.is_empty())
      .collect();
    let total_words = words.len().max(1);

    let neg = NEGATIVE_KEYWORDS.iter().filter(|kw| lower.contains(**kw)).count();
    let pos = POSITIVE_KEYWORDS.iter().filter(|kw| lower.contains(**kw)).count();
    let high_risk =
      HIGH_RISK_KEYWORDS.iter().filter(|kw| lower.contains(**kw)).count();

    let raw_polarity =
      (pos as f64 - neg as f64) / (pos + neg).max(1) as f64;
    let mut polarity = raw_polarity.clamp(-1.0, 1.0);

    // Financial evidence tends to be factual, so base subjectivity is low.
    let opinion = words.iter().filter(|w| OPINION_WORDS.contains(w)).count();
    let subjectivity =
      (opinion as f64 / total_words as f64 * 10.0 + 0.1).min(1.0);

    // High-risk keywords force at least a mildly negative polarity.
    if high_risk > 0 {
      polarity = polarity.min(-0.3);
    }

    let assessment = if polarity < -0.5 {
      "Strongly negative: high-risk language detected"
    } else if polarity < -0.2 {
      "Negative: anomaly indicators present"
    } else if polarity < 0.2 {
      "Neutral: standard operational language"
    } else if polarity < 0.5 {
      "Slightly positive: resolution indicators"
    } else {
      "Positive: resolved/confirmed language"
    };

    SentimentScore {
      polarity:     round3(polarity),
      subjectivity: round3(subjectivity),
      risk_level:   polarity_to_risk(polarity, None),
      assessment:   assessment.into(),
    }
  }
}

impl SentimentAnalyzer for HeuristicAnalyzer {
  type Error = std::convert::Infallible;

  fn analyze(
    &self,
    evidence: &[String],
    title: &str,
    anomaly_type: AnomalyType,
  ) -> Result<SentimentReport, Self::Error> {
    if evidence.is_empty() {
      return Ok(SentimentReport::neutral());
    }

    let evidence_scores: Vec<SentimentScore> =
      evidence.iter().map(|text| self.score_text(text)).collect();

    let title_score =
      (!title.is_empty()).then(|| self.score_text(title));

    let count = evidence_scores.len();
    let avg_polarity =
      evidence_scores.iter().map(|s| s.polarity).sum::<f64>() / count as f64;
    let avg_subjectivity =
      evidence_scores.iter().map(|s| s.subjectivity).sum::<f64>()
        / count as f64;

    let risk_level = polarity_to_risk(avg_polarity, Some(anomaly_type));

    let mut parts: Vec<String> = Vec::new();
    match risk_level {
      RiskLevel::High => parts
        .push(format!("High-risk sentiment detected across {count} evidence items")),
      RiskLevel::Elevated => parts
        .push(format!("Elevated risk indicators in {count} evidence items")),
      _ => parts.push(format!("Standard risk level across {count} evidence items")),
    }
    if avg_polarity < -0.3 {
      parts.push(
        "Language suggests potential fraud or significant billing error".into(),
      );
    } else if avg_polarity < 0.0 {
      parts.push(
        "Anomaly-related language present but not strongly negative".into(),
      );
    } else {
      parts.push("Language is neutral to positive".into());
    }

    Ok(SentimentReport {
      overall_polarity: round3(avg_polarity),
      overall_subjectivity: round3(avg_subjectivity),
      overall_risk_level: risk_level,
      overall_assessment: parts.join(". "),
      evidence_scores,
      title_score,
      analyzed_count: count,
    })
  }
}
