//! The triage pipeline — detect, score, build cases, persist — and the
//! feedback loop that tunes threshold memory for subsequent runs.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  anomaly::AnomalyType,
  case::{self, Case},
  detect,
  feedback::{
    self, FeedbackItem, NewFeedback, TargetType,
  },
  memory::{
    self, ThresholdEntry, ThresholdSource, ThresholdValue, Thresholds,
  },
  score,
  sentiment::SentimentAnalyzer,
  store::TriageStore,
};

// ─── Error ───────────────────────────────────────────────────────────────────

/// An error surfaced by the pipeline entry points. Detector and enrichment
/// failures are isolated and never appear here; store failures and invalid
/// feedback do.
#[derive(Debug, Error)]
pub enum TriageError<E: std::error::Error> {
  #[error("store error: {0}")]
  Store(#[source] E),

  #[error(transparent)]
  Invalid(#[from] crate::Error),
}

// ─── Run/feedback id generation ──────────────────────────────────────────────

fn generate_run_id() -> String {
  format!("RUN-{}", &Uuid::new_v4().simple().to_string()[..8])
}

fn generate_feedback_id() -> String {
  format!("FB-{}", &Uuid::new_v4().simple().to_string()[..8])
}

// ─── Improvement summary ─────────────────────────────────────────────────────

/// One threshold's drift from its seeded default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdChange {
  pub key:        String,
  pub default:    ThresholdValue,
  pub current:    ThresholdValue,
  pub reason:     String,
  pub source:     ThresholdSource,
  pub updated_at: DateTime<Utc>,
}

/// What the feedback loop has learned so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementSummary {
  pub current_memory:          Vec<ThresholdEntry>,
  pub changes:                 Vec<ThresholdChange>,
  pub improvement_notes:       Vec<String>,
  pub false_positive_case_ids: Vec<String>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Orchestrates one-direction data flow per run (tables -> detectors ->
/// scorer -> cases) and the reverse feedback flow (case verdict ->
/// threshold memory).
pub struct Triage<S, A> {
  store:    S,
  analyzer: A,
}

impl<S, A> Triage<S, A>
where
  S: TriageStore,
  A: SentimentAnalyzer,
{
  pub fn new(store: S, analyzer: A) -> Self {
    Self { store, analyzer }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Execute one full triage run: detect, score, rank, build cases,
  /// enrich, persist. Returns the ranked cases (possibly empty). Cases
  /// from the prior run are cleared first.
  pub async fn run_triage(
    &self,
    run_id: Option<String>,
  ) -> Result<Vec<Case>, TriageError<S::Error>> {
    let run_id = run_id.unwrap_or_else(generate_run_id);
    tracing::info!(%run_id, "starting triage run");

    let entries =
      self.store.all_thresholds().await.map_err(TriageError::Store)?;
    let thresholds = Thresholds::from_entries(&entries);

    let false_positive_types = self.false_positive_types().await?;

    self.store.clear_cases().await.map_err(TriageError::Store)?;

    let snapshot =
      self.store.billing_snapshot().await.map_err(TriageError::Store)?;
    let raw = detect::run_all(
      &snapshot,
      &thresholds,
      &detect::default_detectors(),
    );
    tracing::info!(%run_id, count = raw.len(), "detectors finished");
    if raw.is_empty() {
      return Ok(Vec::new());
    }

    let scored = score::score_all(raw, &false_positive_types, &thresholds);
    let mut cases = case::build_cases(&run_id, scored, Utc::now());

    for case in &mut cases {
      match self.analyzer.analyze(
        &case.evidence,
        &case.title,
        case.anomaly_type,
      ) {
        Ok(report) => case.sentiment = Some(report),
        Err(error) => {
          tracing::warn!(
            case_id = %case.case_id,
            %error,
            "sentiment enrichment failed; case left without sentiment"
          );
        }
      }
    }

    self.store.save_cases(&cases).await.map_err(TriageError::Store)?;

    let total_impact: f64 = cases.iter().map(|c| c.estimated_impact).sum();
    tracing::info!(
      %run_id,
      cases = cases.len(),
      total_impact,
      "triage run complete"
    );
    Ok(cases)
  }

  /// Record a feedback item, advance the case status (for open cases),
  /// and apply the threshold adjustments. Returns the persisted item plus
  /// the threshold entries actually changed, as an audit trail.
  ///
  /// Invalid feedback is rejected before anything is written, so a
  /// rejected item never leaves partial memory state behind.
  pub async fn submit_feedback(
    &self,
    new: NewFeedback,
  ) -> Result<(FeedbackItem, Vec<ThresholdEntry>), TriageError<S::Error>> {
    feedback::validate(new.target_type, new.feedback_type)?;

    let case = match new.target_type {
      TargetType::Case => {
        let case = self
          .store
          .get_case(&new.target_id)
          .await
          .map_err(TriageError::Store)?
          .ok_or_else(|| {
            crate::Error::CaseNotFound(new.target_id.clone())
          })?;
        Some(case)
      }
      TargetType::Analyst => None,
    };

    let item = FeedbackItem {
      feedback_id:   generate_feedback_id(),
      target_type:   new.target_type,
      target_id:     new.target_id,
      feedback_type: new.feedback_type,
      // Captured here so false-positive attribution outlives the case row,
      // which the next run's clear will delete.
      anomaly_type:  case.as_ref().map(|c| c.anomaly_type),
      comment:       new.comment,
      timestamp:     Utc::now(),
    };
    self.store.save_feedback(&item).await.map_err(TriageError::Store)?;

    // Status transitions only apply to open cases; feedback against a
    // closed case is logged but does not re-mutate status.
    if let Some(case) = &case
      && case.status.is_open()
      && let Some(next) = feedback::case_status_after(item.feedback_type)
    {
      self
        .store
        .update_case_status(&case.case_id, next)
        .await
        .map_err(TriageError::Store)?;
    }

    let entries =
      self.store.all_thresholds().await.map_err(TriageError::Store)?;
    let thresholds = Thresholds::from_entries(&entries);

    let updates = match &case {
      Some(case) => feedback::plan_case_adjustments(
        item.feedback_type,
        &case.case_id,
        case.anomaly_type,
        &thresholds,
      ),
      None => {
        feedback::plan_analyst_adjustments(item.feedback_type, &thresholds)
      }
    };

    let mut changed = Vec::with_capacity(updates.len());
    for update in updates {
      let entry = self
        .store
        .set_threshold(
          update.key,
          update.value,
          &update.reason,
          ThresholdSource::Feedback,
        )
        .await
        .map_err(TriageError::Store)?;
      tracing::info!(
        key = %entry.key,
        value = %entry.value,
        reason = %entry.reason,
        "threshold adjusted from feedback"
      );
      changed.push(entry);
    }

    Ok((item, changed))
  }

  /// Anomaly types with a false-positive feedback history. The type is
  /// recorded on each feedback item at submission time, so attribution
  /// holds across any number of reruns even though each run clears the
  /// prior run's cases.
  pub async fn false_positive_types(
    &self,
  ) -> Result<HashSet<AnomalyType>, TriageError<S::Error>> {
    let types = self
      .store
      .false_positive_types()
      .await
      .map_err(TriageError::Store)?;
    Ok(types.into_iter().collect())
  }

  /// Summarise how threshold memory has drifted from its defaults.
  pub async fn improvement_summary(
    &self,
  ) -> Result<ImprovementSummary, TriageError<S::Error>> {
    let current_memory =
      self.store.all_thresholds().await.map_err(TriageError::Store)?;
    let false_positive_case_ids = self
      .store
      .false_positive_case_ids()
      .await
      .map_err(TriageError::Store)?;

    let defaults: Vec<(&str, ThresholdValue)> = memory::defaults()
      .into_iter()
      .map(|(key, value, _)| (key, value))
      .collect();

    let mut changes = Vec::new();
    for entry in &current_memory {
      let Some((_, default)) =
        defaults.iter().find(|(key, _)| *key == entry.key)
      else {
        continue;
      };
      if entry.value != *default {
        changes.push(ThresholdChange {
          key:        entry.key.clone(),
          default:    default.clone(),
          current:    entry.value.clone(),
          reason:     entry.reason.clone(),
          source:     entry.source,
          updated_at: entry.updated_at,
        });
      }
    }

    let thresholds = Thresholds::from_entries(&current_memory);
    let mut improvement_notes = Vec::new();
    if thresholds.false_positive_penalty > 0.0 {
      improvement_notes.push(format!(
        "Confidence penalty of {:.0}% applied to anomaly types with prior false positives",
        thresholds.false_positive_penalty * 100.0
      ));
    }
    if thresholds.duplicate_refund_window_hours != 2.0 {
      improvement_notes.push(format!(
        "Duplicate refund window adjusted from 2h to {}h",
        thresholds.duplicate_refund_window_hours
      ));
    }
    if thresholds.underbilling_threshold != 10.0 {
      improvement_notes.push(format!(
        "Underbilling threshold raised from $10 to ${}",
        thresholds.underbilling_threshold
      ));
    }
    if thresholds.refund_spike_multiplier != 2.0 {
      improvement_notes.push(format!(
        "Refund spike multiplier raised from 2x to {}x",
        thresholds.refund_spike_multiplier
      ));
    }
    if !false_positive_case_ids.is_empty() {
      improvement_notes.push(format!(
        "{} cases marked as false positives; rerun will deprioritize similar patterns",
        false_positive_case_ids.len()
      ));
    }
    if improvement_notes.is_empty() {
      improvement_notes.push(
        "No improvements yet; submit feedback on cases to trigger self-improvement"
          .into(),
      );
    }

    Ok(ImprovementSummary {
      current_memory,
      changes,
      improvement_notes,
      false_positive_case_ids,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generated_ids_have_the_expected_shape() {
    let run_id = generate_run_id();
    assert!(run_id.starts_with("RUN-"));
    assert_eq!(run_id.len(), 12);

    let feedback_id = generate_feedback_id();
    assert!(feedback_id.starts_with("FB-"));
    assert_eq!(feedback_id.len(), 11);
  }

  #[test]
  fn generated_run_ids_are_distinct() {
    assert_ne!(generate_run_id(), generate_run_id());
  }
}
