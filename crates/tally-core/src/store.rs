//! The `TriageStore` trait — persistence boundary for the pipeline.
//!
//! Implemented by storage backends (e.g. `tally-store-sqlite`). The
//! pipeline and any outer surface depend on this abstraction, not on a
//! concrete backend.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use crate::{
  anomaly::AnomalyType,
  case::{Case, CaseStatus},
  data::BillingSnapshot,
  feedback::{FeedbackItem, FeedbackType},
  memory::{ThresholdEntry, ThresholdSource, ThresholdValue},
};

pub trait TriageStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Threshold memory ──────────────────────────────────────────────────

  /// Current entry for `key`, or `None`; callers supply their own default
  /// when absent.
  fn get_threshold<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<ThresholdEntry>, Self::Error>> + Send + 'a;

  /// Upsert: always succeeds, overwriting any previous value, reason,
  /// source, and timestamp for the key.
  fn set_threshold<'a>(
    &'a self,
    key: &'a str,
    value: ThresholdValue,
    reason: &'a str,
    source: ThresholdSource,
  ) -> impl Future<Output = Result<ThresholdEntry, Self::Error>> + Send + 'a;

  /// Snapshot of all entries, most recently updated first.
  fn all_thresholds(
    &self,
  ) -> impl Future<Output = Result<Vec<ThresholdEntry>, Self::Error>> + Send + '_;

  /// Delete everything and immediately re-seed the six defaults with
  /// source `system_default`.
  fn reset_thresholds(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Cases ─────────────────────────────────────────────────────────────

  fn save_case<'a>(
    &'a self,
    case: &'a Case,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Persist a whole run's batch. All-or-nothing: a failure here means no
  /// valid partial case set exists.
  fn save_cases<'a>(
    &'a self,
    cases: &'a [Case],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn get_case<'a>(
    &'a self,
    case_id: &'a str,
  ) -> impl Future<Output = Result<Option<Case>, Self::Error>> + Send + 'a;

  /// Cases for one run, ordered by estimated impact descending.
  fn cases_by_run<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Case>, Self::Error>> + Send + 'a;

  /// All open cases, ordered by estimated impact descending.
  fn open_cases(
    &self,
  ) -> impl Future<Output = Result<Vec<Case>, Self::Error>> + Send + '_;

  /// Returns the updated case, or `None` if the id is unknown.
  fn update_case_status<'a>(
    &'a self,
    case_id: &'a str,
    status: CaseStatus,
  ) -> impl Future<Output = Result<Option<Case>, Self::Error>> + Send + 'a;

  /// Delete all cases. Runs clear the prior run's cases before persisting
  /// their own.
  fn clear_cases(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Feedback log (append-only) ────────────────────────────────────────

  fn save_feedback<'a>(
    &'a self,
    item: &'a FeedbackItem,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// All feedback, newest first.
  fn all_feedback(
    &self,
  ) -> impl Future<Output = Result<Vec<FeedbackItem>, Self::Error>> + Send + '_;

  /// Distinct case ids that have received `false_positive` feedback.
  fn false_positive_case_ids(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Distinct anomaly types attributed to `false_positive` feedback. Reads
  /// the type recorded on the feedback items themselves, so the answer is
  /// stable across runs clearing the cases the feedback referred to.
  fn false_positive_types(
    &self,
  ) -> impl Future<Output = Result<Vec<AnomalyType>, Self::Error>> + Send + '_;

  fn feedback_counts(
    &self,
  ) -> impl Future<Output = Result<Vec<(FeedbackType, u64)>, Self::Error>> + Send + '_;

  fn clear_feedback(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Billing data (read-only for detectors) ────────────────────────────

  /// Copy of the five billing tables taken at the start of a run.
  fn billing_snapshot(
    &self,
  ) -> impl Future<Output = Result<BillingSnapshot, Self::Error>> + Send + '_;

  /// Bulk-load billing rows (demo seeding and tests).
  fn load_billing<'a>(
    &'a self,
    snapshot: &'a BillingSnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn clear_billing(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
