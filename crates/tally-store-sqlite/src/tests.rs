//! Integration tests for `SqliteStore` against an in-memory database,
//! including the full triage-and-feedback loop through the pipeline.

use chrono::{NaiveDate, TimeZone, Utc};
use tally_core::{
  anomaly::{AnomalyDetails, AnomalyType, Confidence, Severity},
  case::{Case, CaseStatus},
  data::{BillingSnapshot, Customer, Invoice, Refund, Subscription},
  feedback::{FeedbackItem, FeedbackType, NewFeedback, TargetType},
  memory::{ThresholdSource, ThresholdValue, keys},
  pipeline::{Triage, TriageError},
  sentiment::{HeuristicAnalyzer, SentimentAnalyzer as _},
  store::TriageStore,
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Threshold memory ────────────────────────────────────────────────────────

#[tokio::test]
async fn open_seeds_the_six_defaults() {
  let s = store().await;

  let entries = s.all_thresholds().await.unwrap();
  assert_eq!(entries.len(), 6);
  assert!(
    entries
      .iter()
      .all(|e| e.source == ThresholdSource::SystemDefault)
  );

  let window = s
    .get_threshold(keys::DUPLICATE_REFUND_WINDOW_HOURS)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(window.value, ThresholdValue::Number(2.0));
}

#[tokio::test]
async fn get_missing_threshold_returns_none() {
  let s = store().await;
  assert!(s.get_threshold("no_such_key").await.unwrap().is_none());
}

#[tokio::test]
async fn set_threshold_upserts_and_sorts_most_recent_first() {
  let s = store().await;

  let written = s
    .set_threshold(
      keys::UNDERBILLING_THRESHOLD,
      ThresholdValue::Number(35.0),
      "raised after false positive",
      ThresholdSource::Feedback,
    )
    .await
    .unwrap();
  assert_eq!(written.value, ThresholdValue::Number(35.0));

  let fetched = s
    .get_threshold(keys::UNDERBILLING_THRESHOLD)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched.value, ThresholdValue::Number(35.0));
  assert_eq!(fetched.source, ThresholdSource::Feedback);
  assert_eq!(fetched.reason, "raised after false positive");

  // Still six rows (upsert, not insert), freshest write first.
  let entries = s.all_thresholds().await.unwrap();
  assert_eq!(entries.len(), 6);
  assert_eq!(entries[0].key, keys::UNDERBILLING_THRESHOLD);
}

#[tokio::test]
async fn reset_restores_exactly_the_defaults() {
  let s = store().await;
  s.set_threshold(
    keys::UNDERBILLING_THRESHOLD,
    ThresholdValue::Number(60.0),
    "test",
    ThresholdSource::Manual,
  )
  .await
  .unwrap();

  s.reset_thresholds().await.unwrap();

  let entries = s.all_thresholds().await.unwrap();
  assert_eq!(entries.len(), 6);
  assert!(
    entries
      .iter()
      .all(|e| e.source == ThresholdSource::SystemDefault)
  );
  let under = s
    .get_threshold(keys::UNDERBILLING_THRESHOLD)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(under.value, ThresholdValue::Number(10.0));
}

// ─── Cases ───────────────────────────────────────────────────────────────────

fn sample_case(case_id: &str, run_id: &str, impact: f64) -> Case {
  Case {
    case_id:            case_id.into(),
    run_id:             run_id.into(),
    title:              "Underbilling: Stark Industries (INV008)".into(),
    anomaly_type:       AnomalyType::Underbilling,
    severity:           Severity::High,
    confidence:         Confidence::High,
    estimated_impact:   impact,
    evidence:           vec!["Billed $199.00 but expected $299.00".into()],
    details:            AnomalyDetails::Underbilling {
      customer_id:   "C005".into(),
      customer_name: "Stark Industries".into(),
      invoice_id:    "INV008".into(),
    },
    recommended_action: AnomalyType::Underbilling
      .recommended_action()
      .to_owned(),
    status:             CaseStatus::Open,
    created_at:         Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap(),
    sentiment:          None,
  }
}

#[tokio::test]
async fn save_and_get_case_round_trips() {
  let s = store().await;
  let mut case = sample_case("CASE-UND-a1b2c3-00", "RUN-a1b2c3", 100.0);
  case.sentiment = Some(
    HeuristicAnalyzer
      .analyze(&case.evidence, &case.title, case.anomaly_type)
      .unwrap(),
  );

  s.save_case(&case).await.unwrap();
  let fetched = s.get_case(&case.case_id).await.unwrap().unwrap();
  assert_eq!(fetched, case);
}

#[tokio::test]
async fn get_case_missing_returns_none() {
  let s = store().await;
  assert!(s.get_case("CASE-UND-zzzzzz-99").await.unwrap().is_none());
}

#[tokio::test]
async fn cases_by_run_ordered_by_impact_desc() {
  let s = store().await;
  s.save_cases(&[
    sample_case("CASE-UND-a1b2c3-00", "RUN-a1b2c3", 100.0),
    sample_case("CASE-UND-a1b2c3-01", "RUN-a1b2c3", 500.0),
    sample_case("CASE-UND-a1b2c3-02", "RUN-a1b2c3", 250.0),
    sample_case("CASE-UND-ffffff-00", "RUN-ffffff", 999.0),
  ])
  .await
  .unwrap();

  let cases = s.cases_by_run("RUN-a1b2c3").await.unwrap();
  let impacts: Vec<f64> = cases.iter().map(|c| c.estimated_impact).collect();
  assert_eq!(impacts, vec![500.0, 250.0, 100.0]);
}

#[tokio::test]
async fn update_status_and_open_case_listing() {
  let s = store().await;
  s.save_cases(&[
    sample_case("CASE-UND-a1b2c3-00", "RUN-a1b2c3", 100.0),
    sample_case("CASE-UND-a1b2c3-01", "RUN-a1b2c3", 500.0),
  ])
  .await
  .unwrap();

  let updated = s
    .update_case_status("CASE-UND-a1b2c3-01", CaseStatus::Approved)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.status, CaseStatus::Approved);

  let open = s.open_cases().await.unwrap();
  assert_eq!(open.len(), 1);
  assert_eq!(open[0].case_id, "CASE-UND-a1b2c3-00");
}

#[tokio::test]
async fn update_status_unknown_case_returns_none() {
  let s = store().await;
  let result = s
    .update_case_status("CASE-UND-zzzzzz-99", CaseStatus::Rejected)
    .await
    .unwrap();
  assert!(result.is_none());
}

#[tokio::test]
async fn clear_cases_removes_everything() {
  let s = store().await;
  s.save_case(&sample_case("CASE-UND-a1b2c3-00", "RUN-a1b2c3", 100.0))
    .await
    .unwrap();
  s.clear_cases().await.unwrap();
  assert!(s.open_cases().await.unwrap().is_empty());
}

// ─── Feedback log ────────────────────────────────────────────────────────────

fn feedback_item(
  id: &str,
  target_id: &str,
  feedback_type: FeedbackType,
  minute: u32,
) -> FeedbackItem {
  FeedbackItem {
    feedback_id: id.into(),
    target_type: TargetType::Case,
    target_id: target_id.into(),
    feedback_type,
    anomaly_type: Some(AnomalyType::DuplicateRefund),
    comment: String::new(),
    timestamp: Utc.with_ymd_and_hms(2025, 3, 15, 12, minute, 0).unwrap(),
  }
}

#[tokio::test]
async fn feedback_listed_newest_first() {
  let s = store().await;
  s.save_feedback(&feedback_item("FB-1", "c1", FeedbackType::Approve, 0))
    .await
    .unwrap();
  s.save_feedback(&feedback_item("FB-2", "c2", FeedbackType::Reject, 5))
    .await
    .unwrap();

  let all = s.all_feedback().await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[0].feedback_id, "FB-2");
  assert_eq!(all[1].feedback_id, "FB-1");
  assert_eq!(all[0].anomaly_type, Some(AnomalyType::DuplicateRefund));
}

#[tokio::test]
async fn false_positive_ids_are_distinct() {
  let s = store().await;
  s.save_feedback(&feedback_item("FB-1", "c1", FeedbackType::FalsePositive, 0))
    .await
    .unwrap();
  s.save_feedback(&feedback_item("FB-2", "c1", FeedbackType::FalsePositive, 1))
    .await
    .unwrap();
  s.save_feedback(&feedback_item("FB-3", "c2", FeedbackType::Approve, 2))
    .await
    .unwrap();

  let ids = s.false_positive_case_ids().await.unwrap();
  assert_eq!(ids, vec!["c1".to_owned()]);
}

#[tokio::test]
async fn false_positive_types_come_from_the_feedback_log() {
  let s = store().await;
  s.save_feedback(&feedback_item("FB-1", "c1", FeedbackType::FalsePositive, 0))
    .await
    .unwrap();
  s.save_feedback(&feedback_item("FB-2", "c1", FeedbackType::FalsePositive, 1))
    .await
    .unwrap();
  s.save_feedback(&feedback_item("FB-3", "c2", FeedbackType::Approve, 2))
    .await
    .unwrap();

  // Types are read off the feedback rows directly; deleting cases changes
  // nothing about the answer.
  s.clear_cases().await.unwrap();
  let types = s.false_positive_types().await.unwrap();
  assert_eq!(types, vec![AnomalyType::DuplicateRefund]);
}

#[tokio::test]
async fn feedback_counts_group_by_type() {
  let s = store().await;
  s.save_feedback(&feedback_item("FB-1", "c1", FeedbackType::Approve, 0))
    .await
    .unwrap();
  s.save_feedback(&feedback_item("FB-2", "c2", FeedbackType::Approve, 1))
    .await
    .unwrap();
  s.save_feedback(&feedback_item("FB-3", "c3", FeedbackType::Reject, 2))
    .await
    .unwrap();

  let counts = s.feedback_counts().await.unwrap();
  assert_eq!(counts[0], (FeedbackType::Approve, 2));
  assert!(counts.contains(&(FeedbackType::Reject, 1)));
}

// ─── Billing data ────────────────────────────────────────────────────────────

/// A snapshot that trips every detector except the refund spike with
/// default thresholds: a duplicate refund pair, an underbilled invoice, a
/// tier mismatch (whose invoice also carries a billing gap, so it is
/// underbilled too), and an oversized manual credit.
fn fixture_snapshot() -> BillingSnapshot {
  BillingSnapshot {
    customers:     vec![
      Customer {
        customer_id:   "C003".into(),
        customer_name: "Initech".into(),
        region:        "NA".into(),
      },
      Customer {
        customer_id:   "C005".into(),
        customer_name: "Stark Industries".into(),
        region:        "NA".into(),
      },
      Customer {
        customer_id:   "C007".into(),
        customer_name: "Cyberdyne Systems".into(),
        region:        "APAC".into(),
      },
      Customer {
        customer_id:   "C009".into(),
        customer_name: "Tyrell Corp".into(),
        region:        "EMEA".into(),
      },
    ],
    subscriptions: vec![Subscription {
      subscription_id: "SUB007".into(),
      customer_id:     "C007".into(),
      plan_tier:       "enterprise".into(),
      billing_status:  "active".into(),
    }],
    invoices:      vec![
      Invoice {
        invoice_id:       "INV008".into(),
        customer_id:      "C005".into(),
        billed_amount:    199.0,
        expected_amount:  299.0,
        plan_tier_billed: "enterprise".into(),
        invoice_date:     NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
      },
      Invoice {
        invoice_id:       "INV010".into(),
        customer_id:      "C007".into(),
        billed_amount:    199.0,
        expected_amount:  499.0,
        plan_tier_billed: "pro".into(),
        invoice_date:     NaiveDate::from_ymd_opt(2025, 3, 13).unwrap(),
      },
    ],
    payments:      vec![],
    refunds:       vec![
      Refund {
        refund_id:         "REF003".into(),
        customer_id:       "C003".into(),
        amount:            150.0,
        refund_date:       Utc.with_ymd_and_hms(2025, 3, 14, 14, 0, 0).unwrap(),
        reason:            "overcharge".into(),
        processor:         "stripe".into(),
        linked_payment_id: Some("PAY003".into()),
      },
      Refund {
        refund_id:         "REF004".into(),
        customer_id:       "C003".into(),
        amount:            150.0,
        refund_date:       Utc.with_ymd_and_hms(2025, 3, 14, 14, 45, 0).unwrap(),
        reason:            "overcharge".into(),
        processor:         "stripe".into(),
        linked_payment_id: Some("PAY003".into()),
      },
      Refund {
        refund_id:         "REF009".into(),
        customer_id:       "C009".into(),
        amount:            500.0,
        refund_date:       Utc.with_ymd_and_hms(2025, 3, 14, 16, 0, 0).unwrap(),
        reason:            "manual_credit".into(),
        processor:         "manual".into(),
        linked_payment_id: None,
      },
    ],
  }
}

#[tokio::test]
async fn billing_load_and_snapshot_round_trip() {
  let s = store().await;
  let loaded = fixture_snapshot();
  s.load_billing(&loaded).await.unwrap();

  let snapshot = s.billing_snapshot().await.unwrap();
  assert_eq!(snapshot.customers.len(), 4);
  assert_eq!(snapshot.subscriptions.len(), 1);
  assert_eq!(snapshot.invoices.len(), 2);
  assert_eq!(snapshot.refunds.len(), 3);

  let refund = snapshot
    .refunds
    .iter()
    .find(|r| r.refund_id == "REF004")
    .unwrap();
  assert_eq!(
    refund.refund_date,
    Utc.with_ymd_and_hms(2025, 3, 14, 14, 45, 0).unwrap()
  );
  assert_eq!(refund.linked_payment_id.as_deref(), Some("PAY003"));
}

#[tokio::test]
async fn clear_billing_empties_all_tables() {
  let s = store().await;
  s.load_billing(&fixture_snapshot()).await.unwrap();
  s.clear_billing().await.unwrap();
  assert!(s.billing_snapshot().await.unwrap().is_empty());
}

// ─── Full pipeline loop ──────────────────────────────────────────────────────

async fn triage() -> Triage<SqliteStore, HeuristicAnalyzer> {
  let s = store().await;
  s.load_billing(&fixture_snapshot()).await.unwrap();
  Triage::new(s, HeuristicAnalyzer)
}

#[tokio::test]
async fn run_triage_ranks_and_persists_cases() {
  let t = triage().await;
  let cases = t.run_triage(Some("RUN-a1b2c3d4".into())).await.unwrap();

  // Every finding lands in the high band, so ranking is impact alone.
  // INV010 is flagged twice (underbilled and tier-mismatched, $300 each);
  // the stable sort keeps the underbilling finding first.
  assert_eq!(cases.len(), 5);
  let impacts: Vec<f64> = cases.iter().map(|c| c.estimated_impact).collect();
  assert_eq!(impacts, vec![500.0, 300.0, 300.0, 150.0, 100.0]);
  assert_eq!(cases[0].anomaly_type, AnomalyType::ManualCredit);
  assert_eq!(cases[0].severity, Severity::High);
  assert_eq!(cases[1].anomaly_type, AnomalyType::Underbilling);
  assert_eq!(cases[2].anomaly_type, AnomalyType::TierMismatch);
  assert!(cases.iter().all(|c| c.status == CaseStatus::Open));
  assert!(cases.iter().all(|c| c.sentiment.is_some()));

  // Persisted under the same run.
  let persisted = t.store().cases_by_run("RUN-a1b2c3d4").await.unwrap();
  assert_eq!(persisted.len(), 5);
  assert_eq!(persisted[0].case_id, cases[0].case_id);
}

#[tokio::test]
async fn rerun_clears_prior_cases() {
  let t = triage().await;
  t.run_triage(Some("RUN-first000".into())).await.unwrap();
  let second = t.run_triage(Some("RUN-second00".into())).await.unwrap();

  assert!(t.store().cases_by_run("RUN-first000").await.unwrap().is_empty());
  assert_eq!(
    t.store().cases_by_run("RUN-second00").await.unwrap().len(),
    second.len()
  );
}

#[tokio::test]
async fn feedback_on_unknown_case_is_rejected_before_writes() {
  let t = triage().await;
  let err = t
    .submit_feedback(NewFeedback {
      target_type:   TargetType::Case,
      target_id:     "CASE-UND-zzzzzz-99".into(),
      feedback_type: FeedbackType::Approve,
      comment:       String::new(),
    })
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    TriageError::Invalid(tally_core::Error::CaseNotFound(_))
  ));
  assert!(t.store().all_feedback().await.unwrap().is_empty());
}

#[tokio::test]
async fn false_positive_feedback_tunes_memory_and_downgrades_rerun() {
  let t = triage().await;
  let cases = t.run_triage(None).await.unwrap();
  let dup = cases
    .iter()
    .find(|c| c.anomaly_type == AnomalyType::DuplicateRefund)
    .unwrap();
  assert_eq!(dup.confidence, Confidence::High);

  let (item, changed) = t
    .submit_feedback(NewFeedback {
      target_type:   TargetType::Case,
      target_id:     dup.case_id.clone(),
      feedback_type: FeedbackType::FalsePositive,
      comment:       "both refunds were legitimate".into(),
    })
    .await
    .unwrap();
  assert_eq!(item.feedback_type, FeedbackType::FalsePositive);

  // Penalty bumped and window narrowed, both attributed to feedback.
  assert_eq!(changed.len(), 2);
  let penalty = changed
    .iter()
    .find(|e| e.key == keys::FALSE_POSITIVE_PENALTY)
    .unwrap();
  assert_eq!(penalty.value, ThresholdValue::Number(0.15));
  assert_eq!(penalty.source, ThresholdSource::Feedback);
  let window = changed
    .iter()
    .find(|e| e.key == keys::DUPLICATE_REFUND_WINDOW_HOURS)
    .unwrap();
  assert_eq!(window.value, ThresholdValue::Number(1.5));

  let flagged = t.store().get_case(&dup.case_id).await.unwrap().unwrap();
  assert_eq!(flagged.status, CaseStatus::FalsePositive);

  // The rerun deprioritizes the flagged pattern: confidence down one
  // level, impact discounted by the penalty.
  let rerun = t.run_triage(None).await.unwrap();
  let dup = rerun
    .iter()
    .find(|c| c.anomaly_type == AnomalyType::DuplicateRefund)
    .unwrap();
  assert_eq!(dup.confidence, Confidence::Medium);
  assert_eq!(dup.estimated_impact, 127.5);
}

#[tokio::test]
async fn false_positive_downgrade_never_reverts_on_later_reruns() {
  let t = triage().await;
  let cases = t.run_triage(None).await.unwrap();
  let dup = cases
    .iter()
    .find(|c| c.anomaly_type == AnomalyType::DuplicateRefund)
    .unwrap();

  t.submit_feedback(NewFeedback {
    target_type:   TargetType::Case,
    target_id:     dup.case_id.clone(),
    feedback_type: FeedbackType::FalsePositive,
    comment:       String::new(),
  })
  .await
  .unwrap();

  // The flagged case itself is deleted by the first rerun's clear, but the
  // anomaly type was captured on the feedback item, so confidence for the
  // type never climbs back on any later run.
  for _ in 0..3 {
    let rerun = t.run_triage(None).await.unwrap();
    let dup = rerun
      .iter()
      .find(|c| c.anomaly_type == AnomalyType::DuplicateRefund)
      .unwrap();
    assert_eq!(dup.confidence, Confidence::Medium);
    assert_eq!(dup.estimated_impact, 127.5);
  }
}

#[tokio::test]
async fn approve_decays_the_penalty() {
  let t = triage().await;
  let cases = t.run_triage(None).await.unwrap();
  let dup = cases
    .iter()
    .find(|c| c.anomaly_type == AnomalyType::DuplicateRefund)
    .unwrap()
    .case_id
    .clone();
  let under = cases
    .iter()
    .find(|c| c.anomaly_type == AnomalyType::Underbilling)
    .unwrap()
    .case_id
    .clone();

  t.submit_feedback(NewFeedback {
    target_type:   TargetType::Case,
    target_id:     dup,
    feedback_type: FeedbackType::FalsePositive,
    comment:       String::new(),
  })
  .await
  .unwrap();

  let (_, changed) = t
    .submit_feedback(NewFeedback {
      target_type:   TargetType::Case,
      target_id:     under,
      feedback_type: FeedbackType::Approve,
      comment:       String::new(),
    })
    .await
    .unwrap();
  let penalty = changed
    .iter()
    .find(|e| e.key == keys::FALSE_POSITIVE_PENALTY)
    .unwrap();
  assert_eq!(penalty.value, ThresholdValue::Number(0.1));
}

#[tokio::test]
async fn analyst_feedback_toggles_explanation_style() {
  let t = triage().await;
  let (_, changed) = t
    .submit_feedback(NewFeedback {
      target_type:   TargetType::Analyst,
      target_id:     "summary-1".into(),
      feedback_type: FeedbackType::NotUseful,
      comment:       "too verbose".into(),
    })
    .await
    .unwrap();
  assert_eq!(changed.len(), 1);
  assert_eq!(changed[0].key, keys::EXPLANATION_STYLE);
  assert_eq!(changed[0].value, ThresholdValue::Text("concise".into()));
}

#[tokio::test]
async fn improvement_summary_reports_drift() {
  let t = triage().await;
  let fresh = t.improvement_summary().await.unwrap();
  assert!(fresh.changes.is_empty());
  assert_eq!(fresh.improvement_notes.len(), 1);

  let cases = t.run_triage(None).await.unwrap();
  let dup = cases
    .iter()
    .find(|c| c.anomaly_type == AnomalyType::DuplicateRefund)
    .unwrap()
    .case_id
    .clone();
  t.submit_feedback(NewFeedback {
    target_type:   TargetType::Case,
    target_id:     dup.clone(),
    feedback_type: FeedbackType::FalsePositive,
    comment:       String::new(),
  })
  .await
  .unwrap();

  let summary = t.improvement_summary().await.unwrap();
  assert_eq!(summary.changes.len(), 2);
  assert_eq!(summary.false_positive_case_ids, vec![dup]);
  assert!(
    summary
      .improvement_notes
      .iter()
      .any(|n| n.contains("Confidence penalty of 15%"))
  );
}
