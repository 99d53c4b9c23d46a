//! Rule-based anomaly detectors.
//!
//! Each detector is a pure function of the billing snapshot and the current
//! threshold memory. Detectors never mutate threshold memory or stored
//! cases, and a failing detector is isolated by [`run_all`]: its error is
//! logged and the run proceeds with the remaining detectors' results.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::{
  Error, Result,
  anomaly::{AnomalyDetails, AnomalyType, RawAnomaly},
  data::BillingSnapshot,
  memory::Thresholds,
};

/// Hard floor on daily refund count for spike detection, so low-volume
/// regions are not flagged on noise.
const SPIKE_MIN_DAILY_COUNT: u32 = 3;

fn cents(amount: f64) -> i64 {
  (amount * 100.0).round() as i64
}

// ─── 1. Duplicate refunds ────────────────────────────────────────────────────

/// Flags unordered pairs of refunds for the same customer with identical
/// amounts whose timestamps differ by less than the configured window.
/// One anomaly per pair; a refund is never paired with itself, and pair
/// ordering by refund id guarantees no pair is emitted twice.
pub fn detect_duplicate_refunds(
  snapshot: &BillingSnapshot,
  thresholds: &Thresholds,
) -> Result<Vec<RawAnomaly>> {
  let window_hours = thresholds.duplicate_refund_window_hours;
  let window_seconds = window_hours * 3600.0;

  let mut results = Vec::new();
  for a in &snapshot.refunds {
    for b in &snapshot.refunds {
      if a.refund_id >= b.refund_id
        || a.customer_id != b.customer_id
        || cents(a.amount) != cents(b.amount)
      {
        continue;
      }
      let delta = (b.refund_date - a.refund_date).num_seconds().abs() as f64;
      if delta >= window_seconds {
        continue;
      }

      results.push(RawAnomaly {
        details:    AnomalyDetails::DuplicateRefund {
          customer_id: a.customer_id.clone(),
          refund_ids:  [a.refund_id.clone(), b.refund_id.clone()],
          payment_id:  a.linked_payment_id.clone(),
        },
        evidence:   vec![
          format!(
            "Refunds {} and {} for customer {}",
            a.refund_id, b.refund_id, a.customer_id
          ),
          format!(
            "Same amount ${:.2} within {window_hours}h window",
            a.amount
          ),
          format!(
            "Dates: {} -> {}",
            a.refund_date.format("%Y-%m-%d %H:%M:%S"),
            b.refund_date.format("%Y-%m-%d %H:%M:%S")
          ),
          format!("Reason: {}", a.reason),
        ],
        // The duplicated amount, not double-counted.
        raw_impact: a.amount,
      });
    }
  }
  Ok(results)
}

// ─── 2. Underbilling ─────────────────────────────────────────────────────────

/// Flags invoices where `expected_amount - billed_amount` exceeds the
/// underbilling threshold. Fires iff the gap is strictly greater.
pub fn detect_underbilling(
  snapshot: &BillingSnapshot,
  thresholds: &Thresholds,
) -> Result<Vec<RawAnomaly>> {
  let threshold = thresholds.underbilling_threshold;

  let mut results = Vec::new();
  for invoice in &snapshot.invoices {
    let gap = invoice.expected_amount - invoice.billed_amount;
    if gap <= threshold {
      continue;
    }

    let customer = snapshot.customer(&invoice.customer_id).ok_or_else(|| {
      Error::UnknownCustomer {
        record_id:   invoice.invoice_id.clone(),
        customer_id: invoice.customer_id.clone(),
      }
    })?;

    results.push(RawAnomaly {
      details:    AnomalyDetails::Underbilling {
        customer_id:   invoice.customer_id.clone(),
        customer_name: customer.customer_name.clone(),
        invoice_id:    invoice.invoice_id.clone(),
      },
      evidence:   vec![
        format!(
          "Invoice {} for {} ({})",
          invoice.invoice_id, customer.customer_name, invoice.customer_id
        ),
        format!(
          "Billed ${:.2} but expected ${:.2}",
          invoice.billed_amount, invoice.expected_amount
        ),
        format!("Revenue gap: ${gap:.2}"),
        format!("Invoice date: {}", invoice.invoice_date),
      ],
      raw_impact: gap,
    });
  }
  Ok(results)
}

// ─── 3. Tier mismatch ────────────────────────────────────────────────────────

/// Flags invoices billed on a different tier than the customer's active
/// subscription. No threshold parameter; the mismatch alone qualifies.
pub fn detect_tier_mismatch(
  snapshot: &BillingSnapshot,
  _thresholds: &Thresholds,
) -> Result<Vec<RawAnomaly>> {
  let mut results = Vec::new();
  for invoice in &snapshot.invoices {
    let Some(subscription) = snapshot
      .subscriptions
      .iter()
      .find(|s| {
        s.customer_id == invoice.customer_id && s.billing_status == "active"
      })
    else {
      continue;
    };
    if subscription.plan_tier == invoice.plan_tier_billed {
      continue;
    }

    let customer = snapshot.customer(&invoice.customer_id).ok_or_else(|| {
      Error::UnknownCustomer {
        record_id:   invoice.invoice_id.clone(),
        customer_id: invoice.customer_id.clone(),
      }
    })?;

    let impact = invoice.expected_amount - invoice.billed_amount;
    results.push(RawAnomaly {
      details:    AnomalyDetails::TierMismatch {
        customer_id:       invoice.customer_id.clone(),
        customer_name:     customer.customer_name.clone(),
        invoice_id:        invoice.invoice_id.clone(),
        subscription_tier: subscription.plan_tier.clone(),
        billed_tier:       invoice.plan_tier_billed.clone(),
      },
      evidence:   vec![
        format!(
          "Invoice {} for {} ({})",
          invoice.invoice_id, customer.customer_name, invoice.customer_id
        ),
        format!(
          "Subscription tier: {}, but billed as: {}",
          subscription.plan_tier, invoice.plan_tier_billed
        ),
        format!(
          "Billed ${:.2} vs expected ${:.2}",
          invoice.billed_amount, invoice.expected_amount
        ),
        format!("Invoice date: {}", invoice.invoice_date),
      ],
      raw_impact: impact.max(0.0),
    });
  }
  Ok(results)
}

// ─── 4. Refund spike ─────────────────────────────────────────────────────────

/// Per region, compares each day's refund count against the mean daily
/// count over all observed days for that region. Regions with fewer than
/// two distinct days of data are skipped (no meaningful baseline).
pub fn detect_refund_spike(
  snapshot: &BillingSnapshot,
  thresholds: &Thresholds,
) -> Result<Vec<RawAnomaly>> {
  let multiplier = thresholds.refund_spike_multiplier;

  // region -> day -> (count, total amount); BTreeMaps keep output order
  // deterministic across runs.
  let mut by_region: BTreeMap<String, BTreeMap<NaiveDate, (u32, f64)>> =
    BTreeMap::new();
  for refund in &snapshot.refunds {
    let customer =
      snapshot.customer(&refund.customer_id).ok_or_else(|| {
        Error::UnknownCustomer {
          record_id:   refund.refund_id.clone(),
          customer_id: refund.customer_id.clone(),
        }
      })?;
    let day = refund.refund_date.date_naive();
    let slot = by_region
      .entry(customer.region.clone())
      .or_default()
      .entry(day)
      .or_insert((0, 0.0));
    slot.0 += 1;
    slot.1 += refund.amount;
  }

  let mut results = Vec::new();
  for (region, days) in &by_region {
    if days.len() < 2 {
      continue;
    }
    let baseline =
      days.values().map(|(count, _)| *count as f64).sum::<f64>()
        / days.len() as f64;
    let threshold_count = baseline * multiplier;

    for (day, (count, amount)) in days {
      if (*count as f64) <= threshold_count || *count < SPIKE_MIN_DAILY_COUNT
      {
        continue;
      }
      results.push(RawAnomaly {
        details:    AnomalyDetails::RefundSpike {
          region:       region.clone(),
          date:         *day,
          refund_count: *count,
        },
        evidence:   vec![
          format!("Region {region} on {day}: {count} refunds"),
          format!("Baseline average: {baseline:.1} refunds/day"),
          format!("Threshold ({multiplier}x): {threshold_count:.1}"),
          format!("Total refund amount: ${amount:.2}"),
        ],
        raw_impact: *amount,
      });
    }
  }
  Ok(results)
}

// ─── 5. Suspicious manual credits ────────────────────────────────────────────

/// Flags refunds with reason `manual_credit` above the configured amount.
pub fn detect_manual_credits(
  snapshot: &BillingSnapshot,
  thresholds: &Thresholds,
) -> Result<Vec<RawAnomaly>> {
  let threshold = thresholds.manual_credit_threshold;

  let mut results = Vec::new();
  for refund in &snapshot.refunds {
    if refund.reason != "manual_credit" || refund.amount <= threshold {
      continue;
    }

    let customer =
      snapshot.customer(&refund.customer_id).ok_or_else(|| {
        Error::UnknownCustomer {
          record_id:   refund.refund_id.clone(),
          customer_id: refund.customer_id.clone(),
        }
      })?;

    results.push(RawAnomaly {
      details:    AnomalyDetails::ManualCredit {
        customer_id:   refund.customer_id.clone(),
        customer_name: customer.customer_name.clone(),
        refund_id:     refund.refund_id.clone(),
      },
      evidence:   vec![
        format!(
          "Refund {} for {} ({})",
          refund.refund_id, customer.customer_name, refund.customer_id
        ),
        format!(
          "Manual credit of ${:.2} via {}",
          refund.amount, refund.processor
        ),
        format!(
          "Date: {}",
          refund.refund_date.format("%Y-%m-%d %H:%M:%S")
        ),
        format!("Exceeds threshold of ${threshold:.2}"),
      ],
      raw_impact: refund.amount,
    });
  }
  Ok(results)
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// One registered detector: the anomaly type it emits and its entry point.
pub struct Detector {
  pub anomaly_type: AnomalyType,
  pub run: fn(&BillingSnapshot, &Thresholds) -> Result<Vec<RawAnomaly>>,
}

/// All five detectors in their canonical emission order.
pub fn default_detectors() -> Vec<Detector> {
  vec![
    Detector {
      anomaly_type: AnomalyType::DuplicateRefund,
      run:          detect_duplicate_refunds,
    },
    Detector {
      anomaly_type: AnomalyType::Underbilling,
      run:          detect_underbilling,
    },
    Detector {
      anomaly_type: AnomalyType::TierMismatch,
      run:          detect_tier_mismatch,
    },
    Detector {
      anomaly_type: AnomalyType::RefundSpike,
      run:          detect_refund_spike,
    },
    Detector {
      anomaly_type: AnomalyType::ManualCredit,
      run:          detect_manual_credits,
    },
  ]
}

/// Run every detector, collecting results in emission order. A detector
/// error contributes zero anomalies and is never fatal to the run.
pub fn run_all(
  snapshot: &BillingSnapshot,
  thresholds: &Thresholds,
  detectors: &[Detector],
) -> Vec<RawAnomaly> {
  let mut all = Vec::new();
  for detector in detectors {
    match (detector.run)(snapshot, thresholds) {
      Ok(found) => {
        tracing::debug!(
          detector = %detector.anomaly_type,
          count = found.len(),
          "detector finished"
        );
        all.extend(found);
      }
      Err(error) => {
        tracing::warn!(
          detector = %detector.anomaly_type,
          %error,
          "detector failed; continuing with remaining detectors"
        );
      }
    }
  }
  all
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::data::{Customer, Invoice, Refund, Subscription};

  fn customer(id: &str, name: &str, region: &str) -> Customer {
    Customer {
      customer_id:   id.into(),
      customer_name: name.into(),
      region:        region.into(),
    }
  }

  fn refund(
    id: &str,
    customer_id: &str,
    amount: f64,
    day: u32,
    hour: u32,
    minute: u32,
    reason: &str,
  ) -> Refund {
    Refund {
      refund_id:         id.into(),
      customer_id:       customer_id.into(),
      amount,
      refund_date:       Utc
        .with_ymd_and_hms(2025, 3, day, hour, minute, 0)
        .unwrap(),
      reason:            reason.into(),
      processor:         "stripe".into(),
      linked_payment_id: None,
    }
  }

  fn invoice(
    id: &str,
    customer_id: &str,
    billed: f64,
    expected: f64,
    tier: &str,
  ) -> Invoice {
    Invoice {
      invoice_id:       id.into(),
      customer_id:      customer_id.into(),
      billed_amount:    billed,
      expected_amount:  expected,
      plan_tier_billed: tier.into(),
      invoice_date:     NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
    }
  }

  fn subscription(customer_id: &str, tier: &str, status: &str) -> Subscription {
    Subscription {
      subscription_id: format!("SUB-{customer_id}"),
      customer_id:     customer_id.into(),
      plan_tier:       tier.into(),
      billing_status:  status.into(),
    }
  }

  // ── Duplicate refunds ─────────────────────────────────────────────────────

  #[test]
  fn duplicate_refund_pair_within_window_flagged_once() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C003", "Initech", "NA")],
      refunds: vec![
        refund("REF003", "C003", 150.0, 14, 14, 0, "overcharge"),
        refund("REF004", "C003", 150.0, 14, 14, 45, "overcharge"),
      ],
      ..Default::default()
    };
    let found =
      detect_duplicate_refunds(&snapshot, &Thresholds::default()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].raw_impact, 150.0);
    assert!(found[0].evidence[0].contains("REF003"));
    assert!(found[0].evidence[0].contains("REF004"));
  }

  #[test]
  fn duplicate_refund_outside_window_not_flagged() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C003", "Initech", "NA")],
      refunds: vec![
        refund("REF001", "C003", 150.0, 14, 10, 0, "overcharge"),
        refund("REF002", "C003", 150.0, 14, 12, 0, "overcharge"),
      ],
      ..Default::default()
    };
    // Exactly 2h apart; the window is strict ("less than").
    let found =
      detect_duplicate_refunds(&snapshot, &Thresholds::default()).unwrap();
    assert!(found.is_empty());
  }

  #[test]
  fn duplicate_refund_different_amounts_not_flagged() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C003", "Initech", "NA")],
      refunds: vec![
        refund("REF001", "C003", 150.0, 14, 14, 0, "overcharge"),
        refund("REF002", "C003", 149.0, 14, 14, 30, "overcharge"),
      ],
      ..Default::default()
    };
    let found =
      detect_duplicate_refunds(&snapshot, &Thresholds::default()).unwrap();
    assert!(found.is_empty());
  }

  #[test]
  fn duplicate_refund_triple_yields_three_pairs() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C003", "Initech", "NA")],
      refunds: vec![
        refund("REF001", "C003", 150.0, 14, 14, 0, "overcharge"),
        refund("REF002", "C003", 150.0, 14, 14, 20, "overcharge"),
        refund("REF003", "C003", 150.0, 14, 14, 40, "overcharge"),
      ],
      ..Default::default()
    };
    // Each unordered pair once, never a refund against itself.
    let found =
      detect_duplicate_refunds(&snapshot, &Thresholds::default()).unwrap();
    assert_eq!(found.len(), 3);
  }

  #[test]
  fn narrower_window_reduces_duplicate_matches() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C003", "Initech", "NA")],
      refunds: vec![
        refund("REF001", "C003", 150.0, 14, 14, 0, "overcharge"),
        refund("REF002", "C003", 150.0, 14, 15, 30, "overcharge"),
      ],
      ..Default::default()
    };
    let wide = Thresholds::default();
    let narrow = Thresholds {
      duplicate_refund_window_hours: 1.0,
      ..Thresholds::default()
    };
    assert_eq!(
      detect_duplicate_refunds(&snapshot, &wide).unwrap().len(),
      1
    );
    assert!(
      detect_duplicate_refunds(&snapshot, &narrow)
        .unwrap()
        .is_empty()
    );
  }

  // ── Underbilling ──────────────────────────────────────────────────────────

  #[test]
  fn underbilling_fires_iff_gap_exceeds_threshold() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C005", "Stark Industries", "NA")],
      invoices: vec![
        invoice("INV008", "C005", 199.0, 299.0, "enterprise"),
        invoice("INV009", "C005", 290.0, 299.0, "enterprise"),
        invoice("INV010", "C005", 289.0, 299.0, "enterprise"),
      ],
      ..Default::default()
    };
    let found =
      detect_underbilling(&snapshot, &Thresholds::default()).unwrap();
    // $100 gap and exactly-$10 gap: only the first fires (strictly greater).
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].raw_impact, 100.0);
    assert!(found[0].evidence[2].contains("$100.00"));
  }

  #[test]
  fn raising_underbilling_threshold_reduces_findings() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C005", "Stark Industries", "NA")],
      invoices: vec![
        invoice("INV001", "C005", 280.0, 299.0, "enterprise"),
        invoice("INV002", "C005", 199.0, 299.0, "enterprise"),
      ],
      ..Default::default()
    };
    let before =
      detect_underbilling(&snapshot, &Thresholds::default()).unwrap();
    let after = detect_underbilling(&snapshot, &Thresholds {
      underbilling_threshold: 35.0,
      ..Thresholds::default()
    })
    .unwrap();
    assert_eq!(before.len(), 2);
    assert_eq!(after.len(), 1);
  }

  #[test]
  fn underbilling_with_unknown_customer_is_an_error() {
    let snapshot = BillingSnapshot {
      invoices: vec![invoice("INV001", "C999", 100.0, 300.0, "pro")],
      ..Default::default()
    };
    let err =
      detect_underbilling(&snapshot, &Thresholds::default()).unwrap_err();
    assert!(matches!(err, Error::UnknownCustomer { .. }));
  }

  // ── Tier mismatch ─────────────────────────────────────────────────────────

  #[test]
  fn tier_mismatch_requires_active_subscription() {
    let snapshot = BillingSnapshot {
      customers: vec![
        customer("C007", "Cyberdyne Systems", "APAC"),
        customer("C010", "Wonka Industries", "APAC"),
      ],
      subscriptions: vec![
        subscription("C007", "enterprise", "active"),
        subscription("C010", "starter", "cancelled"),
      ],
      invoices: vec![
        invoice("INV010", "C007", 199.0, 499.0, "pro"),
        invoice("INV011", "C010", 49.0, 49.0, "pro"),
      ],
      ..Default::default()
    };
    let found =
      detect_tier_mismatch(&snapshot, &Thresholds::default()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].raw_impact, 300.0);
    assert!(found[0].evidence[1].contains("enterprise"));
  }

  #[test]
  fn tier_mismatch_impact_floors_at_zero() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C002", "Globex Inc", "NA")],
      subscriptions: vec![subscription("C002", "starter", "active")],
      // Overbilled: expected below billed; mismatch still flagged.
      invoices: vec![invoice("INV002", "C002", 199.0, 49.0, "pro")],
      ..Default::default()
    };
    let found =
      detect_tier_mismatch(&snapshot, &Thresholds::default()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].raw_impact, 0.0);
  }

  // ── Refund spike ──────────────────────────────────────────────────────────

  fn spike_snapshot() -> BillingSnapshot {
    BillingSnapshot {
      customers: vec![
        customer("C004", "Umbrella Ltd", "EMEA"),
        customer("C006", "Wayne Enterprises", "EMEA"),
        customer("C008", "Soylent Corp", "EMEA"),
        customer("C009", "Tyrell Corp", "EMEA"),
      ],
      refunds: vec![
        // Baseline: one refund on an earlier day.
        refund("REF010", "C004", 50.0, 1, 10, 0, "service_issue"),
        // Spike day: four refunds.
        refund("REF005", "C004", 200.0, 14, 9, 0, "service_issue"),
        refund("REF006", "C006", 199.0, 14, 10, 0, "billing_error"),
        refund("REF007", "C008", 49.0, 14, 11, 0, "service_issue"),
        refund("REF008", "C009", 180.0, 14, 12, 0, "overcharge"),
      ],
      ..Default::default()
    }
  }

  #[test]
  fn refund_spike_fires_for_day_above_baseline() {
    // Baseline (1+4)/2 = 2.5; with the default 2.0x multiplier the bar is
    // 5.0, so nothing fires.
    let found =
      detect_refund_spike(&spike_snapshot(), &Thresholds::default())
        .unwrap();
    assert!(found.is_empty());

    // With a 1.5x multiplier the bar is 3.75 and the 4-refund day fires.
    let found = detect_refund_spike(&spike_snapshot(), &Thresholds {
      refund_spike_multiplier: 1.5,
      ..Thresholds::default()
    })
    .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].raw_impact, 200.0 + 199.0 + 49.0 + 180.0);
    match &found[0].details {
      AnomalyDetails::RefundSpike { region, refund_count, .. } => {
        assert_eq!(region, "EMEA");
        assert_eq!(*refund_count, 4);
      }
      other => panic!("unexpected details: {other:?}"),
    }
  }

  #[test]
  fn refund_spike_skips_regions_with_single_day() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C004", "Umbrella Ltd", "EMEA")],
      refunds: vec![
        refund("REF001", "C004", 10.0, 14, 9, 0, "service_issue"),
        refund("REF002", "C004", 10.0, 14, 10, 0, "service_issue"),
        refund("REF003", "C004", 10.0, 14, 11, 0, "service_issue"),
        refund("REF004", "C004", 10.0, 14, 12, 0, "service_issue"),
      ],
      ..Default::default()
    };
    let found =
      detect_refund_spike(&snapshot, &Thresholds::default()).unwrap();
    assert!(found.is_empty());
  }

  #[test]
  fn refund_spike_enforces_minimum_daily_count() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C004", "Umbrella Ltd", "EMEA")],
      refunds: vec![
        // Two observed days: a 1-refund baseline day and a 2-refund day.
        refund("REF001", "C004", 10.0, 1, 9, 0, "service_issue"),
        refund("REF002", "C004", 10.0, 14, 9, 0, "service_issue"),
        refund("REF003", "C004", 10.0, 14, 10, 0, "service_issue"),
      ],
      ..Default::default()
    };
    // Baseline (1+2)/2 = 1.5; 2 > 1.5*1.0 would pass a 1x multiplier, but
    // the hard floor of 3 suppresses it.
    let found = detect_refund_spike(&snapshot, &Thresholds {
      refund_spike_multiplier: 1.0,
      ..Thresholds::default()
    })
    .unwrap();
    assert!(found.is_empty());
  }

  // ── Manual credits ────────────────────────────────────────────────────────

  #[test]
  fn manual_credit_above_threshold_flagged() {
    let snapshot = BillingSnapshot {
      customers: vec![customer("C009", "Tyrell Corp", "EMEA")],
      refunds: vec![
        refund("REF009", "C009", 500.0, 14, 16, 0, "manual_credit"),
        refund("REF010", "C009", 200.0, 14, 17, 0, "manual_credit"),
        refund("REF011", "C009", 500.0, 14, 18, 0, "overcharge"),
      ],
      ..Default::default()
    };
    let found =
      detect_manual_credits(&snapshot, &Thresholds::default()).unwrap();
    // Exactly-at-threshold and wrong-reason refunds do not fire.
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].raw_impact, 500.0);
    assert!(found[0].evidence[3].contains("$200.00"));
  }

  // ── run_all isolation ─────────────────────────────────────────────────────

  #[test]
  fn run_all_isolates_a_failing_detector() {
    fn broken(
      _snapshot: &BillingSnapshot,
      _thresholds: &Thresholds,
    ) -> Result<Vec<RawAnomaly>> {
      Err(Error::UnknownCustomer {
        record_id:   "REF999".into(),
        customer_id: "C999".into(),
      })
    }

    let snapshot = BillingSnapshot {
      customers: vec![customer("C005", "Stark Industries", "NA")],
      invoices: vec![invoice("INV008", "C005", 199.0, 299.0, "enterprise")],
      ..Default::default()
    };
    let detectors = vec![
      Detector { anomaly_type: AnomalyType::RefundSpike, run: broken },
      Detector {
        anomaly_type: AnomalyType::Underbilling,
        run:          detect_underbilling,
      },
    ];
    let found = run_all(&snapshot, &Thresholds::default(), &detectors);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].anomaly_type(), AnomalyType::Underbilling);
  }

  #[test]
  fn run_all_preserves_detector_order() {
    let snapshot = BillingSnapshot {
      customers: vec![
        customer("C003", "Initech", "NA"),
        customer("C005", "Stark Industries", "NA"),
      ],
      invoices: vec![invoice("INV008", "C005", 199.0, 299.0, "enterprise")],
      refunds: vec![
        refund("REF003", "C003", 150.0, 14, 14, 0, "overcharge"),
        refund("REF004", "C003", 150.0, 14, 14, 45, "overcharge"),
      ],
      ..Default::default()
    };
    let found =
      run_all(&snapshot, &Thresholds::default(), &default_detectors());
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].anomaly_type(), AnomalyType::DuplicateRefund);
    assert_eq!(found[1].anomaly_type(), AnomalyType::Underbilling);
  }
}
