//! Typed rows for the five logical billing tables, and the read-only
//! snapshot detectors run against.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
  pub customer_id:   String,
  pub customer_name: String,
  pub region:        String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
  pub subscription_id: String,
  pub customer_id:     String,
  pub plan_tier:       String,
  /// `"active"` subscriptions participate in tier-mismatch detection.
  pub billing_status:  String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
  pub invoice_id:       String,
  pub customer_id:      String,
  pub billed_amount:    f64,
  pub expected_amount:  f64,
  pub plan_tier_billed: String,
  pub invoice_date:     NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
  pub payment_id:   String,
  pub invoice_id:   String,
  pub customer_id:  String,
  pub amount:       f64,
  pub payment_date: NaiveDate,
  pub processor:    String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
  pub refund_id:         String,
  pub customer_id:       String,
  pub amount:            f64,
  pub refund_date:       DateTime<Utc>,
  /// Free-text reason; `"manual_credit"` triggers the manual-credit detector.
  pub reason:            String,
  pub processor:         String,
  pub linked_payment_id: Option<String>,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// An in-memory copy of the billing tables taken at the start of a triage
/// run. Detectors only ever read from this; no detector writes anywhere.
#[derive(Debug, Clone, Default)]
pub struct BillingSnapshot {
  pub customers:     Vec<Customer>,
  pub subscriptions: Vec<Subscription>,
  pub invoices:      Vec<Invoice>,
  pub payments:      Vec<Payment>,
  pub refunds:       Vec<Refund>,
}

impl BillingSnapshot {
  pub fn customer(&self, customer_id: &str) -> Option<&Customer> {
    self.customers.iter().find(|c| c.customer_id == customer_id)
  }

  pub fn is_empty(&self) -> bool {
    self.customers.is_empty()
      && self.subscriptions.is_empty()
      && self.invoices.is_empty()
      && self.payments.is_empty()
      && self.refunds.is_empty()
  }
}
