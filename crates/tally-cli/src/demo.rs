//! Deterministic demo billing dataset.
//!
//! Dates are relative to today so the demo always looks fresh. Five
//! anomalies are seeded for reliable detection with default thresholds:
//!
//!   1. Duplicate refund: C003, $150.00 twice within 45 minutes
//!   2. Underbilling: C005 expected $299 but billed $199 (INV008)
//!   3. Tier mismatch: C007 on enterprise billed as pro (INV010)
//!   4. Refund spike: five EMEA refunds on one day against a quiet baseline
//!   5. Suspicious manual credit: C009, $500 refund with reason manual_credit
//!
//! The mismatched invoice (INV010) also carries a $300 billing gap, so the
//! underbilling detector flags it as well, for six findings in total.

use chrono::{DateTime, Days, NaiveDate, Utc};
use tally_core::data::{
  BillingSnapshot, Customer, Invoice, Payment, Refund, Subscription,
};

fn day(days_ago: u64) -> NaiveDate {
  Utc::now()
    .date_naive()
    .checked_sub_days(Days::new(days_ago))
    .unwrap_or_default()
}

fn at(days_ago: u64, hour: u32, minute: u32) -> DateTime<Utc> {
  day(days_ago)
    .and_hms_opt(hour, minute, 0)
    .unwrap_or_default()
    .and_utc()
}

fn customer(id: &str, name: &str, region: &str) -> Customer {
  Customer {
    customer_id:   id.into(),
    customer_name: name.into(),
    region:        region.into(),
  }
}

fn subscription(id: &str, cust: &str, tier: &str, status: &str) -> Subscription {
  Subscription {
    subscription_id: id.into(),
    customer_id:     cust.into(),
    plan_tier:       tier.into(),
    billing_status:  status.into(),
  }
}

fn invoice(
  id: &str,
  cust: &str,
  days_ago: u64,
  billed: f64,
  expected: f64,
  tier: &str,
) -> Invoice {
  Invoice {
    invoice_id:       id.into(),
    customer_id:      cust.into(),
    billed_amount:    billed,
    expected_amount:  expected,
    plan_tier_billed: tier.into(),
    invoice_date:     day(days_ago),
  }
}

fn payment(id: &str, inv: &str, cust: &str, days_ago: u64, amount: f64) -> Payment {
  Payment {
    payment_id:   id.into(),
    invoice_id:   inv.into(),
    customer_id:  cust.into(),
    amount,
    payment_date: day(days_ago),
    processor:    "stripe".into(),
  }
}

#[allow(clippy::too_many_arguments)]
fn refund(
  id: &str,
  cust: &str,
  days_ago: u64,
  hour: u32,
  minute: u32,
  amount: f64,
  reason: &str,
  processor: &str,
  linked: &str,
) -> Refund {
  Refund {
    refund_id:         id.into(),
    customer_id:       cust.into(),
    amount,
    refund_date:       at(days_ago, hour, minute),
    reason:            reason.into(),
    processor:         processor.into(),
    linked_payment_id: Some(linked.into()),
  }
}

/// The full demo dataset.
pub fn snapshot() -> BillingSnapshot {
  BillingSnapshot {
    customers:     vec![
      customer("C001", "Acme Corp", "NA"),
      customer("C002", "Globex Inc", "NA"),
      customer("C003", "Initech", "NA"),
      customer("C004", "Umbrella Ltd", "EMEA"),
      customer("C005", "Stark Industries", "NA"),
      customer("C006", "Wayne Enterprises", "EMEA"),
      customer("C007", "Cyberdyne Systems", "APAC"),
      customer("C008", "Soylent Corp", "EMEA"),
      customer("C009", "Tyrell Corp", "EMEA"),
      customer("C010", "Wonka Industries", "APAC"),
    ],
    subscriptions: vec![
      subscription("SUB001", "C001", "enterprise", "active"),
      subscription("SUB002", "C002", "pro", "active"),
      subscription("SUB003", "C003", "starter", "active"),
      subscription("SUB004", "C004", "enterprise", "active"),
      subscription("SUB005", "C005", "enterprise", "active"),
      subscription("SUB006", "C006", "pro", "active"),
      subscription("SUB007", "C007", "enterprise", "active"),
      subscription("SUB008", "C008", "starter", "active"),
      subscription("SUB009", "C009", "pro", "active"),
      subscription("SUB010", "C010", "starter", "cancelled"),
    ],
    invoices:      vec![
      invoice("INV001", "C001", 30, 499.00, 499.00, "enterprise"),
      invoice("INV002", "C002", 30, 199.00, 199.00, "pro"),
      invoice("INV003", "C003", 30, 49.00, 49.00, "starter"),
      invoice("INV004", "C004", 30, 499.00, 499.00, "enterprise"),
      invoice("INV005", "C001", 2, 499.00, 499.00, "enterprise"),
      invoice("INV006", "C002", 2, 199.00, 199.00, "pro"),
      invoice("INV007", "C003", 2, 49.00, 49.00, "starter"),
      // Underbilling: C005 should be $299 but was billed $199.
      invoice("INV008", "C005", 2, 199.00, 299.00, "enterprise"),
      invoice("INV009", "C006", 2, 199.00, 199.00, "pro"),
      // Tier mismatch: C007 is enterprise but billed as pro.
      invoice("INV010", "C007", 2, 199.00, 499.00, "pro"),
      invoice("INV011", "C008", 2, 49.00, 49.00, "starter"),
      invoice("INV012", "C009", 2, 199.00, 199.00, "pro"),
      invoice("INV013", "C005", 32, 299.00, 299.00, "enterprise"),
      invoice("INV014", "C007", 32, 499.00, 499.00, "enterprise"),
      invoice("INV015", "C006", 32, 199.00, 199.00, "pro"),
      invoice("INV016", "C004", 2, 499.00, 499.00, "enterprise"),
    ],
    payments:      vec![
      payment("PAY001", "INV001", "C001", 30, 499.00),
      payment("PAY002", "INV002", "C002", 30, 199.00),
      payment("PAY003", "INV003", "C003", 30, 49.00),
      payment("PAY004", "INV004", "C004", 30, 499.00),
      payment("PAY005", "INV005", "C001", 2, 499.00),
      payment("PAY006", "INV006", "C002", 2, 199.00),
      payment("PAY007", "INV007", "C003", 2, 49.00),
      payment("PAY008", "INV008", "C005", 2, 199.00),
      payment("PAY009", "INV009", "C006", 2, 199.00),
      payment("PAY010", "INV010", "C007", 2, 199.00),
      payment("PAY011", "INV011", "C008", 2, 49.00),
      payment("PAY012", "INV012", "C009", 2, 199.00),
      payment("PAY013", "INV013", "C005", 32, 299.00),
      payment("PAY014", "INV014", "C007", 32, 499.00),
      payment("PAY015", "INV015", "C006", 32, 199.00),
      payment("PAY016", "INV016", "C004", 2, 499.00),
    ],
    refunds:       vec![
      refund("REF001", "C002", 25, 10, 0, 50.00, "service_issue", "stripe", "PAY002"),
      refund("REF002", "C001", 20, 10, 0, 100.00, "billing_error", "stripe", "PAY001"),
      // Duplicate refund: C003, same amount, 45 minutes apart.
      refund("REF003", "C003", 1, 14, 0, 150.00, "overcharge", "stripe", "PAY007"),
      refund("REF004", "C003", 1, 14, 45, 150.00, "overcharge", "stripe", "PAY007"),
      // Refund spike: five EMEA refunds on the same day (the manual
      // credit below is the fifth).
      refund("REF005", "C004", 1, 9, 0, 200.00, "service_issue", "stripe", "PAY004"),
      refund("REF006", "C006", 1, 10, 0, 199.00, "billing_error", "stripe", "PAY009"),
      refund("REF007", "C008", 1, 11, 0, 49.00, "service_issue", "stripe", "PAY011"),
      refund("REF008", "C009", 1, 12, 0, 180.00, "overcharge", "stripe", "PAY012"),
      // Suspicious manual credit.
      refund("REF009", "C009", 1, 16, 0, 500.00, "manual_credit", "manual", "PAY012"),
      // Older refunds giving EMEA its quiet baseline.
      refund("REF010", "C004", 35, 10, 0, 50.00, "service_issue", "stripe", "PAY004"),
      refund("REF011", "C006", 40, 10, 0, 30.00, "billing_error", "stripe", "PAY015"),
    ],
  }
}
