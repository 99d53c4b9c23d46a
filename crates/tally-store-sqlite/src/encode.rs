//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings, calendar dates as
//! `YYYY-MM-DD`. Structured fields (threshold values, evidence, details,
//! sentiment reports) are stored as compact JSON. Enum discriminants are
//! stored as the same strings the core types serialise to.

use chrono::{DateTime, NaiveDate, Utc};
use tally_core::{
  anomaly::{AnomalyType, Confidence, Severity},
  case::{Case, CaseStatus},
  data::{Invoice, Payment, Refund},
  feedback::{FeedbackItem, FeedbackType, TargetType},
  memory::{ThresholdEntry, ThresholdSource, ThresholdValue},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("bad date {s:?}: {e}")))
}

// ─── Enum discriminants ──────────────────────────────────────────────────────

pub fn decode_source(s: &str) -> Result<ThresholdSource> {
  match s {
    "system_default" => Ok(ThresholdSource::SystemDefault),
    "feedback" => Ok(ThresholdSource::Feedback),
    "feedback+llm" => Ok(ThresholdSource::FeedbackLlm),
    "manual" => Ok(ThresholdSource::Manual),
    other => Err(Error::Decode(format!("unknown threshold source: {other:?}"))),
  }
}

pub fn decode_anomaly_type(s: &str) -> Result<AnomalyType> {
  AnomalyType::ALL
    .into_iter()
    .find(|t| t.as_str() == s)
    .ok_or_else(|| Error::Decode(format!("unknown anomaly type: {s:?}")))
}

pub fn decode_severity(s: &str) -> Result<Severity> {
  match s {
    "low" => Ok(Severity::Low),
    "medium" => Ok(Severity::Medium),
    "high" => Ok(Severity::High),
    "critical" => Ok(Severity::Critical),
    other => Err(Error::Decode(format!("unknown severity: {other:?}"))),
  }
}

pub fn decode_confidence(s: &str) -> Result<Confidence> {
  match s {
    "low" => Ok(Confidence::Low),
    "medium" => Ok(Confidence::Medium),
    "high" => Ok(Confidence::High),
    other => Err(Error::Decode(format!("unknown confidence: {other:?}"))),
  }
}

pub fn decode_status(s: &str) -> Result<CaseStatus> {
  match s {
    "open" => Ok(CaseStatus::Open),
    "approved" => Ok(CaseStatus::Approved),
    "rejected" => Ok(CaseStatus::Rejected),
    "false_positive" => Ok(CaseStatus::FalsePositive),
    other => Err(Error::Decode(format!("unknown case status: {other:?}"))),
  }
}

pub fn decode_target_type(s: &str) -> Result<TargetType> {
  match s {
    "case" => Ok(TargetType::Case),
    "analyst" => Ok(TargetType::Analyst),
    other => Err(Error::Decode(format!("unknown target type: {other:?}"))),
  }
}

pub fn decode_feedback_type(s: &str) -> Result<FeedbackType> {
  match s {
    "approve" => Ok(FeedbackType::Approve),
    "reject" => Ok(FeedbackType::Reject),
    "false_positive" => Ok(FeedbackType::FalsePositive),
    "useful" => Ok(FeedbackType::Useful),
    "not_useful" => Ok(FeedbackType::NotUseful),
    other => Err(Error::Decode(format!("unknown feedback type: {other:?}"))),
  }
}

// ─── Threshold values ────────────────────────────────────────────────────────

pub fn encode_value(value: &ThresholdValue) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_value(s: &str) -> Result<ThresholdValue> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `thresholds` row.
pub struct RawThreshold {
  pub key:        String,
  pub value_json: String,
  pub reason:     String,
  pub source:     String,
  pub updated_at: String,
}

impl RawThreshold {
  pub fn into_entry(self) -> Result<ThresholdEntry> {
    Ok(ThresholdEntry {
      key:        self.key,
      value:      decode_value(&self.value_json)?,
      reason:     self.reason,
      source:     decode_source(&self.source)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `cases` row.
pub struct RawCase {
  pub case_id:            String,
  pub run_id:             String,
  pub title:              String,
  pub anomaly_type:       String,
  pub severity:           String,
  pub confidence:         String,
  pub estimated_impact:   f64,
  pub evidence:           String,
  pub details:            String,
  pub recommended_action: String,
  pub status:             String,
  pub created_at:         String,
  pub sentiment:          Option<String>,
}

impl RawCase {
  pub fn into_case(self) -> Result<Case> {
    Ok(Case {
      case_id:            self.case_id,
      run_id:             self.run_id,
      title:              self.title,
      anomaly_type:       decode_anomaly_type(&self.anomaly_type)?,
      severity:           decode_severity(&self.severity)?,
      confidence:         decode_confidence(&self.confidence)?,
      estimated_impact:   self.estimated_impact,
      evidence:           serde_json::from_str(&self.evidence)?,
      details:            serde_json::from_str(&self.details)?,
      recommended_action: self.recommended_action,
      status:             decode_status(&self.status)?,
      created_at:         decode_dt(&self.created_at)?,
      sentiment:          self
        .sentiment
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
    })
  }
}

/// A `cases` row pre-encoded for insertion, so the serialisation happens
/// before entering the connection closure.
pub struct CaseRow {
  pub case_id:            String,
  pub run_id:             String,
  pub title:              String,
  pub anomaly_type:       String,
  pub severity:           String,
  pub confidence:         String,
  pub estimated_impact:   f64,
  pub evidence:           String,
  pub details:            String,
  pub recommended_action: String,
  pub status:             String,
  pub created_at:         String,
  pub sentiment:          Option<String>,
}

impl CaseRow {
  pub fn from_case(case: &Case) -> Result<Self> {
    Ok(Self {
      case_id:            case.case_id.clone(),
      run_id:             case.run_id.clone(),
      title:              case.title.clone(),
      anomaly_type:       case.anomaly_type.as_str().to_owned(),
      severity:           case.severity.as_str().to_owned(),
      confidence:         case.confidence.as_str().to_owned(),
      estimated_impact:   case.estimated_impact,
      evidence:           serde_json::to_string(&case.evidence)?,
      details:            serde_json::to_string(&case.details)?,
      recommended_action: case.recommended_action.clone(),
      status:             case.status.as_str().to_owned(),
      created_at:         encode_dt(case.created_at),
      sentiment:          case
        .sentiment
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?,
    })
  }
}

/// Raw strings read directly from a `feedback` row.
pub struct RawFeedback {
  pub feedback_id:   String,
  pub target_type:   String,
  pub target_id:     String,
  pub feedback_type: String,
  pub anomaly_type:  Option<String>,
  pub comment:       String,
  pub timestamp:     String,
}

impl RawFeedback {
  pub fn into_item(self) -> Result<FeedbackItem> {
    Ok(FeedbackItem {
      feedback_id:   self.feedback_id,
      target_type:   decode_target_type(&self.target_type)?,
      target_id:     self.target_id,
      feedback_type: decode_feedback_type(&self.feedback_type)?,
      anomaly_type:  self
        .anomaly_type
        .as_deref()
        .map(decode_anomaly_type)
        .transpose()?,
      comment:       self.comment,
      timestamp:     decode_dt(&self.timestamp)?,
    })
  }
}

/// Raw `invoices` row; only the date needs decoding.
pub struct RawInvoice {
  pub invoice_id:       String,
  pub customer_id:      String,
  pub billed_amount:    f64,
  pub expected_amount:  f64,
  pub plan_tier_billed: String,
  pub invoice_date:     String,
}

impl RawInvoice {
  pub fn into_invoice(self) -> Result<Invoice> {
    Ok(Invoice {
      invoice_id:       self.invoice_id,
      customer_id:      self.customer_id,
      billed_amount:    self.billed_amount,
      expected_amount:  self.expected_amount,
      plan_tier_billed: self.plan_tier_billed,
      invoice_date:     decode_date(&self.invoice_date)?,
    })
  }
}

pub struct RawPayment {
  pub payment_id:   String,
  pub invoice_id:   String,
  pub customer_id:  String,
  pub amount:       f64,
  pub payment_date: String,
  pub processor:    String,
}

impl RawPayment {
  pub fn into_payment(self) -> Result<Payment> {
    Ok(Payment {
      payment_id:   self.payment_id,
      invoice_id:   self.invoice_id,
      customer_id:  self.customer_id,
      amount:       self.amount,
      payment_date: decode_date(&self.payment_date)?,
      processor:    self.processor,
    })
  }
}

pub struct RawRefund {
  pub refund_id:         String,
  pub customer_id:       String,
  pub amount:            f64,
  pub refund_date:       String,
  pub reason:            String,
  pub processor:         String,
  pub linked_payment_id: Option<String>,
}

impl RawRefund {
  pub fn into_refund(self) -> Result<Refund> {
    Ok(Refund {
      refund_id:         self.refund_id,
      customer_id:       self.customer_id,
      amount:            self.amount,
      refund_date:       decode_dt(&self.refund_date)?,
      reason:            self.reason,
      processor:         self.processor,
      linked_payment_id: self.linked_payment_id,
    })
  }
}
