//! [`SqliteStore`] — the SQLite implementation of [`TriageStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use tally_core::{
  anomaly::AnomalyType,
  case::{Case, CaseStatus},
  data::{BillingSnapshot, Customer, Subscription},
  feedback::{FeedbackItem, FeedbackType},
  memory::{self, ThresholdEntry, ThresholdSource, ThresholdValue},
  store::TriageStore,
};

use crate::{
  Error, Result,
  encode::{
    CaseRow, RawCase, RawFeedback, RawInvoice, RawPayment, RawRefund,
    RawThreshold, encode_date, encode_dt, encode_value,
  },
  schema::SCHEMA,
};

const CASE_COLUMNS: &str = "case_id, run_id, title, anomaly_type, severity, \
  confidence, estimated_impact, evidence, details, recommended_action, \
  status, created_at, sentiment";

fn insert_case_row(
  conn: &rusqlite::Connection,
  row: &CaseRow,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO cases (
       case_id, run_id, title, anomaly_type, severity, confidence,
       estimated_impact, evidence, details, recommended_action,
       status, created_at, sentiment
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    rusqlite::params![
      row.case_id,
      row.run_id,
      row.title,
      row.anomaly_type,
      row.severity,
      row.confidence,
      row.estimated_impact,
      row.evidence,
      row.details,
      row.recommended_action,
      row.status,
      row.created_at,
      row.sentiment,
    ],
  )?;
  Ok(())
}

fn case_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCase> {
  Ok(RawCase {
    case_id:            row.get(0)?,
    run_id:             row.get(1)?,
    title:              row.get(2)?,
    anomaly_type:       row.get(3)?,
    severity:           row.get(4)?,
    confidence:         row.get(5)?,
    estimated_impact:   row.get(6)?,
    evidence:           row.get(7)?,
    details:            row.get(8)?,
    recommended_action: row.get(9)?,
    status:             row.get(10)?,
    created_at:         row.get(11)?,
    sentiment:          row.get(12)?,
  })
}

/// The six seeded defaults pre-encoded for insertion.
fn default_rows() -> Result<Vec<(String, String, String)>> {
  memory::defaults()
    .into_iter()
    .map(|(key, value, reason)| {
      Ok((key.to_owned(), encode_value(&value)?, reason.to_owned()))
    })
    .collect()
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally triage store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, run schema initialisation, and
  /// seed any missing threshold defaults.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let rows = default_rows()?;
    let now_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(SCHEMA)?;
        // Seed defaults without touching keys that already hold a
        // feedback-adjusted value.
        for (key, value_json, reason) in &rows {
          conn.execute(
            "INSERT OR IGNORE INTO thresholds (key, value_json, reason, source, updated_at)
             VALUES (?1, ?2, ?3, 'system_default', ?4)",
            rusqlite::params![key, value_json, reason, now_str],
          )?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── TriageStore impl ────────────────────────────────────────────────────────

impl TriageStore for SqliteStore {
  type Error = Error;

  // ── Threshold memory ──────────────────────────────────────────────────────

  async fn get_threshold(&self, key: &str) -> Result<Option<ThresholdEntry>> {
    let key_str = key.to_owned();

    let raw: Option<RawThreshold> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT key, value_json, reason, source, updated_at
             FROM thresholds WHERE key = ?1",
            rusqlite::params![key_str],
            |row| {
              Ok(RawThreshold {
                key:        row.get(0)?,
                value_json: row.get(1)?,
                reason:     row.get(2)?,
                source:     row.get(3)?,
                updated_at: row.get(4)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawThreshold::into_entry).transpose()
  }

  async fn set_threshold(
    &self,
    key: &str,
    value: ThresholdValue,
    reason: &str,
    source: ThresholdSource,
  ) -> Result<ThresholdEntry> {
    let entry = ThresholdEntry {
      key: key.to_owned(),
      value,
      reason: reason.to_owned(),
      source,
      updated_at: Utc::now(),
    };

    let key_str    = entry.key.clone();
    let value_json = encode_value(&entry.value)?;
    let reason_str = entry.reason.clone();
    let source_str = entry.source.as_str().to_owned();
    let at_str     = encode_dt(entry.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO thresholds (key, value_json, reason, source, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (key) DO UPDATE SET
             value_json = excluded.value_json,
             reason     = excluded.reason,
             source     = excluded.source,
             updated_at = excluded.updated_at",
          rusqlite::params![key_str, value_json, reason_str, source_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(entry)
  }

  async fn all_thresholds(&self) -> Result<Vec<ThresholdEntry>> {
    let raws: Vec<RawThreshold> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT key, value_json, reason, source, updated_at
           FROM thresholds ORDER BY updated_at DESC, key",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawThreshold {
              key:        row.get(0)?,
              value_json: row.get(1)?,
              reason:     row.get(2)?,
              source:     row.get(3)?,
              updated_at: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawThreshold::into_entry).collect()
  }

  async fn reset_thresholds(&self) -> Result<()> {
    let rows = default_rows()?;
    let now_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM thresholds", [])?;
        for (key, value_json, reason) in &rows {
          tx.execute(
            "INSERT INTO thresholds (key, value_json, reason, source, updated_at)
             VALUES (?1, ?2, ?3, 'system_default', ?4)",
            rusqlite::params![key, value_json, reason, now_str],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Cases ─────────────────────────────────────────────────────────────────

  async fn save_case(&self, case: &Case) -> Result<()> {
    let row = CaseRow::from_case(case)?;
    self
      .conn
      .call(move |conn| {
        insert_case_row(conn, &row)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn save_cases(&self, cases: &[Case]) -> Result<()> {
    let rows = cases
      .iter()
      .map(CaseRow::from_case)
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for row in &rows {
          insert_case_row(&tx, row)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_case(&self, case_id: &str) -> Result<Option<Case>> {
    let id_str = case_id.to_owned();
    let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_id = ?1");

    let raw: Option<RawCase> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(&sql, rusqlite::params![id_str], case_from_row)
          .optional()?)
      })
      .await?;

    raw.map(RawCase::into_case).transpose()
  }

  async fn cases_by_run(&self, run_id: &str) -> Result<Vec<Case>> {
    let run_str = run_id.to_owned();
    let sql = format!(
      "SELECT {CASE_COLUMNS} FROM cases
       WHERE run_id = ?1 ORDER BY estimated_impact DESC, case_id"
    );

    let raws: Vec<RawCase> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![run_str], case_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCase::into_case).collect()
  }

  async fn open_cases(&self) -> Result<Vec<Case>> {
    let sql = format!(
      "SELECT {CASE_COLUMNS} FROM cases
       WHERE status = 'open' ORDER BY estimated_impact DESC, case_id"
    );

    let raws: Vec<RawCase> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], case_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCase::into_case).collect()
  }

  async fn update_case_status(
    &self,
    case_id: &str,
    status: CaseStatus,
  ) -> Result<Option<Case>> {
    let id_str     = case_id.to_owned();
    let status_str = status.as_str().to_owned();

    let updated: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE cases SET status = ?2 WHERE case_id = ?1",
          rusqlite::params![id_str, status_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Ok(None);
    }
    self.get_case(case_id).await
  }

  async fn clear_cases(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute("DELETE FROM cases", [])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Feedback log ──────────────────────────────────────────────────────────

  async fn save_feedback(&self, item: &FeedbackItem) -> Result<()> {
    let id_str      = item.feedback_id.clone();
    let target_type = item.target_type.as_str().to_owned();
    let target_id   = item.target_id.clone();
    let fb_type     = item.feedback_type.as_str().to_owned();
    let anomaly     = item.anomaly_type.map(|t| t.as_str().to_owned());
    let comment     = item.comment.clone();
    let at_str      = encode_dt(item.timestamp);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO feedback
             (feedback_id, target_type, target_id, feedback_type, anomaly_type,
              comment, timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str, target_type, target_id, fb_type, anomaly, comment, at_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn all_feedback(&self) -> Result<Vec<FeedbackItem>> {
    let raws: Vec<RawFeedback> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT feedback_id, target_type, target_id, feedback_type,
                  anomaly_type, comment, timestamp
           FROM feedback ORDER BY timestamp DESC, feedback_id",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawFeedback {
              feedback_id:   row.get(0)?,
              target_type:   row.get(1)?,
              target_id:     row.get(2)?,
              feedback_type: row.get(3)?,
              anomaly_type:  row.get(4)?,
              comment:       row.get(5)?,
              timestamp:     row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFeedback::into_item).collect()
  }

  async fn false_positive_case_ids(&self) -> Result<Vec<String>> {
    let ids: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT target_id FROM feedback
           WHERE target_type = 'case' AND feedback_type = 'false_positive'
           ORDER BY target_id",
        )?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(ids)
  }

  async fn false_positive_types(&self) -> Result<Vec<AnomalyType>> {
    let raws: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT anomaly_type FROM feedback
           WHERE target_type = 'case' AND feedback_type = 'false_positive'
             AND anomaly_type IS NOT NULL
           ORDER BY anomaly_type",
        )?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .iter()
      .map(|s| crate::encode::decode_anomaly_type(s))
      .collect()
  }

  async fn feedback_counts(&self) -> Result<Vec<(FeedbackType, u64)>> {
    let raws: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT feedback_type, COUNT(*) FROM feedback
           GROUP BY feedback_type ORDER BY COUNT(*) DESC, feedback_type",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(fb_type, count)| {
        Ok((crate::encode::decode_feedback_type(&fb_type)?, count as u64))
      })
      .collect()
  }

  async fn clear_feedback(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute("DELETE FROM feedback", [])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Billing data ──────────────────────────────────────────────────────────

  async fn billing_snapshot(&self) -> Result<BillingSnapshot> {
    type Tables = (
      Vec<Customer>,
      Vec<Subscription>,
      Vec<RawInvoice>,
      Vec<RawPayment>,
      Vec<RawRefund>,
    );

    let (customers, subscriptions, invoices, payments, refunds): Tables = self
      .conn
      .call(|conn| {
        let customers = conn
          .prepare("SELECT customer_id, customer_name, region FROM customers")?
          .query_map([], |row| {
            Ok(Customer {
              customer_id:   row.get(0)?,
              customer_name: row.get(1)?,
              region:        row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let subscriptions = conn
          .prepare(
            "SELECT subscription_id, customer_id, plan_tier, billing_status
             FROM subscriptions",
          )?
          .query_map([], |row| {
            Ok(Subscription {
              subscription_id: row.get(0)?,
              customer_id:     row.get(1)?,
              plan_tier:       row.get(2)?,
              billing_status:  row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let invoices = conn
          .prepare(
            "SELECT invoice_id, customer_id, billed_amount, expected_amount,
                    plan_tier_billed, invoice_date
             FROM invoices",
          )?
          .query_map([], |row| {
            Ok(RawInvoice {
              invoice_id:       row.get(0)?,
              customer_id:      row.get(1)?,
              billed_amount:    row.get(2)?,
              expected_amount:  row.get(3)?,
              plan_tier_billed: row.get(4)?,
              invoice_date:     row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let payments = conn
          .prepare(
            "SELECT payment_id, invoice_id, customer_id, amount, payment_date,
                    processor
             FROM payments",
          )?
          .query_map([], |row| {
            Ok(RawPayment {
              payment_id:   row.get(0)?,
              invoice_id:   row.get(1)?,
              customer_id:  row.get(2)?,
              amount:       row.get(3)?,
              payment_date: row.get(4)?,
              processor:    row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let refunds = conn
          .prepare(
            "SELECT refund_id, customer_id, amount, refund_date, reason,
                    processor, linked_payment_id
             FROM refunds",
          )?
          .query_map([], |row| {
            Ok(RawRefund {
              refund_id:         row.get(0)?,
              customer_id:       row.get(1)?,
              amount:            row.get(2)?,
              refund_date:       row.get(3)?,
              reason:            row.get(4)?,
              processor:         row.get(5)?,
              linked_payment_id: row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((customers, subscriptions, invoices, payments, refunds))
      })
      .await?;

    Ok(BillingSnapshot {
      customers,
      subscriptions,
      invoices: invoices
        .into_iter()
        .map(RawInvoice::into_invoice)
        .collect::<Result<_>>()?,
      payments: payments
        .into_iter()
        .map(RawPayment::into_payment)
        .collect::<Result<_>>()?,
      refunds: refunds
        .into_iter()
        .map(RawRefund::into_refund)
        .collect::<Result<_>>()?,
    })
  }

  async fn load_billing(&self, snapshot: &BillingSnapshot) -> Result<()> {
    let customers: Vec<(String, String, String)> = snapshot
      .customers
      .iter()
      .map(|c| (c.customer_id.clone(), c.customer_name.clone(), c.region.clone()))
      .collect();
    let subscriptions: Vec<(String, String, String, String)> = snapshot
      .subscriptions
      .iter()
      .map(|s| {
        (
          s.subscription_id.clone(),
          s.customer_id.clone(),
          s.plan_tier.clone(),
          s.billing_status.clone(),
        )
      })
      .collect();
    let invoices: Vec<(String, String, f64, f64, String, String)> = snapshot
      .invoices
      .iter()
      .map(|i| {
        (
          i.invoice_id.clone(),
          i.customer_id.clone(),
          i.billed_amount,
          i.expected_amount,
          i.plan_tier_billed.clone(),
          encode_date(i.invoice_date),
        )
      })
      .collect();
    let payments: Vec<(String, String, String, f64, String, String)> = snapshot
      .payments
      .iter()
      .map(|p| {
        (
          p.payment_id.clone(),
          p.invoice_id.clone(),
          p.customer_id.clone(),
          p.amount,
          encode_date(p.payment_date),
          p.processor.clone(),
        )
      })
      .collect();
    let refunds: Vec<(String, String, f64, String, String, String, Option<String>)> =
      snapshot
        .refunds
        .iter()
        .map(|r| {
          (
            r.refund_id.clone(),
            r.customer_id.clone(),
            r.amount,
            encode_dt(r.refund_date),
            r.reason.clone(),
            r.processor.clone(),
            r.linked_payment_id.clone(),
          )
        })
        .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (id, name, region) in &customers {
          tx.execute(
            "INSERT OR REPLACE INTO customers (customer_id, customer_name, region)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id, name, region],
          )?;
        }
        for (id, cust, tier, status) in &subscriptions {
          tx.execute(
            "INSERT OR REPLACE INTO subscriptions
               (subscription_id, customer_id, plan_tier, billing_status)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, cust, tier, status],
          )?;
        }
        for (id, cust, billed, expected, tier, date) in &invoices {
          tx.execute(
            "INSERT OR REPLACE INTO invoices
               (invoice_id, customer_id, billed_amount, expected_amount,
                plan_tier_billed, invoice_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id, cust, billed, expected, tier, date],
          )?;
        }
        for (id, inv, cust, amount, date, processor) in &payments {
          tx.execute(
            "INSERT OR REPLACE INTO payments
               (payment_id, invoice_id, customer_id, amount, payment_date, processor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id, inv, cust, amount, date, processor],
          )?;
        }
        for (id, cust, amount, date, reason, processor, linked) in &refunds {
          tx.execute(
            "INSERT OR REPLACE INTO refunds
               (refund_id, customer_id, amount, refund_date, reason,
                processor, linked_payment_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![id, cust, amount, date, reason, processor, linked],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn clear_billing(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        // Children before parents so foreign keys hold mid-delete.
        tx.execute("DELETE FROM refunds", [])?;
        tx.execute("DELETE FROM payments", [])?;
        tx.execute("DELETE FROM invoices", [])?;
        tx.execute("DELETE FROM subscriptions", [])?;
        tx.execute("DELETE FROM customers", [])?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
