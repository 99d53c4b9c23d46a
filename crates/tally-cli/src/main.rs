//! `tally` — command-line billing anomaly triage.
//!
//! # Usage
//!
//! ```
//! tally seed                    # load the demo billing dataset
//! tally run                     # detect, score, and open cases
//! tally cases                   # list open cases
//! tally feedback CASE-DUP-a1b2c3-00 false_positive --comment "legit"
//! tally run                     # rerun: thresholds and confidence shift
//! tally improvement             # what the feedback loop has learned
//! ```

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tally_core::{
  case::Case,
  feedback::{FeedbackType, NewFeedback, TargetType},
  memory::ThresholdEntry,
  pipeline::Triage,
  sentiment::HeuristicAnalyzer,
  store::TriageStore,
};
use tally_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tally", about = "Billing anomaly triage with feedback-tuned thresholds")]
struct Cli {
  /// Path to a TOML config file (db path).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// SQLite database path (default: tally.db).
  #[arg(long, env = "TALLY_DB")]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Load the deterministic demo billing dataset.
  Seed,
  /// Execute a triage run and print the ranked cases.
  Run {
    /// Reuse a specific run id instead of generating one.
    #[arg(long)]
    run_id: Option<String>,
  },
  /// List open cases, or one run's cases with --run-id.
  Cases {
    #[arg(long)]
    run_id: Option<String>,
  },
  /// Record a review verdict on a case: approve | reject | false_positive.
  Feedback {
    case_id: String,
    #[arg(value_parser = parse_case_feedback)]
    verdict: FeedbackType,
    #[arg(long, default_value = "")]
    comment: String,
  },
  /// Rate the analyst output: useful | not_useful.
  Rate {
    #[arg(value_parser = parse_analyst_feedback)]
    rating:  FeedbackType,
    #[arg(long, default_value = "")]
    comment: String,
  },
  /// Print current threshold memory.
  Memory,
  /// Summarise how feedback has shifted thresholds from the defaults.
  Improvement,
  /// Clear cases and feedback, and reset threshold memory to the
  /// seeded defaults.
  Reset,
}

fn parse_case_feedback(s: &str) -> Result<FeedbackType, String> {
  match s {
    "approve" => Ok(FeedbackType::Approve),
    "reject" => Ok(FeedbackType::Reject),
    "false_positive" => Ok(FeedbackType::FalsePositive),
    other => Err(format!(
      "unknown verdict {other:?} (expected approve, reject, or false_positive)"
    )),
  }
}

fn parse_analyst_feedback(s: &str) -> Result<FeedbackType, String> {
  match s {
    "useful" => Ok(FeedbackType::Useful),
    "not_useful" => Ok(FeedbackType::NotUseful),
    other => {
      Err(format!("unknown rating {other:?} (expected useful or not_useful)"))
    }
  }
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  db: String,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let file_cfg: ConfigFile = if let Some(path) = &cli.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flag overrides config file, which overrides the default path.
  let db_path = cli
    .db
    .or_else(|| (!file_cfg.db.is_empty()).then(|| PathBuf::from(&file_cfg.db)))
    .unwrap_or_else(|| PathBuf::from("tally.db"));

  let store = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("opening store at {}", db_path.display()))?;
  let triage = Triage::new(store, HeuristicAnalyzer);

  match cli.command {
    Command::Seed => {
      let snapshot = demo::snapshot();
      triage.store().clear_billing().await?;
      triage.store().load_billing(&snapshot).await?;
      println!(
        "Seeded demo data: {} customers, {} subscriptions, {} invoices, {} payments, {} refunds",
        snapshot.customers.len(),
        snapshot.subscriptions.len(),
        snapshot.invoices.len(),
        snapshot.payments.len(),
        snapshot.refunds.len(),
      );
    }

    Command::Run { run_id } => {
      let cases = triage.run_triage(run_id).await?;
      if cases.is_empty() {
        println!("No anomalies detected.");
      } else {
        println!("Opened {} cases (run {}):\n", cases.len(), cases[0].run_id);
        for case in &cases {
          print_case(case);
        }
      }
    }

    Command::Cases { run_id } => {
      let cases = match run_id {
        Some(run_id) => triage.store().cases_by_run(&run_id).await?,
        None => triage.store().open_cases().await?,
      };
      if cases.is_empty() {
        println!("No cases.");
      }
      for case in &cases {
        print_case(case);
      }
    }

    Command::Feedback { case_id, verdict, comment } => {
      let (item, changed) = triage
        .submit_feedback(NewFeedback {
          target_type: TargetType::Case,
          target_id: case_id,
          feedback_type: verdict,
          comment,
        })
        .await?;
      println!("Recorded {} ({})", item.feedback_id, item.feedback_type);
      print_adjustments(&changed);
    }

    Command::Rate { rating, comment } => {
      let (item, changed) = triage
        .submit_feedback(NewFeedback {
          target_type: TargetType::Analyst,
          target_id: "analyst".into(),
          feedback_type: rating,
          comment,
        })
        .await?;
      println!("Recorded {} ({})", item.feedback_id, item.feedback_type);
      print_adjustments(&changed);
    }

    Command::Memory => {
      for entry in triage.store().all_thresholds().await? {
        println!(
          "{:<32} {:<10} [{}] {}",
          entry.key, entry.value, entry.source, entry.reason
        );
      }
    }

    Command::Improvement => {
      let summary = triage.improvement_summary().await?;
      for note in &summary.improvement_notes {
        println!("- {note}");
      }
      if !summary.changes.is_empty() {
        println!("\nChanged thresholds:");
        for change in &summary.changes {
          println!(
            "  {:<32} {} -> {} ({})",
            change.key, change.default, change.current, change.reason
          );
        }
      }
    }

    Command::Reset => {
      triage.store().clear_cases().await?;
      triage.store().clear_feedback().await?;
      triage.store().reset_thresholds().await?;
      println!("Cases and feedback cleared; threshold memory reset to defaults.");
    }
  }

  Ok(())
}

// ─── Output helpers ───────────────────────────────────────────────────────────

fn print_case(case: &Case) {
  println!(
    "{}  [{}/{}]  ${:>10.2}  {}",
    case.case_id,
    case.severity,
    case.confidence,
    case.estimated_impact,
    case.title
  );
  if let Some(sentiment) = &case.sentiment {
    println!(
      "    risk: {:?}, polarity {:+.2} -- {}",
      sentiment.overall_risk_level,
      sentiment.overall_polarity,
      sentiment.overall_assessment
    );
  }
  println!("    action: {}", case.recommended_action);
}

fn print_adjustments(changed: &[ThresholdEntry]) {
  if changed.is_empty() {
    println!("No threshold adjustments.");
    return;
  }
  for entry in changed {
    println!("  {} = {} ({})", entry.key, entry.value, entry.reason);
  }
}
