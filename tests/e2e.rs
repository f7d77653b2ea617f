//! End-to-end tests for statement-parser.
//!
//! These make live LLM API calls against a small statement PDF built on the
//! fly. They are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 OPENAI_API_KEY=sk-... cargo test --test e2e -- --nocapture

use futures::StreamExt;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use statement_parser::{
    load_upload, watch_job, JobLifecycleAdapter, JobOptions, JobQueue, JobState, NoopProgress,
    ParserConfig, QueueConfig, StatementParser,
};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test if E2E_ENABLED is not set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

const STATEMENT_LINES: &[&str] = &[
    "FIRST EXAMPLE BANK",
    "Account holder: Jane Doe",
    "Address: 12 Market Street, Springfield",
    "Statement date: 2024-01-31",
    "Opening balance: 1,000.00",
    "2024-01-03  Salary ACME Corp          +2,500.00",
    "2024-01-07  Rent payment              -1,200.00",
    "2024-01-15  Grocery Store               -85.40",
    "2024-01-28  Electricity bill            -64.60",
    "Closing balance: 2,150.00",
];

/// One page, one line of Courier per entry of `lines`.
fn statement_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new("TL", vec![14.into()]),
        Operation::new("Td", vec![60.into(), 740.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_parse_generated_statement() {
    e2e_skip_unless_enabled!();

    let config = ParserConfig::default();
    let parser = StatementParser::from_config(&config).expect("provider configured");
    let pdf = statement_pdf(STATEMENT_LINES);

    let record = parser.run(&pdf, &NoopProgress).await.expect("parse");
    println!("{}", serde_json::to_string_pretty(&record).unwrap());

    assert_eq!(record.transaction_count(), 4);
    assert!((record.start_balance - 1000.0).abs() < 0.01);
    assert!((record.end_balance - 2150.0).abs() < 0.01);
    assert!(record.is_reconciled, "balances should reconcile");
    assert!(record.transactions.iter().any(|t| t.amount < 0.0));
}

#[tokio::test]
async fn test_queue_round_trip_from_file() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("january.pdf");
    std::fs::write(&path, statement_pdf(STATEMENT_LINES)).unwrap();

    let config = ParserConfig::default();
    let upload = load_upload(path.to_str().unwrap(), &config).await.unwrap();
    let parser = Arc::new(StatementParser::from_config(&config).expect("provider configured"));
    let queue = JobQueue::start(JobLifecycleAdapter::new(parser), QueueConfig::default());

    let ack = queue.submit(upload, JobOptions::default()).await.unwrap();
    let statuses: Vec<_> = watch_job(queue.clone(), ack.job_id, Duration::from_millis(250))
        .map(|s| s.unwrap())
        .collect()
        .await;

    for s in &statuses {
        println!("{:>9} {:>3}%", s.status.to_string(), s.progress);
    }
    let last = statuses.last().unwrap();
    assert_eq!(last.status, JobState::Completed, "{:?}", last.error);
    assert_eq!(last.file_name, "january.pdf");
    queue.shutdown().await;
}

#[test]
fn test_provider_name_is_accepted_by_builder() {
    let config = ParserConfig::builder()
        .provider_name("anthropic")
        .model("claude-sonnet-4-20250514")
        .build()
        .unwrap();
    assert_eq!(config.provider_name.as_deref(), Some("anthropic"));
    assert_eq!(config.model_or_default(), "claude-sonnet-4-20250514");
}
