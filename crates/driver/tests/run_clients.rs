//! Integration tests for the parallel driver.
//!
//! A small synthetic client population goes through enrichment, the
//! purchase view and scoring. No test relies on the order of rows across
//! clients.

use aggregator::{CategoryIndex, CategoryMissPolicy};
use chrono::NaiveDate;
use data_loader::{
    columns, ClientDataset, ClientId, DataLoadError, EventRecord, EventStore, InMemoryEventStore, PurchaseRecord,
};
use driver::{
    ClientErrorPolicy, DriverConfig, DriverError, DriverJob, DriverRow, JsonLinesSink, ParallelDriver, RewardScorer,
    ScoreEventsJob, ScoringRequest, VecSink,
};
use pipeline::{AnchorAggregates, CategoryEncoding, FeatureSchema, FeatureSchemaVersion, FeatureVectorBuilder};
use predictor::{ModelArtifact, Node, Tree};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

const CLIENTS: usize = 23;
const EVENTS_PER_CLIENT: usize = 4;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn client_id(i: usize) -> ClientId {
    format!("C{:02}", i)
}

fn create_client(i: usize) -> ClientDataset {
    let id = client_id(i);
    let view = |proposition: &str, day: &str, section: &str, category: &str| {
        EventRecord::new(&id, proposition, date(day))
            .with_category(category)
            .with_attribute(columns::PAGE_SECTION, section)
    };

    let purchases = vec![PurchaseRecord::new(&id, "P1", date("2024-11-18"), 10.0 + i as f64)];
    let events = vec![
        view("P1", "2024-11-05", "search", "audio"),
        view("P1", "2024-11-12", "home", "audio"),
        view("P1", "2024-11-19", "search", "audio"),
        view("P2", "2024-11-20", "home", "video"),
    ];
    ClientDataset::new(id.clone(), purchases, events).unwrap()
}

fn create_store() -> Arc<InMemoryEventStore> {
    Arc::new(InMemoryEventStore::from_datasets((0..CLIENTS).map(create_client)))
}

/// Store whose loads fail for chosen clients
struct FlakyStore {
    inner: InMemoryEventStore,
    unreadable: HashSet<ClientId>,
    malformed: HashSet<ClientId>,
}

impl FlakyStore {
    fn new(unreadable: &[usize], malformed: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryEventStore::from_datasets((0..CLIENTS).map(create_client)),
            unreadable: unreadable.iter().map(|i| client_id(*i)).collect(),
            malformed: malformed.iter().map(|i| client_id(*i)).collect(),
        })
    }
}

impl EventStore for FlakyStore {
    fn client_ids(&self) -> data_loader::Result<Vec<ClientId>> {
        self.inner.client_ids()
    }

    fn load_client(&self, client_id: &str) -> data_loader::Result<ClientDataset> {
        if self.unreadable.contains(client_id) {
            return Err(DataLoadError::Io(std::io::Error::other("disk read failed")));
        }
        if self.malformed.contains(client_id) {
            return Err(DataLoadError::MissingColumn {
                table: "events".into(),
                column: columns::PROPOSITION.into(),
                row: 1,
            });
        }
        self.inner.load_client(client_id)
    }

    fn write_client(&self, dataset: &ClientDataset) -> data_loader::Result<()> {
        self.inner.write_client(dataset)
    }
}

fn sorted_json(rows: &[DriverRow]) -> Vec<String> {
    let mut lines: Vec<String> = rows.iter().map(|row| serde_json::to_string(row).unwrap()).collect();
    lines.sort();
    lines
}

/// One stump on product spend: 0.9 once the client has bought the product
fn write_model(dir: &Path, schema: &FeatureSchema) -> std::path::PathBuf {
    let spend = schema.position("total_spend_on_product").unwrap();
    let artifact = ModelArtifact {
        model_version: "reward-test".into(),
        schema_version: Some(schema.version()),
        feature_names: schema.column_names().into_iter().map(str::to_string).collect(),
        trees: vec![Tree {
            nodes: vec![
                Node::Split {
                    feature: spend,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { value: 0.1 },
                Node::Leaf { value: 0.9 },
            ],
        }],
    };
    let path = dir.join("reward_model.json");
    std::fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();
    path
}

/// Encoding fitted on every stored event
fn fit_encoding(store: &dyn EventStore, schema: &FeatureSchema) -> CategoryEncoding {
    let builder = FeatureVectorBuilder::new(schema);
    let mut vectors = Vec::new();
    for id in store.client_ids().unwrap() {
        let dataset = store.load_client(&id).unwrap();
        let categories = CategoryIndex::from_events(dataset.events());
        for event in dataset.events() {
            let aggregates =
                AnchorAggregates::compute(dataset.purchases(), &categories, event, CategoryMissPolicy::Zero).unwrap();
            vectors.push(builder.build(event, &aggregates).unwrap());
        }
    }
    CategoryEncoding::build_for_schema("reward-test", schema, &vectors).unwrap()
}

#[test]
fn test_enrich_writes_back_every_client() {
    let store = create_store();
    let config = DriverConfig::default().with_batch_size(4).with_worker_count(3);
    let driver = ParallelDriver::new(store.clone(), config).unwrap();
    let mut sink = VecSink::new();

    let report = driver.run_all(&DriverJob::enrich(driver.config()), &mut sink).unwrap();

    assert_eq!(report.batches, 6);
    assert_eq!(report.succeeded, CLIENTS);
    assert_eq!(report.rows, CLIENTS * EVENTS_PER_CLIENT);
    assert_eq!(sink.rows().len(), CLIENTS * EVENTS_PER_CLIENT);

    let stored = store.load_client("C07").unwrap();
    assert!(stored.event_columns().iter().any(|c| c == "purchases_7_day_after"));
    // The view on 2024-11-12 is followed by the 2024-11-18 purchase
    let second = &stored.events()[1];
    assert_eq!(second.attribute("purchases_7_day_after"), Some("1"));
}

#[test]
fn test_output_independent_of_batching() {
    let store = create_store();
    let configs = [(1, 1), (3, 2), (5, 8), (100, 4)];

    let mut outputs = Vec::new();
    for (batch_size, workers) in configs {
        let config = DriverConfig::default()
            .with_batch_size(batch_size)
            .with_worker_count(workers)
            .with_channel_capacity(1);
        let driver = ParallelDriver::new(store.clone(), config).unwrap();
        let mut sink = VecSink::new();
        driver.run_all(&DriverJob::CollectEvents, &mut sink).unwrap();
        outputs.push(sorted_json(sink.rows()));
    }

    assert_eq!(outputs[0].len(), CLIENTS * EVENTS_PER_CLIENT);
    for output in &outputs[1..] {
        assert_eq!(output, &outputs[0]);
    }
}

#[test]
fn test_purchase_view_through_driver() {
    let driver = ParallelDriver::new(create_store(), DriverConfig::default().with_batch_size(10)).unwrap();
    let mut sink = VecSink::new();

    driver.run_all(&DriverJob::PurchaseView, &mut sink).unwrap();

    let rows = sink.into_rows();
    assert_eq!(rows.len(), CLIENTS);
    for row in rows {
        match row {
            DriverRow::PurchaseView(view) => {
                assert_eq!((view.seen_30_days, view.seen_7_days, view.seen_1_days), (2, 1, 0));
            }
            other => panic!("unexpected row {:?}", other),
        }
    }
}

#[test]
fn test_score_after_enrichment() -> anyhow::Result<()> {
    let store = create_store();
    let driver = ParallelDriver::new(store.clone(), DriverConfig::default().with_batch_size(5))?;
    driver.run_all(&DriverJob::enrich(driver.config()), &mut VecSink::new())?;

    let schema = FeatureSchema::for_version(FeatureSchemaVersion::V3);
    let dir = tempfile::tempdir()?;
    let model_path = write_model(dir.path(), &schema);
    fit_encoding(store.as_ref(), &schema).save(dir.path())?;

    let scorer = RewardScorer::load(&model_path, dir.path(), &schema)?;
    let mut sink = VecSink::new();
    let report = driver.run_all(&ScoreEventsJob::new(&scorer), &mut sink)?;

    assert_eq!(report.rows, CLIENTS * EVENTS_PER_CLIENT);
    let bought = sink.rows().iter().filter(|s| s.score > 0.5).count();
    // Only the P1 view after the purchase sees any spend
    assert_eq!(bought, CLIENTS);

    let request = ScoringRequest {
        client_id: client_id(0),
        date: date("2024-12-01"),
        context: BTreeMap::from([(columns::PAGE_SECTION.to_string(), "search".to_string())]),
        candidates: vec!["P2".into(), "P1".into()],
    };
    let ranked = scorer.score_candidates(&store.load_client("C00")?, &request)?;
    assert_eq!(ranked[0].proposition_id, "P1");
    assert!((ranked[0].score - 0.9).abs() < 1e-12);
    assert!((ranked[1].score - 0.1).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_skip_policy_continues_past_failures() {
    let store = FlakyStore::new(&[3, 17], &[]);
    let driver = ParallelDriver::new(store, DriverConfig::default().with_batch_size(4)).unwrap();
    let mut sink = VecSink::new();

    let report = driver.run_all(&DriverJob::CollectEvents, &mut sink).unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(report.succeeded, CLIENTS - 2);
    assert_eq!(sink.rows().len(), (CLIENTS - 2) * EVENTS_PER_CLIENT);
}

#[test]
fn test_abort_batch_drops_rest_of_batch() {
    let store = FlakyStore::new(&[4], &[]);
    let config = DriverConfig::default()
        .with_batch_size(4)
        .with_on_client_error(ClientErrorPolicy::AbortBatch);
    let driver = ParallelDriver::new(store, config).unwrap();
    let mut sink = VecSink::new();

    let report = driver.run_all(&DriverJob::PurchaseView, &mut sink).unwrap();

    // C04 opens the second batch, C05..C07 are given up
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.succeeded, CLIENTS - 4);
    assert_eq!(report.clients(), CLIENTS);
}

#[test]
fn test_abort_all_stops_run() {
    let store = FlakyStore::new(&[9], &[]);
    let config = DriverConfig::default()
        .with_batch_size(2)
        .with_worker_count(2)
        .with_on_client_error(ClientErrorPolicy::AbortAll);
    let driver = ParallelDriver::new(store, config).unwrap();

    let err = driver.run_all(&DriverJob::CollectEvents, &mut VecSink::new()).unwrap_err();

    match err {
        DriverError::Aborted { client, source, report } => {
            assert_eq!(client, "C09");
            assert!(!source.is_contract_violation());
            assert_eq!(report.failed, 1);
            assert_eq!(report.clients(), CLIENTS);
        }
        other => panic!("expected abort, got {}", other),
    }
}

#[test]
fn test_schema_error_aborts_under_skip() {
    let store = FlakyStore::new(&[], &[12]);
    let driver = ParallelDriver::new(store, DriverConfig::default().with_batch_size(3)).unwrap();

    let err = driver.run_all(&DriverJob::CollectPurchases, &mut VecSink::new()).unwrap_err();

    match err {
        DriverError::Aborted { client, source, .. } => {
            assert_eq!(client, "C12");
            assert!(source.is_contract_violation());
        }
        other => panic!("expected abort, got {}", other),
    }
}

#[test]
fn test_json_lines_output() {
    let driver = ParallelDriver::new(create_store(), DriverConfig::default().with_batch_size(6)).unwrap();
    let mut sink = JsonLinesSink::new(Vec::new());

    let report = driver.run_all(&DriverJob::PurchaseView, &mut sink).unwrap();

    assert_eq!(sink.rows_written(), report.rows);
    let bytes = sink.into_inner().unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), CLIENTS);
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["PROPOSITION"], "P1");
        assert_eq!(value["NUMBER_OF_TIMES_SEEN_30_days"], 2);
    }
}

#[test]
fn test_duplicate_clients_rejected() {
    let driver = ParallelDriver::new(create_store(), DriverConfig::default()).unwrap();
    let ids = vec![client_id(1), client_id(2), client_id(1)];

    let result = driver.run(&DriverJob::CollectEvents, ids, &mut VecSink::new());
    assert!(matches!(result, Err(DriverError::DuplicateClient(id)) if id == "C01"));
}
