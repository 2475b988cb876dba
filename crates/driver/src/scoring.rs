//! Scoring candidate propositions for one client.
//!
//! The scorer ties the serving-side pieces together: the active feature
//! schema, the category encoding persisted when the model was trained, and
//! the loaded predictor. All three are checked against each other once, at
//! construction.

use crate::error::Result;
use aggregator::{CategoryIndex, CategoryMissPolicy};
use chrono::NaiveDate;
use data_loader::{ClientDataset, ClientId, DataLoadError, EventRecord, PropositionId};
use pipeline::{
    AnchorAggregates, CategoryEncoding, FeatureError, FeatureMatrix, FeatureSchema, FeatureVectorBuilder,
    UnknownValuePolicy,
};
use predictor::RewardPredictor;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Candidates to score for one client on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub client_id: ClientId,
    pub date: NaiveDate,
    /// Page, device and user attributes shared by every candidate
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    pub candidates: Vec<PropositionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredProposition {
    pub proposition_id: PropositionId,
    pub score: f64,
}

/// Reward score of one stored interaction event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEvent {
    #[serde(rename = "USER_CLIENT_NUMBER")]
    pub user_id: ClientId,
    #[serde(rename = "DATE")]
    pub date: NaiveDate,
    #[serde(rename = "PROPOSITION")]
    pub proposition_id: PropositionId,
    #[serde(rename = "reward_score")]
    pub score: f64,
}

#[derive(Debug)]
pub struct RewardScorer {
    schema: FeatureSchema,
    encoding: CategoryEncoding,
    unknown_policy: UnknownValuePolicy,
    category_miss: CategoryMissPolicy,
    predictor: RewardPredictor,
}

impl RewardScorer {
    /// Pair a predictor with the encoding it was trained with.
    ///
    /// The encoding must carry the predictor's model version and cover every
    /// categorical column of the predictor's schema.
    pub fn new(predictor: RewardPredictor, encoding: CategoryEncoding) -> Result<Self> {
        if encoding.model_version() != predictor.model_version() {
            return Err(FeatureError::ModelVersionMismatch {
                expected: predictor.model_version().to_string(),
                found: encoding.model_version().to_string(),
            }
            .into());
        }

        let schema = predictor.schema().clone();
        if let Some(column) = schema
            .categorical_columns()
            .into_iter()
            .find(|column| encoding.column(column).is_none())
        {
            return Err(FeatureError::UnencodedColumn {
                column: column.to_string(),
            }
            .into());
        }

        Ok(Self {
            schema,
            encoding,
            unknown_policy: UnknownValuePolicy::default(),
            category_miss: CategoryMissPolicy::default(),
            predictor,
        })
    }

    /// Load the model artifact and the encoding persisted for its version
    pub fn load(model_path: &Path, encoding_dir: &Path, schema: &FeatureSchema) -> Result<Self> {
        let predictor = RewardPredictor::load(model_path, schema)?;
        let encoding = CategoryEncoding::load(encoding_dir, predictor.model_version())?;
        info!(
            "Loaded reward model {} with schema {}",
            predictor.model_version(),
            schema.version()
        );
        Self::new(predictor, encoding)
    }

    pub fn with_unknown_policy(mut self, policy: UnknownValuePolicy) -> Self {
        self.unknown_policy = policy;
        self
    }

    pub fn with_category_miss(mut self, policy: CategoryMissPolicy) -> Self {
        self.category_miss = policy;
        self
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn model_version(&self) -> &str {
        self.predictor.model_version()
    }

    /// Score every candidate of the request, highest score first.
    ///
    /// Each candidate becomes one anchor on the request date carrying the
    /// request context; spend is aggregated from the client's purchases up
    /// to that date.
    #[instrument(skip(self, dataset, request), fields(client = %request.client_id))]
    pub fn score_candidates(
        &self,
        dataset: &ClientDataset,
        request: &ScoringRequest,
    ) -> Result<Vec<ScoredProposition>> {
        if dataset.client_id() != request.client_id {
            return Err(DataLoadError::ForeignRecord {
                client: dataset.client_id().to_string(),
                found: request.client_id.clone(),
            }
            .into());
        }

        let categories = CategoryIndex::from_events(dataset.events());
        let anchors: Vec<EventRecord> = request
            .candidates
            .iter()
            .map(|candidate| {
                let mut anchor = EventRecord::new(&request.client_id, candidate, request.date);
                anchor.attributes = request.context.clone();
                anchor.category = categories.category_of(candidate).map(str::to_string);
                anchor
            })
            .collect();

        let scores = self.score_anchors(dataset, &categories, &anchors)?;

        let mut scored: Vec<ScoredProposition> = request
            .candidates
            .iter()
            .zip(scores)
            .map(|(candidate, score)| ScoredProposition {
                proposition_id: candidate.clone(),
                score,
            })
            .collect();

        // Sort by score DESC, NaN last
        scored.sort_by(|a, b| by_score_desc(a.score, b.score));

        debug!("Scored {} candidates", scored.len());
        Ok(scored)
    }

    /// Score every interaction event of a client, in event order
    #[instrument(skip(self, dataset), fields(client = %dataset.client_id()))]
    pub fn score_events(&self, dataset: &ClientDataset) -> Result<Vec<ScoredEvent>> {
        let categories = CategoryIndex::from_events(dataset.events());
        let scores = self.score_anchors(dataset, &categories, dataset.events())?;

        Ok(dataset
            .events()
            .iter()
            .zip(scores)
            .map(|(event, score)| ScoredEvent {
                user_id: event.user_id.clone(),
                date: event.date,
                proposition_id: event.proposition_id.clone(),
                score,
            })
            .collect())
    }

    fn score_anchors(
        &self,
        dataset: &ClientDataset,
        categories: &CategoryIndex,
        anchors: &[EventRecord],
    ) -> Result<Vec<f64>> {
        if anchors.is_empty() {
            return Ok(Vec::new());
        }

        let with_aggregates = anchors
            .iter()
            .map(|anchor| {
                let aggregates = if self.schema.needs_spend() {
                    AnchorAggregates::compute(dataset.purchases(), categories, anchor, self.category_miss)?
                } else {
                    AnchorAggregates::default()
                };
                Ok((anchor, aggregates))
            })
            .collect::<Result<Vec<_>>>()?;

        let vectors = FeatureVectorBuilder::new(&self.schema).build_all(&with_aggregates)?;
        let encoded = self.encoding.apply_all(&vectors, self.unknown_policy)?;
        let matrix = FeatureMatrix::from_vectors(&self.schema, &encoded)?;
        Ok(self.predictor.predict(&matrix)?)
    }
}

/// Descending total order on scores with NaN after every number
fn by_score_desc(a: f64, b: f64) -> Ordering {
    a.is_nan().cmp(&b.is_nan()).then_with(|| b.total_cmp(&a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{columns, PurchaseRecord};
    use pipeline::{FeatureSchemaVersion, FeatureVector};
    use predictor::RewardModel;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Scores a row by its product spend
    struct SpendModel {
        names: Vec<String>,
        spend: usize,
    }

    impl RewardModel for SpendModel {
        fn model_version(&self) -> &str {
            "m1"
        }

        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_row(&self, row: &[f64]) -> predictor::Result<f64> {
            Ok(row[self.spend])
        }
    }

    fn dataset() -> ClientDataset {
        let purchases = vec![
            PurchaseRecord::new("U1", "P1", date("2024-01-01"), 10.0),
            PurchaseRecord::new("U1", "P2", date("2024-01-05"), 40.0),
            PurchaseRecord::new("U1", "P1", date("2024-03-01"), 99.0),
        ];
        let events = vec![
            EventRecord::new("U1", "P1", date("2024-01-10"))
                .with_category("audio")
                .with_attribute(columns::PAGE_SECTION, "search"),
            EventRecord::new("U1", "P2", date("2024-01-12"))
                .with_category("video")
                .with_attribute(columns::PAGE_SECTION, "home"),
        ];
        ClientDataset::new("U1", purchases, events).unwrap()
    }

    fn scorer() -> RewardScorer {
        let schema = FeatureSchema::for_version(FeatureSchemaVersion::V3);
        let names: Vec<String> = schema.column_names().into_iter().map(str::to_string).collect();
        let spend = schema.position("total_spend_on_product").unwrap();
        let predictor = RewardPredictor::from_model(SpendModel { names, spend }, &schema).unwrap();

        let mut seed = FeatureVector::new();
        for column in schema.categorical_columns() {
            seed.set(column, pipeline::FeatureValue::Categorical("x".into()));
        }
        let encoding = CategoryEncoding::build_for_schema("m1", &schema, &[seed]).unwrap();
        RewardScorer::new(predictor, encoding)
            .unwrap()
            .with_unknown_policy(UnknownValuePolicy::Reserved)
    }

    #[test]
    fn test_candidates_ranked_by_score() {
        let request = ScoringRequest {
            client_id: "U1".into(),
            date: date("2024-02-01"),
            context: BTreeMap::new(),
            candidates: vec!["P1".into(), "P3".into(), "P2".into()],
        };

        let scored = scorer().score_candidates(&dataset(), &request).unwrap();

        let order: Vec<&str> = scored.iter().map(|s| s.proposition_id.as_str()).collect();
        assert_eq!(order, vec!["P2", "P1", "P3"]);
        // The March purchase is after the request date
        assert_eq!(scored[1].score, 10.0);
        assert_eq!(scored[2].score, 0.0);
    }

    /// Spend as score, except a spend of 10 scores NaN
    struct NanAtTenModel(SpendModel);

    impl RewardModel for NanAtTenModel {
        fn model_version(&self) -> &str {
            self.0.model_version()
        }

        fn feature_names(&self) -> &[String] {
            self.0.feature_names()
        }

        fn predict_row(&self, row: &[f64]) -> predictor::Result<f64> {
            let score = self.0.predict_row(row)?;
            Ok(if score == 10.0 { f64::NAN } else { score })
        }
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let schema = FeatureSchema::for_version(FeatureSchemaVersion::V3);
        let names: Vec<String> = schema.column_names().into_iter().map(str::to_string).collect();
        let spend = schema.position("total_spend_on_product").unwrap();
        let predictor = RewardPredictor::from_model(NanAtTenModel(SpendModel { names, spend }), &schema).unwrap();
        let encoding = CategoryEncoding::build_for_schema("m1", &schema, &[]).unwrap();
        let scorer = RewardScorer::new(predictor, encoding)
            .unwrap()
            .with_unknown_policy(UnknownValuePolicy::Reserved);

        let request = ScoringRequest {
            client_id: "U1".into(),
            date: date("2024-02-01"),
            context: BTreeMap::new(),
            candidates: vec!["P1".into(), "P3".into(), "P2".into()],
        };
        let scored = scorer.score_candidates(&dataset(), &request).unwrap();

        let order: Vec<&str> = scored.iter().map(|s| s.proposition_id.as_str()).collect();
        assert_eq!(order, vec!["P2", "P3", "P1"]);
        assert!(scored[2].score.is_nan());
    }

    #[test]
    fn test_score_order_is_total() {
        let mut scores = vec![f64::NAN, 1.0, -2.0, f64::NAN, 3.5, 0.0];
        scores.sort_by(|a, b| by_score_desc(*a, *b));

        assert_eq!(&scores[..4], &[3.5, 1.0, 0.0, -2.0]);
        assert!(scores[4..].iter().all(|s| s.is_nan()));
    }

    #[test]
    fn test_request_for_other_client_rejected() {
        let request = ScoringRequest {
            client_id: "U2".into(),
            date: date("2024-02-01"),
            context: BTreeMap::new(),
            candidates: vec!["P1".into()],
        };

        assert!(scorer().score_candidates(&dataset(), &request).is_err());
    }

    #[test]
    fn test_score_events_keeps_event_order() {
        let scored = scorer().score_events(&dataset()).unwrap();

        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].proposition_id, "P1");
        assert_eq!(scored[0].score, 10.0);
        assert_eq!(scored[1].score, 40.0);
    }

    #[test]
    fn test_encoding_of_other_model_rejected() {
        let schema = FeatureSchema::for_version(FeatureSchemaVersion::V1);
        let names: Vec<String> = schema.column_names().into_iter().map(str::to_string).collect();
        let predictor = RewardPredictor::from_model(SpendModel { names, spend: 0 }, &schema).unwrap();
        let encoding = CategoryEncoding::build_for_schema("m0", &schema, &[]).unwrap();

        let result = RewardScorer::new(predictor, encoding);
        assert!(matches!(
            result,
            Err(crate::DriverError::Feature(FeatureError::ModelVersionMismatch { .. }))
        ));
    }

    #[test]
    fn test_encoding_missing_a_column_rejected() {
        let schema = FeatureSchema::for_version(FeatureSchemaVersion::V1);
        let names: Vec<String> = schema.column_names().into_iter().map(str::to_string).collect();
        let predictor = RewardPredictor::from_model(SpendModel { names, spend: 0 }, &schema).unwrap();
        let encoding = CategoryEncoding::build("m1", &[], &[columns::PAGE_SECTION]).unwrap();

        let err = RewardScorer::new(predictor, encoding).unwrap_err();
        assert!(err.is_contract_violation());
    }
}
