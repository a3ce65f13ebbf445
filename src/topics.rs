use std::{collections::HashSet, time::Instant};

use anyhow::anyhow;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{ServiceError, ServiceResult},
    inference::{Embedder, TopicModel},
    models::{TopicScope, OUTLIER_TOPIC},
    normalize::Normalizer,
    store::Store,
    vectorizer::CountVectorizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhoneOutcome {
    NoReviews,
    Updated,
}

/// Retrains the topic model per phone and persists label-keyed topics plus
/// review links. Cluster ids are not stable across runs; rows are keyed on
/// `(phone_id, topic_label)` so a recurring label maps to the same topic.
pub struct TopicPipeline<'a> {
    pub store: &'a Store,
    pub normalizer: &'a Normalizer,
    pub topic_model: &'a dyn TopicModel,
    pub embedder: &'a dyn Embedder,
    pub extra_stop_words: &'a [String],
}

impl TopicPipeline<'_> {
    pub fn run(&self, scope: TopicScope) -> ServiceResult<Vec<String>> {
        match scope {
            TopicScope::AllPhones => self.run_all(),
            TopicScope::SinglePhone(phone_id) => Ok(vec![self.run_single(phone_id)?]),
        }
    }

    /// Phones without reviews are left out of the returned statuses.
    pub fn run_all(&self) -> ServiceResult<Vec<String>> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let phone_ids = self.store.phone_ids()?;
        info!(run_id = %run_id, phones = phone_ids.len(), "Topic job started");

        let mut statuses = Vec::new();
        for phone_id in phone_ids {
            if let PhoneOutcome::Updated = self.process_phone(run_id, phone_id)? {
                statuses.push(format!("Topics generated/updated for phone_id {phone_id}"));
            }
        }

        info!(
            run_id = %run_id,
            updated = statuses.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Topic job finished"
        );
        Ok(statuses)
    }

    pub fn run_single(&self, phone_id: i64) -> ServiceResult<String> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(run_id = %run_id, phone_id, "Topic job started");

        let status = match self.process_phone(run_id, phone_id)? {
            PhoneOutcome::NoReviews => format!("No reviews found for phone_id {phone_id}"),
            PhoneOutcome::Updated => format!("Topics generated for phone_id {phone_id}"),
        };

        info!(
            run_id = %run_id,
            phone_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Topic job finished"
        );
        Ok(status)
    }

    fn process_phone(&self, run_id: Uuid, phone_id: i64) -> ServiceResult<PhoneOutcome> {
        let reviews = self.store.reviews_for_phone(phone_id)?;
        if reviews.is_empty() {
            debug!(run_id = %run_id, phone_id, "No reviews, skipping phone");
            return Ok(PhoneOutcome::NoReviews);
        }

        let (review_ids, docs): (Vec<i64>, Vec<String>) = reviews
            .iter()
            .map(|r| (r.review_id, self.normalizer.normalize(&r.review_text)))
            .unzip();

        let vectorizer = CountVectorizer::english_with(self.extra_stop_words);
        let fit = self
            .topic_model
            .fit_transform(&docs, self.embedder, &vectorizer)
            .map_err(|err| {
                ServiceError::Inference(err.context(format!("fitting topics for phone {phone_id}")))
            })?;
        if fit.assignments.len() != docs.len() {
            return Err(ServiceError::Inference(anyhow!(
                "topic model returned {} assignments for {} documents",
                fit.assignments.len(),
                docs.len()
            )));
        }

        let mut topic_ids = HashSet::new();
        let mut links = 0usize;
        for (idx, &cluster) in fit.assignments.iter().enumerate() {
            if cluster == OUTLIER_TOPIC {
                debug!(run_id = %run_id, review_id = review_ids[idx], "Outlier review skipped");
                continue;
            }

            let terms = fit.terms(cluster);
            let Some((topic_label, _)) = terms.first() else {
                debug!(run_id = %run_id, cluster, "Cluster has no terms, skipping review");
                continue;
            };
            let representative_terms = terms
                .iter()
                .map(|(term, _)| term.as_str())
                .collect::<Vec<_>>()
                .join(", ");

            let topic_id = self
                .store
                .upsert_topic(phone_id, topic_label, &representative_terms)?;
            self.store
                .upsert_review_topic(review_ids[idx], topic_id, fit.probability(idx))?;
            topic_ids.insert(topic_id);
            links += 1;
        }

        info!(
            run_id = %run_id,
            phone_id,
            reviews = docs.len(),
            topics = topic_ids.len(),
            links,
            "Topics persisted for phone"
        );
        Ok(PhoneOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use anyhow::{bail, Result};
    use rusqlite::params;

    use super::*;
    use crate::{models::TopicFit, store::tests::seeded_store};

    struct NullEmbedder;

    impl Embedder for NullEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }
    }

    /// Returns a fixed fit, padded with outliers when more documents arrive.
    struct ScriptedTopicModel {
        fit: TopicFit,
    }

    impl TopicModel for ScriptedTopicModel {
        fn fit_transform(
            &self,
            docs: &[String],
            _embedder: &dyn Embedder,
            _vectorizer: &CountVectorizer,
        ) -> Result<TopicFit> {
            let mut fit = self.fit.clone();
            fit.assignments.resize(docs.len(), OUTLIER_TOPIC);
            Ok(fit)
        }
    }

    /// Fixed cluster assignments with terms ranked by the real vectorizer.
    struct VectorizerTopicModel {
        assignments: Vec<i64>,
    }

    impl TopicModel for VectorizerTopicModel {
        fn fit_transform(
            &self,
            docs: &[String],
            _embedder: &dyn Embedder,
            vectorizer: &CountVectorizer,
        ) -> Result<TopicFit> {
            let assignments: Vec<i64> = self.assignments[..docs.len()].to_vec();
            Ok(TopicFit {
                topic_terms: vectorizer.rank_topic_terms(docs, &assignments, 10),
                probabilities: Some(vec![0.9; docs.len()]),
                assignments,
            })
        }
    }

    fn battery_fit(assignments: Vec<i64>) -> TopicFit {
        TopicFit {
            assignments,
            probabilities: Some(vec![0.8, 0.6, 0.4, 0.2]),
            topic_terms: HashMap::from([
                (
                    0,
                    vec![("battery".to_string(), 0.5), ("drain".to_string(), 0.2)],
                ),
                (1, vec![]),
            ]),
        }
    }

    fn domain_words() -> Vec<String> {
        ["phone", "review", "smartphone"]
            .iter()
            .map(|w| w.to_string())
            .collect()
    }

    fn run(store: &Store, model: &dyn TopicModel, scope: TopicScope) -> Vec<String> {
        let normalizer = Normalizer::default();
        let extra = domain_words();
        TopicPipeline {
            store,
            normalizer: &normalizer,
            topic_model: model,
            embedder: &NullEmbedder,
            extra_stop_words: &extra,
        }
        .run(scope)
        .unwrap()
    }

    #[test]
    fn phone_without_reviews_reports_status_and_writes_nothing() {
        let store = seeded_store();
        let model = ScriptedTopicModel {
            fit: battery_fit(vec![]),
        };
        let statuses = run(&store, &model, TopicScope::SinglePhone(11));

        assert_eq!(statuses, vec!["No reviews found for phone_id 11"]);
        assert!(store.topic_records(11).unwrap().is_empty());
        assert!(store.review_topic_links().unwrap().is_empty());
    }

    #[test]
    fn shared_cluster_yields_one_topic_and_a_link_per_review() {
        let store = seeded_store();
        let model = ScriptedTopicModel {
            fit: battery_fit(vec![0, 0, OUTLIER_TOPIC]),
        };
        let statuses = run(&store, &model, TopicScope::SinglePhone(10));
        assert_eq!(statuses, vec!["Topics generated for phone_id 10"]);

        let topics = store.topic_records(10).unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic_label, "battery");
        assert_eq!(topics[0].representative_terms, "battery, drain");

        let links = store.review_topic_links().unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.topic_id == topics[0].topic_id));
        assert_eq!(links[0].review_id, 100);
        assert_eq!(links[0].relevance_score, 0.8);
        assert_eq!(links[1].review_id, 101);
        assert_eq!(links[1].relevance_score, 0.6);
    }

    #[test]
    fn outliers_and_termless_clusters_are_never_persisted() {
        let store = seeded_store();
        let model = ScriptedTopicModel {
            fit: battery_fit(vec![OUTLIER_TOPIC, 1, OUTLIER_TOPIC]),
        };
        run(&store, &model, TopicScope::SinglePhone(10));

        assert!(store.topic_records(10).unwrap().is_empty());
        assert!(store.review_topic_links().unwrap().is_empty());
    }

    #[test]
    fn missing_probabilities_store_zero_relevance() {
        let store = seeded_store();
        let mut fit = battery_fit(vec![0, OUTLIER_TOPIC, OUTLIER_TOPIC]);
        fit.probabilities = None;
        run(&store, &ScriptedTopicModel { fit }, TopicScope::SinglePhone(10));

        let links = store.review_topic_links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].relevance_score, 0.0);
    }

    #[test]
    fn all_phones_scope_omits_phones_without_reviews() {
        let store = seeded_store();
        let model = ScriptedTopicModel {
            fit: battery_fit(vec![0]),
        };
        let statuses = run(&store, &model, TopicScope::AllPhones);

        assert_eq!(
            statuses,
            vec![
                "Topics generated/updated for phone_id 10",
                "Topics generated/updated for phone_id 20",
            ]
        );
        assert_eq!(store.topic_records(20).unwrap().len(), 1);
    }

    #[test]
    fn rerun_after_new_review_reuses_existing_labels() {
        let store = seeded_store();
        let model = ScriptedTopicModel {
            fit: battery_fit(vec![0, 0, OUTLIER_TOPIC, 0]),
        };
        run(&store, &model, TopicScope::SinglePhone(10));
        let before = store.topic_records(10).unwrap();

        store
            .execute(
                "INSERT INTO reviews (review_id, phone_id, review_text) VALUES (?1, ?2, ?3)",
                params![103, 10, "Battery barely survives the afternoon."],
            )
            .unwrap();
        run(&store, &model, TopicScope::SinglePhone(10));

        let after = store.topic_records(10).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].topic_id, before[0].topic_id);

        let linked: Vec<i64> = store
            .review_topic_links()
            .unwrap()
            .iter()
            .map(|l| l.review_id)
            .collect();
        assert_eq!(linked, vec![100, 101, 103]);
    }

    #[test]
    fn labels_come_from_normalized_review_text() {
        let store = seeded_store();
        let model = VectorizerTopicModel {
            assignments: vec![0, 0, 1],
        };
        run(&store, &model, TopicScope::SinglePhone(10));

        let topics = store.topic_records(10).unwrap();
        let labels: Vec<&str> = topics.iter().map(|t| t.topic_label.as_str()).collect();
        assert!(labels.contains(&"battery"));
        assert_eq!(topics.len(), 2);
        assert_eq!(store.review_topic_links().unwrap().len(), 3);
    }

    #[test]
    fn mismatched_assignment_count_is_an_error() {
        struct ShortModel;
        impl TopicModel for ShortModel {
            fn fit_transform(
                &self,
                _docs: &[String],
                _embedder: &dyn Embedder,
                _vectorizer: &CountVectorizer,
            ) -> Result<TopicFit> {
                Ok(TopicFit::default())
            }
        }

        let store = seeded_store();
        let normalizer = Normalizer::default();
        let pipeline = TopicPipeline {
            store: &store,
            normalizer: &normalizer,
            topic_model: &ShortModel,
            embedder: &NullEmbedder,
            extra_stop_words: &[],
        };
        assert!(matches!(
            pipeline.run_single(10),
            Err(ServiceError::Inference(_))
        ));
    }

    #[test]
    fn review_that_normalizes_to_nothing_still_reaches_the_model() {
        /// Rejects empty text the way hosted embedding services do.
        struct StrictEmbedder;
        impl Embedder for StrictEmbedder {
            fn embed(&self, text: &str) -> Result<Vec<f32>> {
                if text.is_empty() {
                    bail!("empty embedding input");
                }
                Ok(vec![1.0, 0.0])
            }
        }

        /// Embeds through the shared helper and clusters non-empty docs together.
        #[derive(Default)]
        struct RecordingModel {
            seen: Mutex<Vec<(String, Vec<f32>)>>,
        }
        impl TopicModel for RecordingModel {
            fn fit_transform(
                &self,
                docs: &[String],
                embedder: &dyn Embedder,
                _vectorizer: &CountVectorizer,
            ) -> Result<TopicFit> {
                let embeddings = crate::inference::embed_documents(docs, embedder)?;
                self.seen
                    .lock()
                    .unwrap()
                    .extend(docs.iter().cloned().zip(embeddings));
                Ok(TopicFit {
                    assignments: docs
                        .iter()
                        .map(|d| if d.is_empty() { OUTLIER_TOPIC } else { 0 })
                        .collect(),
                    probabilities: Some(vec![0.7; docs.len()]),
                    topic_terms: HashMap::from([(0, vec![("battery".to_string(), 0.5)])]),
                })
            }
        }

        let store = seeded_store();
        store
            .execute(
                "INSERT INTO reviews (review_id, phone_id, review_text) VALUES (?1, ?2, ?3)",
                params![103, 10, "It is OK!!!"],
            )
            .unwrap();
        let normalizer = Normalizer::default();
        let model = RecordingModel::default();
        let status = TopicPipeline {
            store: &store,
            normalizer: &normalizer,
            topic_model: &model,
            embedder: &StrictEmbedder,
            extra_stop_words: &[],
        }
        .run_single(10)
        .unwrap();
        assert_eq!(status, "Topics generated for phone_id 10");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[3], (String::new(), vec![0.0, 0.0]));

        let topics = store.topic_records(10).unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic_label, "battery");
        let linked: Vec<i64> = store
            .review_topic_links()
            .unwrap()
            .iter()
            .map(|l| l.review_id)
            .collect();
        assert_eq!(linked, vec![100, 101, 102]);
    }
}
