use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::normalize::ENGLISH_STOP_WORDS;

/// Term-frequency vectorizer: lowercases, keeps tokens of two or more word
/// characters and drops stopwords.
#[derive(Debug, Clone, Default)]
pub struct CountVectorizer {
    stop_words: BTreeSet<String>,
}

impl CountVectorizer {
    pub fn new<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stop_words: stop_words.into_iter().map(Into::into).collect(),
        }
    }

    /// English stopwords plus domain terms that carry no topical signal.
    pub fn english_with(extra: &[String]) -> Self {
        Self::new(
            ENGLISH_STOP_WORDS
                .iter()
                .map(|w| w.to_string())
                .chain(extra.iter().map(|w| w.trim().to_ascii_lowercase()))
                .filter(|w| !w.is_empty()),
        )
    }

    pub fn is_stop_word(&self, term: &str) -> bool {
        self.stop_words.contains(term)
    }

    pub fn analyze(&self, doc: &str) -> Vec<String> {
        doc.to_lowercase()
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|token| token.chars().count() >= 2 && !self.is_stop_word(token))
            .map(str::to_string)
            .collect()
    }

    pub fn term_counts(&self, doc: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for term in self.analyze(doc) {
            *counts.entry(term).or_insert(0) += 1;
        }
        counts
    }

    /// Rank terms per cluster with class-based TF-IDF.
    ///
    /// Every cluster (outliers included) is one class; the weight of term `t`
    /// in class `c` is `tf(t,c) / |c| * ln(1 + A / f(t))` where `A` is the
    /// mean word count per class and `f(t)` the term's total frequency.
    /// Only positive weights are kept, best first, ties broken by term.
    pub fn rank_topic_terms(
        &self,
        docs: &[String],
        assignments: &[i64],
        top_n: usize,
    ) -> HashMap<i64, Vec<(String, f64)>> {
        let mut class_counts: BTreeMap<i64, BTreeMap<String, usize>> = BTreeMap::new();
        for (doc, cluster) in docs.iter().zip(assignments) {
            let counts = class_counts.entry(*cluster).or_default();
            for (term, n) in self.term_counts(doc) {
                *counts.entry(term).or_insert(0) += n;
            }
        }

        let mut term_totals: HashMap<&str, usize> = HashMap::new();
        let mut words_total = 0usize;
        for counts in class_counts.values() {
            for (term, n) in counts {
                *term_totals.entry(term.as_str()).or_insert(0) += n;
                words_total += n;
            }
        }
        if class_counts.is_empty() || words_total == 0 {
            return HashMap::new();
        }
        let mean_words = words_total as f64 / class_counts.len() as f64;

        let mut ranked = HashMap::new();
        for (cluster, counts) in &class_counts {
            let class_words: usize = counts.values().sum();
            if class_words == 0 {
                continue;
            }

            let mut weights: Vec<(String, f64)> = counts
                .iter()
                .map(|(term, n)| {
                    let tf = *n as f64 / class_words as f64;
                    let idf = (1.0 + mean_words / term_totals[term.as_str()] as f64).ln();
                    (term.clone(), tf * idf)
                })
                .filter(|(_, weight)| *weight > 0.0)
                .collect();
            weights.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            weights.truncate(top_n);

            if !weights.is_empty() {
                ranked.insert(*cluster, weights);
            }
        }
        ranked
    }
}
