//! BM25 sparse keyword model
//!
//! Trains a vocabulary, per-term IDF, and average document length over a
//! corpus, then turns arbitrary text into sparse index/value vectors for
//! the keyword half of hybrid search. Model state serialises to JSON and
//! round-trips bit-exactly.

use crate::error::{Bm25Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Sparse vector as parallel index/value arrays.
///
/// Indices are strictly increasing and all below the vocabulary size;
/// values are finite and non-negative. Empty is legal and means no
/// vocabulary term matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Options for [`Bm25Model::generate`]
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Keep only the top-N terms by score (lower vocab index wins ties)
    pub max_terms: Option<usize>,
    /// Drop terms scoring below this value
    pub min_score: Option<f32>,
    /// L2-normalise the value array
    pub normalize: bool,
}

/// Serialised model state, JSON-compatible
#[derive(Debug, Serialize, Deserialize)]
struct Bm25State {
    vocabulary: Vec<(String, u32)>,
    idf: Vec<(String, f32)>,
    avg_doc_length: f32,
    k1: f32,
    b: f32,
    min_term_len: usize,
    stop_words: Vec<String>,
    trained: bool,
}

/// Document counts gathered in one pass over a corpus
#[derive(Debug, Default)]
struct CorpusStats {
    doc_count: usize,
    total_tokens: usize,
    doc_frequencies: HashMap<String, usize>,
}

/// BM25 model: tokenisation, training, sparse-vector generation
#[derive(Debug, Clone)]
pub struct Bm25Model {
    k1: f32,
    b: f32,
    min_term_len: usize,
    stop_words: BTreeSet<String>,
    vocabulary: HashMap<String, u32>,
    idf: HashMap<String, f32>,
    avg_doc_length: f32,
    trained: bool,
}

impl Default for Bm25Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Model {
    /// Model with the standard parameters: k1=1.2, b=0.75, min_term_len=2,
    /// empty stop-word set
    pub fn new() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            min_term_len: 2,
            stop_words: BTreeSet::new(),
            vocabulary: HashMap::new(),
            idf: HashMap::new(),
            avg_doc_length: 0.0,
            trained: false,
        }
    }

    /// Replace the stop-word set (empty by default)
    pub fn with_stop_words(mut self, stop_words: impl IntoIterator<Item = String>) -> Self {
        self.stop_words = stop_words.into_iter().collect();
        self
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Lower-case, strip punctuation to spaces, split, and filter by
    /// length and stop words
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        cleaned
            .split_whitespace()
            .filter(|t| t.len() >= self.min_term_len && !self.stop_words.contains(*t))
            .map(String::from)
            .collect()
    }

    /// Rebuild the model from scratch over `corpus`.
    ///
    /// Clears previous state. Fails with `EmptyCorpus` when the corpus
    /// yields zero documents, or when no term survives tokenisation (a
    /// corpus of only stop words trains nothing).
    pub fn learn<I, S>(&mut self, corpus: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.vocabulary.clear();
        self.idf.clear();
        self.avg_doc_length = 0.0;
        self.trained = false;

        let stats = self.scan_corpus(corpus);
        if stats.doc_count == 0 || stats.doc_frequencies.is_empty() {
            return Err(Bm25Error::EmptyCorpus.into());
        }

        // Vocabulary indices are assigned by lexicographic term order so
        // training is independent of corpus iteration order
        let mut terms: Vec<&String> = stats.doc_frequencies.keys().collect();
        terms.sort();
        for (index, term) in terms.iter().enumerate() {
            self.vocabulary.insert((*term).clone(), index as u32);
        }

        self.finish_training(&stats);
        tracing::debug!(
            "BM25 trained: {} docs, {} terms, avg_doc_length {:.2}",
            stats.doc_count,
            self.vocabulary.len(),
            self.avg_doc_length
        );
        Ok(())
    }

    /// Retrain over `corpus` without reassigning existing vocabulary
    /// indices.
    ///
    /// Terms already in the vocabulary keep their index; unseen terms are
    /// appended after the current index space in lexicographic order. IDF
    /// and average document length are recomputed over `corpus`. Sparse
    /// vectors generated by earlier trainings stay index-compatible with
    /// this model, which is what incremental re-indexing relies on.
    pub fn learn_preserving<I, S>(&mut self, corpus: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stats = self.scan_corpus(corpus);
        if stats.doc_count == 0
            || (stats.doc_frequencies.is_empty() && self.vocabulary.is_empty())
        {
            return Err(Bm25Error::EmptyCorpus.into());
        }

        let mut new_terms: Vec<&String> = stats
            .doc_frequencies
            .keys()
            .filter(|term| !self.vocabulary.contains_key(*term))
            .collect();
        new_terms.sort();

        let mut next_index = self.vocabulary.len() as u32;
        for term in new_terms {
            self.vocabulary.insert(term.clone(), next_index);
            next_index += 1;
        }

        self.finish_training(&stats);
        tracing::debug!(
            "BM25 retrained preserving indices: {} docs, {} terms",
            stats.doc_count,
            self.vocabulary.len()
        );
        Ok(())
    }

    fn scan_corpus<I, S>(&self, corpus: I) -> CorpusStats
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stats = CorpusStats::default();
        for doc in corpus {
            stats.doc_count += 1;
            let tokens = self.tokenize(doc.as_ref());
            stats.total_tokens += tokens.len();

            let unique: BTreeSet<&String> = tokens.iter().collect();
            for term in unique {
                *stats.doc_frequencies.entry(term.clone()).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Recompute IDF for every vocabulary term (absent terms score as
    /// df = 0) plus the average document length, then flip the trained
    /// flag
    fn finish_training(&mut self, stats: &CorpusStats) {
        let n = stats.doc_count as f32;
        self.idf.clear();
        for term in self.vocabulary.keys() {
            let df = stats.doc_frequencies.get(term).copied().unwrap_or(0) as f32;
            self.idf
                .insert(term.clone(), ((n - df + 0.5) / (df + 0.5)).ln());
        }
        self.avg_doc_length = stats.total_tokens as f32 / n;
        self.trained = !self.vocabulary.is_empty() && self.avg_doc_length > 0.0;
    }

    /// Produce the sparse BM25 vector for `text`.
    ///
    /// Terms whose contribution is not positive are dropped (IDF may be
    /// negative for very common terms; such terms carry no weight in the
    /// sparse vector). Fails with `NotTrained` before `learn`.
    pub fn generate(&self, text: &str, options: &GenerateOptions) -> Result<SparseVector> {
        if !self.trained {
            return Err(Bm25Error::NotTrained.into());
        }

        let tokens = self.tokenize(text);
        let doc_length = tokens.len() as f32;

        let mut term_frequencies: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *term_frequencies.entry(token.as_str()).or_insert(0) += 1;
        }

        let min_score = options.min_score.unwrap_or(0.0).max(0.0);
        let norm = 1.0 - self.b + self.b * doc_length / self.avg_doc_length;

        let mut scored: Vec<(u32, f32)> = Vec::new();
        for (term, tf) in term_frequencies {
            let Some(&index) = self.vocabulary.get(term) else {
                continue;
            };
            let idf = self.idf[term];
            let tf = tf as f32;
            let score = idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm);
            if score > 0.0 && score >= min_score {
                scored.push((index, score));
            }
        }

        if let Some(max_terms) = options.max_terms {
            // Stable tie-break: lower vocabulary index wins
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
            scored.truncate(max_terms);
        }

        scored.sort_by_key(|(index, _)| *index);

        let mut indices: Vec<u32> = Vec::with_capacity(scored.len());
        let mut values: Vec<f32> = Vec::with_capacity(scored.len());
        for (index, score) in scored {
            indices.push(index);
            values.push(score);
        }

        if options.normalize {
            let magnitude = values.iter().map(|v| v * v).sum::<f32>().sqrt();
            if magnitude > 0.0 {
                for value in &mut values {
                    *value /= magnitude;
                }
            }
        }

        Ok(SparseVector { indices, values })
    }

    /// Serialise the model state to JSON
    pub fn to_json(&self) -> Result<String> {
        let mut vocabulary: Vec<(String, u32)> = self
            .vocabulary
            .iter()
            .map(|(t, i)| (t.clone(), *i))
            .collect();
        vocabulary.sort_by(|a, b| a.0.cmp(&b.0));

        let mut idf: Vec<(String, f32)> =
            self.idf.iter().map(|(t, v)| (t.clone(), *v)).collect();
        idf.sort_by(|a, b| a.0.cmp(&b.0));

        let state = Bm25State {
            vocabulary,
            idf,
            avg_doc_length: self.avg_doc_length,
            k1: self.k1,
            b: self.b,
            min_term_len: self.min_term_len,
            stop_words: self.stop_words.iter().cloned().collect(),
            trained: self.trained,
        };

        serde_json::to_string(&state).map_err(|e| Bm25Error::Serialize(e.to_string()).into())
    }

    /// Reconstruct a model from its JSON state
    pub fn from_json(json: &str) -> Result<Self> {
        let state: Bm25State =
            serde_json::from_str(json).map_err(|e| Bm25Error::Deserialize(e.to_string()))?;

        Ok(Self {
            k1: state.k1,
            b: state.b,
            min_term_len: state.min_term_len,
            stop_words: state.stop_words.into_iter().collect(),
            vocabulary: state.vocabulary.into_iter().collect(),
            idf: state.idf.into_iter().collect(),
            avg_doc_length: state.avg_doc_length,
            trained: state.trained,
        })
    }
}

/// Per-collection BM25 model hand-over point.
///
/// The indexer is the single writer: after each re-training it publishes
/// an immutable snapshot here and mirrors it to disk. Readers (the
/// searcher) only ever see complete models.
pub struct Bm25Store {
    dir: std::path::PathBuf,
    cache: std::sync::RwLock<HashMap<String, std::sync::Arc<Bm25Model>>>,
}

impl Bm25Store {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: std::sync::RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, collection: &str) -> std::path::PathBuf {
        self.dir.join(format!("{collection}.bm25.json"))
    }

    /// Current model for a collection, from memory or disk
    pub fn get(&self, collection: &str) -> Option<std::sync::Arc<Bm25Model>> {
        if let Some(model) = self.read_cache().get(collection) {
            return Some(model.clone());
        }

        let path = self.path_for(collection);
        let json = std::fs::read_to_string(path).ok()?;
        match Bm25Model::from_json(&json) {
            Ok(model) => {
                let model = std::sync::Arc::new(model);
                self.write_cache()
                    .insert(collection.to_string(), model.clone());
                Some(model)
            }
            Err(e) => {
                tracing::warn!("Dropping unreadable BM25 model for {}: {}", collection, e);
                None
            }
        }
    }

    /// Publish a freshly trained model (memory first, then disk)
    pub fn put(&self, collection: &str, model: Bm25Model) -> Result<()> {
        let json = model.to_json()?;
        self.write_cache()
            .insert(collection.to_string(), std::sync::Arc::new(model));

        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        std::io::Write::write_all(&mut tmp, json.as_bytes())?;
        tmp.persist(self.path_for(collection))
            .map_err(|e| crate::error::Error::Io(e.error))?;
        Ok(())
    }

    /// Drop the model with its collection
    pub fn remove(&self, collection: &str) {
        self.write_cache().remove(collection);
        let _ = std::fs::remove_file(self.path_for(collection));
    }

    fn read_cache(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, std::sync::Arc<Bm25Model>>> {
        self.cache.read().unwrap_or_else(|poison| poison.into_inner())
    }

    fn write_cache(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, std::sync::Arc<Bm25Model>>> {
        self.cache.write().unwrap_or_else(|poison| poison.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trained_model() -> Bm25Model {
        let mut model = Bm25Model::new();
        model
            .learn([
                "fn authenticate(password: &str) -> bool { verify_credentials(password) }",
                "fn render(template: &str) -> String { template.to_owned() }",
                "fn parse_config(path: &str) -> Config { read_toml(path) }",
                "# Deployment notes\nrestart the gateway service after deploy",
            ])
            .unwrap();
        model
    }

    #[test]
    fn test_tokenizer_rules() {
        let model = Bm25Model::new();
        let tokens = model.tokenize("Foo::bar_baz(x, 42) - q");
        // "q" is dropped (shorter than min_term_len), punctuation splits
        assert_eq!(tokens, vec!["foo", "bar_baz", "42"]);
    }

    #[test]
    fn test_tokenizer_stop_words() {
        let model = Bm25Model::new().with_stop_words(["the".to_string(), "fn".to_string()]);
        let tokens = model.tokenize("the fn runs the loop");
        assert_eq!(tokens, vec!["runs", "loop"]);
    }

    #[test]
    fn test_learn_empty_corpus_fails() {
        let mut model = Bm25Model::new();
        let err = model.learn(Vec::<String>::new()).unwrap_err();
        assert_eq!(err.kind(), "empty_corpus");
        assert!(!model.is_trained());
    }

    #[test]
    fn test_learn_stop_word_only_corpus_fails() {
        let mut model = Bm25Model::new().with_stop_words(["stop".to_string()]);
        let err = model.learn(["stop stop stop"]).unwrap_err();
        assert_eq!(err.kind(), "empty_corpus");
    }

    #[test]
    fn test_generate_before_learn_fails() {
        let model = Bm25Model::new();
        let err = model
            .generate("anything", &GenerateOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "not_trained");
    }

    #[test]
    fn test_learn_clears_previous_state() {
        let mut model = Bm25Model::new();
        model.learn(["alpha beta", "alpha gamma"]).unwrap();
        let first_size = model.vocabulary_size();

        model.learn(["delta epsilon"]).unwrap();
        assert_ne!(model.vocabulary_size(), first_size);
        let vector = model
            .generate("alpha", &GenerateOptions::default())
            .unwrap();
        assert!(vector.is_empty());
    }

    #[test]
    fn test_sparse_vector_well_formed() {
        let model = trained_model();
        let vector = model
            .generate(
                "authenticate the user password and render the template",
                &GenerateOptions::default(),
            )
            .unwrap();

        assert_eq!(vector.indices.len(), vector.values.len());
        assert!(!vector.is_empty());
        for pair in vector.indices.windows(2) {
            assert!(pair[0] < pair[1], "indices must be strictly increasing");
        }
        for &index in &vector.indices {
            assert!((index as usize) < model.vocabulary_size());
        }
        for &value in &vector.values {
            assert!(value.is_finite());
            assert!(value >= 0.0);
        }
    }

    #[test]
    fn test_rare_term_outweighs_common_term() {
        let mut model = Bm25Model::new();
        model
            .learn([
                "common rare_term common filler",
                "common filler words here",
                "common words again filler",
                "common more words filler",
            ])
            .unwrap();

        let vector = model
            .generate("common rare_term", &GenerateOptions::default())
            .unwrap();

        // The common term has negative idf and drops out entirely
        assert_eq!(vector.indices.len(), 1);
        assert!(vector.values[0] > 0.0);
    }

    #[test]
    fn test_max_terms_keeps_top_scores() {
        let model = trained_model();
        let full = model
            .generate(
                "authenticate password render template deploy restart service",
                &GenerateOptions::default(),
            )
            .unwrap();
        let capped = model
            .generate(
                "authenticate password render template deploy restart service",
                &GenerateOptions {
                    max_terms: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(full.indices.len() > 2);
        assert_eq!(capped.indices.len(), 2);

        // The kept values are the two best scores of the full vector
        let mut best: Vec<f32> = full.values.clone();
        best.sort_by(|a, b| b.partial_cmp(a).unwrap());
        let mut kept: Vec<f32> = capped.values.clone();
        kept.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(kept, best[..2].to_vec());
    }

    #[test]
    fn test_min_score_filters() {
        let model = trained_model();
        let unfiltered = model
            .generate("authenticate password", &GenerateOptions::default())
            .unwrap();
        let filtered = model
            .generate(
                "authenticate password",
                &GenerateOptions {
                    min_score: Some(f32::MAX),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!unfiltered.is_empty());
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_normalize_produces_unit_vector() {
        let model = trained_model();
        let vector = model
            .generate(
                "authenticate password render",
                &GenerateOptions {
                    normalize: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let magnitude: f32 = vector.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_no_vocabulary_match_is_empty_not_error() {
        let model = trained_model();
        let vector = model
            .generate("zzz qqq xxyyzz", &GenerateOptions::default())
            .unwrap();
        assert!(vector.is_empty());
    }

    #[test]
    fn test_serialization_roundtrip_bit_exact() {
        let model = trained_model();
        let json = model.to_json().unwrap();
        let restored = Bm25Model::from_json(&json).unwrap();

        assert_eq!(restored.is_trained(), model.is_trained());
        assert_eq!(restored.vocabulary_size(), model.vocabulary_size());
        assert_eq!(restored.avg_doc_length.to_bits(), model.avg_doc_length.to_bits());
        for (term, idf) in &model.idf {
            assert_eq!(restored.idf[term].to_bits(), idf.to_bits());
        }

        // Generation through the restored model is bit-identical
        let query = "authenticate the user password";
        let options = GenerateOptions {
            max_terms: Some(256),
            normalize: true,
            ..Default::default()
        };
        let original = model.generate(query, &options).unwrap();
        let roundtrip = restored.generate(query, &options).unwrap();
        assert_eq!(original.indices, roundtrip.indices);
        let original_bits: Vec<u32> = original.values.iter().map(|v| v.to_bits()).collect();
        let roundtrip_bits: Vec<u32> = roundtrip.values.iter().map(|v| v.to_bits()).collect();
        assert_eq!(original_bits, roundtrip_bits);
    }

    #[test]
    fn test_vocabulary_is_order_independent() {
        let mut forward = Bm25Model::new();
        forward.learn(["alpha beta", "gamma delta"]).unwrap();
        let mut reverse = Bm25Model::new();
        reverse.learn(["gamma delta", "alpha beta"]).unwrap();
        assert_eq!(forward.to_json().unwrap(), reverse.to_json().unwrap());
    }

    #[test]
    fn test_learn_preserving_keeps_existing_indices() {
        let mut model = Bm25Model::new();
        model.learn(["delta alpha", "alpha charlie"]).unwrap();
        let before: HashMap<String, u32> = model.vocabulary.clone();

        model
            .learn_preserving(["delta alpha", "alpha charlie", "bravo echo"])
            .unwrap();

        for (term, index) in &before {
            assert_eq!(model.vocabulary[term], *index, "index of '{term}' moved");
        }
        // New terms land after the existing index space
        assert!(model.vocabulary["bravo"] >= before.len() as u32);
        assert!(model.vocabulary["echo"] >= before.len() as u32);
        // Every vocabulary term carries an idf
        assert_eq!(model.idf.len(), model.vocabulary.len());
        assert!(model.is_trained());
    }

    #[test]
    fn test_learn_preserving_from_empty_matches_learn() {
        let corpus = ["alpha beta", "gamma beta delta"];
        let mut fresh = Bm25Model::new();
        fresh.learn(corpus).unwrap();
        let mut preserved = Bm25Model::new();
        preserved.learn_preserving(corpus).unwrap();
        assert_eq!(fresh.to_json().unwrap(), preserved.to_json().unwrap());
    }

    #[test]
    fn test_learn_preserving_retains_terms_missing_from_corpus() {
        let mut model = Bm25Model::new();
        model.learn(["alpha beta", "alpha gamma"]).unwrap();
        let alpha_index = model.vocabulary["alpha"];

        // The new corpus no longer contains "alpha"; its slot survives
        model
            .learn_preserving(["beta gamma", "gamma delta"])
            .unwrap();
        assert_eq!(model.vocabulary["alpha"], alpha_index);
        assert!(model.idf.contains_key("alpha"));

        // A query for the vanished term produces a vector that simply
        // matches nothing, not an error
        let vector = model
            .generate("alpha", &GenerateOptions::default())
            .unwrap();
        assert_eq!(vector.indices, vec![alpha_index]);
    }

    #[test]
    fn test_learn_preserving_empty_corpus_fails() {
        let mut model = Bm25Model::new();
        let err = model
            .learn_preserving(Vec::<String>::new())
            .unwrap_err();
        assert_eq!(err.kind(), "empty_corpus");
    }

    #[test]
    fn test_bm25_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Bm25Store::new(dir.path());
        assert!(store.get("code_chunks_abc").is_none());

        store.put("code_chunks_abc", trained_model()).unwrap();
        let loaded = store.get("code_chunks_abc").unwrap();
        assert!(loaded.is_trained());

        // Survives a fresh store instance (disk mirror)
        let fresh = Bm25Store::new(dir.path());
        assert!(fresh.get("code_chunks_abc").is_some());

        store.remove("code_chunks_abc");
        let fresh = Bm25Store::new(dir.path());
        assert!(fresh.get("code_chunks_abc").is_none());
    }

    #[test]
    fn test_idf_formula() {
        let mut model = Bm25Model::new();
        // "shared" appears in both docs, "solo" in one
        model.learn(["shared solo", "shared other"]).unwrap();

        let n = 2.0f32;
        let expected_solo = ((n - 1.0 + 0.5) / (1.0 + 0.5)).ln();
        let expected_shared = ((n - 2.0 + 0.5) / (2.0 + 0.5)).ln();
        assert!((model.idf["solo"] - expected_solo).abs() < 1e-6);
        assert!((model.idf["shared"] - expected_shared).abs() < 1e-6);
        // Very common terms go negative; that is intentional
        assert!(model.idf["shared"] < 0.0);
    }
}
