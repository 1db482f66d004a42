use burn::data::dataset::{source::huggingface::HuggingfaceDatasetLoader, Dataset, SqliteDataset};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use tokenizers::{Tokenizer, TruncationParams};

use crate::error::{Error, Result};
use crate::labels::LabelMap;

/// Name of the annotated dataset on the Hugging Face hub.
pub const DATASET_NAME: &str = "ucberkeley-dlab/measuring-hate-speech";
/// Pretrained checkpoint whose subword vocabulary we tokenize with.
pub const TOKENIZER_NAME: &str = "distilbert-base-uncased";

/// One annotation row as published, restricted to the text and the seven
/// binary target columns. Any other column of the source dataset is ignored
/// at deserialization time; a missing one aborts the load.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RawRecord {
    pub text: String,
    pub target_race: bool,
    pub target_religion: bool,
    pub target_origin: bool,
    pub target_gender: bool,
    pub target_sexuality: bool,
    pub target_age: bool,
    pub target_disability: bool,
}

impl RawRecord {
    fn target(&self, label: &str) -> Option<bool> {
        match label {
            "race" => Some(self.target_race),
            "religion" => Some(self.target_religion),
            "origin" => Some(self.target_origin),
            "gender" => Some(self.target_gender),
            "sexuality" => Some(self.target_sexuality),
            "age" => Some(self.target_age),
            "disability" => Some(self.target_disability),
            _ => None,
        }
    }

    /// One-hot vector over the categories, in label identifier order.
    pub fn label_vector(&self, labels: &LabelMap) -> Result<Vec<f32>> {
        labels
            .names()
            .iter()
            .map(|name| {
                self.target(name)
                    .map(|hit| if hit { 1.0 } else { 0.0 })
                    .ok_or_else(|| Error::Schema(name.clone()))
            })
            .collect()
    }
}

/// A preprocessed example: raw text plus its binarized label vector.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct HateSpeechItem {
    pub text: String,
    /// One entry per category, always 0.0 or 1.0.
    pub labels: Vec<f32>,
}

/// A tokenized example. The text itself is dropped once encoded; only the
/// truncated (unpadded) token ids and the label vector move downstream.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TokenizedItem {
    pub input_ids: Vec<u32>,
    pub labels: Vec<f32>,
}

/// Downloads the annotation split from the hub. The loader caches the
/// dataset locally, so repeated runs do not re-fetch.
pub fn load_remote() -> Result<Vec<RawRecord>> {
    let dataset: SqliteDataset<RawRecord> =
        HuggingfaceDatasetLoader::new(DATASET_NAME).dataset("train")?;
    let records = dataset.iter().collect::<Vec<_>>();
    tracing::info!("loaded {} rows from {DATASET_NAME}", records.len());
    Ok(records)
}

/// Reads the same schema from a local CSV export. Boolean targets are
/// expected in lowercase (`true`/`false`).
pub fn load_csv(fname: &str) -> Result<Vec<RawRecord>> {
    let mut rdr = csv::ReaderBuilder::new().from_path(fname)?;

    let mut records = Vec::new();
    for record in rdr.deserialize() {
        records.push(record?);
    }
    tracing::info!("loaded {} rows from {fname}", records.len());
    Ok(records)
}

/// Converts raw records into examples carrying a single numeric label
/// vector, dropping the per-category columns.
pub fn binarize(records: Vec<RawRecord>, labels: &LabelMap) -> Result<Vec<HateSpeechItem>> {
    records
        .into_iter()
        .map(|record| {
            let vector = record.label_vector(labels)?;
            Ok(HateSpeechItem { text: record.text, labels: vector })
        })
        .collect()
}

/// Positive counts and percentages per category, for auditing the class
/// distribution before training.
#[derive(Debug, Clone)]
pub struct LabelStats {
    pub counts: Vec<usize>,
    pub percentages: Vec<f32>,
}

pub fn label_stats(items: &[HateSpeechItem], labels: &LabelMap) -> LabelStats {
    let mut counts = vec![0usize; labels.len()];
    for item in items {
        for (id, value) in item.labels.iter().enumerate() {
            if *value > 0.5 {
                counts[id] += 1;
            }
        }
    }

    let total = items.len().max(1);
    let percentages = counts
        .iter()
        .map(|count| 100.0 * *count as f32 / total as f32)
        .collect::<Vec<_>>();

    for (id, name) in labels.names().iter().enumerate() {
        tracing::info!(
            "label '{name}': {} positives ({:.2}%)",
            counts[id],
            percentages[id]
        );
    }

    LabelStats { counts, percentages }
}

/// The three disjoint partitions of the preprocessed dataset.
#[derive(Debug, Clone)]
pub struct DatasetSplits<T> {
    pub train: Vec<T>,
    pub validation: Vec<T>,
    pub test: Vec<T>,
}

/// Seeded 80/10/10 partition: 20% is first held out, then halved into
/// validation and test. The same seed always yields the same partitions.
pub fn split<T>(items: Vec<T>, seed: u64) -> DatasetSplits<T> {
    let (train, held_out) = split_off_fraction(items, 0.2, seed);
    let (validation, test) = split_off_fraction(held_out, 0.5, seed);

    tracing::info!(
        "split: {} train / {} validation / {} test",
        train.len(),
        validation.len(),
        test.len()
    );

    DatasetSplits { train, validation, test }
}

fn split_off_fraction<T>(mut items: Vec<T>, fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let held = ((items.len() as f64 * fraction).round() as usize).min(items.len());
    let tail = items.split_off(items.len() - held);
    (items, tail)
}

/// Fetches the pretrained subword tokenizer and caps sequences at the model
/// limit. No padding is configured here: batches pad dynamically to their
/// longest member at collation time.
pub fn load_tokenizer(name: &str, max_length: usize) -> Result<Tokenizer> {
    let mut tok = Tokenizer::from_pretrained(name, None)
        .map_err(|e| Error::Tokenizer(e.to_string()))?;
    tok.with_truncation(Some(TruncationParams { max_length, ..Default::default() }))
        .map_err(|e| Error::Tokenizer(e.to_string()))?;
    Ok(tok)
}

/// Identifier of the padding token in the tokenizer vocabulary.
pub fn pad_token_id(tok: &Tokenizer) -> Result<u32> {
    tok.token_to_id("[PAD]")
        .ok_or_else(|| Error::Tokenizer("vocabulary has no [PAD] token".to_string()))
}

/// Encodes every example, dropping the text afterwards.
pub fn tokenize(items: Vec<HateSpeechItem>, tok: &Tokenizer) -> Result<Vec<TokenizedItem>> {
    items
        .into_par_iter()
        .map(|item| {
            let encoding = tok
                .encode(item.text.as_str(), true)
                .map_err(|e| Error::Tokenizer(e.to_string()))?;
            Ok(TokenizedItem {
                input_ids: encoding.get_ids().to_vec(),
                labels: item.labels,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, age: bool, race: bool) -> RawRecord {
        RawRecord {
            text: text.to_string(),
            target_race: race,
            target_religion: false,
            target_origin: false,
            target_gender: false,
            target_sexuality: false,
            target_age: age,
            target_disability: false,
        }
    }

    #[test]
    fn test_label_vector_order_and_values() {
        let labels = LabelMap::from_dataset_schema().unwrap();
        let vector = record("old fart", true, false).label_vector(&labels).unwrap();

        assert_eq!(vector.len(), 7);
        assert!(vector.iter().all(|v| *v == 0.0 || *v == 1.0));
        assert_eq!(vector[labels.id("age").unwrap()], 1.0);
        assert_eq!(vector[labels.id("race").unwrap()], 0.0);
    }

    #[test]
    fn test_binarize_drops_nothing() {
        let labels = LabelMap::from_dataset_schema().unwrap();
        let records = vec![record("a", true, false), record("b", false, true)];
        let items = binarize(records, &labels).unwrap();

        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.labels.len() == labels.len()));
    }

    #[test]
    fn test_label_stats_counts_positives() {
        let labels = LabelMap::from_dataset_schema().unwrap();
        let items = binarize(
            vec![record("a", true, true), record("b", true, false)],
            &labels,
        )
        .unwrap();

        let stats = label_stats(&items, &labels);
        assert_eq!(stats.counts[labels.id("age").unwrap()], 2);
        assert_eq!(stats.counts[labels.id("race").unwrap()], 1);
        assert_eq!(stats.percentages[labels.id("age").unwrap()], 100.0);
        assert_eq!(stats.percentages[labels.id("race").unwrap()], 50.0);
    }

    #[test]
    fn test_split_proportions_and_coverage() {
        let items: Vec<usize> = (0..1000).collect();
        let splits = split(items, 42);

        assert_eq!(splits.train.len(), 800);
        assert_eq!(splits.validation.len(), 100);
        assert_eq!(splits.test.len(), 100);

        let mut all: Vec<usize> = splits
            .train
            .iter()
            .chain(splits.validation.iter())
            .chain(splits.test.iter())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        let first = split((0..500).collect::<Vec<usize>>(), 42);
        let second = split((0..500).collect::<Vec<usize>>(), 42);

        assert_eq!(first.train, second.train);
        assert_eq!(first.validation, second.validation);
        assert_eq!(first.test, second.test);
    }

    #[test]
    fn test_split_partitions_are_disjoint() {
        let splits = split((0..200).collect::<Vec<usize>>(), 7);
        for id in &splits.train {
            assert!(!splits.validation.contains(id));
            assert!(!splits.test.contains(id));
        }
        for id in &splits.validation {
            assert!(!splits.test.contains(id));
        }
    }
}
