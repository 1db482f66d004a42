use std::cmp::Ordering;
use std::path::PathBuf;

use burn::config::Config;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::CompactRecorder;
use burn::tensor::{activation::sigmoid, Int, Tensor};
use tokenizers::Tokenizer;

use crate::bert::BertForMultiLabelClassification;
use crate::error::{Error, Result};
use crate::labels::LabelMap;
use crate::train::TrainingConfig;

/// Score of a single hate speech category, in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryScore {
    pub label: String,
    pub score: f32,
}

/// All category scores for the probabilities of one example, ordered by
/// descending score. No threshold is applied: a text can belong to several
/// categories at once and the caller decides what to keep.
pub fn rank_scores(probabilities: Vec<f32>, labels: &LabelMap) -> Vec<CategoryScore> {
    let mut scores = probabilities
        .into_iter()
        .enumerate()
        .map(|(id, score)| CategoryScore {
            label: labels.name(id).unwrap_or("unknown").to_string(),
            score,
        })
        .collect::<Vec<_>>();

    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scores
}

/// Text classification pipeline over a trained model.
///
/// Rebuilds the model from the training config and weights saved under the
/// artifact directory, then scores free text against every category.
pub struct HateSpeechClassifier<B: Backend> {
    model: BertForMultiLabelClassification<B>,
    tokenizer: Tokenizer,
    labels: LabelMap,
    device: B::Device,
}

impl <B: Backend> HateSpeechClassifier<B> {
    pub fn load(
        artifact_dir: &str,
        tokenizer: Tokenizer,
        labels: LabelMap,
        device: B::Device,
    ) -> Result<Self> {
        let config = TrainingConfig::load(format!("{artifact_dir}/config.json"))
            .map_err(Error::Config)?;

        let model = config
            .model
            .init::<B>(&device)
            .load_file(
                PathBuf::from(format!("{artifact_dir}/model")),
                &CompactRecorder::new(),
                &device,
            )
            .map_err(Error::Record)?;
        tracing::info!("model loaded from {artifact_dir}");

        Ok(Self { model, tokenizer, labels, device })
    }

    /// Sigmoid scores for every category, highest first. A text may score
    /// high on several categories simultaneously; a slur about the elderly,
    /// say, is expected to rank `age` first.
    pub fn classify(&self, text: &str) -> Result<Vec<CategoryScore>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        let ids = encoding
            .get_ids()
            .iter()
            .map(|id| *id as i32)
            .collect::<Vec<_>>();

        let input_ids = Tensor::<B, 1, Int>::from_ints(ids.as_slice(), &self.device)
            .unsqueeze::<2>();
        let logits = self.model.forward(input_ids, None);
        let probabilities = sigmoid(logits)
            .into_data()
            .iter::<f32>()
            .collect::<Vec<_>>();

        Ok(rank_scores(probabilities, &self.labels))
    }
}

#[cfg(test)]
mod tests {
    use crate::labels::LabelMap;

    use super::rank_scores;

    #[test]
    fn test_scores_cover_every_category() {
        let labels = LabelMap::from_dataset_schema().unwrap();
        let scores = rank_scores(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.9, 0.6], &labels);

        assert_eq!(scores.len(), 7);
        let mut names = scores.iter().map(|s| s.label.clone()).collect::<Vec<_>>();
        names.sort();
        let mut expected = labels.names().to_vec();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_scores_are_sorted_descending() {
        let labels = LabelMap::from_dataset_schema().unwrap();
        let scores = rank_scores(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.9, 0.6], &labels);

        assert_eq!(scores[0].label, "age");
        assert_eq!(scores[0].score, 0.9);
        assert!(scores.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
