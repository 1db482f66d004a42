use std::sync::Arc;

use burn::data::dataloader::DataLoader;
use burn::prelude::Backend;
use burn::tensor::ElementConversion;

use crate::bert::{BertForMultiLabelClassification, MultiLabelBatch};
use crate::metrics::{prediction_rows, samples_accuracy, samples_f1, target_rows};

/// Exact dataset-level metrics for one split.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub loss: f64,
    pub accuracy: f64,
    pub f1: f64,
}

/// Scores a model over a whole dataloader without touching its parameters.
///
/// Per-batch metrics are weighted by batch size before averaging, so a
/// smaller trailing batch cannot skew the aggregate: the result equals
/// computing each metric over the concatenated dataset directly.
///
/// Run this on the inner (non autodiff) backend; no gradients are recorded
/// and dropout stays inactive there.
pub fn evaluate<B: Backend>(
    model: &BertForMultiLabelClassification<B>,
    dataloader: Arc<dyn DataLoader<MultiLabelBatch<B>>>,
) -> EvalReport {
    let mut running_loss = 0.0;
    let mut running_accuracy = 0.0;
    let mut running_f1 = 0.0;
    let mut num_samples = 0usize;

    for batch in dataloader.iter() {
        let batch_size = batch.labels.dims()[0];
        let output = model.forward_classification(batch);

        let predictions = prediction_rows(&output.logits);
        let targets = target_rows(&output.targets);
        let loss: f64 = output.loss.into_scalar().elem();

        running_loss += loss * batch_size as f64;
        running_accuracy += samples_accuracy(&predictions, &targets) * batch_size as f64;
        running_f1 += samples_f1(&predictions, &targets) * batch_size as f64;
        num_samples += batch_size;
    }

    if num_samples == 0 {
        return EvalReport { loss: 0.0, accuracy: 0.0, f1: 0.0 };
    }

    let n = num_samples as f64;
    EvalReport {
        loss: running_loss / n,
        accuracy: running_accuracy / n,
        f1: running_f1 / n,
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::NdArray;
    use burn::data::dataloader::batcher::Batcher;
    use burn::data::dataloader::DataLoaderBuilder;
    use burn::data::dataset::InMemDataset;
    use burn::prelude::Backend;
    use burn::tensor::ElementConversion;

    use crate::bert::test::tiny_model_config;
    use crate::bert::{MultiLabelBatcher, MultiLabelBatcherBuilder};
    use crate::data::TokenizedItem;
    use crate::metrics::{prediction_rows, samples_accuracy, samples_f1, target_rows};

    use super::evaluate;

    fn batcher() -> MultiLabelBatcher<NdArray> {
        MultiLabelBatcherBuilder::default()
            .pad_token_id(0)
            .num_labels(3)
            .max_seq_length(32)
            .device(Default::default())
            .build()
            .unwrap()
    }

    fn items() -> Vec<TokenizedItem> {
        // five examples so a batch size of two leaves a partial final batch
        vec![
            TokenizedItem { input_ids: vec![5, 6, 7], labels: vec![1.0, 0.0, 0.0] },
            TokenizedItem { input_ids: vec![8, 9], labels: vec![0.0, 1.0, 1.0] },
            TokenizedItem { input_ids: vec![10, 11, 12, 13], labels: vec![0.0, 0.0, 0.0] },
            TokenizedItem { input_ids: vec![14], labels: vec![1.0, 1.0, 0.0] },
            TokenizedItem { input_ids: vec![15, 16, 17, 18, 19], labels: vec![0.0, 0.0, 1.0] },
        ]
    }

    #[test]
    fn test_weighted_aggregation_matches_direct_computation() {
        NdArray::<f32>::seed(42);
        let device = Default::default();
        let model = tiny_model_config().init::<NdArray>(&device);

        let dataloader = DataLoaderBuilder::new(batcher())
            .batch_size(2)
            .build(InMemDataset::new(items()));
        let report = evaluate(&model, dataloader);

        // same metrics computed over the whole split as a single batch
        let full = batcher().batch(items());
        let output = model.forward_classification(full);
        let predictions = prediction_rows(&output.logits);
        let targets = target_rows(&output.targets);

        let direct_loss: f64 = output.loss.into_scalar().elem();
        let direct_accuracy = samples_accuracy(&predictions, &targets);
        let direct_f1 = samples_f1(&predictions, &targets);

        assert!((report.loss - direct_loss).abs() < 1e-4);
        assert!((report.accuracy - direct_accuracy).abs() < 1e-6);
        assert!((report.f1 - direct_f1).abs() < 1e-6);
    }

    #[test]
    fn test_empty_split_yields_zeroed_report() {
        let device = Default::default();
        let model = tiny_model_config().init::<NdArray>(&device);

        let dataloader = DataLoaderBuilder::new(batcher())
            .batch_size(2)
            .build(InMemDataset::new(Vec::<TokenizedItem>::new()));

        let report = evaluate(&model, dataloader);
        assert_eq!(report.loss, 0.0);
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.f1, 0.0);
    }
}
