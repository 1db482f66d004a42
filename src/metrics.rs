use std::marker::PhantomData;

use burn::prelude::Backend;
use burn::tensor::{activation::sigmoid, Int, Tensor};
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};

/// Sigmoid probabilities at or above this value count as a positive
/// prediction for their category.
pub const DECISION_THRESHOLD: f32 = 0.50;

/// Fraction of matching entries over the flattened prediction and label
/// matrices. Rows must be binary vectors of equal length.
pub fn samples_accuracy(predictions: &[Vec<f32>], targets: &[Vec<f32>]) -> f64 {
    let total: usize = targets.iter().map(Vec::len).sum();
    if total == 0 {
        return 0.0;
    }

    let matching: usize = predictions
        .iter()
        .zip(targets.iter())
        .flat_map(|(row, truth)| row.iter().zip(truth.iter()))
        .filter(|(p, t)| (**p > 0.5) == (**t > 0.5))
        .count();

    matching as f64 / total as f64
}

/// Per-example F1 averaged over all examples. For one example with tp true
/// positives, the score is 2·tp / (|predicted| + |actual|); a zero
/// denominator scores 0.
pub fn samples_f1(predictions: &[Vec<f32>], targets: &[Vec<f32>]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }

    let sum: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(row, truth)| {
            let tp = row
                .iter()
                .zip(truth.iter())
                .filter(|(p, t)| **p > 0.5 && **t > 0.5)
                .count();
            let denominator = row.iter().filter(|p| **p > 0.5).count()
                + truth.iter().filter(|t| **t > 0.5).count();

            if denominator == 0 {
                0.0
            } else {
                2.0 * tp as f64 / denominator as f64
            }
        })
        .sum();

    sum / targets.len() as f64
}

/// Thresholded predictions as binary row vectors, one per example.
pub fn prediction_rows<B: Backend>(logits: &Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, classes] = logits.dims();
    let flat = sigmoid(logits.clone())
        .greater_equal_elem(DECISION_THRESHOLD)
        .float()
        .into_data()
        .iter::<f32>()
        .collect::<Vec<_>>();

    flat.chunks(classes).map(<[f32]>::to_vec).collect()
}

/// Target label matrix as binary row vectors, one per example.
pub fn target_rows<B: Backend>(targets: &Tensor<B, 2, Int>) -> Vec<Vec<f32>> {
    let [_, classes] = targets.dims();
    let flat = targets
        .clone()
        .float()
        .into_data()
        .iter::<f32>()
        .collect::<Vec<_>>();

    flat.chunks(classes).map(<[f32]>::to_vec).collect()
}

/// What the multi-label metrics consume: raw logits and the 0/1 label
/// matrix, both shaped `[batch, categories]`.
pub struct MultiLabelInput<B: Backend> {
    pub logits: Tensor<B, 2>,
    pub targets: Tensor<B, 2, Int>,
}

impl<B: Backend> MultiLabelInput<B> {
    pub fn new(logits: Tensor<B, 2>, targets: Tensor<B, 2, Int>) -> Self {
        Self { logits, targets }
    }
}

/// Running sample-wise accuracy over an epoch.
pub struct SamplesAccuracyMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> Default for SamplesAccuracyMetric<B> {
    fn default() -> Self {
        Self { state: NumericMetricState::default(), _b: PhantomData }
    }
}

impl<B: Backend> SamplesAccuracyMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for SamplesAccuracyMetric<B> {
    const NAME: &'static str = "Samples Accuracy";

    type Input = MultiLabelInput<B>;

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, _] = input.targets.dims();
        let accuracy = samples_accuracy(
            &prediction_rows(&input.logits),
            &target_rows(&input.targets),
        );

        self.state.update(
            100.0 * accuracy,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for SamplesAccuracyMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// Running sample-wise F1 over an epoch.
pub struct SamplesF1Metric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> Default for SamplesF1Metric<B> {
    fn default() -> Self {
        Self { state: NumericMetricState::default(), _b: PhantomData }
    }
}

impl<B: Backend> SamplesF1Metric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for SamplesF1Metric<B> {
    const NAME: &'static str = "Samples F1";

    type Input = MultiLabelInput<B>;

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, _] = input.targets.dims();
        let f1 = samples_f1(
            &prediction_rows(&input.logits),
            &target_rows(&input.targets),
        );

        self.state.update(
            100.0 * f1,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for SamplesF1Metric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
