use burn::{config::Config, module::Module, nn::{Dropout, DropoutConfig, Linear, LinearConfig}, prelude::Backend, tensor::{activation::relu, Tensor}};

/// Configuration of the multi-label classification head.
#[derive(Debug, Config)]
pub struct BertClassificationHeadConfig {
    /// number of categories to score
    pub num_labels: usize,
    /// 'hidden' size of the embeddings
    #[config(default = "768")]
    pub hidden_size: usize,
    /// probability that a classifier neuron be deactivated during a training step
    #[config(default = "0.2")]
    pub classifier_dropout: f64,
    /// std deviation when initializing the weights
    #[config(default = "0.02")]
    pub initializer_range: f64,
}

impl BertClassificationHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertClassificationHead<B> {
        let initializer = burn::nn::Initializer::Normal { mean: 0.0, std: self.initializer_range };
        let pre_classifier = LinearConfig::new(self.hidden_size, self.hidden_size)
            .with_initializer(initializer.clone())
            .init(device);
        let classifier = LinearConfig::new(self.hidden_size, self.num_labels)
            .with_initializer(initializer)
            .init(device);
        let dropout = DropoutConfig::new(self.classifier_dropout).init();

        BertClassificationHead { pre_classifier, dropout, classifier }
    }
}

/// Scores every category from the first token's hidden state.
///
/// One logit per category; the categories are not mutually exclusive, so no
/// softmax is ever applied over them.
#[derive(Debug, Module)]
pub struct BertClassificationHead<B: Backend> {
    pre_classifier: Linear<B>,
    dropout: Dropout,
    classifier: Linear<B>,
}

impl <B: Backend> BertClassificationHead<B> {
    pub fn forward(&self, hidden: Tensor<B, 3>) -> Tensor<B, 2> {
        let b = hidden.shape().dims[0];
        // hidden state of the leading [CLS] token
        let pooled: Tensor<B, 2> = hidden.slice([0..b, 0..1]).squeeze(1);

        let pooled = relu(self.pre_classifier.forward(pooled));
        let pooled = self.dropout.forward(pooled);
        self.classifier.forward(pooled)
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Tensor;

    use super::BertClassificationHeadConfig;

    #[test]
    fn test_one_logit_per_category() {
        let device = Default::default();
        let head = BertClassificationHeadConfig::new(7)
            .with_hidden_size(16)
            .init::<NdArray>(&device);

        let hidden = Tensor::<NdArray, 3>::zeros([4, 9, 16], &device);
        let logits = head.forward(hidden);
        assert_eq!(logits.dims(), [4, 7]);
    }
}
