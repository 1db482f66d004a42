use burn::{config::Config, data::dataloader::batcher::Batcher, module::Module, nn::{attention::{generate_padding_mask, GeneratePaddingMask}, loss::BinaryCrossEntropyLossConfig}, prelude::Backend, tensor::{backend::AutodiffBackend, Bool, Int, Tensor, TensorData}, train::{metric::{Adaptor, LossInput}, TrainOutput, TrainStep, ValidStep}};
use derive_builder::Builder;

use crate::data::TokenizedItem;
use crate::metrics::MultiLabelInput;

use super::{BertClassificationHead, BertClassificationHeadConfig, BertModel, BertModelConfig};

/// A collated batch: token ids padded to the longest sequence of the batch,
/// the matching padding mask, and the 0/1 label matrix.
#[derive(Debug, Clone)]
pub struct MultiLabelBatch<B: Backend> {
    /// Shape: [batch, sequence]
    pub input_ids: Tensor<B, 2, Int>,
    /// Shape: [batch, sequence]
    pub padding_mask: Tensor<B, 2, Bool>,
    /// Shape: [batch, categories]
    pub labels: Tensor<B, 2, Int>,
}

/// Creates a MultiLabelBatch from a series of tokenized examples.
///
/// Sequences arrive unpadded; padding happens here, per batch, up to the
/// longest member (dynamic padding).
#[derive(Debug, Clone, Builder)]
pub struct MultiLabelBatcher<B: Backend> {
    /// the identifier of the [PAD] token in the vocabulary
    /// => for distilbert-base-uncased, it would be 0
    pub pad_token_id: u32,
    /// number of hate speech categories
    pub num_labels: usize,
    /// maximum sequence length for the tokenized text
    pub max_seq_length: u32,
    /// the device where the tensors must be created
    pub device: B::Device
}

impl <B: Backend> Batcher<TokenizedItem, MultiLabelBatch<B>> for MultiLabelBatcher<B> {
    fn batch(&self, items: Vec<TokenizedItem>) -> MultiLabelBatch<B> {
        let tokens_list = items.iter()
            .map(|i| i.input_ids.iter().copied().map(|t| t as usize).collect())
            .collect();

        // pad every sequence of the batch to a common length
        let GeneratePaddingMask{tensor, mask} = generate_padding_mask::<B>(
            self.pad_token_id as usize,
            tokens_list,
            Some(self.max_seq_length as usize),
            &self.device);

        let batch_size = items.len();
        let labels_flat = items.iter()
            .flat_map(|i| i.labels.iter().map(|l| *l as i32))
            .collect::<Vec<_>>();
        let labels = Tensor::from_data(
            TensorData::new(labels_flat, [batch_size, self.num_labels]),
            &self.device);

        MultiLabelBatch {
            input_ids: tensor,
            padding_mask: mask,
            labels,
        }
    }
}

/// What a train or valid step hands to the metrics: the multi-label loss,
/// one logit per category, and the target matrix.
#[derive(Debug)]
pub struct MultiLabelOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub logits: Tensor<B, 2>,
    pub targets: Tensor<B, 2, Int>,
}

impl <B: Backend> Adaptor<LossInput<B>> for MultiLabelOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl <B: Backend> Adaptor<MultiLabelInput<B>> for MultiLabelOutput<B> {
    fn adapt(&self) -> MultiLabelInput<B> {
        MultiLabelInput::new(self.logits.clone(), self.targets.clone())
    }
}

#[derive(Debug, Config)]
pub struct BertForMultiLabelClassificationConfig {
    /// number of categories to score
    pub num_labels: usize,
    // ---- embedding ---------
    /// size of the word token vocabulary
    #[config(default = "30522")]
    pub vocab_size: usize,
    /// identifier of the pad token
    #[config(default = "0")]
    pub pad_token_id: usize,
    /// max length of any processable sequence
    #[config(default = "512")]
    pub max_position_embeddings: usize,
    /// 'hidden' size of the embeddings
    #[config(default = "768")]
    pub hidden_size: usize,
    /// probability that an embedding neuron be deactivated during a training step
    #[config(default = "0.1")]
    pub hidden_dropout_prob: f64,
    /// small value whose role is to prevent division by zero in layer norm
    #[config(default = "1e-12")]
    pub layer_norm_eps: f64,
    // ---- encoder
    /// probability that a neuron from the hidden layers in the encoder be deactivated during training
    #[config(default = "0.1")]
    pub attention_probs_dropout_prob: f64,
    /// std deviation when initializing the encoder weights
    #[config(default = "0.02")]
    pub initializer_range: f64,
    /// output size of the hidden layers
    #[config(default = "3072")]
    pub intermediate_size: usize,
    /// number of self attention heads in the encoder
    #[config(default = "12")]
    pub num_attention_heads: usize,
    /// number of encoder layers
    #[config(default = "6")]
    pub num_hidden_layers: usize,
    // ---- head
    /// probability that a classifier neuron be deactivated during a training step
    #[config(default = "0.2")]
    pub classifier_dropout: f64,
}

/// The encoder backbone topped with the multi-label classification head.
#[derive(Debug, Module)]
pub struct BertForMultiLabelClassification<B: Backend> {
    model: BertModel<B>,
    head: BertClassificationHead<B>
}

impl BertForMultiLabelClassificationConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertForMultiLabelClassification<B> {
        let model = self.bert_config().init(device);
        let head = self.head_config().init(device);

        BertForMultiLabelClassification { model, head }
    }
    fn bert_config(&self) -> BertModelConfig {
        BertModelConfig::new()
            .with_attention_probs_dropout_prob(self.attention_probs_dropout_prob)
            .with_hidden_dropout_prob(self.hidden_dropout_prob)
            .with_hidden_size(self.hidden_size)
            .with_initializer_range(self.initializer_range)
            .with_intermediate_size(self.intermediate_size)
            .with_layer_norm_eps(self.layer_norm_eps)
            .with_max_position_embeddings(self.max_position_embeddings)
            .with_num_attention_heads(self.num_attention_heads)
            .with_num_hidden_layers(self.num_hidden_layers)
            .with_pad_token_id(self.pad_token_id)
            .with_vocab_size(self.vocab_size)
    }
    fn head_config(&self) -> BertClassificationHeadConfig {
        BertClassificationHeadConfig::new(self.num_labels)
            .with_hidden_size(self.hidden_size)
            .with_classifier_dropout(self.classifier_dropout)
            .with_initializer_range(self.initializer_range)
    }
}

impl <B: Backend> BertForMultiLabelClassification<B> {
    /// Raw per-category logits for a batch of token sequences.
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, padding_mask: Option<Tensor<B, 2, Bool>>) -> Tensor<B, 2> {
        let hidden = self.model.forward(input_ids, padding_mask);
        self.head.forward(hidden)
    }

    /// Forward pass plus the multi-label criterion: binary cross entropy
    /// with logits, averaged over every (example, category) cell.
    pub fn forward_classification(&self, batch: MultiLabelBatch<B>) -> MultiLabelOutput<B> {
        let logits = self.forward(batch.input_ids, Some(batch.padding_mask));

        let criterion = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&logits.device());
        let loss = criterion.forward(logits.clone(), batch.labels.clone());

        MultiLabelOutput { loss, logits, targets: batch.labels }
    }
}

impl <B: AutodiffBackend> TrainStep<MultiLabelBatch<B>, MultiLabelOutput<B>> for BertForMultiLabelClassification<B> {
    fn step(&self, batch: MultiLabelBatch<B>) -> TrainOutput<MultiLabelOutput<B>> {
        let output = self.forward_classification(batch);
        TrainOutput::new(self, output.loss.backward(), output)
    }
}
impl <B: Backend> ValidStep<MultiLabelBatch<B>, MultiLabelOutput<B>> for BertForMultiLabelClassification<B> {
    fn step(&self, batch: MultiLabelBatch<B>) -> MultiLabelOutput<B> {
        self.forward_classification(batch)
    }
}

#[cfg(test)]
pub mod test {
    use burn::backend::ndarray::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    use crate::data::TokenizedItem;

    use super::{BertForMultiLabelClassificationConfig, MultiLabelBatcherBuilder};

    fn item(ids: &[u32], labels: &[f32]) -> TokenizedItem {
        TokenizedItem { input_ids: ids.to_vec(), labels: labels.to_vec() }
    }

    pub fn tiny_model_config() -> BertForMultiLabelClassificationConfig {
        BertForMultiLabelClassificationConfig::new(3)
            .with_vocab_size(100)
            .with_hidden_size(16)
            .with_intermediate_size(32)
            .with_num_attention_heads(2)
            .with_num_hidden_layers(1)
            .with_max_position_embeddings(32)
    }

    #[test]
    fn test_batch_pads_to_longest_sequence() {
        let device = Default::default();
        let batcher = MultiLabelBatcherBuilder::<NdArray>::default()
            .pad_token_id(0)
            .num_labels(3)
            .max_seq_length(32)
            .device(device)
            .build()
            .unwrap();

        let batch = batcher.batch(vec![
            item(&[5, 6, 7], &[1.0, 0.0, 0.0]),
            item(&[8, 9, 10, 11, 12], &[0.0, 1.0, 1.0]),
        ]);

        assert_eq!(batch.input_ids.dims(), [2, 5]);
        assert_eq!(batch.padding_mask.dims(), [2, 5]);
        assert_eq!(batch.labels.dims(), [2, 3]);
    }

    #[test]
    fn test_classification_output_shapes() {
        let device = Default::default();
        let batcher = MultiLabelBatcherBuilder::<NdArray>::default()
            .pad_token_id(0)
            .num_labels(3)
            .max_seq_length(32)
            .device(device)
            .build()
            .unwrap();
        let batch = batcher.batch(vec![
            item(&[5, 6, 7], &[1.0, 0.0, 0.0]),
            item(&[8, 9], &[0.0, 1.0, 1.0]),
        ]);

        let model = tiny_model_config().init::<NdArray>(&Default::default());
        let output = model.forward_classification(batch);

        assert_eq!(output.logits.dims(), [2, 3]);
        assert_eq!(output.targets.dims(), [2, 3]);
        let loss = output.loss.into_scalar();
        assert!(loss.is_finite());
    }
}
