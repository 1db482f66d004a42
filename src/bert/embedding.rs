use std::default::Default;
use burn::{config::Config, module::Module, nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig}, prelude::Backend, tensor::{Float, Int, Tensor}};

/// Configuration of the input embedding.
///
/// DistilBert style: word and absolute position embeddings only, no segment
/// vocabulary.
#[derive(Debug, Copy, Config)]
pub struct BertEmbeddingConfig {
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
    /// probability that a neuron be deactivated during a training step
    #[config(default = "0.1")]
    pub hidden_dropout_prob: f64,
    /// small value whose role is to prevent division by zero in layer norm
    #[config(default = "1e-12")]
    pub layer_norm_eps: f64,
}

/// The actual embedding module
#[derive(Debug, Module)]
pub struct BertEmbedding<B: Backend> {
    /// identifier of the pad token
    pub pad_token_id: usize,
    /// max length of any processable sequence
    pub max_position_embeddings: usize,
    /// token input embeddings
    word_embedding: Embedding<B>,
    /// position embedding (absolute)
    position_embedding: Embedding<B>,
    /// normalization
    layer_norm: LayerNorm<B>,
    /// dropout
    dropout: Dropout,
}

impl Default for BertEmbeddingConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BertEmbeddingConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertEmbedding<B> {
        BertEmbedding {
            pad_token_id:            self.pad_token_id,
            max_position_embeddings: self.max_position_embeddings,
            word_embedding:          EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device),
            position_embedding:      EmbeddingConfig::new(self.max_position_embeddings, self.hidden_size).init(device),
            layer_norm:              LayerNormConfig::new(self.hidden_size).with_epsilon(self.layer_norm_eps).init(device),
            dropout:                 DropoutConfig::new(self.hidden_dropout_prob).init(),
        }
    }
}

impl <B: Backend> BertEmbedding<B> {
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3, Float> {
        let shape = input_ids.shape();
        let device = input_ids.device();

        let seq_len = shape.dims[1];

        let words = self.word_embedding.forward(input_ids);

        let position = Tensor::arange(0..seq_len as i64, &device).unsqueeze();
        let position = self.position_embedding.forward(position);

        let embedding = words + position;
        let embedding = self.layer_norm.forward(embedding);

        self.dropout.forward(embedding)
    }
}
