use burn::{config::Config, module::Module, nn::transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput}, prelude::Backend, tensor::{Bool, Int, Tensor}};

use super::{BertEmbedding, BertEmbeddingConfig};


/// Configuration to initialize the encoder backbone.
///
/// Defaults match distilbert-base-uncased: 6 layers, 12 heads, hidden size
/// 768.
#[derive(Debug, Config)]
pub struct BertModelConfig {
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
}

/// The encoder backbone: embedding layer plus transformer encoder.
#[derive(Debug, Module)]
pub struct BertModel<B: Backend> {
    pub hidden_size: usize,
    pub embedding: BertEmbedding<B>,
    pub encoder: TransformerEncoder<B>
}

impl BertModelConfig {
    /// Initializes the model
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertModel<B> {
        let embedding = self.embedding_config().init(device);
        let encoder = self.encoder_config().init(device);

        BertModel { hidden_size: self.hidden_size, embedding, encoder }
    }
    /// Creates an embedding configuration
    fn embedding_config(&self) -> BertEmbeddingConfig {
        BertEmbeddingConfig::new()
            .with_vocab_size(self.vocab_size)
            .with_pad_token_id(self.pad_token_id)
            .with_max_position_embeddings(self.max_position_embeddings)
            .with_layer_norm_eps(self.layer_norm_eps)
            .with_hidden_size(self.hidden_size)
            .with_hidden_dropout_prob(self.hidden_dropout_prob)
    }
    /// Creates an encoder configuration
    fn encoder_config(&self) -> TransformerEncoderConfig {
        TransformerEncoderConfig::new(
            self.hidden_size,
            self.intermediate_size,
            self.num_attention_heads,
            self.num_hidden_layers)
            .with_dropout(self.attention_probs_dropout_prob)
            .with_initializer(burn::nn::Initializer::Normal { mean: 0.0, std: self.initializer_range })
            .with_norm_first(false)
            .with_quiet_softmax(false)
    }
}

impl <B: Backend> BertModel<B> {
    /// Encodes a batch of token id sequences into contextual hidden states.
    /// Padded positions are hidden from attention through the mask.
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, padding_mask: Option<Tensor<B, 2, Bool>>) -> Tensor<B, 3>{
        let y = self.embedding.forward(input_ids);

        let mut e_input = TransformerEncoderInput::new(y);
        if let Some(pad_mask) = padding_mask {
            e_input = e_input.mask_pad(pad_mask);
        }
        self.encoder.forward(e_input)
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::NdArray;
    use burn::tensor::{Int, Tensor};

    use super::BertModelConfig;

    fn tiny_config() -> BertModelConfig {
        BertModelConfig::new()
            .with_vocab_size(100)
            .with_hidden_size(16)
            .with_intermediate_size(32)
            .with_num_attention_heads(2)
            .with_num_hidden_layers(1)
            .with_max_position_embeddings(32)
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = tiny_config().init::<NdArray>(&device);

        let ids = Tensor::<NdArray, 2, Int>::zeros([3, 7], &device);
        let hidden = model.forward(ids, None);
        assert_eq!(hidden.dims(), [3, 7, 16]);
    }
}
