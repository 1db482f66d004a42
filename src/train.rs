use burn::{config::Config, data::{dataloader::DataLoaderBuilder, dataset::{Dataset, InMemDataset}}, lr_scheduler::linear::LinearLrSchedulerConfig, module::Module, optim::AdamWConfig, record::CompactRecorder, tensor::backend::AutodiffBackend, train::{metric::LossMetric, LearnerBuilder}};

use crate::bert::{BertForMultiLabelClassificationConfig, MultiLabelBatcher, MultiLabelBatcherBuilder};
use crate::data::TokenizedItem;
use crate::error::Error;
use crate::metrics::{SamplesAccuracyMetric, SamplesF1Metric};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: BertForMultiLabelClassificationConfig,
    pub optimizer: AdamWConfig,
    #[config(default = 1)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    /// initial learning rate; decays linearly to `final_learning_rate`
    /// over the whole run, without warmup
    #[config(default = 5.0e-5)]
    pub learning_rate: f64,
    #[config(default = 1.0e-8)]
    pub final_learning_rate: f64,
}

fn create_artifact_dir(artifact_dir: &str) {
    // Remove existing artifacts before to get an accurate learner summary
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir).ok();
}

/// Highest epoch for which the learner left a model checkpoint under
/// `artifact_dir`, if any.
pub fn latest_checkpoint(artifact_dir: &str) -> Option<usize> {
    let entries = std::fs::read_dir(format!("{artifact_dir}/checkpoint")).ok()?;

    entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            name.strip_prefix("model-")?
                .strip_suffix(".mpk")?
                .parse::<usize>()
                .ok()
        })
        .max()
}

/// Runs the fine-tuning procedure: one train pass and one validation pass
/// per epoch, a checkpoint (model, optimizer and scheduler state) written
/// at every epoch boundary, and the final model saved under `artifact_dir`.
///
/// `resume_from` restarts from a previously written checkpoint epoch with
/// the optimizer momentum intact; `None` starts from a fresh model.
pub fn train<B: AutodiffBackend>(
    artifact_dir: &str,
    config: TrainingConfig,
    trainset: InMemDataset<TokenizedItem>,
    validset: InMemDataset<TokenizedItem>,
    device: B::Device,
    resume_from: Option<usize>,
) -> crate::error::Result<()> {
    // an existing checkpoint is picked up automatically unless the caller
    // pinned a specific epoch
    let resume_from = resume_from.or_else(|| latest_checkpoint(artifact_dir));
    match resume_from {
        Some(epoch) => tracing::info!("resuming training from checkpoint epoch {epoch}"),
        None => {
            tracing::info!("no checkpoint found, starting from scratch");
            create_artifact_dir(artifact_dir);
        }
    }

    config
        .save(format!("{artifact_dir}/config.json"))
        .map_err(Error::Io)?;

    B::seed(config.seed);

    let batcher_train: MultiLabelBatcher<B> = MultiLabelBatcherBuilder::default()
        .pad_token_id(config.model.pad_token_id as u32)
        .num_labels(config.model.num_labels)
        .max_seq_length(config.model.max_position_embeddings as u32)
        .device(device.clone())
        .build()?;

    let batcher_valid: MultiLabelBatcher<B::InnerBackend> = MultiLabelBatcherBuilder::default()
        .pad_token_id(config.model.pad_token_id as u32)
        .num_labels(config.model.num_labels)
        .max_seq_length(config.model.max_position_embeddings as u32)
        .device(device.clone())
        .build()?;

    let steps_per_epoch = trainset.len().div_ceil(config.batch_size);
    let num_training_steps = (config.num_epochs * steps_per_epoch).max(1);
    tracing::info!(
        "training for {} epochs, {} steps, batch size {}",
        config.num_epochs,
        num_training_steps,
        config.batch_size
    );

    // only the train split is reshuffled across epochs
    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(trainset);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(validset);

    let lr_scheduler = LinearLrSchedulerConfig::new(
        config.learning_rate,
        config.final_learning_rate,
        num_training_steps,
    )
    .init();

    let mut builder = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(SamplesAccuracyMetric::new())
        .metric_valid_numeric(SamplesAccuracyMetric::new())
        .metric_train_numeric(SamplesF1Metric::new())
        .metric_valid_numeric(SamplesF1Metric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(vec![device.clone()])
        .num_epochs(config.num_epochs)
        .summary();

    if let Some(epoch) = resume_from {
        builder = builder.checkpoint(epoch);
    }

    let learner = builder.build(
        config.model.init::<B>(&device),
        config.optimizer.init(),
        lr_scheduler,
    );

    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    model_trained
        .save_file(format!("{artifact_dir}/model"), &CompactRecorder::new())
        .map_err(Error::Record)?;
    tracing::info!("trained model saved under {artifact_dir}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::NdArray;
    use burn::data::dataloader::batcher::Batcher;
    use burn::module::Module;
    use burn::record::CompactRecorder;

    use crate::bert::test::tiny_model_config;
    use crate::bert::MultiLabelBatcherBuilder;
    use crate::data::TokenizedItem;

    #[test]
    fn test_latest_checkpoint_picks_highest_epoch() {
        let dir = std::env::temp_dir().join("hatebert-ckpt-scan");
        std::fs::create_dir_all(dir.join("checkpoint")).unwrap();
        for name in ["model-1.mpk", "model-12.mpk", "optim-12.mpk", "garbage.txt"] {
            std::fs::write(dir.join("checkpoint").join(name), b"").unwrap();
        }

        let found = super::latest_checkpoint(dir.to_str().unwrap());
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(found, Some(12));
    }

    #[test]
    fn test_latest_checkpoint_empty_dir() {
        let dir = std::env::temp_dir().join("hatebert-ckpt-none");
        std::fs::create_dir_all(&dir).unwrap();
        let found = super::latest_checkpoint(dir.to_str().unwrap());
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(found, None);
    }

    #[test]
    fn test_checkpoint_roundtrip_restores_parameters() {
        let device = Default::default();
        let config = tiny_model_config();
        let model = config.init::<NdArray>(&device);

        let path = std::env::temp_dir().join("hatebert-roundtrip-model");
        model
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .unwrap();

        let restored = config
            .init::<NdArray>(&device)
            .load_file(path.clone(), &CompactRecorder::new(), &device)
            .unwrap();
        std::fs::remove_file(path.with_extension("mpk")).ok();

        let batcher = MultiLabelBatcherBuilder::<NdArray>::default()
            .pad_token_id(0)
            .num_labels(3)
            .max_seq_length(32)
            .device(device)
            .build()
            .unwrap();
        let batch = batcher.batch(vec![TokenizedItem {
            input_ids: vec![4, 8, 15, 16, 23, 42],
            labels: vec![1.0, 0.0, 1.0],
        }]);

        let expected = model
            .forward(batch.input_ids.clone(), Some(batch.padding_mask.clone()))
            .into_data();
        let actual = restored
            .forward(batch.input_ids, Some(batch.padding_mask))
            .into_data();

        expected.assert_approx_eq(&actual, 6);
    }
}
