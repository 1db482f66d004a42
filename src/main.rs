use burn::backend::{wgpu::WgpuDevice, Autodiff, Wgpu};
use burn::config::Config;
use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataset::InMemDataset;
use burn::module::Module;
use burn::optim::AdamWConfig;
use burn::record::CompactRecorder;
use structopt::StructOpt;

use hatebert_rs::bert::{BertForMultiLabelClassificationConfig, MultiLabelBatcher, MultiLabelBatcherBuilder};
use hatebert_rs::data::{self, RawRecord};
use hatebert_rs::eval::evaluate;
use hatebert_rs::infer::HateSpeechClassifier;
use hatebert_rs::labels::LabelMap;
use hatebert_rs::train::{train, TrainingConfig};
use hatebert_rs::{Error, Result};

/// Multi-label hate speech classifier: fine-tune, score and query a small
/// bert-style encoder over the seven target categories of the Berkeley
/// measuring-hate-speech dataset.
#[derive(Debug, StructOpt)]
#[structopt(name = "hatebert")]
enum Command {
    /// Fine-tune a classifier and checkpoint it every epoch
    Train {
        /// where checkpoints, config and the final model are written
        #[structopt(long, default_value = "./artifacts")]
        artifact_dir: String,
        /// read the dataset from a local csv export instead of the hub
        #[structopt(long)]
        csv: Option<String>,
        #[structopt(long, default_value = "1")]
        epochs: usize,
        #[structopt(long, default_value = "64")]
        batch_size: usize,
        /// seed driving the split and the batch shuffling
        #[structopt(long, default_value = "42")]
        seed: u64,
        /// pin the checkpoint epoch to resume from; by default the latest
        /// checkpoint under the artifact dir is picked up, or training
        /// starts from scratch when there is none
        #[structopt(long)]
        checkpoint: Option<usize>,
    },
    /// Score a trained model on the held-out test split
    Evaluate {
        #[structopt(long, default_value = "./artifacts")]
        artifact_dir: String,
        /// read the dataset from a local csv export instead of the hub
        #[structopt(long)]
        csv: Option<String>,
        /// must match the seed used at training time to keep the test
        /// split untouched by training
        #[structopt(long, default_value = "42")]
        seed: u64,
    },
    /// Classify one text into the seven categories
    Predict {
        #[structopt(long, default_value = "./artifacts")]
        artifact_dir: String,
        text: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hatebert_rs=info".parse().unwrap()),
        )
        .init();

    // the device is picked once and holds for the whole run; wgpu falls
    // back to a cpu adapter when no gpu is available
    type Backend = Wgpu;
    let device = WgpuDevice::BestAvailable;
    tracing::info!("using device {device:?}");

    match Command::from_args() {
        Command::Train { artifact_dir, csv, epochs, batch_size, seed, checkpoint } => {
            let labels = LabelMap::from_dataset_schema()?;
            let model_config = BertForMultiLabelClassificationConfig::new(labels.len());

            let tokenizer =
                data::load_tokenizer(data::TOKENIZER_NAME, model_config.max_position_embeddings)?;
            let model_config =
                model_config.with_pad_token_id(data::pad_token_id(&tokenizer)? as usize);

            let items = data::binarize(load_records(csv)?, &labels)?;
            data::label_stats(&items, &labels);
            let splits = data::split(items, seed);

            let trainset = InMemDataset::new(data::tokenize(splits.train, &tokenizer)?);
            let validset = InMemDataset::new(data::tokenize(splits.validation, &tokenizer)?);

            let config = TrainingConfig::new(model_config, AdamWConfig::new())
                .with_num_epochs(epochs)
                .with_batch_size(batch_size)
                .with_seed(seed);

            train::<Autodiff<Backend>>(&artifact_dir, config, trainset, validset, device, checkpoint)
        }
        Command::Evaluate { artifact_dir, csv, seed } => {
            let labels = LabelMap::from_dataset_schema()?;
            let config = TrainingConfig::load(format!("{artifact_dir}/config.json"))
                .map_err(Error::Config)?;

            let tokenizer =
                data::load_tokenizer(data::TOKENIZER_NAME, config.model.max_position_embeddings)?;

            let items = data::binarize(load_records(csv)?, &labels)?;
            let splits = data::split(items, seed);
            let testset = InMemDataset::new(data::tokenize(splits.test, &tokenizer)?);

            let batcher: MultiLabelBatcher<Backend> = MultiLabelBatcherBuilder::default()
                .pad_token_id(config.model.pad_token_id as u32)
                .num_labels(config.model.num_labels)
                .max_seq_length(config.model.max_position_embeddings as u32)
                .device(device.clone())
                .build()?;
            let dataloader = DataLoaderBuilder::new(batcher)
                .batch_size(config.batch_size)
                .build(testset);

            let model = config
                .model
                .init::<Backend>(&device)
                .load_file(
                    format!("{artifact_dir}/model"),
                    &CompactRecorder::new(),
                    &device,
                )
                .map_err(Error::Record)?;

            let report = evaluate(&model, dataloader);
            println!(
                "TEST LOSS: {:.5} | TEST ACCURACY: {:.5} | TEST F1: {:.5}",
                report.loss, report.accuracy, report.f1
            );
            Ok(())
        }
        Command::Predict { artifact_dir, text } => {
            let labels = LabelMap::from_dataset_schema()?;
            let config = TrainingConfig::load(format!("{artifact_dir}/config.json"))
                .map_err(Error::Config)?;
            let tokenizer =
                data::load_tokenizer(data::TOKENIZER_NAME, config.model.max_position_embeddings)?;

            let classifier =
                HateSpeechClassifier::<Backend>::load(&artifact_dir, tokenizer, labels, device)?;

            for score in classifier.classify(&text)? {
                println!("{:<12} {:.4}", score.label, score.score);
            }
            Ok(())
        }
    }
}

fn load_records(csv: Option<String>) -> Result<Vec<RawRecord>> {
    match csv {
        Some(path) => data::load_csv(&path),
        None => data::load_remote(),
    }
}
