use thiserror::Error;

use crate::bert::MultiLabelBatcherBuilderError;

/// The kind of errors that can happen in this program
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset import error: {0}")]
    Import(#[from] burn::data::dataset::source::huggingface::ImporterError),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("dataset error: {0}")]
    Dataset(String),
    #[error("column '{0}' does not name a known target category")]
    Schema(String),
    #[error("record error: {0}")]
    Record(burn::record::RecorderError),
    #[error("config error: {0}")]
    Config(burn::config::ConfigError),
    #[error("batcher builder: {0}")]
    MultiLabelBatcherBuilder(#[from] MultiLabelBatcherBuilderError),
}

/// Custom result type to map the possible errors
pub type Result<T> = std::result::Result<T, Error>;
