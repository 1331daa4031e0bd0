// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 错误类型
//! Error types shared by the registry, workers and orchestrator.

use std::path::PathBuf;

use thiserror::Error;

use crate::detection::types::StreamId;

pub type Result<T> = std::result::Result<T, SentinelError>;

#[derive(Debug, Error)]
pub enum SentinelError {
    /// 配置错误 (致命, 在任何工作线程启动之前)
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("input folder {} does not exist", .0.display())]
    MissingInput(PathBuf),

    /// 流打开失败 (仅影响该流)
    #[error("[{stream}] failed to open stream: {message}")]
    StreamOpen { stream: StreamId, message: String },

    /// 流读取中断 (仅影响该流)
    #[error("[{stream}] stream read failed: {message}")]
    StreamRead { stream: StreamId, message: String },

    #[error("[{stream}] output sink failed: {source}")]
    Sink {
        stream: StreamId,
        #[source]
        source: Box<SentinelError>,
    },

    #[error("worker for {0} panicked")]
    WorkerPanic(StreamId),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl SentinelError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SentinelError::Configuration(message.into())
    }

    pub fn stream_read(stream: &StreamId, message: impl ToString) -> Self {
        SentinelError::StreamRead {
            stream: stream.clone(),
            message: message.to_string(),
        }
    }

    pub fn stream_open(stream: &StreamId, message: impl ToString) -> Self {
        SentinelError::StreamOpen {
            stream: stream.clone(),
            message: message.to_string(),
        }
    }

    pub fn sink(stream: &StreamId, source: SentinelError) -> Self {
        SentinelError::Sink {
            stream: stream.clone(),
            source: Box::new(source),
        }
    }

    /// 是否为致命配置错误 (只有这一类会中止整个运行)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SentinelError::Configuration(_) | SentinelError::MissingInput(_)
        )
    }
}
