// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 输出记录落盘
//! Append-only output record sinks (CSV per stream, or in memory).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::detection::{OutputRecord, StreamId};
use crate::error::Result;

pub const RECORD_HEADER: [&str; 7] = [
    "stream_id",
    "frame_index",
    "global_id",
    "class_label",
    "x_center",
    "y_center",
    "alert_flag",
];

/// 一路视频的输出记录流 (由该工作线程独占)
pub trait RecordSink: Send {
    fn append(&mut self, record: &OutputRecord) -> Result<()>;

    /// 刷新并关闭, 返回记录的存储位置 (交给汇总器)
    fn finish(self: Box<Self>) -> Result<RecordStore>;
}

pub trait SinkProvider: Send + Sync {
    fn open(&self, stream: &StreamId) -> Result<Box<dyn RecordSink>>;
}

/// 输出记录的存储句柄
#[derive(Debug, Clone, PartialEq)]
pub enum RecordStore {
    Csv(PathBuf),
    Memory(Vec<OutputRecord>),
}

impl RecordStore {
    pub fn load(&self) -> Result<Vec<OutputRecord>> {
        match self {
            RecordStore::Memory(records) => Ok(records.clone()),
            RecordStore::Csv(path) => {
                let mut reader = csv::Reader::from_path(path)?;
                let records = reader
                    .deserialize::<OutputRecord>()
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(records)
            }
        }
    }
}

/// 每路视频一个 `records_<stream>.csv`
pub struct CsvSinkProvider {
    output_dir: PathBuf,
}

impl CsvSinkProvider {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, stream: &StreamId) -> PathBuf {
        record_path(&self.output_dir, stream)
    }
}

pub fn record_path(output_dir: &Path, stream: &StreamId) -> PathBuf {
    output_dir.join(format!("records_{}.csv", stream))
}

impl SinkProvider for CsvSinkProvider {
    fn open(&self, stream: &StreamId) -> Result<Box<dyn RecordSink>> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.path_for(stream);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        // 即使没有任何记录也写表头
        writer.write_record(RECORD_HEADER)?;
        debug!("📝 [{}] 输出文件 {}", stream, path.display());
        Ok(Box::new(CsvSink { writer, path }))
    }
}

struct CsvSink {
    writer: csv::Writer<fs::File>,
    path: PathBuf,
}

impl RecordSink for CsvSink {
    fn append(&mut self, record: &OutputRecord) -> Result<()> {
        self.writer.serialize(record)?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<RecordStore> {
        self.writer.flush()?;
        Ok(RecordStore::Csv(self.path))
    }
}

/// 记录保存在内存中 (测试/嵌入使用)
#[derive(Debug, Default, Clone, Copy)]
pub struct MemorySinkProvider;

impl SinkProvider for MemorySinkProvider {
    fn open(&self, _stream: &StreamId) -> Result<Box<dyn RecordSink>> {
        Ok(Box::new(MemorySink::default()))
    }
}

#[derive(Default)]
struct MemorySink {
    records: Vec<OutputRecord>,
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &OutputRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<RecordStore> {
        Ok(RecordStore::Memory(self.records))
    }
}
