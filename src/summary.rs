// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 运行结束后的统计汇总
//! Per-class / per-stream appearance counts and unique global identities.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::detection::{GlobalId, OutputRecord, StreamId};
use crate::error::Result;
use crate::sink::RecordStore;

/// 汇总器: 接收全部输出记录的存储句柄
pub trait Summarizer {
    fn summarize(&self, stores: &[RecordStore]) -> Result<SummaryStats>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryStats {
    /// 类别 → 全部视频中的出现次数
    pub global: BTreeMap<String, u64>,
    /// 视频 → 类别 → 出现次数
    pub by_stream: BTreeMap<StreamId, BTreeMap<String, u64>>,
    /// 类别 → 不同全局ID数
    pub unique_ids: BTreeMap<String, usize>,
    pub generated_at: String,
}

impl SummaryStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OutputRecord>) -> Self {
        let mut stats = SummaryStats {
            generated_at: crate::gen_time_string("-"),
            ..Default::default()
        };
        let mut unique: BTreeMap<String, BTreeSet<GlobalId>> = BTreeMap::new();

        for record in records {
            *stats.global.entry(record.class_label.clone()).or_default() += 1;
            *stats
                .by_stream
                .entry(record.stream_id.clone())
                .or_default()
                .entry(record.class_label.clone())
                .or_default() += 1;
            unique
                .entry(record.class_label.clone())
                .or_default()
                .insert(record.global_id);
        }

        stats.unique_ids = unique.into_iter().map(|(k, v)| (k, v.len())).collect();
        stats
    }

    pub fn total_appearances(&self) -> u64 {
        self.global.values().sum()
    }

    /// 打印可读的统计报告
    pub fn log(&self) {
        info!("{}", "=".repeat(60));
        info!("📊 检测目标汇总 ({})", self.generated_at);
        info!("--- 全局统计 ---");
        for (class, count) in &self.global {
            let unique = self.unique_ids.get(class).copied().unwrap_or(0);
            info!("  {}: {} 次出现, {} 个唯一目标", class, count, unique);
        }
        info!("--- 分视频统计 ---");
        for (stream, classes) in &self.by_stream {
            info!("  视频: {}", stream);
            for (class, count) in classes {
                info!("    - {}: {} 次出现", class, count);
            }
        }
        info!("{}", "=".repeat(60));
    }
}

/// 写出 `object_summary.csv` 并打印报告
pub struct ClassSummary {
    output: Option<PathBuf>,
}

impl ClassSummary {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: Some(output.into()),
        }
    }

    /// 只统计和打印, 不写文件
    pub fn report_only() -> Self {
        Self { output: None }
    }

    fn write_csv(&self, stats: &SummaryStats) -> Result<()> {
        let Some(path) = &self.output else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["kind", "class_label", "stream_id", "appearances", "unique_objects"])?;
        for (class, count) in &stats.global {
            let unique = stats.unique_ids.get(class).copied().unwrap_or(0).to_string();
            let count = count.to_string();
            writer.write_record(["GLOBAL", class.as_str(), "ALL_STREAMS", count.as_str(), unique.as_str()])?;
        }
        // 唯一目标只做全局统计
        for (stream, classes) in &stats.by_stream {
            for (class, count) in classes {
                let count = count.to_string();
                writer.write_record(["PER_STREAM", class.as_str(), stream.as_str(), count.as_str(), ""])?;
            }
        }
        writer.flush()?;
        info!("📄 汇总已生成: {}", path.display());
        Ok(())
    }
}

impl Summarizer for ClassSummary {
    fn summarize(&self, stores: &[RecordStore]) -> Result<SummaryStats> {
        let mut records = Vec::new();
        for store in stores {
            records.extend(store.load()?);
        }
        let stats = SummaryStats::from_records(&records);
        self.write_csv(&stats)?;
        stats.log();
        Ok(stats)
    }
}
