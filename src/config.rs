// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 运行配置 - 通过JSON文件调整参数

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SentinelError};
use crate::zone::{Zone, ZoneMap};

/// 多路视频跨流身份关联
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "数字卫兵 - 多路视频跨流身份关联与区域告警", long_about = None)]
pub struct Args {
    /// 配置文件路径 (不存在时自动创建默认配置)
    #[arg(short, long, default_value = "sentinel.json")]
    pub config: PathBuf,

    /// 输入目录 (覆盖配置文件)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// 输出目录 (覆盖配置文件)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// ReID相似度阈值 (覆盖配置文件)
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// 不生成汇总
    #[arg(long)]
    pub no_summary: bool,

    /// 从标准输入读取控制命令: `q <stream>` 停止一路, `s [id]` 设定/清除目标
    #[arg(long)]
    pub stdin_control: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    // === 目录 ===
    pub input_folder: PathBuf,  // 输入目录 (每路视频一个检测日志)
    pub output_folder: PathBuf, // 输出目录 (记录CSV + 汇总)
    pub stream_extensions: Vec<String>,

    // === 跨流身份 ===
    pub similarity_threshold: f32, // 严格大于该值视为同一目标

    // === 控制 ===
    pub control_capacity: usize, // 每路控制队列长度

    pub summary_file: String,

    // === 告警区域 ===
    // 格式: "视频名": [[x1, y1, x2, y2], [[x, y], [x, y], [x, y]], ...]
    pub alert_zones: ZoneMap,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        let mut alert_zones = ZoneMap::new();
        alert_zones.insert(
            "CAMERA_HALL_PORTE_GAUCHE.mp4",
            vec![Zone::rectangle(99.0, 332.0, 252.0, 349.0)],
        );

        Self {
            input_folder: PathBuf::from("VIDEO_RESEAU_1"),
            output_folder: PathBuf::from("RESULTATS_DRSI_11"),
            stream_extensions: vec!["jsonl".to_string()],
            similarity_threshold: 0.75,
            control_capacity: 16,
            summary_file: "object_summary.csv".to_string(),
            alert_zones,
        }
    }
}

impl SentinelConfig {
    /// 从JSON文件加载配置; 文件不存在时创建默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => {
                let config: SentinelConfig = serde_json::from_str(&json).map_err(|e| {
                    SentinelError::configuration(format!("{}: {}", path.display(), e))
                })?;
                config.validate()?;
                info!("✅ 配置已从 {} 加载", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.similarity_threshold.is_finite() || !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SentinelError::configuration(format!(
                "similarity_threshold must lie in [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.stream_extensions.is_empty() {
            return Err(SentinelError::configuration(
                "stream_extensions must list at least one extension",
            ));
        }
        Ok(())
    }

    /// 命令行参数覆盖配置文件
    pub fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(input) = &args.input {
            self.input_folder = input.clone();
        }
        if let Some(output) = &args.output {
            self.output_folder = output.clone();
        }
        if let Some(threshold) = args.threshold {
            self.similarity_threshold = threshold;
        }
        self.validate()
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_folder.join(&self.summary_file)
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前配置:");
        info!("  输入目录: {}", self.input_folder.display());
        info!("  输出目录: {}", self.output_folder.display());
        info!("  输入扩展名: {:?}", self.stream_extensions);
        info!("  相似度阈值: {:.2}", self.similarity_threshold);
        info!("  告警区域: {} 路视频已配置", self.alert_zones.len());
    }
}
