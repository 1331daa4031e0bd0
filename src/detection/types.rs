// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fmt;
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// 全局身份ID (从1开始单调递增, 永不复用)
pub type GlobalId = u64;

/// 视频流标识 (通常为输入文件名, 如 `CAMERA_HALL_PORTE_GAUCHE.mp4`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 去掉扩展名的部分 (`CAM.jsonl` -> `CAM`)
    pub fn stem(&self) -> &str {
        Path::new(&self.0)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Point2 {
    x: f32,
    y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }
}

/// 外观特征向量 (ReID embedding)
///
/// L2范数在构造时计算一次, 匹配时不再重复计算.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Embedding {
    // An float32 1-dim tensor
    data: Array1<f32>,
    norm: f32,
}

impl Embedding {
    pub fn new(data: Array1<f32>) -> Self {
        let norm = data.dot(&data).sqrt();
        Self { data, norm }
    }

    pub fn from_vec(values: Vec<f32>) -> Self {
        Self::new(Array1::from(values))
    }

    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.norm
    }

    /// 空向量/零向量/含NaN的向量无法参与余弦相似度计算
    pub fn is_degenerate(&self) -> bool {
        self.data.is_empty() || !self.norm.is_finite() || self.norm <= f32::EPSILON
    }

    /// 余弦相似度, 维度不一致时返回 None
    pub fn cosine_similarity(&self, other: &Embedding) -> Option<f32> {
        if self.data.len() != other.data.len() || self.is_degenerate() || other.is_degenerate()
        {
            return None;
        }
        let dot = self.data.dot(&other.data);
        Some((dot / (self.norm * other.norm)).clamp(-1.0, 1.0))
    }
}

/// 单帧单目标检测结果 (由外部检测/跟踪适配器产生, 流内有效)
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// 流内局部跟踪ID
    pub local_track_id: u32,
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub class_label: String,
    /// 外观特征, None 表示适配器未能提取
    pub embedding: Option<Embedding>,
}

impl Detection {
    pub fn center(&self) -> Point2 {
        Point2::new(self.center_x, self.center_y)
    }

    /// 返回可用于匹配的特征 (缺失或退化的特征视为不可用)
    pub fn usable_embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref().filter(|e| !e.is_degenerate())
    }
}

/// 输出记录 (每个被接受的检测一行, 只追加)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub stream_id: StreamId,
    pub frame_index: u64,
    pub global_id: GlobalId,
    pub class_label: String,
    pub x_center: f32,
    pub y_center: f32,
    #[serde(with = "alert_flag")]
    pub alert_flag: bool,
}

/// alert_flag 以 0/1 落盘
mod alert_flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flag: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*flag))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(de::Error::custom(format!("alert_flag must be 0 or 1, got {}", other))),
        }
    }
}
