// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测数据模型 (Detection Data Model)
///
/// 外部检测/跟踪适配器产出的数据结构:
/// - Detection:    单帧单目标检测 (含外观特征)
/// - Embedding:    ReID外观特征向量
/// - OutputRecord: 每个被接受检测的输出记录
pub mod types;

pub use types::{Detection, Embedding, GlobalId, OutputRecord, Point2, StreamId};
