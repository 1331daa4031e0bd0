// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测输入适配 (Detector Adapter)
///
/// 检测/跟踪/ReID模型本身在外部运行, 本模块只消费其逐帧结果:
/// - StreamSource:    发现输入流并打开
/// - DetectionStream: 逐帧拉取检测结果 (含外观特征或"不可用"标记)
/// - ReplaySource:    读取检测日志文件 (每行一帧的JSON)
/// - ScriptedSource:  内存中的脚本化帧序列 (测试/嵌入使用)
pub mod replay;
pub mod scripted;

use crate::detection::{Detection, StreamId};
use crate::error::Result;

pub use replay::ReplaySource;
pub use scripted::{ScriptedFrame, ScriptedSource};

/// 单路视频的逐帧检测流
pub trait DetectionStream: Send {
    /// 下一帧的检测结果; `Ok(None)` 表示流结束, 空列表表示本帧无检测
    fn next_frame(&mut self) -> Result<Option<Vec<Detection>>>;
}

/// 输入流来源
pub trait StreamSource: Send + Sync {
    /// 发现所有可处理的输入流; 输入源不存在是致命配置错误
    fn discover(&self) -> Result<Vec<StreamId>>;

    fn open(&self, stream: &StreamId) -> Result<Box<dyn DetectionStream>>;
}
