// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::collections::{BTreeMap, VecDeque};

use super::{DetectionStream, StreamSource};
use crate::detection::{Detection, StreamId};
use crate::error::{Result, SentinelError};

/// 脚本化的一帧
#[derive(Debug, Clone)]
pub enum ScriptedFrame {
    Detections(Vec<Detection>),
    /// 模拟读流中断
    ReadFailure(String),
}

/// 内存中的输入源, 每路视频一个预设帧序列
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    streams: BTreeMap<StreamId, Vec<ScriptedFrame>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, stream: impl Into<String>, frames: Vec<ScriptedFrame>) -> Self {
        self.streams.insert(StreamId::new(stream), frames);
        self
    }

    pub fn with_detections(self, stream: impl Into<String>, frames: Vec<Vec<Detection>>) -> Self {
        self.with_stream(stream, frames.into_iter().map(ScriptedFrame::Detections).collect())
    }
}

impl StreamSource for ScriptedSource {
    fn discover(&self) -> Result<Vec<StreamId>> {
        Ok(self.streams.keys().cloned().collect())
    }

    fn open(&self, stream: &StreamId) -> Result<Box<dyn DetectionStream>> {
        let frames = self
            .streams
            .get(stream)
            .ok_or_else(|| SentinelError::stream_open(stream, "no such scripted stream"))?;
        Ok(Box::new(ScriptedStream {
            stream: stream.clone(),
            frames: frames.iter().cloned().collect(),
        }))
    }
}

struct ScriptedStream {
    stream: StreamId,
    frames: VecDeque<ScriptedFrame>,
}

impl DetectionStream for ScriptedStream {
    fn next_frame(&mut self) -> Result<Option<Vec<Detection>>> {
        match self.frames.pop_front() {
            None => Ok(None),
            Some(ScriptedFrame::Detections(dets)) => Ok(Some(dets)),
            Some(ScriptedFrame::ReadFailure(msg)) => {
                Err(SentinelError::stream_read(&self.stream, msg))
            }
        }
    }
}
