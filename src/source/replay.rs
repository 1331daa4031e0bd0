// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测日志回放
//! Replays per-stream detection logs: one JSON object per frame, e.g.
//! `{"detections":[{"track_id":3,"x":310.5,"y":200.0,"w":40,"h":90,"class":"person","embedding":[...]}]}`.
//! A blank line is a frame without detections.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::{DetectionStream, StreamSource};
use crate::detection::{Detection, Embedding, StreamId};
use crate::error::{Result, SentinelError};

#[derive(Debug, Deserialize)]
struct FrameLine {
    #[serde(default)]
    detections: Vec<DetectionLine>,
}

#[derive(Debug, Deserialize)]
struct DetectionLine {
    track_id: u32,
    x: f32,
    y: f32,
    #[serde(default)]
    w: f32,
    #[serde(default)]
    h: f32,
    class: String,
    // null / 缺失 = 特征不可用
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

impl From<DetectionLine> for Detection {
    fn from(line: DetectionLine) -> Self {
        Detection {
            local_track_id: line.track_id,
            center_x: line.x,
            center_y: line.y,
            width: line.w,
            height: line.h,
            class_label: line.class,
            embedding: line.embedding.map(Embedding::from_vec),
        }
    }
}

/// 从输入目录发现检测日志文件
pub struct ReplaySource {
    input_dir: PathBuf,
    extensions: Vec<String>,
}

impl ReplaySource {
    pub fn new(input_dir: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            input_dir: input_dir.into(),
            extensions: extensions.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect(),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

impl StreamSource for ReplaySource {
    fn discover(&self) -> Result<Vec<StreamId>> {
        if !self.input_dir.is_dir() {
            return Err(SentinelError::MissingInput(self.input_dir.clone()));
        }

        let mut streams = Vec::new();
        for entry in fs::read_dir(&self.input_dir)? {
            let path = entry?.path();
            if !path.is_file() || !self.accepts(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                streams.push(StreamId::new(name));
            }
        }
        streams.sort();

        info!(
            "📂 在 {} 中发现 {} 路视频: {:?}",
            self.input_dir.display(),
            streams.len(),
            streams.iter().map(StreamId::as_str).collect::<Vec<_>>()
        );
        Ok(streams)
    }

    fn open(&self, stream: &StreamId) -> Result<Box<dyn DetectionStream>> {
        let path = self.input_dir.join(stream.as_str());
        let file = File::open(&path).map_err(|e| SentinelError::stream_open(stream, e))?;
        debug!("🎬 [{}] 打开检测日志 {}", stream, path.display());
        Ok(Box::new(ReplayStream {
            stream: stream.clone(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
        }))
    }
}

struct ReplayStream {
    stream: StreamId,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl DetectionStream for ReplayStream {
    fn next_frame(&mut self) -> Result<Option<Vec<Detection>>> {
        let Some(line) = self.lines.next() else {
            return Ok(None);
        };
        self.line_no += 1;
        let line = line.map_err(|e| SentinelError::stream_read(&self.stream, e))?;
        if line.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        let frame: FrameLine = serde_json::from_str(&line).map_err(|e| {
            SentinelError::stream_read(&self.stream, format!("line {}: {}", self.line_no, e))
        })?;
        Ok(Some(frame.detections.into_iter().map(Detection::from).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn extensions() -> Vec<String> {
        vec!["jsonl".to_string()]
    }

    #[test]
    fn test_missing_input_folder_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = ReplaySource::new(dir.path().join("absent"), &extensions());
        let err = source.discover().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_discover_filters_extension_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jsonl", "a.JSONL", "notes.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("nested.jsonl")).unwrap();

        let source = ReplaySource::new(dir.path(), &[".jsonl".to_string()]);
        let streams = source.discover().unwrap();
        assert_eq!(streams, vec![StreamId::new("a.JSONL"), StreamId::new("b.jsonl")]);
    }

    #[test]
    fn test_replay_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join("cam.jsonl")).unwrap();
        writeln!(
            f,
            r#"{{"detections":[{{"track_id":1,"x":10,"y":20,"w":4,"h":8,"class":"person","embedding":[1.0,0.0]}},{{"track_id":2,"x":1,"y":2,"class":"car","embedding":null}}]}}"#
        )
        .unwrap();
        writeln!(f).unwrap();
        writeln!(f, "{{\"detections\":[]}}").unwrap();
        writeln!(f, "not json").unwrap();
        drop(f);

        let source = ReplaySource::new(dir.path(), &extensions());
        let mut stream = source.open(&StreamId::new("cam.jsonl")).unwrap();

        let first = stream.next_frame().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].class_label, "person");
        assert_eq!(first[0].center_x, 10.0);
        assert!(first[0].usable_embedding().is_some());
        assert!(first[1].embedding.is_none());

        assert_eq!(stream.next_frame().unwrap(), Some(vec![]));
        assert_eq!(stream.next_frame().unwrap(), Some(vec![]));
        assert!(matches!(
            stream.next_frame(),
            Err(SentinelError::StreamRead { .. })
        ));
    }

    #[test]
    fn test_open_missing_stream() {
        let dir = tempfile::tempdir().unwrap();
        let source = ReplaySource::new(dir.path(), &extensions());
        assert!(matches!(
            source.open(&StreamId::new("ghost.jsonl")),
            Err(SentinelError::StreamOpen { .. })
        ));
    }
}
