// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 调度器 (Orchestrator)
//! 发现输入流 → 每路一个工作线程 (共享注册表/目标选择器) → 等待全部结束 → 交给汇总器

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info, warn};

use crate::config::SentinelConfig;
use crate::control::{ControlHandle, TargetSelector};
use crate::detection::StreamId;
use crate::error::{Result, SentinelError};
use crate::registry::IdentityRegistry;
use crate::sink::{CsvSinkProvider, RecordStore, SinkProvider};
use crate::source::{ReplaySource, StreamSource};
use crate::summary::{Summarizer, SummaryStats};
use crate::worker::{SharedContext, StreamWorker, WorkerReport};
use crate::zone::ZoneMap;

const DEFAULT_CONTROL_CAPACITY: usize = 16;

pub struct Orchestrator {
    source: Arc<dyn StreamSource>,
    sinks: Arc<dyn SinkProvider>,
    zones: ZoneMap,
    shared: SharedContext,
    control_capacity: usize,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn StreamSource>,
        sinks: Arc<dyn SinkProvider>,
        zones: ZoneMap,
        threshold: f32,
    ) -> Self {
        Self {
            source,
            sinks,
            zones,
            shared: SharedContext::new(threshold),
            control_capacity: DEFAULT_CONTROL_CAPACITY,
        }
    }

    /// 检测日志回放输入 + 每路CSV输出
    pub fn from_config(config: &SentinelConfig) -> Self {
        let source = ReplaySource::new(&config.input_folder, &config.stream_extensions);
        let sinks = CsvSinkProvider::new(&config.output_folder);
        Self::new(
            Arc::new(source),
            Arc::new(sinks),
            config.alert_zones.clone(),
            config.similarity_threshold,
        )
        .with_control_capacity(config.control_capacity)
    }

    pub fn with_control_capacity(mut self, capacity: usize) -> Self {
        self.control_capacity = capacity.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.shared.registry
    }

    pub fn target(&self) -> &Arc<TargetSelector> {
        &self.shared.target
    }

    /// 发现输入并启动所有工作线程; 输入源不存在时不启动任何线程
    pub fn spawn(self) -> Result<RunHandle> {
        let streams = self.source.discover()?;
        if streams.is_empty() {
            warn!("⚠️ 没有发现可处理的视频流");
        }

        let mut controls = ControlHandle::new();
        let mut workers = Vec::with_capacity(streams.len());
        let mut spawn_failures = Vec::new();

        for stream in streams {
            let commands = controls.register(stream.clone(), self.control_capacity);
            let zones = self.zones.zones_for(&stream).to_vec();
            let worker = StreamWorker::new(stream.clone(), zones, self.shared.clone(), commands);
            let source = Arc::clone(&self.source);
            let sinks = Arc::clone(&self.sinks);

            let spawned = std::thread::Builder::new()
                .name(format!("worker-{}", stream))
                .spawn(move || worker.run(source.as_ref(), sinks.as_ref()));
            match spawned {
                Ok(handle) => workers.push((stream, handle)),
                Err(e) => {
                    error!("❌ [{}] 工作线程启动失败: {}", stream, e);
                    spawn_failures.push(WorkerReport::failed(stream, e.into()));
                }
            }
        }

        info!("🚀 已启动 {} 个工作线程", workers.len());
        Ok(RunHandle {
            controls,
            shared: self.shared,
            workers,
            spawn_failures,
        })
    }

    /// spawn + wait
    pub fn run(self) -> Result<RunOutcome> {
        Ok(self.spawn()?.wait())
    }
}

/// 运行中的句柄: 外部UI通过它发送控制命令
pub struct RunHandle {
    controls: ControlHandle,
    shared: SharedContext,
    workers: Vec<(StreamId, JoinHandle<WorkerReport>)>,
    spawn_failures: Vec<WorkerReport>,
}

impl RunHandle {
    pub fn controls(&self) -> &ControlHandle {
        &self.controls
    }

    pub fn target(&self) -> &Arc<TargetSelector> {
        &self.shared.target
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.shared.registry
    }

    /// 等待所有工作线程进入 DONE; 单路panic只记为该路失败
    pub fn wait(self) -> RunOutcome {
        let mut reports = self.spawn_failures;
        for (stream, handle) in self.workers {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => {
                    error!("❌ [{}] 工作线程异常退出", stream);
                    reports.push(WorkerReport::failed(
                        stream.clone(),
                        SentinelError::WorkerPanic(stream),
                    ));
                }
            }
        }
        reports.sort_by(|a, b| a.stream.cmp(&b.stream));

        let identities = self.shared.registry.len();
        info!(
            "🏁 处理完成: {} 路视频, {} 个全局身份",
            reports.len(),
            identities
        );
        RunOutcome {
            reports,
            identities,
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    /// 按流ID排序
    pub reports: Vec<WorkerReport>,
    pub identities: usize,
}

impl RunOutcome {
    pub fn stores(&self) -> Vec<RecordStore> {
        self.reports.iter().filter_map(|r| r.store.clone()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkerReport> {
        self.reports.iter().filter(|r| !r.is_ok())
    }

    pub fn report(&self, stream: &StreamId) -> Option<&WorkerReport> {
        self.reports.iter().find(|r| &r.stream == stream)
    }

    /// 把全部输出记录交给汇总器
    pub fn summarize(&self, summarizer: &dyn Summarizer) -> Result<SummaryStats> {
        summarizer.summarize(&self.stores())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, Embedding, OutputRecord};
    use crate::sink::MemorySinkProvider;
    use crate::source::{ScriptedFrame, ScriptedSource};
    use crate::summary::ClassSummary;
    use crate::zone::Zone;
    use std::fs;
    use std::io::Write;

    fn det(track: u32, x: f32, y: f32, embedding: &[f32], class: &str) -> Detection {
        Detection {
            local_track_id: track,
            center_x: x,
            center_y: y,
            width: 20.0,
            height: 40.0,
            class_label: class.to_string(),
            embedding: Some(Embedding::from_vec(embedding.to_vec())),
        }
    }

    fn records(outcome: &RunOutcome, stream: &str) -> Vec<OutputRecord> {
        outcome
            .report(&StreamId::new(stream))
            .and_then(|r| r.store.as_ref())
            .map(|s| s.load().unwrap())
            .unwrap_or_default()
    }

    #[test]
    fn test_missing_input_spawns_no_workers() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SentinelConfig::default();
        config.input_folder = dir.path().join("VIDEO_RESEAU_1");
        config.output_folder = dir.path().join("out");

        let err = Orchestrator::from_config(&config).run().unwrap_err();
        assert!(err.is_fatal());
        assert!(!config.output_folder.exists());
    }

    #[test]
    fn test_concurrent_streams_converge_on_one_identity() {
        let e = [0.2, 0.9, 0.4];
        let frames: Vec<Vec<Detection>> = (0..25)
            .map(|i| vec![det(7, 10.0 + i as f32, 10.0, &e, "person")])
            .collect();
        let source = ScriptedSource::new()
            .with_detections("cam_a", frames.clone())
            .with_detections("cam_b", frames);

        let outcome = Orchestrator::new(
            Arc::new(source),
            Arc::new(MemorySinkProvider),
            ZoneMap::new(),
            0.75,
        )
        .run()
        .unwrap();

        assert_eq!(outcome.failures().count(), 0);
        // 首帧可能因快照过时各自建ID, 之后两路都解析到最早的ID
        assert!(outcome.identities <= 2);
        for stream in ["cam_a", "cam_b"] {
            let recs = records(&outcome, stream);
            assert_eq!(recs.len(), 25);
            assert!(recs[1..].iter().all(|r| r.global_id == 1));
        }
    }

    #[test]
    fn test_stream_failure_is_local() {
        let source = ScriptedSource::new()
            .with_stream(
                "broken",
                vec![
                    ScriptedFrame::Detections(vec![det(1, 0.0, 0.0, &[1.0, 0.0], "car")]),
                    ScriptedFrame::ReadFailure("decoder lost sync".into()),
                ],
            )
            .with_detections(
                "healthy",
                vec![vec![det(1, 0.0, 0.0, &[0.0, 1.0], "person")]; 4],
            );

        let outcome = Orchestrator::new(
            Arc::new(source),
            Arc::new(MemorySinkProvider),
            ZoneMap::new(),
            0.75,
        )
        .run()
        .unwrap();

        let failed: Vec<_> = outcome.failures().map(|r| r.stream.as_str().to_string()).collect();
        assert_eq!(failed, vec!["broken".to_string()]);
        assert_eq!(records(&outcome, "broken").len(), 1);
        assert_eq!(records(&outcome, "healthy").len(), 4);
        assert_eq!(outcome.stores().len(), 2);
    }

    #[test]
    fn test_replay_to_csv_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir(&input).unwrap();

        let mut a = fs::File::create(input.join("CAM_A.jsonl")).unwrap();
        writeln!(a, r#"{{"detections":[{{"track_id":1,"x":300,"y":300,"w":20,"h":40,"class":"person","embedding":[1.0,0.0]}}]}}"#).unwrap();
        writeln!(a, r#"{{"detections":[{{"track_id":1,"x":50,"y":50,"w":20,"h":40,"class":"person","embedding":null}}]}}"#).unwrap();
        let mut b = fs::File::create(input.join("CAM_B.jsonl")).unwrap();
        writeln!(b).unwrap();
        fs::File::create(input.join("readme.txt")).unwrap();
        drop((a, b));

        let mut config = SentinelConfig::default();
        config.input_folder = input;
        config.output_folder = dir.path().join("out");
        config.alert_zones = ZoneMap::new();
        config
            .alert_zones
            .insert("CAM_A.mp4", vec![Zone::rectangle(100.0, 100.0, 500.0, 500.0)]);

        let handle = Orchestrator::from_config(&config).spawn().unwrap();
        let mut streams: Vec<_> = handle.controls().streams().map(|s| s.to_string()).collect();
        streams.sort();
        assert_eq!(streams, vec!["CAM_A.jsonl", "CAM_B.jsonl"]);
        let outcome = handle.wait();

        let recs = records(&outcome, "CAM_A.jsonl");
        assert_eq!(recs.len(), 1);
        assert!(recs[0].alert_flag);
        assert_eq!(recs[0].global_id, 1);
        assert!(records(&outcome, "CAM_B.jsonl").is_empty());
        assert_eq!(outcome.report(&StreamId::new("CAM_A.jsonl")).unwrap().dropped, 1);

        let stats = outcome
            .summarize(&ClassSummary::new(config.summary_path()))
            .unwrap();
        assert_eq!(stats.global["person"], 1);
        assert!(config.summary_path().exists());
        assert!(config.output_folder.join("records_CAM_B.jsonl.csv").exists());
    }
}
