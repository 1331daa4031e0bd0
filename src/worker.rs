// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 流工作线程 (Stream Worker)
//! 职责: 拉取检测帧 → 区域判定 → 全局身份匹配 → 输出记录
//!
//! 状态机: INIT → RUNNING → DRAINING → DONE

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::control::{TargetSelector, WorkerCommand};
use crate::detection::{Detection, GlobalId, OutputRecord, StreamId};
use crate::error::{Result, SentinelError};
use crate::registry::IdentityRegistry;
use crate::sink::{RecordSink, RecordStore, SinkProvider};
use crate::source::{DetectionStream, StreamSource};
use crate::zone::{self, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    Running,
    Draining,
    Done,
}

/// 所有工作线程共享的资源
#[derive(Clone)]
pub struct SharedContext {
    pub registry: Arc<IdentityRegistry>,
    pub target: Arc<TargetSelector>,
    pub threshold: f32,
}

impl SharedContext {
    pub fn new(threshold: f32) -> Self {
        Self {
            registry: Arc::new(IdentityRegistry::new()),
            target: Arc::new(TargetSelector::new()),
            threshold,
        }
    }
}

/// 工作线程结束时的统计
#[derive(Debug)]
pub struct WorkerReport {
    pub stream: StreamId,
    pub frames: u64,
    pub records: u64,
    /// 特征缺失/退化而丢弃的检测
    pub dropped: u64,
    pub alerts: u64,
    /// 本路出现过的局部跟踪ID数
    pub local_tracks: usize,
    pub quit_early: bool,
    pub store: Option<RecordStore>,
    /// 本路的局部错误 (打开/读取/写出); 其他工作线程不受影响
    pub failure: Option<SentinelError>,
}

impl WorkerReport {
    fn new(stream: StreamId) -> Self {
        Self {
            stream,
            frames: 0,
            records: 0,
            dropped: 0,
            alerts: 0,
            local_tracks: 0,
            quit_early: false,
            store: None,
            failure: None,
        }
    }

    pub fn failed(stream: StreamId, failure: SentinelError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(stream)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct StreamWorker {
    stream: StreamId,
    zones: Vec<Zone>,
    shared: SharedContext,
    commands: Receiver<WorkerCommand>,
    state: WorkerState,
    local_to_global: HashMap<u32, GlobalId>,
    last_target_seen: Option<GlobalId>,
    report: WorkerReport,
}

impl StreamWorker {
    pub fn new(
        stream: StreamId,
        zones: Vec<Zone>,
        shared: SharedContext,
        commands: Receiver<WorkerCommand>,
    ) -> Self {
        Self {
            report: WorkerReport::new(stream.clone()),
            stream,
            zones,
            shared,
            commands,
            state: WorkerState::Init,
            local_to_global: HashMap::new(),
            last_target_seen: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        debug!("🔁 [{}] {:?} → {:?}", self.stream, self.state, next);
        self.state = next;
    }

    /// 运行到 DONE 并返回统计; 错误只记录在报告中, 不向外传播
    pub fn run(mut self, source: &dyn StreamSource, sinks: &dyn SinkProvider) -> WorkerReport {
        info!(
            "🚀 [{}] 启动 ({} 个告警区域)",
            self.stream,
            self.zones.len()
        );

        let (mut input, mut sink) = match self.init(source, sinks) {
            Ok(opened) => opened,
            Err(e) => {
                error!("❌ [{}] 初始化失败: {}", self.stream, e);
                self.report.failure = Some(e);
                self.transition(WorkerState::Done);
                return self.report;
            }
        };

        self.transition(WorkerState::Running);
        if let Err(e) = self.run_frames(input.as_mut(), sink.as_mut()) {
            error!(
                "❌ [{}] 第 {} 帧处理中断: {}",
                self.stream, self.report.frames, e
            );
            self.report.failure = Some(e);
        }

        // DRAINING: 释放输入, 刷新输出, 不再访问注册表
        self.transition(WorkerState::Draining);
        drop(input);
        match sink.finish() {
            Ok(store) => self.report.store = Some(store),
            Err(e) => {
                error!("❌ [{}] 输出刷新失败: {}", self.stream, e);
                let e = SentinelError::sink(&self.stream, e);
                self.report.failure.get_or_insert(e);
            }
        }
        self.report.local_tracks = self.local_to_global.len();

        self.transition(WorkerState::Done);
        info!(
            "✅ [{}] 结束: {} 帧, {} 条记录, {} 次告警, 丢弃 {} 个无特征检测",
            self.stream,
            self.report.frames,
            self.report.records,
            self.report.alerts,
            self.report.dropped
        );
        self.report
    }

    fn init(
        &mut self,
        source: &dyn StreamSource,
        sinks: &dyn SinkProvider,
    ) -> Result<(Box<dyn DetectionStream>, Box<dyn RecordSink>)> {
        let input = source.open(&self.stream)?;
        let sink = sinks
            .open(&self.stream)
            .map_err(|e| SentinelError::sink(&self.stream, e))?;
        Ok((input, sink))
    }

    fn run_frames(&mut self, input: &mut dyn DetectionStream, sink: &mut dyn RecordSink) -> Result<()> {
        let mut frame_index: u64 = 0;
        loop {
            if self.poll_commands() {
                info!("🛑 [{}] 收到停止信号, 放弃剩余帧", self.stream);
                self.report.quit_early = true;
                return Ok(());
            }

            let Some(detections) = input.next_frame()? else {
                return Ok(());
            };

            for detection in detections {
                if let Some(record) = self.process_detection(frame_index, detection) {
                    sink.append(&record)
                        .map_err(|e| SentinelError::sink(&self.stream, e))?;
                    self.report.records += 1;
                }
            }

            frame_index += 1;
            self.report.frames = frame_index;
        }
    }

    /// 处理所有待处理的控制消息; 返回 true 表示需要停止
    fn poll_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(WorkerCommand::Quit) => return true,
                Ok(WorkerCommand::Retarget(target)) => self.shared.target.apply(target),
                // 控制端全部关闭时继续正常运行
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// 单个检测: 特征不可用则丢弃 (不注册/不输出/不告警)
    pub fn process_detection(&mut self, frame_index: u64, detection: Detection) -> Option<OutputRecord> {
        let center = detection.center();
        let embedding = match detection.embedding {
            Some(e) if !e.is_degenerate() => e,
            _ => {
                self.report.dropped += 1;
                return None;
            }
        };

        let alert = zone::is_inside(center, &self.zones);

        let resolution = self.shared.registry.resolve(
            embedding,
            center,
            &self.stream,
            self.shared.threshold,
        );
        let global_id = resolution.id();
        self.local_to_global.insert(detection.local_track_id, global_id);

        if alert {
            self.report.alerts += 1;
            warn!(
                target: "sentinel_reid::alert",
                stream = %self.stream,
                frame = frame_index,
                global_id,
                class = %detection.class_label,
                "🚨 [{}] 告警 目标 {}",
                self.stream,
                global_id
            );
        }

        if self.shared.target.is_target(global_id) {
            if self.last_target_seen != Some(global_id) {
                info!(
                    target: "sentinel_reid::target",
                    stream = %self.stream,
                    frame = frame_index,
                    global_id,
                    "🎯 [{}] 目标 {} 出现在 ({:.0}, {:.0})",
                    self.stream,
                    global_id,
                    center.x(),
                    center.y()
                );
                self.last_target_seen = Some(global_id);
            }
        } else if self.last_target_seen == Some(global_id) {
            self.last_target_seen = None;
        }

        Some(OutputRecord {
            stream_id: self.stream.clone(),
            frame_index,
            global_id,
            class_label: detection.class_label,
            x_center: center.x(),
            y_center: center.y(),
            alert_flag: alert,
        })
    }

    pub fn global_id_of(&self, local_track_id: u32) -> Option<GlobalId> {
        self.local_to_global.get(&local_track_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlHandle;
    use crate::detection::Embedding;
    use crate::sink::MemorySinkProvider;
    use crate::source::{ScriptedFrame, ScriptedSource};
    use crossbeam_channel::Sender;

    fn det(track: u32, x: f32, y: f32, embedding: Option<Vec<f32>>) -> Detection {
        Detection {
            local_track_id: track,
            center_x: x,
            center_y: y,
            width: 10.0,
            height: 20.0,
            class_label: "person".into(),
            embedding: embedding.map(Embedding::from_vec),
        }
    }

    fn worker(stream: &str, zones: Vec<Zone>, shared: &SharedContext) -> (StreamWorker, ControlHandle) {
        let mut controls = ControlHandle::new();
        let rx = controls.register(StreamId::new(stream), 8);
        (
            StreamWorker::new(StreamId::new(stream), zones, shared.clone(), rx),
            controls,
        )
    }

    fn records(report: &WorkerReport) -> Vec<OutputRecord> {
        report.store.as_ref().unwrap().load().unwrap()
    }

    #[test]
    fn test_worker_processes_frames_in_order() {
        let shared = SharedContext::new(0.75);
        let source = ScriptedSource::new().with_detections(
            "cam",
            vec![
                vec![det(1, 300.0, 300.0, Some(vec![1.0, 0.0])), det(2, 50.0, 50.0, None)],
                vec![],
                vec![
                    det(1, 100.0, 100.0, Some(vec![0.99, 0.14])),
                    det(3, 60.0, 60.0, Some(vec![0.0, 1.0])),
                ],
            ],
        );
        let (w, _controls) = worker("cam", vec![Zone::rectangle(100.0, 100.0, 500.0, 500.0)], &shared);
        assert_eq!(w.state(), WorkerState::Init);

        let report = w.run(&source, &MemorySinkProvider);
        assert!(report.is_ok());
        assert_eq!(report.frames, 3);
        assert_eq!(report.records, 3);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.alerts, 1);
        assert_eq!(report.local_tracks, 2);

        let out = records(&report);
        let summary: Vec<_> = out
            .iter()
            .map(|r| (r.frame_index, r.global_id, r.alert_flag))
            .collect();
        assert_eq!(summary, vec![(0, 1, true), (2, 1, false), (2, 2, false)]);
        assert_eq!(shared.registry.len(), 2);
    }

    #[test]
    fn test_empty_zone_list_never_alerts() {
        let shared = SharedContext::new(0.75);
        let (mut w, _c) = worker("cam", vec![], &shared);
        let record = w
            .process_detection(0, det(9, 300.0, 300.0, Some(vec![1.0, 2.0])))
            .unwrap();
        assert!(!record.alert_flag);
        assert_eq!(w.global_id_of(9), Some(1));
    }

    #[test]
    fn test_degenerate_embedding_is_dropped() {
        let shared = SharedContext::new(0.75);
        let (mut w, _c) = worker("cam", vec![Zone::rectangle(0.0, 0.0, 10.0, 10.0)], &shared);
        assert!(w.process_detection(0, det(1, 5.0, 5.0, Some(vec![]))).is_none());
        assert!(w.process_detection(0, det(1, 5.0, 5.0, Some(vec![0.0, 0.0]))).is_none());
        assert!(shared.registry.is_empty());
        assert_eq!(w.global_id_of(1), None);
    }

    #[test]
    fn test_read_failure_flushes_partial_output() {
        let shared = SharedContext::new(0.75);
        let source = ScriptedSource::new().with_stream(
            "cam",
            vec![
                ScriptedFrame::Detections(vec![det(1, 1.0, 1.0, Some(vec![1.0, 0.0]))]),
                ScriptedFrame::ReadFailure("connection reset".into()),
                ScriptedFrame::Detections(vec![det(1, 1.0, 1.0, Some(vec![1.0, 0.0]))]),
            ],
        );
        let (w, _c) = worker("cam", vec![], &shared);
        let report = w.run(&source, &MemorySinkProvider);

        assert!(matches!(report.failure, Some(SentinelError::StreamRead { .. })));
        assert_eq!(report.frames, 1);
        assert_eq!(records(&report).len(), 1);
    }

    #[test]
    fn test_open_failure_reports_without_output() {
        let shared = SharedContext::new(0.75);
        let (w, _c) = worker("ghost", vec![], &shared);
        let report = w.run(&ScriptedSource::new(), &MemorySinkProvider);
        assert!(matches!(report.failure, Some(SentinelError::StreamOpen { .. })));
        assert!(report.store.is_none());
    }

    #[test]
    fn test_quit_before_start_processes_nothing() {
        let shared = SharedContext::new(0.75);
        let source = ScriptedSource::new()
            .with_detections("cam", vec![vec![det(1, 1.0, 1.0, Some(vec![1.0, 0.0]))]; 5]);
        let (w, controls) = worker("cam", vec![], &shared);
        assert!(controls.quit(&StreamId::new("cam")));

        let report = w.run(&source, &MemorySinkProvider);
        assert!(report.quit_early);
        assert!(report.is_ok());
        assert_eq!(report.frames, 0);
        assert_eq!(records(&report), vec![]);
    }

    /// 拉取到指定帧时向自己发送控制命令的输入流
    struct SignallingSource {
        tx: Sender<WorkerCommand>,
        at_frame: usize,
        command: WorkerCommand,
    }

    struct SignallingStream {
        tx: Sender<WorkerCommand>,
        at_frame: usize,
        command: WorkerCommand,
        pulled: usize,
    }

    impl StreamSource for SignallingSource {
        fn discover(&self) -> Result<Vec<StreamId>> {
            Ok(vec![StreamId::new("cam")])
        }

        fn open(&self, _stream: &StreamId) -> Result<Box<dyn DetectionStream>> {
            Ok(Box::new(SignallingStream {
                tx: self.tx.clone(),
                at_frame: self.at_frame,
                command: self.command.clone(),
                pulled: 0,
            }))
        }
    }

    impl DetectionStream for SignallingStream {
        fn next_frame(&mut self) -> Result<Option<Vec<Detection>>> {
            if self.pulled == self.at_frame {
                self.tx.send(self.command.clone()).unwrap();
            }
            self.pulled += 1;
            if self.pulled > 10 {
                return Ok(None);
            }
            Ok(Some(vec![det(1, 1.0, 1.0, Some(vec![1.0, 0.0]))]))
        }
    }

    #[test]
    fn test_quit_mid_stream_abandons_remaining_frames() {
        let shared = SharedContext::new(0.75);
        let (tx, rx) = crossbeam_channel::bounded(4);
        let source = SignallingSource {
            tx,
            at_frame: 2,
            command: WorkerCommand::Quit,
        };
        let w = StreamWorker::new(StreamId::new("cam"), vec![], shared.clone(), rx);
        let report = w.run(&source, &MemorySinkProvider);

        assert!(report.quit_early);
        assert_eq!(report.frames, 3);
        assert_eq!(records(&report).len(), 3);
    }

    #[test]
    fn test_retarget_does_not_change_processing() {
        let shared = SharedContext::new(0.75);
        let (tx, rx) = crossbeam_channel::bounded(4);
        let source = SignallingSource {
            tx,
            at_frame: 4,
            command: WorkerCommand::Retarget(Some(1)),
        };
        let w = StreamWorker::new(StreamId::new("cam"), vec![], shared.clone(), rx);
        let report = w.run(&source, &MemorySinkProvider);

        assert!(!report.quit_early);
        assert_eq!(report.frames, 10);
        assert_eq!(report.records, 10);
        assert_eq!(shared.target.current(), Some(1));
        assert!(records(&report).iter().all(|r| r.global_id == 1));
    }
}
