// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 控制通道 (外部UI → 工作线程)
//! Control inputs: per-worker quit, shared followed-identity selector.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{info, warn};

use crate::detection::{GlobalId, StreamId};

// 0 = 未选择目标 (全局ID从1开始)
const NO_TARGET: u64 = 0;

/// 当前关注的全局身份 (所有工作线程共享, 后写者胜)
///
/// 只影响显示/日志上的突出, 不影响匹配.
#[derive(Debug, Default)]
pub struct TargetSelector {
    current: AtomicU64,
}

impl TargetSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow(&self, id: GlobalId) {
        self.current.store(id, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.current.store(NO_TARGET, Ordering::Relaxed);
    }

    pub fn current(&self) -> Option<GlobalId> {
        match self.current.load(Ordering::Relaxed) {
            NO_TARGET => None,
            id => Some(id),
        }
    }

    pub fn is_target(&self, id: GlobalId) -> bool {
        self.current() == Some(id)
    }

    pub fn apply(&self, target: Option<GlobalId>) {
        match target {
            Some(id) => {
                self.follow(id);
                info!("🎯 目标已设定: ID {}", id);
            }
            None => {
                self.clear();
                info!("🎯 目标已清除");
            }
        }
    }

    /// 操作员输入: 空输入清除目标, 无法解析的输入保留当前目标
    pub fn retarget(&self, input: Option<&str>) -> Option<GlobalId> {
        match input.map(str::trim).filter(|s| !s.is_empty()) {
            None => self.apply(None),
            Some(text) => match parse_target(text) {
                Some(id) => self.apply(Some(id)),
                None => warn!("⚠️ 无效的目标ID: {:?}", text),
            },
        }
        self.current()
    }
}

fn parse_target(text: &str) -> Option<GlobalId> {
    text.parse::<GlobalId>().ok().filter(|&id| id != NO_TARGET)
}

/// 工作线程控制消息
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerCommand {
    /// 提前结束本路视频 (仅影响该工作线程)
    Quit,
    /// 更新共享目标, 不改变工作线程状态
    Retarget(Option<GlobalId>),
}

/// 每路工作线程的控制通道发送端
#[derive(Clone, Debug, Default)]
pub struct ControlHandle {
    senders: BTreeMap<StreamId, Sender<WorkerCommand>>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为一路视频创建控制通道, 返回工作线程持有的接收端
    pub fn register(&mut self, stream: StreamId, capacity: usize) -> Receiver<WorkerCommand> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.senders.insert(stream, tx);
        rx
    }

    /// 发送失败 (工作线程已结束或队列满) 返回 false
    pub fn send(&self, stream: &StreamId, command: WorkerCommand) -> bool {
        let Some(tx) = self.senders.get(stream) else {
            warn!("⚠️ 未知视频流: {}", stream);
            return false;
        };
        match tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("⚠️ [{}] 控制队列已满, 丢弃命令", stream);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn quit(&self, stream: &StreamId) -> bool {
        self.send(stream, WorkerCommand::Quit)
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamId> {
        self.senders.keys()
    }
}

/// 文本控制协议 (`--stdin-control`):
/// `q <stream>` / `quit <stream>`, `s [id]` / `target [id]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlInput {
    Quit(StreamId),
    Retarget(Option<String>),
}

impl ControlInput {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let verb = parts.next()?;
        let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());
        match verb {
            "q" | "quit" => rest.map(|s| ControlInput::Quit(StreamId::new(s))),
            "s" | "target" => Some(ControlInput::Retarget(rest.map(str::to_string))),
            _ => None,
        }
    }

    pub fn dispatch(&self, controls: &ControlHandle, target: &TargetSelector) {
        match self {
            ControlInput::Quit(stream) => {
                if controls.quit(stream) {
                    info!("🛑 [{}] 已请求停止", stream);
                }
            }
            ControlInput::Retarget(id) => {
                target.retarget(id.as_deref());
            }
        }
    }
}
