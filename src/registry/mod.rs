// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 全局身份注册表 (Global Identity Registry)
///
/// 所有流工作线程共享的跨流身份存储:
/// - 一把互斥锁同时保护身份表与ID计数器
/// - 匹配: 锁内复制快照, 锁外计算相似度 (O(n) 计算不占用临界区)
/// - 创建/更新: 重新加锁做 O(1) 修改
///
/// 快照可能略微过时: 另一线程刚刚创建的身份对本次匹配不可见.
/// 这种竞争是允许的, 后续帧快照追上后自然收敛, 不做事后合并.
pub mod matching;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::detection::{Embedding, GlobalId, Point2, StreamId};

pub use matching::{best_match, MatchResult};

/// 全局身份: 只保留最近一次出现的特征/位置/流, 不保留历史
#[derive(Debug, Clone)]
pub struct GlobalIdentity {
    pub global_id: GlobalId,
    pub embedding: Arc<Embedding>,
    pub last_position: Point2,
    pub last_stream: StreamId,
}

/// 创建或更新的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 匹配到已有身份并覆盖其特征
    Matched(GlobalId),
    /// 分配了新的全局ID
    Created(GlobalId),
}

impl Resolution {
    pub fn id(&self) -> GlobalId {
        match *self {
            Resolution::Matched(id) | Resolution::Created(id) => id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Resolution::Created(_))
    }
}

struct RegistryState {
    // BTreeMap 按ID升序迭代, 保证相同分数时最早的ID胜出
    tracks: BTreeMap<GlobalId, GlobalIdentity>,
    next_id: GlobalId,
}

pub struct IdentityRegistry {
    state: Mutex<RegistryState>,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                tracks: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    // 工作线程panic不会留下半写的条目 (每次修改都是单条insert), 直接接管被污染的锁
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 锁内复制一份一致快照 (特征向量以Arc共享, 复制开销与条目数成正比)
    pub fn snapshot(&self) -> Vec<GlobalIdentity> {
        self.lock().tracks.values().cloned().collect()
    }

    /// 在快照上寻找最佳候选; 空表返回 [`MatchResult::NONE`]
    pub fn find_best_match(&self, embedding: &Embedding) -> MatchResult {
        let snapshot = self.snapshot();
        best_match(embedding, &snapshot)
    }

    /// 相似度严格大于阈值则覆盖已匹配身份, 否则分配新ID并插入
    pub fn create_or_update(
        &self,
        embedding: Embedding,
        position: Point2,
        stream: &StreamId,
        matched: MatchResult,
        threshold: f32,
    ) -> Resolution {
        let embedding = Arc::new(embedding);
        let mut state = self.lock();

        if let Some(id) = matched.accepted(threshold) {
            if let Some(track) = state.tracks.get_mut(&id) {
                track.embedding = embedding;
                track.last_position = position;
                track.last_stream = stream.clone();
                return Resolution::Matched(id);
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        state.tracks.insert(
            id,
            GlobalIdentity {
                global_id: id,
                embedding,
                last_position: position,
                last_stream: stream.clone(),
            },
        );
        drop(state);

        debug!(
            "🆕 [{}] 新全局身份 ID:{} (最佳相似度 {:.3})",
            stream, id, matched.similarity
        );
        Resolution::Created(id)
    }

    /// 匹配 + 创建/更新 (两段独立的临界区)
    pub fn resolve(
        &self,
        embedding: Embedding,
        position: Point2,
        stream: &StreamId,
        threshold: f32,
    ) -> Resolution {
        let matched = self.find_best_match(&embedding);
        self.create_or_update(embedding, position, stream, matched, threshold)
    }

    pub fn get(&self, id: GlobalId) -> Option<GlobalIdentity> {
        self.lock().tracks.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tracks.is_empty()
    }
}
