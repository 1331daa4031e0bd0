// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 全局身份匹配 (无锁, 在快照上计算)
//! Cosine-similarity scan over a registry snapshot.

use super::GlobalIdentity;
use crate::detection::{Embedding, GlobalId};

/// 匹配结果: 最佳候选ID及其相似度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub candidate: Option<GlobalId>,
    pub similarity: f32,
}

impl MatchResult {
    /// 注册表为空时的哨兵值
    pub const NONE: MatchResult = MatchResult {
        candidate: None,
        similarity: -1.0,
    };

    /// 严格大于阈值才视为同一目标
    pub fn accepted(&self, threshold: f32) -> Option<GlobalId> {
        self.candidate.filter(|_| self.similarity > threshold)
    }
}

impl Default for MatchResult {
    fn default() -> Self {
        Self::NONE
    }
}

/// 在快照上寻找余弦相似度最高的全局身份
///
/// 快照按ID升序排列; 只有严格更大的相似度才会替换当前最佳,
/// 因此相同分数时保留最早创建的ID. 维度不一致的条目被跳过.
pub fn best_match(embedding: &Embedding, snapshot: &[GlobalIdentity]) -> MatchResult {
    let mut best = MatchResult::NONE;
    for track in snapshot {
        let Some(sim) = embedding.cosine_similarity(&track.embedding) else {
            continue;
        };
        if best.candidate.is_none() || sim > best.similarity {
            best = MatchResult {
                candidate: Some(track.global_id),
                similarity: sim,
            };
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Point2, StreamId};
    use rand::Rng;
    use std::sync::Arc;

    fn track(id: GlobalId, values: Vec<f32>) -> GlobalIdentity {
        GlobalIdentity {
            global_id: id,
            embedding: Arc::new(Embedding::from_vec(values)),
            last_position: Point2::new(0.0, 0.0),
            last_stream: StreamId::new("cam"),
        }
    }

    #[test]
    fn test_empty_snapshot_returns_sentinel() {
        let e = Embedding::from_vec(vec![1.0, 0.0]);
        assert_eq!(best_match(&e, &[]), MatchResult::NONE);
        assert_eq!(MatchResult::NONE.accepted(-1.0), None);
    }

    #[test]
    fn test_tie_keeps_earliest_id() {
        let e = Embedding::from_vec(vec![1.0, 0.0]);
        let snapshot = vec![track(1, vec![2.0, 0.0]), track(2, vec![5.0, 0.0])];
        let m = best_match(&e, &snapshot);
        assert_eq!(m.candidate, Some(1));
        assert!((m.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_strict_threshold() {
        let m = MatchResult {
            candidate: Some(4),
            similarity: 0.75,
        };
        assert_eq!(m.accepted(0.75), None);
        assert_eq!(m.accepted(0.7499), Some(4));
    }

    #[test]
    fn test_opposite_vectors_still_yield_a_candidate() {
        let e = Embedding::from_vec(vec![1.0, 0.0]);
        let m = best_match(&e, &[track(1, vec![-1.0, 0.0])]);
        assert_eq!(m.candidate, Some(1));
        assert!((m.similarity + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_returns_true_maximum_over_random_snapshots() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let dim = 16;
            let k = rng.gen_range(1..40);
            let snapshot: Vec<_> = (1..=k)
                .map(|id| track(id, (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()))
                .collect();
            let query = Embedding::from_vec((0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect());

            let m = best_match(&query, &snapshot);
            let expected = snapshot
                .iter()
                .map(|t| query.cosine_similarity(&t.embedding).unwrap())
                .fold(f32::NEG_INFINITY, f32::max);
            assert_eq!(m.similarity, expected);
            let winner = snapshot
                .iter()
                .find(|t| t.global_id == m.candidate.unwrap())
                .unwrap();
            assert_eq!(query.cosine_similarity(&winner.embedding), Some(expected));
        }
    }
}
