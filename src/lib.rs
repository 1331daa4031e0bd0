// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行配置
pub mod control; // 控制通道 (停止/目标选择)
pub mod detection; // 检测数据类型
pub mod error;
pub mod orchestrator; // 多路调度
pub mod registry; // 跨流全局身份注册表
pub mod sink; // 输出记录
pub mod source; // 检测输入
pub mod summary; // 运行汇总
pub mod worker; // 单路工作线程
pub mod zone; // 告警区域

pub use crate::config::{Args, SentinelConfig};
pub use crate::control::{ControlHandle, ControlInput, TargetSelector, WorkerCommand};
pub use crate::detection::{Detection, Embedding, GlobalId, OutputRecord, Point2, StreamId};
pub use crate::error::{Result, SentinelError};
pub use crate::orchestrator::{Orchestrator, RunHandle, RunOutcome};
pub use crate::registry::{GlobalIdentity, IdentityRegistry, Resolution};
pub use crate::summary::{ClassSummary, Summarizer, SummaryStats};
pub use crate::zone::{Zone, ZoneMap};

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_time_string_layout() {
        let s = gen_time_string("-");
        assert_eq!(s.split('-').count(), 6);
        assert!(s.split('-').all(|part| part.chars().all(|c| c.is_ascii_digit())));
    }
}
