// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 数字卫兵 (Digital Sentinel) - 多路视频跨流身份关联
//!
//! 系统架构:
//! 1. 工作线程: 每路视频一个 (检测帧 → 区域告警 → 全局身份 → 输出记录)
//! 2. 控制线程: 标准输入命令 (可选, --stdin-control)
//! 3. 主线程:   等待全部结束并生成汇总
//!
//! 直接运行: cargo run --bin sentinel --release -- --config sentinel.json

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sentinel_reid::{
    Args, ClassSummary, ControlHandle, ControlInput, Orchestrator, SentinelConfig, TargetSelector,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_reid=info,sentinel=info".into()),
        )
        .with_thread_names(true)
        .init();

    let mut config = SentinelConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    config.apply_args(&args).context("命令行参数无效")?;

    info!("🚀 数字卫兵系统启动");
    config.print_summary();

    // ========== 启动所有工作线程 ==========
    let handle = Orchestrator::from_config(&config)
        .spawn()
        .context("启动失败")?;

    // ========== 控制线程: 标准输入 ==========
    if args.stdin_control {
        let controls = handle.controls().clone();
        let target = Arc::clone(handle.target());
        std::thread::Builder::new()
            .name("control".into())
            .spawn(move || read_controls(controls, target))
            .context("控制线程启动失败")?;
        info!("⌨️  控制命令: q <视频> 停止一路, s [ID] 设定/清除目标");
    }

    // ========== 主线程: 等待全部结束 ==========
    let outcome = handle.wait();
    for report in outcome.failures() {
        if let Some(failure) = &report.failure {
            error!("❌ [{}] {}", report.stream, failure);
        }
    }

    if args.no_summary {
        return Ok(());
    }
    outcome
        .summarize(&ClassSummary::new(config.summary_path()))
        .context("生成汇总失败")?;

    info!("✅ 全部完成, 结果保存在 {}", config.output_folder.display());
    Ok(())
}

/// 阻塞读取标准输入; 主线程结束时随进程退出
fn read_controls(controls: ControlHandle, target: Arc<TargetSelector>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match ControlInput::parse(&line) {
            Some(input) => input.dispatch(&controls, &target),
            None => warn!("⚠️ 无法识别的命令: {}", line.trim()),
        }
    }
}
