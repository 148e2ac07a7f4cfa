//! Helm 命令行入口
//!
//! `helm [QUESTION]`：跑一次会话，打印决策报告，并把轨迹导出到 `app.trace_dir`。

use anyhow::Context;
use helm::config::{load_config, AppConfig};
use helm::{answer_question, observability, trace};

const DEFAULT_QUESTION: &str = "What is LangGraph?";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let question = if args.is_empty() {
        DEFAULT_QUESTION.to_string()
    } else {
        args.join(" ")
    };

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let snapshot = answer_question(&cfg, &question)
        .await
        .context("Session failed to start")?;

    print!("{}", trace::render(&snapshot));

    let path = trace::export_trace(&snapshot, &cfg.app.trace_dir)
        .context("Failed to export trace")?;
    println!();
    println!("Trace: {}", path.display());

    Ok(())
}
