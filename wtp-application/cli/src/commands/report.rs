//! 运行记录查询命令

use anyhow::{bail, Context, Result};
use colored::Colorize;

use wtp_storage::{RunFilter, Storage, StorageManager};

async fn open_storage(db_path: &str) -> Result<Storage> {
    let manager = StorageManager::new(db_path)
        .await
        .context("打开数据库失败")?;
    Ok(Storage::from_manager(&manager))
}

fn colorize_status(status: &str) -> colored::ColoredString {
    match status {
        "Passed" => status.green(),
        "Failed" => status.red(),
        "Running" => status.cyan(),
        _ => status.yellow(),
    }
}

/// 列出运行记录
pub async fn list(db_path: &str, case_id: Option<i64>, limit: i64) -> Result<()> {
    let storage = open_storage(db_path).await?;

    let records = storage
        .runs()
        .list(&RunFilter {
            case_id,
            limit: Some(limit),
            ..Default::default()
        })
        .await?;

    if records.is_empty() {
        println!("没有运行记录");
        return Ok(());
    }

    println!(
        "{:<6}  {:<8}  {:<24}  {:<8}  {:<20}  {}",
        "ID".bold(),
        "用例".bold(),
        "名称".bold(),
        "状态".bold(),
        "开始时间".bold(),
        "耗时".bold()
    );
    for record in records {
        let duration = record
            .duration_ms
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6}  {:<8}  {:<24}  {:<8}  {:<20}  {}",
            record.id,
            record.case_id,
            record.case_name,
            colorize_status(&record.status),
            record.start_time.format("%Y-%m-%d %H:%M:%S"),
            duration
        );
    }

    Ok(())
}

/// 显示单次运行详情与日志
pub async fn show(db_path: &str, run_id: i64) -> Result<()> {
    let storage = open_storage(db_path).await?;

    let Some(record) = storage.runs().get_by_id(run_id).await? else {
        bail!("运行 {} 不存在", run_id);
    };

    println!("{} {}", "运行".bold(), record.id);
    println!("  用例: {} ({})", record.case_name, record.case_id);
    println!("  状态: {}", colorize_status(&record.status));
    println!("  开始: {}", record.start_time.format("%Y-%m-%d %H:%M:%S"));
    if let Some(end) = record.end_time {
        println!("  结束: {}", end.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(duration) = record.duration_ms {
        println!("  耗时: {} ms", duration);
    }
    if let Some(report_path) = &record.report_path {
        println!("  报告: {}", report_path);
    }
    if let Some(log_path) = &record.log_path {
        println!("  日志文件: {}", log_path);
    }

    let logs = storage.run_logs().get_for_run(run_id).await?;
    if !logs.is_empty() {
        println!();
        println!("{}", "日志:".bold());
        for log in logs {
            let level = match log.level.as_str() {
                "ERROR" | "CRITICAL" => log.level.red(),
                _ => log.level.normal(),
            };
            let step = log
                .step_ordinal
                .map(|o| format!("步骤 {}", o))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  [{}] {:<6} {} {}",
                log.timestamp.format("%H:%M:%S%.3f"),
                level,
                step,
                log.message
            );
            if let Some(screenshot) = &log.screenshot_path {
                println!("      截图: {}", screenshot);
            }
        }
    }

    Ok(())
}
