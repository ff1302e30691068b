pub mod agent;
pub mod keywords;
pub mod report;
pub mod run;

use colored::Colorize;
use wtp_common::{RunReport, RunStatus, StepStatus};

/// 打印单次运行的步骤明细与终态
pub fn print_run_report(report: &RunReport) {
    println!();
    println!(
        "{} {} (用例 {})",
        "运行".bold(),
        report.case_name.bold(),
        report.case_id
    );

    for step in &report.steps {
        let marker = match step.status {
            StepStatus::Passed => "✓".green(),
            StepStatus::Failed => "✗".red(),
            StepStatus::Skipped => "-".yellow(),
        };
        println!("  {} 步骤 {}: {}", marker, step.ordinal, step.description);
        if step.status == StepStatus::Failed {
            println!("    {}", step.message.red());
            if let Some(screenshot) = &step.screenshot_path {
                println!("    截图: {}", screenshot);
            }
        }
    }

    let status = match report.status {
        RunStatus::Passed => report.status.as_str().green().bold(),
        RunStatus::Failed => report.status.as_str().red().bold(),
        _ => report.status.as_str().yellow().bold(),
    };
    println!("  状态: {} ({} ms)", status, report.duration_ms);

    if let Some(log_path) = &report.log_path {
        println!("  日志: {}", log_path);
    }
    if let Some(report_path) = &report.report_path {
        println!("  报告: {}", report_path);
    }
}
