//! 本地执行命令

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use wtp_common::{BrowserEngine, RunSettings, TestCase};
use wtp_engine::{RunnerConfig, TestRunner};
use wtp_storage::{Storage, StorageManager};

use crate::config::CliConfig;

use super::print_run_report;

/// 本地执行选项 (配置文件与命令行参数合并后的结果)
pub struct RunOptions {
    pub settings: RunSettings,
    pub webdriver_url: String,
    pub reports_dir: String,
    pub db_path: Option<String>,
    pub fanout: usize,
}

impl RunOptions {
    pub fn from_config(
        config: &CliConfig,
        base_url: Option<String>,
        browser: Option<String>,
        headed: bool,
        webdriver_url: Option<String>,
        reports_dir: Option<String>,
        no_db: bool,
    ) -> Result<Self> {
        let settings = build_settings(config, base_url, browser, headed)?;

        Ok(Self {
            settings,
            webdriver_url: webdriver_url.unwrap_or_else(|| config.webdriver_url.clone()),
            reports_dir: reports_dir.unwrap_or_else(|| config.reports_dir.clone()),
            db_path: if no_db { None } else { Some(config.db_path.clone()) },
            fanout: 4,
        })
    }
}

/// 合并项目默认设置与命令行覆盖
pub fn build_settings(
    config: &CliConfig,
    base_url: Option<String>,
    browser: Option<String>,
    headed: bool,
) -> Result<RunSettings> {
    let browser: BrowserEngine = browser
        .unwrap_or_else(|| config.browser.clone())
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    Ok(RunSettings {
        base_url: base_url.unwrap_or_else(|| config.base_url.clone()),
        browser,
        headless: if headed { false } else { config.headless },
    })
}

async fn build_runner(options: &RunOptions) -> Result<TestRunner> {
    let runner = TestRunner::new(RunnerConfig {
        reports_root: options.reports_dir.clone().into(),
        webdriver_url: options.webdriver_url.clone(),
        locator_timeout: Duration::from_secs(10),
        fanout: options.fanout,
        ..Default::default()
    });

    match &options.db_path {
        Some(db_path) => {
            let manager = StorageManager::new(db_path)
                .await
                .context("初始化数据库失败")?;
            let storage = Arc::new(Storage::from_manager(&manager));
            Ok(runner.with_storage(storage))
        }
        None => Ok(runner),
    }
}

/// 执行单个用例文件
pub async fn run_case(file: &Path, options: RunOptions) -> Result<()> {
    let case = TestCase::from_yaml_file(file)
        .with_context(|| format!("加载用例文件失败: {}", file.display()))?;

    println!(
        "执行用例 {} ({} 引擎, headless={})",
        case.name.bold(),
        options.settings.browser,
        options.settings.headless
    );

    let runner = build_runner(&options).await?;
    let report = runner.run_case(&case, &options.settings).await?;

    print_run_report(&report);

    if !report.passed() {
        bail!("用例执行未通过");
    }
    Ok(())
}

/// 执行目录下的全部用例文件 (按文件名排序)
pub async fn run_suite(dir: &Path, options: RunOptions) -> Result<()> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("读取用例目录失败: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    files.sort();

    if files.is_empty() {
        bail!("目录中没有用例文件: {}", dir.display());
    }

    let mut cases = Vec::with_capacity(files.len());
    for file in &files {
        let case = TestCase::from_yaml_file(file)
            .with_context(|| format!("加载用例文件失败: {}", file.display()))?;
        cases.push(case);
    }

    println!(
        "执行套件: {} ({} 个用例, 并发 {})",
        dir.display(),
        cases.len(),
        options.fanout
    );

    let runner = build_runner(&options).await?;
    let label = format!("suite:{}", dir.display());
    let bulk = runner.run_bulk(&label, &cases, &options.settings).await;

    for report in &bulk.reports {
        print_run_report(report);
    }

    println!();
    let summary = format!("{}/{} 通过", bulk.passed, bulk.total);
    if bulk.failed == 0 {
        println!("套件结果: {}", summary.green().bold());
        Ok(())
    } else {
        println!("套件结果: {}", summary.red().bold());
        bail!("{} 个用例未通过", bulk.failed)
    }
}
