//! 会话 trace 记录
//!
//! 以结构化事件流的形式记录会话期间发生的动作，
//! 释放会话时写入 `trace.json` 作为本次运行的报告归档。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// 单条 trace 事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
}

/// 会话 trace 记录器
///
/// 事件按追加顺序保存，会话释放时一次性落盘。
pub struct TraceRecorder {
    started_at: DateTime<Utc>,
    engine: String,
    events: Mutex<Vec<TraceEvent>>,
}

#[derive(Serialize)]
struct TraceArchive<'a> {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    engine: &'a str,
    events: &'a [TraceEvent],
}

impl TraceRecorder {
    pub fn new(engine: &str) -> Self {
        Self {
            started_at: Utc::now(),
            engine: engine.to_string(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// 追加一条事件
    pub fn record(&self, kind: &str, detail: impl Into<String>) {
        let event = TraceEvent {
            timestamp: Utc::now(),
            kind: kind.to_string(),
            detail: detail.into(),
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// 写入 trace 归档，返回落盘路径
    pub fn flush(&self, dir: &Path) -> Result<PathBuf> {
        let events = self
            .events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default();

        let archive = TraceArchive {
            started_at: self.started_at,
            finished_at: Utc::now(),
            engine: &self.engine,
            events: &events,
        };

        let path = dir.join("trace.json");
        let json = serde_json::to_string_pretty(&archive)
            .map_err(|e| crate::BrowserError::WebDriver(e.to_string()))?;
        std::fs::write(&path, json)?;

        debug!("会话 trace 已写入: {} ({} 条事件)", path.display(), events.len());
        Ok(path)
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_record_and_flush() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = TraceRecorder::new("chromium");

        recorder.record("navigate", "https://example.com");
        recorder.record("click", "#submit");
        assert_eq!(recorder.event_count(), 2);

        let path = recorder.flush(dir.path()).unwrap();
        assert!(path.exists());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("navigate"));
        assert!(content.contains("#submit"));
    }
}
