//! エンジン設定

use std::time::Duration;

/// 位置情報を持つフレームが無い場合に表示するロケーション
pub const DEFAULT_LOCATION_FALLBACK: &str = "[External Code]";

/// 非同期評価ワーカーのデフォルト数
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// 評価エンジンとスレッドの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// 非同期評価ワーカーの数
    pub worker_threads: usize,
    /// 非同期評価に適用するタイムアウト（None なら無制限）
    pub async_timeout: Option<Duration>,
    /// ロケーションのフォールバック表示
    pub location_fallback: String,
}

impl EngineConfig {
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    pub fn with_async_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.async_timeout = timeout;
        self
    }

    pub fn with_location_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.location_fallback = fallback.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            async_timeout: None,
            location_fallback: DEFAULT_LOCATION_FALLBACK.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_threads_never_zero() {
        let config = EngineConfig::default().with_worker_threads(0);
        assert_eq!(config.worker_threads, 1);
    }
}
