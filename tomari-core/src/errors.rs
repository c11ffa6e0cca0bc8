//! エラー型

use std::time::Duration;
use thiserror::Error;
use tomari_target::ThreadId;

/// 式評価のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// サポートしていない操作
    #[error("operation is not implemented")]
    NotImplemented,
    /// 評価器が使える結果を返さなかった
    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),
    /// 要求後、実行前にフレームが無効化された
    #[error("stack frame was invalidated before evaluation completed")]
    StaleContext,
    /// 同期評価が指定時間内に終わらなかった
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),
    /// ワーカー内部の予期しない障害
    #[error("internal fault during evaluation: {0}")]
    InternalFault(String),
}

/// スレッド操作のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThreadError {
    /// サスペンドカウントが 0 のスレッドを再開しようとした
    #[error("thread {0} is not suspended")]
    NotSuspended(ThreadId),
    /// サポートしていない操作
    #[error("operation is not implemented")]
    NotImplemented,
    /// スタックウォークに失敗した
    #[error("stack walk failed: {0}")]
    StackWalk(String),
    /// 無効化されたフレームへの問い合わせ
    #[error("stack frame is no longer valid")]
    StaleFrame,
    /// スレッドが既に終了している
    #[error("thread has exited")]
    ThreadExited,
}

impl From<ThreadError> for EvalError {
    fn from(err: ThreadError) -> Self {
        match err {
            ThreadError::StaleFrame | ThreadError::ThreadExited => EvalError::StaleContext,
            ThreadError::NotImplemented => EvalError::NotImplemented,
            other => EvalError::EvaluationFailed(other.to_string()),
        }
    }
}

/// 評価の結果型
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// スレッド操作の結果型
pub type ThreadResult<T> = std::result::Result<T, ThreadError>;
