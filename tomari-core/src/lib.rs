//! Tomari デバッガのコア機能
//!
//! このクレートは、デバッグ対象スレッドの実行状態を管理します。
//! 実行・停止の通知に合わせたスタックフレームキャッシュの維持、
//! スレッドのプロパティ問い合わせ、フレームに束縛された式の
//! 同期・非同期評価と完了通知を提供します。

pub mod broadcast;
pub mod command;
pub mod config;
pub mod errors;
pub mod evaluator;
pub mod expression;
pub mod frame;
pub mod program;
pub mod properties;
pub mod thread;

pub use broadcast::{
    completion_channel, ChannelListener, CompletionBroadcaster, CompletionEvent,
    CompletionListener, RequestId,
};
pub use command::Command;
pub use config::EngineConfig;
pub use errors::{EvalError, EvalResult, ThreadError, ThreadResult};
pub use evaluator::EvalEngine;
pub use expression::Expression;
pub use frame::{FrameInfo, FrameInfoFields, StackFrame};
pub use program::{Program, ProgramInfo};
pub use properties::{
    DisplayNamePriority, ExtendedPropertyFields, ThreadCategory, ThreadProperties,
    ThreadProperties100, ThreadPropertyFields,
};
pub use thread::{Thread, ThreadState};

// 他のクレートから使用するために再エクスポート
pub use tomari_target::{EvalFlags, NativeFrame, Property, ThreadId};

/// コアの結果型
pub type Result<T> = anyhow::Result<T>;
