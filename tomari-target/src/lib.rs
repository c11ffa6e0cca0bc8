//! Tomari ターゲット境界
//!
//! このクレートは、デバッグ対象に対するネイティブ機能の境界を定義します。
//! スタックウォーカーと式評価器は不透明な機能として扱い、
//! コアはトレイト経由でのみ呼び出します。

pub mod thread;
pub mod eval;
pub mod value;
pub mod simulated;

pub use thread::{ThreadId, NativeFrame, NativeVariable, StackWalker};
pub use eval::{EvalFlags, ExpressionBackend, Property};
pub use value::format_integer;
pub use simulated::{Gate, SimulatedTarget};

/// ターゲット境界の結果型
pub type Result<T> = anyhow::Result<T>;
