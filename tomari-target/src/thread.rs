//! スレッドとネイティブスタックフレーム

use crate::Result;

/// スレッドID
pub type ThreadId = u32;

/// フレームに属する名前付きの整数値（引数・ローカル変数）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeVariable {
    pub name: String,
    pub value: i64,
}

impl NativeVariable {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// スタックウォーカーが返す生のフレーム情報
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeFrame {
    /// プログラムカウンタ
    pub pc: u64,
    /// 関数シンボル（マングルされている場合がある）
    pub function: Option<String>,
    /// モジュール名
    pub module: Option<String>,
    /// ソース言語
    pub language: Option<String>,
    /// 引数
    pub args: Vec<NativeVariable>,
    /// ローカル変数
    pub locals: Vec<NativeVariable>,
}

impl NativeFrame {
    /// 新しいフレームを作成する
    pub fn new(pc: u64) -> Self {
        Self {
            pc,
            ..Default::default()
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: i64) -> Self {
        self.args.push(NativeVariable::new(name, value));
        self
    }

    pub fn with_local(mut self, name: impl Into<String>, value: i64) -> Self {
        self.locals.push(NativeVariable::new(name, value));
        self
    }

    /// 引数とローカル変数から名前で値を探す（引数優先）
    pub fn lookup(&self, name: &str) -> Option<i64> {
        self.args
            .iter()
            .chain(self.locals.iter())
            .find(|v| v.name == name)
            .map(|v| v.value)
    }
}

/// ネイティブのスタックウォーカー
///
/// 停止中のスレッドの呼び出しスタックを、最内フレームから順に返します。
/// 実装はブロックする可能性があります。
pub trait StackWalker: Send + Sync {
    fn walk(&self, tid: ThreadId) -> Result<Vec<NativeFrame>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_prefers_args() {
        let frame = NativeFrame::new(0x1000)
            .with_arg("x", 1)
            .with_local("x", 2)
            .with_local("y", 3);

        assert_eq!(frame.lookup("x"), Some(1));
        assert_eq!(frame.lookup("y"), Some(3));
        assert_eq!(frame.lookup("z"), None);
    }
}
