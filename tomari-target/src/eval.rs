//! 式評価器の境界

use crate::{NativeFrame, Result};

/// 評価フラグ
///
/// コアは解釈せず、そのまま評価器へ渡します。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalFlags {
    /// 副作用を伴う評価を禁止する
    pub no_side_effects: bool,
    /// 関数呼び出しを伴う評価を禁止する
    pub no_func_eval: bool,
}

/// 評価結果のプロパティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// 式のテキスト
    pub name: String,
    /// 基数に従って整形された値
    pub value: String,
    /// 型名
    pub type_name: Option<String>,
}

/// 不透明な式評価器
///
/// `Ok(None)` は評価器が使える結果を返さなかったことを表します。
pub trait ExpressionBackend: Send + Sync {
    fn evaluate(
        &self,
        frame: &NativeFrame,
        text: &str,
        radix: u32,
        flags: EvalFlags,
    ) -> Result<Option<Property>>;
}
