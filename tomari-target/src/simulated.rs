//! プロセス内で完結する模擬ターゲット
//!
//! 実プロセスを用意せずにスタックウォークと式評価を行うための実装です。
//! CLI のデモとテストで使用します。

use crate::{
    format_integer, EvalFlags, ExpressionBackend, NativeFrame, Property, Result, StackWalker,
    ThreadId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 評価やスタックウォークを外部から止めておくためのゲート
///
/// テストでワーカーを特定の地点に留めるために使います。
#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

#[derive(Default)]
struct GateState {
    open: bool,
    entered: usize,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// ゲートを開き、待機中の評価をすべて再開させる
    pub fn open(&self) {
        lock(&self.state).open = true;
        self.cond.notify_all();
    }

    /// 少なくとも `count` 件の評価がゲートに到達するまで待つ
    pub fn wait_entered(&self, count: usize) {
        let mut state = lock(&self.state);
        while state.entered < count {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// これまでにゲートに到達した件数
    pub fn entered(&self) -> usize {
        lock(&self.state).entered
    }

    fn pass(&self) {
        let mut state = lock(&self.state);
        state.entered += 1;
        self.cond.notify_all();
        while !state.open {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// 模擬ターゲット
///
/// スレッドごとのスタックを保持し、[`StackWalker`] と [`ExpressionBackend`]
/// の両方を実装します。
#[derive(Default)]
pub struct SimulatedTarget {
    stacks: Mutex<HashMap<ThreadId, Vec<NativeFrame>>>,
    failing_walks: Mutex<Vec<ThreadId>>,
    walk_count: AtomicUsize,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
    walk_gates: Mutex<HashMap<ThreadId, Arc<Gate>>>,
    panic_on: Mutex<Vec<String>>,
}

impl SimulatedTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// スレッドのスタックを設定する（最内フレームが先頭）
    pub fn set_stack(&self, tid: ThreadId, frames: Vec<NativeFrame>) {
        lock(&self.stacks).insert(tid, frames);
    }

    /// スレッドのスタックウォークを失敗させる
    pub fn fail_walks_for(&self, tid: ThreadId) {
        lock(&self.failing_walks).push(tid);
    }

    /// これまでに実行されたスタックウォークの回数
    pub fn walk_count(&self) -> usize {
        self.walk_count.load(Ordering::SeqCst)
    }

    /// 指定した式の評価をゲートで止める
    pub fn gate_expression(&self, text: impl Into<String>) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        lock(&self.gates).insert(text.into(), Arc::clone(&gate));
        gate
    }

    /// 指定したスレッドのスタックウォークをゲートで止める
    pub fn gate_walk(&self, tid: ThreadId) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        lock(&self.walk_gates).insert(tid, Arc::clone(&gate));
        gate
    }

    /// 指定した式の評価で panic させる
    pub fn panic_on(&self, text: impl Into<String>) {
        lock(&self.panic_on).push(text.into());
    }

    fn operand(frame: &NativeFrame, token: &str) -> Option<i64> {
        let token = token.trim();
        if let Some(hex) = token.strip_prefix("0x") {
            return i64::from_str_radix(hex, 16).ok();
        }
        token.parse::<i64>().ok().or_else(|| frame.lookup(token))
    }

    /// `a`、`a + b`、`a - b`、`a * b` の形の式を評価する
    fn compute(frame: &NativeFrame, text: &str) -> Option<i64> {
        let text = text.trim();
        // 先頭の符号は演算子として扱わない
        let split = text
            .char_indices()
            .skip(1)
            .find(|(_, c)| matches!(c, '+' | '-' | '*'));

        match split {
            Some((pos, op)) => {
                let lhs = Self::operand(frame, &text[..pos])?;
                let rhs = Self::operand(frame, &text[pos + 1..])?;
                match op {
                    '+' => lhs.checked_add(rhs),
                    '-' => lhs.checked_sub(rhs),
                    _ => lhs.checked_mul(rhs),
                }
            }
            None => Self::operand(frame, text),
        }
    }
}

impl StackWalker for SimulatedTarget {
    fn walk(&self, tid: ThreadId) -> Result<Vec<NativeFrame>> {
        self.walk_count.fetch_add(1, Ordering::SeqCst);
        trace!(tid, "simulated stack walk");

        let gate = lock(&self.walk_gates).get(&tid).cloned();
        if let Some(gate) = gate {
            gate.pass();
        }

        if lock(&self.failing_walks).contains(&tid) {
            return Err(anyhow::anyhow!("Unable to unwind thread {}", tid));
        }

        Ok(lock(&self.stacks).get(&tid).cloned().unwrap_or_default())
    }
}

impl ExpressionBackend for SimulatedTarget {
    fn evaluate(
        &self,
        frame: &NativeFrame,
        text: &str,
        radix: u32,
        _flags: EvalFlags,
    ) -> Result<Option<Property>> {
        let gate = lock(&self.gates).get(text).cloned();
        if let Some(gate) = gate {
            gate.pass();
        }

        if lock(&self.panic_on).iter().any(|t| t == text) {
            panic!("simulated evaluator fault while evaluating '{}'", text);
        }

        Ok(Self::compute(frame, text).map(|value| Property {
            name: text.to_string(),
            value: format_integer(value, radix),
            type_name: Some("i64".to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> NativeFrame {
        NativeFrame::new(0x1000).with_arg("a", 6).with_local("b", 7)
    }

    #[test]
    fn test_evaluate_expressions() {
        let target = SimulatedTarget::new();
        let frame = frame();

        let eval = |text: &str, radix| {
            target
                .evaluate(&frame, text, radix, EvalFlags::default())
                .unwrap()
                .map(|p| p.value)
        };

        assert_eq!(eval("a", 10), Some("6".to_string()));
        assert_eq!(eval("a * b", 10), Some("42".to_string()));
        assert_eq!(eval("a*b", 16), Some("0x2a".to_string()));
        assert_eq!(eval("-3 + a", 10), Some("3".to_string()));
        assert_eq!(eval("0x10 - b", 10), Some("9".to_string()));
        assert_eq!(eval("missing", 10), None);
    }

    #[test]
    fn test_walk_counts_and_failures() {
        let target = SimulatedTarget::new();
        target.set_stack(1, vec![frame()]);
        target.fail_walks_for(2);

        assert_eq!(target.walk(1).unwrap().len(), 1);
        assert!(target.walk(2).is_err());
        assert!(target.walk(3).unwrap().is_empty());
        assert_eq!(target.walk_count(), 3);
    }

    #[test]
    fn test_walk_gate_holds_walk() {
        let target = Arc::new(SimulatedTarget::new());
        target.set_stack(1, vec![frame()]);
        let gate = target.gate_walk(1);

        let walker = Arc::clone(&target);
        let handle = std::thread::spawn(move || walker.walk(1).map(|frames| frames.len()));

        gate.wait_entered(1);
        assert_eq!(gate.entered(), 1);
        gate.open();
        assert_eq!(handle.join().unwrap().unwrap(), 1);
    }
}
