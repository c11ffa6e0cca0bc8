//! フレームに束縛された式と、その評価
//!
//! 同期評価がすべての評価方法の基本です。非同期評価はワーカー上で
//! 同期評価を呼び、結果を必ず 1 回だけ完了通知として配送します。
//! フレームの有効性は評価を実際に実行する時点と、評価器から戻った時点で
//! 確認するため、途中で再開されたスレッドの古い結果を返すことはありません。

use crate::broadcast::{CompletionListener, CompletionSlot, RequestId};
use crate::errors::{EvalError, EvalResult};
use crate::evaluator::EvalEngine;
use crate::frame::StackFrame;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tomari_target::{EvalFlags, ExpressionBackend, NativeFrame, Property};
use tracing::{trace, warn};

/// 解析済みの式
///
/// 不変の値で、何度でも評価できます。評価はそれぞれ独立です。
#[derive(Clone)]
pub struct Expression {
    engine: Arc<EvalEngine>,
    frame: StackFrame,
    text: Arc<str>,
    radix: u32,
}

impl Expression {
    pub fn new(engine: Arc<EvalEngine>, frame: StackFrame, text: impl Into<String>, radix: u32) -> Self {
        Self {
            engine,
            frame,
            text: Arc::from(text.into()),
            radix,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn radix(&self) -> u32 {
        self.radix
    }

    pub fn frame(&self) -> &StackFrame {
        &self.frame
    }

    /// 呼び出し元のスレッドで式を評価する
    ///
    /// `timeout` を指定した場合は評価器を期限付き評価のプールで実行し、
    /// 期限を過ぎたら [`EvalError::Timeout`] を返します。評価器の呼び出し自体は
    /// 中断されず、結果は破棄されます。プールの枠が期限まで空かない場合も
    /// `Timeout` になります。
    pub fn evaluate_sync(&self, flags: EvalFlags, timeout: Option<Duration>) -> EvalResult<Property> {
        trace!(text = %self.text, ?timeout, "evaluate_sync");

        let native = self.frame.snapshot()?;
        let result = match timeout {
            Some(limit) => self.run_with_timeout(native, flags, limit),
            None => run_backend(self.engine.backend().as_ref(), &native, &self.text, self.radix, flags),
        };

        if !self.frame.is_valid() {
            return Err(EvalError::StaleContext);
        }
        result
    }

    fn run_with_timeout(&self, native: NativeFrame, flags: EvalFlags, limit: Duration) -> EvalResult<Property> {
        let deadline = Instant::now() + limit;
        let (tx, rx) = mpsc::sync_channel(1);
        let backend = Arc::clone(self.engine.backend());
        let text = Arc::clone(&self.text);
        let radix = self.radix;

        let spawned = self.engine.spawn_timed(deadline, move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                run_backend(backend.as_ref(), &native, &text, radix, flags)
            }))
            .unwrap_or_else(|payload| Err(EvalError::InternalFault(panic_message(payload.as_ref()))));
            // 期限切れ後は受信側が居ないので送信失敗は無視する
            let _ = tx.send(result);
        });
        if !spawned {
            warn!(text = %self.text, ?limit, "no free slot for timed evaluation");
            return Err(EvalError::Timeout(limit));
        }

        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(text = %self.text, ?limit, "evaluation timed out");
                Err(EvalError::Timeout(limit))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EvalError::InternalFault(
                "evaluator terminated without a result".to_string(),
            )),
        }
    }

    /// ワーカープールで式を評価し、完了をリスナーへ通知する
    ///
    /// すぐに要求 ID を返します。評価の成否やワーカー内部の障害に関わらず、
    /// リスナーには要求ごとにちょうど 1 回通知されます。
    pub fn evaluate_async(
        &self,
        flags: EvalFlags,
        listener: Arc<dyn CompletionListener>,
    ) -> EvalResult<RequestId> {
        let request = self.engine.next_request_id();
        trace!(%request, text = %self.text, "evaluate_async");

        let slot = CompletionSlot::new(
            request,
            self.clone(),
            listener,
            Arc::clone(self.engine.broadcaster()),
        );
        let expression = self.clone();
        let timeout = self.engine.config().async_timeout;

        self.engine.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| expression.evaluate_sync(flags, timeout)))
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    warn!(%request, "evaluation worker fault: {}", message);
                    Err(EvalError::InternalFault(message))
                });
            slot.complete(result);
        });

        Ok(request)
    }

    /// 実行中の非同期評価の中止はサポートしない
    pub fn abort(&self) -> EvalResult<()> {
        trace!(text = %self.text, "abort");
        Err(EvalError::NotImplemented)
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("text", &self.text)
            .field("radix", &self.radix)
            .field("frame", &self.frame)
            .finish()
    }
}

fn run_backend(
    backend: &dyn ExpressionBackend,
    native: &NativeFrame,
    text: &str,
    radix: u32,
    flags: EvalFlags,
) -> EvalResult<Property> {
    match backend.evaluate(native, text, radix, flags) {
        Ok(Some(property)) => Ok(property),
        Ok(None) => Err(EvalError::EvaluationFailed(format!("no result for '{}'", text))),
        Err(e) => Err(EvalError::EvaluationFailed(e.to_string())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
