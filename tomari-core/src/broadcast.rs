//! 非同期評価の完了通知
//!
//! 非同期評価 1 件につき完了イベントを 1 回だけリスナーへ届けます。
//! 配送はリスナーの応答を待たない撃ちっぱなしです。

use crate::errors::{EvalError, EvalResult};
use crate::expression::Expression;
use crate::program::ProgramInfo;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tomari_target::{Property, ThreadId};
use tracing::{debug, warn};

/// 非同期評価要求のID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 完了イベント
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    /// 元の要求
    pub request: RequestId,
    /// 評価した式
    pub expression: Expression,
    /// 評価結果
    pub result: EvalResult<Property>,
    /// 結果を生成したプログラム
    pub program: ProgramInfo,
    /// 式が束縛されたフレームの所有スレッド
    pub thread: ThreadId,
}

/// 完了イベントの受け手
pub trait CompletionListener: Send + Sync {
    fn on_completion(&self, event: CompletionEvent);
}

/// チャネルへ完了イベントを流すリスナー
pub struct ChannelListener {
    sender: Sender<CompletionEvent>,
}

impl CompletionListener for ChannelListener {
    fn on_completion(&self, event: CompletionEvent) {
        let request = event.request;
        if self.sender.send(event).is_err() {
            warn!(%request, "completion receiver dropped; event discarded");
        }
    }
}

/// 完了イベントを受け取るチャネルを作成する
pub fn completion_channel() -> (Arc<dyn CompletionListener>, Receiver<CompletionEvent>) {
    let (sender, receiver) = mpsc::channel();
    (Arc::new(ChannelListener { sender }), receiver)
}

/// 完了イベントの配送者
#[derive(Debug, Clone)]
pub struct CompletionBroadcaster {
    program: ProgramInfo,
}

impl CompletionBroadcaster {
    pub fn new(program: ProgramInfo) -> Self {
        Self { program }
    }

    pub fn program(&self) -> &ProgramInfo {
        &self.program
    }

    /// 完了イベントを 1 件配送する
    ///
    /// プログラムは式が束縛されたスレッドから求め、スレッドが既に
    /// 破棄されているか登録簿外のスレッドであれば配送者自身の情報を使います。
    pub fn notify(
        &self,
        listener: &dyn CompletionListener,
        request: RequestId,
        expression: Expression,
        result: EvalResult<Property>,
    ) {
        debug!(%request, ok = result.is_ok(), "delivering completion");
        let thread = expression.frame().thread_id();
        let program = expression
            .frame()
            .thread()
            .and_then(|t| t.program().cloned())
            .unwrap_or_else(|| self.program.clone());
        listener.on_completion(CompletionEvent {
            request,
            expression,
            result,
            program,
            thread,
        });
    }
}

/// 1 つの非同期要求に対する配送権
///
/// [`CompletionSlot::complete`] は値を消費するため 2 回呼べません。
/// 完了せずに破棄された場合は `InternalFault` を配送します。
pub(crate) struct CompletionSlot {
    request: RequestId,
    pending: Option<(Expression, Arc<dyn CompletionListener>)>,
    broadcaster: Arc<CompletionBroadcaster>,
}

impl CompletionSlot {
    pub(crate) fn new(
        request: RequestId,
        expression: Expression,
        listener: Arc<dyn CompletionListener>,
        broadcaster: Arc<CompletionBroadcaster>,
    ) -> Self {
        Self {
            request,
            pending: Some((expression, listener)),
            broadcaster,
        }
    }

    pub(crate) fn complete(mut self, result: EvalResult<Property>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: EvalResult<Property>) {
        if let Some((expression, listener)) = self.pending.take() {
            self.broadcaster
                .notify(listener.as_ref(), self.request, expression, result);
        }
    }
}

impl Drop for CompletionSlot {
    fn drop(&mut self) {
        if self.pending.is_some() {
            warn!(request = %self.request, "evaluation abandoned before completion");
            self.deliver(Err(EvalError::InternalFault(
                "evaluation was abandoned before completion".to_string(),
            )));
        }
    }
}
