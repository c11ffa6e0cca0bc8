//! 式評価エンジン
//!
//! 評価器の実体と、非同期評価を実行する有界ワーカープールを保持します。
//! 期限付き評価は別の有界プールで実行し、期限切れ後も走り続ける
//! 評価器呼び出しを含めて、同時に動くのは `worker_threads` 件までです。

use crate::broadcast::{CompletionBroadcaster, RequestId};
use crate::config::EngineConfig;
use crate::expression::Expression;
use crate::frame::StackFrame;
use crate::program::ProgramInfo;
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;
use tomari_target::ExpressionBackend;
use tracing::{debug, error};

/// 期限付き評価の実行枠
struct TimedSlots {
    busy: Mutex<usize>,
    cond: Condvar,
    capacity: usize,
}

impl TimedSlots {
    fn new(capacity: usize) -> Self {
        Self {
            busy: Mutex::new(0),
            cond: Condvar::new(),
            capacity,
        }
    }

    /// 期限までに空いた枠を確保する。空かなければ None
    fn acquire(self: &Arc<Self>, deadline: Instant) -> Option<TimedSlot> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        while *busy >= self.capacity {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            busy = self
                .cond
                .wait_timeout(busy, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *busy += 1;
        Some(TimedSlot {
            slots: Arc::clone(self),
        })
    }
}

/// 確保した実行枠。破棄時に枠を返す
struct TimedSlot {
    slots: Arc<TimedSlots>,
}

impl Drop for TimedSlot {
    fn drop(&mut self) {
        let mut busy = self.slots.busy.lock().unwrap_or_else(PoisonError::into_inner);
        *busy -= 1;
        self.slots.cond.notify_one();
    }
}

/// 式評価エンジン
pub struct EvalEngine {
    backend: Arc<dyn ExpressionBackend>,
    pool: rayon::ThreadPool,
    timed_pool: rayon::ThreadPool,
    timed_slots: Arc<TimedSlots>,
    broadcaster: Arc<CompletionBroadcaster>,
    config: EngineConfig,
    next_request: AtomicU64,
}

impl EvalEngine {
    /// 新しい評価エンジンを作成する
    pub fn new(
        program: ProgramInfo,
        backend: Arc<dyn ExpressionBackend>,
        config: EngineConfig,
    ) -> Result<Arc<Self>> {
        let workers = config.worker_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tomari-eval-{}", i))
            .panic_handler(|_| error!("evaluation worker panicked outside of a request"))
            .build()?;
        let timed_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tomari-eval-timed-{}", i))
            .panic_handler(|_| error!("timed evaluation worker panicked"))
            .build()?;
        debug!(workers, "evaluation pools started");

        Ok(Arc::new(Self {
            backend,
            pool,
            timed_pool,
            timed_slots: Arc::new(TimedSlots::new(workers)),
            broadcaster: Arc::new(CompletionBroadcaster::new(program)),
            config,
            next_request: AtomicU64::new(1),
        }))
    }

    /// フレームに束縛された式を作成する
    pub fn parse_expression(
        self: &Arc<Self>,
        frame: &StackFrame,
        text: impl Into<String>,
        radix: u32,
    ) -> Expression {
        Expression::new(Arc::clone(self), frame.clone(), text, radix)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn backend(&self) -> &Arc<dyn ExpressionBackend> {
        &self.backend
    }

    pub(crate) fn broadcaster(&self) -> &Arc<CompletionBroadcaster> {
        &self.broadcaster
    }

    pub(crate) fn next_request_id(&self) -> RequestId {
        RequestId(self.next_request.fetch_add(1, Ordering::SeqCst))
    }

    /// ワーカープールにジョブを投入する
    pub(crate) fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.pool.spawn(job);
    }

    /// 期限付き評価のプールにジョブを投入する
    ///
    /// 実行枠は `deadline` まで待って確保し、ジョブが終わるまで保持します。
    /// 期限までに枠が空かなければジョブを投入せずに false を返します。
    pub(crate) fn spawn_timed(&self, deadline: Instant, job: impl FnOnce() + Send + 'static) -> bool {
        let Some(slot) = self.timed_slots.acquire(deadline) else {
            return false;
        };
        self.timed_pool.spawn(move || {
            let _slot = slot;
            job();
        });
        true
    }
}
