//! デバッグ対象スレッドの実行状態とフレームキャッシュ
//!
//! 実行フラグ・サスペンドカウントと、遅延構築されるスタックフレームの
//! キャッシュを 1 つのスレッドにまとめて管理します。
//! フレームキャッシュはスレッドごとに 1 つの Mutex で保護され、
//! 実行状態の変化に伴う無効化と、スタックウォーク結果の格納は
//! 同じロックの下で行われます。

use crate::config::DEFAULT_LOCATION_FALLBACK;
use crate::errors::{ThreadError, ThreadResult};
use crate::frame::{FrameInfo, FrameInfoFields, StackFrame};
use crate::program::ProgramInfo;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tomari_target::{NativeFrame, StackWalker, ThreadId};
use tracing::{debug, trace, warn};

/// スレッドの実行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    /// 実行中だがユーザーにより凍結されている
    Suspended,
    Stopped,
}

/// フレームキャッシュ
///
/// `frames` が `None` の間はまだスタックウォークしていない状態です。
#[derive(Default)]
struct FrameCache {
    generation: u64,
    frames: Option<Arc<[NativeFrame]>>,
}

impl FrameCache {
    fn invalidate(&mut self) {
        self.generation += 1;
        self.frames = None;
    }
}

struct ThreadNames {
    name: String,
    display_name: String,
}

/// デバッグ対象のスレッド
pub struct Thread {
    id: ThreadId,
    names: RwLock<ThreadNames>,
    running: AtomicBool,
    exited: AtomicBool,
    suspend_count: AtomicU32,
    flags: AtomicU32,
    cache: Mutex<FrameCache>,
    walker: Arc<dyn StackWalker>,
    location_fallback: String,
    program: Option<ProgramInfo>,
    this: Weak<Thread>,
}

impl Thread {
    /// スレッドを作成する
    ///
    /// 名前が空の場合は `Thread-<id>` を使います。表示名は名前で初期化されます。
    pub fn new(id: ThreadId, name: Option<&str>, walker: Arc<dyn StackWalker>) -> Arc<Self> {
        Self::with_location_fallback(id, name, walker, DEFAULT_LOCATION_FALLBACK)
    }

    /// ロケーションのフォールバック表示を指定してスレッドを作成する
    pub fn with_location_fallback(
        id: ThreadId,
        name: Option<&str>,
        walker: Arc<dyn StackWalker>,
        location_fallback: impl Into<String>,
    ) -> Arc<Self> {
        Self::create(id, name, walker, location_fallback.into(), None)
    }

    /// プログラムに属するスレッドを作成する
    pub(crate) fn for_program(
        id: ThreadId,
        name: Option<&str>,
        walker: Arc<dyn StackWalker>,
        location_fallback: String,
        program: ProgramInfo,
    ) -> Arc<Self> {
        Self::create(id, name, walker, location_fallback, Some(program))
    }

    fn create(
        id: ThreadId,
        name: Option<&str>,
        walker: Arc<dyn StackWalker>,
        location_fallback: String,
        program: Option<ProgramInfo>,
    ) -> Arc<Self> {
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Thread-{}", id),
        };
        Arc::new_cyclic(|this| Self {
            id,
            names: RwLock::new(ThreadNames {
                display_name: name.clone(),
                name,
            }),
            running: AtomicBool::new(true),
            exited: AtomicBool::new(false),
            suspend_count: AtomicU32::new(0),
            flags: AtomicU32::new(0),
            cache: Mutex::new(FrameCache::default()),
            walker,
            location_fallback,
            program,
            this: this.clone(),
        })
    }

    fn lock_cache(&self) -> MutexGuard<'_, FrameCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// 所属するプログラム（登録簿を経由せずに作られた場合は None）
    pub fn program(&self) -> Option<&ProgramInfo> {
        self.program.as_ref()
    }

    pub fn name(&self) -> String {
        self.names.read().unwrap_or_else(PoisonError::into_inner).name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.names.write().unwrap_or_else(PoisonError::into_inner).name = name.into();
    }

    pub fn display_name(&self) -> String {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .display_name
            .clone()
    }

    pub fn set_display_name(&self, name: impl Into<String>) {
        self.names.write().unwrap_or_else(PoisonError::into_inner).display_name = name.into();
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::SeqCst)
    }

    pub fn set_flags(&self, flags: u32) {
        self.flags.store(flags, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    pub fn suspend_count(&self) -> u32 {
        self.suspend_count.load(Ordering::SeqCst)
    }

    /// 実行フラグとサスペンドカウントから導出した状態
    pub fn state(&self) -> ThreadState {
        if !self.is_running() {
            ThreadState::Stopped
        } else if self.suspend_count() > 0 {
            ThreadState::Suspended
        } else {
            ThreadState::Running
        }
    }

    /// デバッグ対象の停止・再開通知を反映する
    ///
    /// 停止時はサスペンドカウントを 1 増やします。どちらの遷移でも
    /// フレームキャッシュは同じロックの下で破棄され、発行済みの
    /// [`StackFrame`] はすべて無効になります。
    pub fn set_running(&self, running: bool) {
        trace!(tid = self.id, running, "set_running");

        let mut cache = self.lock_cache();
        self.running.store(running, Ordering::SeqCst);
        if !running {
            self.suspend_count.fetch_add(1, Ordering::SeqCst);
        }
        cache.invalidate();

        debug!(tid = self.id, generation = cache.generation, "frame cache invalidated");
    }

    /// ユーザー操作によるサスペンド。新しいサスペンドカウントを返す
    pub fn suspend(&self) -> u32 {
        let count = self.suspend_count.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(tid = self.id, count, "suspend");
        count
    }

    /// ユーザー操作による再開。新しいサスペンドカウントを返す
    ///
    /// カウントが 0 の場合は [`ThreadError::NotSuspended`] を返し、
    /// カウントは変更しません。
    pub fn resume(&self) -> ThreadResult<u32> {
        let previous = self
            .suspend_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1))
            .map_err(|_| ThreadError::NotSuspended(self.id))?;

        trace!(tid = self.id, count = previous - 1, "resume");
        Ok(previous - 1)
    }

    /// スレッド終了を反映する。以降フレームは取得できない
    pub fn mark_exited(&self) {
        let mut cache = self.lock_cache();
        self.exited.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        cache.invalidate();
        debug!(tid = self.id, "thread exited");
    }

    /// キャッシュ済みのフレームを取得する。未構築ならスタックウォークする
    ///
    /// ウォーク自体はロックの外で行い、結果を格納する直前に世代を確認します。
    /// ウォーク中に状態が変わった場合は結果を捨て、[`ThreadError::StaleFrame`]
    /// を返します。
    fn cached_frames(&self) -> ThreadResult<(u64, Arc<[NativeFrame]>)> {
        if self.has_exited() {
            return Err(ThreadError::ThreadExited);
        }

        let generation = {
            let cache = self.lock_cache();
            if let Some(frames) = &cache.frames {
                return Ok((cache.generation, Arc::clone(frames)));
            }
            cache.generation
        };

        debug!(tid = self.id, generation, "walking stack");
        let walked = self.walker.walk(self.id);

        let mut cache = self.lock_cache();
        if cache.generation != generation {
            debug!(tid = self.id, "execution state changed during stack walk");
            return Err(ThreadError::StaleFrame);
        }
        if let Some(frames) = &cache.frames {
            return Ok((cache.generation, Arc::clone(frames)));
        }

        let frames: Arc<[NativeFrame]> = walked
            .map_err(|e| {
                warn!(tid = self.id, "stack walk failed: {}", e);
                ThreadError::StackWalk(e.to_string())
            })?
            .into();
        cache.frames = Some(Arc::clone(&frames));

        Ok((generation, frames))
    }

    /// スタックフレームのハンドルを最内フレームから順に取得する
    ///
    /// 停止中に状態変化なく繰り返し呼んだ場合、同じハンドル列を返し、
    /// スタックウォークは最初の 1 回だけ行われます。
    pub fn frames(&self) -> ThreadResult<Vec<StackFrame>> {
        let (generation, frames) = self.cached_frames()?;
        Ok((0..frames.len())
            .map(|index| StackFrame::new(self.this.clone(), self.id, generation, index))
            .collect())
    }

    /// 指定したフィールドを埋めたフレーム情報を列挙する
    pub fn enumerate_frames(&self, fields: FrameInfoFields, radix: u32) -> ThreadResult<Vec<FrameInfo>> {
        trace!(tid = self.id, "enumerate_frames");
        let (_, frames) = self.cached_frames()?;
        Ok(frames
            .iter()
            .map(|native| FrameInfo::from_native(native, fields, radix))
            .collect())
    }

    /// 関数名を持つ最初のフレームの関数名。無ければフォールバック表示
    pub fn location(&self) -> String {
        match self.enumerate_frames(FrameInfoFields::function_name(), 0) {
            Ok(infos) => infos
                .into_iter()
                .filter_map(|info| info.function_name)
                .find(|name| !name.is_empty())
                .unwrap_or_else(|| self.location_fallback.clone()),
            Err(e) => {
                debug!(tid = self.id, "location unavailable: {}", e);
                self.location_fallback.clone()
            }
        }
    }

    pub(crate) fn frame_snapshot(&self, generation: u64, index: usize) -> ThreadResult<NativeFrame> {
        let cache = self.lock_cache();
        if cache.generation != generation {
            return Err(ThreadError::StaleFrame);
        }
        cache
            .frames
            .as_ref()
            .and_then(|frames| frames.get(index))
            .cloned()
            .ok_or(ThreadError::StaleFrame)
    }

    pub fn can_do_func_eval(&self) -> bool {
        true
    }

    pub fn can_set_next_statement(&self, _frame: &StackFrame) -> bool {
        false
    }

    pub fn set_next_statement(&self, _frame: &StackFrame) -> ThreadResult<()> {
        Err(ThreadError::NotImplemented)
    }

    /// 論理スレッドは提供しない
    pub fn logical_thread(&self, _frame: &StackFrame) -> ThreadResult<()> {
        Err(ThreadError::NotImplemented)
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .field("suspend_count", &self.suspend_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tomari_target::SimulatedTarget;

    fn thread_with_stack(target: &Arc<SimulatedTarget>) -> Arc<Thread> {
        target.set_stack(
            7,
            vec![
                NativeFrame::new(0x10),
                NativeFrame::new(0x20).with_function("worker_loop"),
            ],
        );
        Thread::new(7, None, target.clone())
    }

    #[test]
    fn test_default_names() {
        let target = Arc::new(SimulatedTarget::new());
        let thread = Thread::new(3, Some(""), target.clone());
        assert_eq!(thread.name(), "Thread-3");
        assert_eq!(thread.display_name(), "Thread-3");

        thread.set_display_name("renderer");
        assert_eq!(thread.name(), "Thread-3");
        assert_eq!(thread.display_name(), "renderer");

        let named = Thread::new(4, Some("io"), target);
        assert_eq!(named.name(), "io");
    }

    #[test]
    fn test_suspend_resume_counts() {
        let target = Arc::new(SimulatedTarget::new());
        let thread = Thread::new(1, None, target);

        assert_eq!(thread.suspend(), 1);
        assert_eq!(thread.suspend(), 2);
        assert_eq!(thread.resume(), Ok(1));
        assert_eq!(thread.state(), ThreadState::Suspended);
        assert_eq!(thread.resume(), Ok(0));
        assert_eq!(thread.state(), ThreadState::Running);
        assert_eq!(thread.resume(), Err(ThreadError::NotSuspended(1)));
        assert_eq!(thread.suspend_count(), 0);
    }

    #[test]
    fn test_stop_increments_suspend_count() {
        let target = Arc::new(SimulatedTarget::new());
        let thread = Thread::new(1, None, target);

        thread.set_running(false);
        assert_eq!(thread.suspend_count(), 1);
        assert_eq!(thread.state(), ThreadState::Stopped);

        thread.set_running(true);
        assert_eq!(thread.suspend_count(), 1);
        assert_eq!(thread.state(), ThreadState::Suspended);
    }

    #[test]
    fn test_frames_are_cached_until_state_change() {
        let target = Arc::new(SimulatedTarget::new());
        let thread = thread_with_stack(&target);
        thread.set_running(false);

        let first = thread.frames().unwrap();
        let second = thread.frames().unwrap();
        assert_eq!(first, second);
        assert_eq!(target.walk_count(), 1);

        thread.set_running(true);
        assert!(first.iter().all(|f| !f.is_valid()));
        assert_eq!(first[0].snapshot(), Err(ThreadError::StaleFrame));
    }

    #[test]
    fn test_location_skips_unnamed_frames() {
        let target = Arc::new(SimulatedTarget::new());
        let thread = thread_with_stack(&target);
        assert_eq!(thread.location(), "worker_loop");
    }

    #[test]
    fn test_location_fallback_on_walk_failure() {
        let target = Arc::new(SimulatedTarget::new());
        target.fail_walks_for(9);
        let thread = Thread::new(9, None, target);

        assert_eq!(thread.location(), DEFAULT_LOCATION_FALLBACK);
        assert!(matches!(thread.frames(), Err(ThreadError::StackWalk(_))));
    }

    #[test]
    fn test_exited_thread_has_no_frames() {
        let target = Arc::new(SimulatedTarget::new());
        let thread = thread_with_stack(&target);
        let frames = thread.frames().unwrap();

        thread.mark_exited();
        assert_eq!(thread.frames(), Err(ThreadError::ThreadExited));
        assert!(!frames[1].is_valid());
    }

    #[test]
    fn test_next_statement_is_unsupported() {
        let target = Arc::new(SimulatedTarget::new());
        let thread = thread_with_stack(&target);
        let frame = thread.frames().unwrap().remove(0);

        assert!(!thread.can_set_next_statement(&frame));
        assert_eq!(thread.set_next_statement(&frame), Err(ThreadError::NotImplemented));
    }
}
