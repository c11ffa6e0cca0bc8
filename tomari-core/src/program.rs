//! デバッグ対象プログラムとスレッドの登録簿

use crate::config::EngineConfig;
use crate::thread::Thread;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tomari_target::{StackWalker, ThreadId};
use tracing::{debug, trace};

/// プログラムの識別情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    pub id: u32,
    pub name: String,
}

impl ProgramInfo {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// デバッグ対象プログラム
///
/// デバッガから報告されたスレッドを ID 順に保持します。
pub struct Program {
    info: ProgramInfo,
    walker: Arc<dyn StackWalker>,
    config: EngineConfig,
    threads: RwLock<BTreeMap<ThreadId, Arc<Thread>>>,
}

impl Program {
    pub fn new(info: ProgramInfo, walker: Arc<dyn StackWalker>, config: EngineConfig) -> Self {
        Self {
            info,
            walker,
            config,
            threads: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn info(&self) -> &ProgramInfo {
        &self.info
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 新しいスレッドを登録する
    ///
    /// 同じ ID が既に登録されている場合は既存のスレッドを返します。
    pub fn add_thread(&self, id: ThreadId, name: Option<&str>) -> Arc<Thread> {
        let mut threads = self.threads.write().unwrap_or_else(PoisonError::into_inner);
        let thread = threads.entry(id).or_insert_with(|| {
            debug!(tid = id, "thread created");
            Thread::for_program(
                id,
                name,
                Arc::clone(&self.walker),
                self.config.location_fallback.clone(),
                self.info.clone(),
            )
        });
        Arc::clone(thread)
    }

    /// 終了したスレッドを登録簿から外す
    pub fn remove_thread(&self, id: ThreadId) -> Option<Arc<Thread>> {
        let thread = self
            .threads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)?;
        thread.mark_exited();
        Some(thread)
    }

    pub fn thread(&self, id: ThreadId) -> Option<Arc<Thread>> {
        self.threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// すべてのスレッドを ID 順に列挙する
    pub fn threads(&self) -> Vec<Arc<Thread>> {
        self.threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// デバッグ対象全体の停止・再開通知を各スレッドへ伝える
    pub fn set_running(&self, running: bool) {
        trace!(program = self.info.id, running, "program set_running");
        for thread in self.threads() {
            thread.set_running(running);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tomari_target::SimulatedTarget;

    fn program() -> Program {
        Program::new(
            ProgramInfo::new(1, "demo"),
            Arc::new(SimulatedTarget::new()),
            EngineConfig::default().with_location_fallback("<none>"),
        )
    }

    #[test]
    fn test_thread_registry() {
        let program = program();
        let main = program.add_thread(1, Some("main"));
        program.add_thread(3, None);
        program.add_thread(2, None);

        let ids: Vec<_> = program.threads().iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(Arc::ptr_eq(&main, &program.add_thread(1, Some("other"))));
        assert_eq!(main.location(), "<none>");
        assert_eq!(main.program(), Some(&ProgramInfo::new(1, "demo")));

        let removed = program.remove_thread(2).unwrap();
        assert!(removed.has_exited());
        assert!(program.thread(2).is_none());
    }

    #[test]
    fn test_set_running_reaches_every_thread() {
        let program = program();
        program.add_thread(1, None);
        program.add_thread(2, None);

        program.set_running(false);
        assert!(program.threads().iter().all(|t| !t.is_running()));
        assert!(program.threads().iter().all(|t| t.suspend_count() == 1));
    }
}
