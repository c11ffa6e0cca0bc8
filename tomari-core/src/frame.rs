//! スタックフレーム
//!
//! [`StackFrame`] はスレッドが所有するフレームキャッシュへのハンドルです。
//! ハンドル自体はフレームのデータを持たず、スレッドへの弱参照と
//! キャッシュの世代番号、キャッシュ内のインデックスだけを保持します。
//! スレッドがキャッシュを無効化すると世代番号が進み、
//! それ以前に発行されたハンドルへの問い合わせはすべて失敗します。

use crate::errors::{ThreadError, ThreadResult};
use crate::thread::Thread;
use rustc_demangle::demangle;
use std::fmt;
use std::sync::{Arc, Weak};
use tomari_target::{format_integer, NativeFrame, ThreadId};

/// フレーム情報のうち、呼び出し側が要求するフィールド
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfoFields {
    pub function_name: bool,
    /// 関数名に `(name=value, ...)` 形式の引数を付加する
    pub function_args: bool,
    pub module: bool,
    pub address: bool,
    pub language: bool,
    pub stale_code: bool,
    pub frame_valid: bool,
}

impl FrameInfoFields {
    /// すべてのフィールドを要求する
    pub fn all() -> Self {
        Self {
            function_name: true,
            function_args: true,
            module: true,
            address: true,
            language: true,
            stale_code: true,
            frame_valid: true,
        }
    }

    /// 関数名のみを要求する
    pub fn function_name() -> Self {
        Self {
            function_name: true,
            ..Default::default()
        }
    }
}

/// フレーム情報
///
/// 要求されなかったフィールドは `None` のままです。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub function_name: Option<String>,
    pub module: Option<String>,
    pub address: Option<u64>,
    pub language: Option<String>,
    pub stale_code: Option<bool>,
    pub frame_valid: Option<bool>,
}

impl FrameInfo {
    /// ネイティブフレームから要求されたフィールドだけを埋める
    pub(crate) fn from_native(native: &NativeFrame, fields: FrameInfoFields, radix: u32) -> Self {
        let mut info = FrameInfo::default();

        if fields.function_name {
            let mut name = native
                .function
                .as_deref()
                .map(|sym| format!("{:#}", demangle(sym)))
                .unwrap_or_default();

            if fields.function_args && !name.is_empty() {
                let args: Vec<String> = native
                    .args
                    .iter()
                    .map(|arg| format!("{}={}", arg.name, format_integer(arg.value, radix)))
                    .collect();
                name = format!("{}({})", name, args.join(", "));
            }
            info.function_name = Some(name);
        }
        if fields.module {
            info.module = Some(native.module.clone().unwrap_or_default());
        }
        if fields.address {
            info.address = Some(native.pc);
        }
        if fields.language {
            info.language = native.language.clone();
        }
        if fields.stale_code {
            info.stale_code = Some(false);
        }
        if fields.frame_valid {
            info.frame_valid = Some(true);
        }

        info
    }
}

/// スレッドのフレームキャッシュ内の 1 フレームを指すハンドル
#[derive(Clone)]
pub struct StackFrame {
    thread: Weak<Thread>,
    thread_id: ThreadId,
    generation: u64,
    index: usize,
}

impl StackFrame {
    pub(crate) fn new(thread: Weak<Thread>, thread_id: ThreadId, generation: u64, index: usize) -> Self {
        Self {
            thread,
            thread_id,
            generation,
            index,
        }
    }

    /// 所有スレッドのID
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// スタック内の位置（0 が最内フレーム）
    pub fn index(&self) -> usize {
        self.index
    }

    /// 発行時のキャッシュ世代
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 所有スレッドを取得する（終了済みなら None）
    pub fn thread(&self) -> Option<Arc<Thread>> {
        self.thread.upgrade()
    }

    /// ハンドルがまだ有効か
    pub fn is_valid(&self) -> bool {
        self.snapshot().is_ok()
    }

    /// フレームのデータを複製して取得する
    ///
    /// 無効化済みのハンドルに対しては [`ThreadError::StaleFrame`] を返します。
    pub fn snapshot(&self) -> ThreadResult<NativeFrame> {
        let thread = self.thread.upgrade().ok_or(ThreadError::ThreadExited)?;
        thread.frame_snapshot(self.generation, self.index)
    }

    /// 要求されたフィールドを埋めたフレーム情報を取得する
    pub fn info(&self, fields: FrameInfoFields, radix: u32) -> ThreadResult<FrameInfo> {
        let native = self.snapshot()?;
        Ok(FrameInfo::from_native(&native, fields, radix))
    }
}

impl PartialEq for StackFrame {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.thread, &other.thread)
            && self.generation == other.generation
            && self.index == other.index
    }
}

impl Eq for StackFrame {}

impl fmt::Debug for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFrame")
            .field("thread_id", &self.thread_id)
            .field("generation", &self.generation)
            .field("index", &self.index)
            .finish()
    }
}
