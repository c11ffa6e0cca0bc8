//! スレッドのプロパティ問い合わせ
//!
//! 呼び出し側が要求したフィールドだけを計算します。ロケーションは
//! スタックウォークを伴うため、要求された場合にのみ求めます。

use crate::thread::{Thread, ThreadState};
use tomari_target::ThreadId;
use tracing::trace;

/// 優先度の表示値（取得手段が無いため固定）
pub const UNKNOWN_PRIORITY: &str = "<unknown priority>";

/// 基本プロパティのうち要求するフィールド
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadPropertyFields {
    pub id: bool,
    pub suspend_count: bool,
    pub state: bool,
    pub priority: bool,
    pub name: bool,
    pub location: bool,
}

impl ThreadPropertyFields {
    pub fn all() -> Self {
        Self {
            id: true,
            suspend_count: true,
            state: true,
            priority: true,
            name: true,
            location: true,
        }
    }

    pub fn id() -> Self {
        Self {
            id: true,
            ..Default::default()
        }
    }

    pub fn location() -> Self {
        Self {
            location: true,
            ..Default::default()
        }
    }
}

/// 基本プロパティ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadProperties {
    pub id: Option<ThreadId>,
    pub suspend_count: Option<u32>,
    pub state: Option<ThreadState>,
    pub priority: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
}

/// 拡張プロパティのうち要求するフィールド
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedPropertyFields {
    pub display_name: bool,
    pub category: bool,
    pub affinity: bool,
    pub priority_id: bool,
    pub flags: bool,
}

impl ExtendedPropertyFields {
    pub fn all() -> Self {
        Self {
            display_name: true,
            category: true,
            affinity: true,
            priority_id: true,
            flags: true,
        }
    }
}

/// スレッドの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadCategory {
    Worker,
    Main,
}

/// 表示名の優先度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayNamePriority {
    Default,
}

/// 拡張プロパティ（基本プロパティを常にすべて含む）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadProperties100 {
    pub base: ThreadProperties,
    pub display_name: Option<String>,
    pub display_name_priority: Option<DisplayNamePriority>,
    pub category: Option<ThreadCategory>,
    pub affinity: Option<u64>,
    pub priority_id: Option<i32>,
    pub flags: Option<u32>,
}

impl Thread {
    /// スレッドの種別。ID 1 をメインスレッドとみなす
    pub fn category(&self) -> ThreadCategory {
        if self.id() == 1 {
            ThreadCategory::Main
        } else {
            ThreadCategory::Worker
        }
    }

    /// 要求されたフィールドだけを埋めたプロパティを取得する
    pub fn properties(&self, fields: ThreadPropertyFields) -> ThreadProperties {
        trace!(tid = self.id(), ?fields, "properties");
        let mut props = ThreadProperties::default();

        if fields.id {
            props.id = Some(self.id());
        }
        if fields.suspend_count {
            props.suspend_count = Some(self.suspend_count());
        }
        if fields.state {
            props.state = Some(self.state());
        }
        if fields.priority {
            props.priority = Some(UNKNOWN_PRIORITY.to_string());
        }
        if fields.name {
            props.name = Some(self.name());
        }
        if fields.location {
            props.location = Some(self.location());
        }

        props
    }

    /// 拡張プロパティを取得する
    ///
    /// 基本フィールドは要求に関わらずすべて埋め、その上に要求された
    /// 拡張フィールドを重ねます。
    pub fn properties100(&self, fields: ExtendedPropertyFields) -> ThreadProperties100 {
        let mut props = ThreadProperties100 {
            base: self.properties(ThreadPropertyFields::all()),
            ..Default::default()
        };

        if fields.display_name {
            props.display_name = Some(self.display_name());
            props.display_name_priority = Some(DisplayNamePriority::Default);
        }
        if fields.category {
            props.category = Some(self.category());
        }
        if fields.affinity {
            props.affinity = Some(0);
        }
        if fields.priority_id {
            props.priority_id = Some(0);
        }
        if fields.flags {
            props.flags = Some(self.flags());
        }

        props
    }
}
