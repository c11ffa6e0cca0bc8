//! REPL コマンド

use tomari_target::ThreadId;

/// REPL コマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// スレッド一覧表示
    Threads,
    /// スレッドを追加（デバッガからの新規スレッド通知を模擬）
    AddThread { tid: ThreadId, name: Option<String> },
    /// スレッド終了を模擬
    ExitThread(ThreadId),
    /// デバッグ対象を停止
    Stop,
    /// デバッグ対象を実行継続
    Continue,
    /// スレッドをサスペンド
    Suspend(ThreadId),
    /// スレッドを再開
    Resume(ThreadId),
    /// バックトレース表示
    Backtrace(ThreadId),
    /// スレッドのプロパティ表示
    Properties(ThreadId),
    /// スレッドの名前を設定
    Rename { tid: ThreadId, name: String },
    /// 表示の基数を設定
    Radix(u32),
    /// フレームに対して式を同期評価
    Eval { tid: ThreadId, frame: usize, text: String },
    /// フレームに対して式を非同期評価
    EvalAsync { tid: ThreadId, frame: usize, text: String },
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        let tid = |idx: usize| parts.get(idx).and_then(|s| s.parse::<ThreadId>().ok());

        match parts[0] {
            "threads" | "info" => Some(Command::Threads),
            "thread" => match parts.get(1).copied() {
                Some("add") => Some(Command::AddThread {
                    tid: tid(2)?,
                    name: (parts.len() > 3).then(|| parts[3..].join(" ")),
                }),
                Some("exit") => Some(Command::ExitThread(tid(2)?)),
                _ => None,
            },
            "stop" => Some(Command::Stop),
            "continue" | "c" => Some(Command::Continue),
            "suspend" => Some(Command::Suspend(tid(1)?)),
            "resume" => Some(Command::Resume(tid(1)?)),
            "backtrace" | "bt" => Some(Command::Backtrace(tid(1)?)),
            "props" | "p" => Some(Command::Properties(tid(1)?)),
            "rename" if parts.len() > 2 => Some(Command::Rename {
                tid: tid(1)?,
                name: parts[2..].join(" "),
            }),
            "radix" => match parts.get(1)?.parse::<u32>().ok()? {
                r @ (10 | 16) => Some(Command::Radix(r)),
                _ => None,
            },
            cmd @ ("eval" | "e" | "eval&" | "e&") if parts.len() > 3 => {
                let tid = tid(1)?;
                let frame = parts[2].parse::<usize>().ok()?;
                let text = parts[3..].join(" ");
                if cmd.ends_with('&') {
                    Some(Command::EvalAsync { tid, frame, text })
                } else {
                    Some(Command::Eval { tid, frame, text })
                }
            }
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("continue"), Some(Command::Continue));
        assert_eq!(Command::parse("c"), Some(Command::Continue));
        assert_eq!(Command::parse("bt 2"), Some(Command::Backtrace(2)));
        assert_eq!(Command::parse("bt"), None);
        assert_eq!(Command::parse("radix 16"), Some(Command::Radix(16)));
        assert_eq!(Command::parse("radix 8"), None);
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
    }

    #[test]
    fn test_parse_thread_management() {
        assert_eq!(
            Command::parse("thread add 4 io worker"),
            Some(Command::AddThread {
                tid: 4,
                name: Some("io worker".to_string())
            })
        );
        assert_eq!(
            Command::parse("thread add 5"),
            Some(Command::AddThread { tid: 5, name: None })
        );
        assert_eq!(Command::parse("thread exit 5"), Some(Command::ExitThread(5)));
    }

    #[test]
    fn test_parse_eval() {
        assert_eq!(
            Command::parse("eval 1 0 a + b"),
            Some(Command::Eval {
                tid: 1,
                frame: 0,
                text: "a + b".to_string()
            })
        );
        assert_eq!(
            Command::parse("e& 2 1 x"),
            Some(Command::EvalAsync {
                tid: 2,
                frame: 1,
                text: "x".to_string()
            })
        );
        assert_eq!(Command::parse("eval 1 0"), None);
    }
}
