//! Tomari CLI - コマンドラインインターフェース
//!
//! 模擬デバッグ対象に対してスレッド状態の管理と式評価を試す REPL

use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tomari_core::{
    completion_channel, Command, CompletionEvent, CompletionListener, EngineConfig, EvalEngine,
    EvalFlags, ExtendedPropertyFields, FrameInfoFields, NativeFrame, Program, ProgramInfo, Thread,
    ThreadId,
};
use tomari_target::SimulatedTarget;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tomari - debuggee thread state explorer
#[derive(Parser)]
#[command(name = "tomari")]
#[command(version = "0.1.0")]
#[command(about = "Explore thread execution state, frame caches and expression evaluation", long_about = None)]
struct Cli {
    /// Number of asynchronous evaluation workers
    #[arg(short, long, default_value_t = tomari_core::config::DEFAULT_WORKER_THREADS)]
    workers: usize,

    /// Timeout for asynchronous evaluations in milliseconds
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Location shown for threads without named frames
    #[arg(long, default_value = tomari_core::config::DEFAULT_LOCATION_FALLBACK)]
    location_fallback: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// REPL の状態
struct Session {
    program: Program,
    engine: Arc<EvalEngine>,
    target: Arc<SimulatedTarget>,
    listener: Arc<dyn CompletionListener>,
    completions: Receiver<CompletionEvent>,
    radix: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    println!("Tomari - debuggee thread state explorer");
    println!("Version 0.1.0");
    println!();

    let mut session = init_session(&cli)?;
    run_repl(&mut session)?;

    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 模擬デバッグ対象とエンジンを初期化する
fn init_session(cli: &Cli) -> Result<Session> {
    let config = EngineConfig::default()
        .with_worker_threads(cli.workers)
        .with_async_timeout(cli.timeout_ms.map(Duration::from_millis))
        .with_location_fallback(cli.location_fallback.clone());

    let target = Arc::new(SimulatedTarget::new());
    target.set_stack(
        1,
        vec![
            NativeFrame::new(0x5555_5555_9a10)
                .with_function("_ZN4demo7compute17h5d1c3a9f0e2b4c6dE")
                .with_module("demo")
                .with_language("Rust")
                .with_arg("n", 12)
                .with_local("acc", 144),
            NativeFrame::new(0x5555_5555_9b80)
                .with_function("_ZN4demo4main17h0f1e2d3c4b5a6978E")
                .with_module("demo")
                .with_language("Rust")
                .with_local("limit", 255),
        ],
    );
    target.set_stack(
        2,
        vec![
            NativeFrame::new(0x7fff_f7d1_2a3d).with_module("libc.so.6"),
            NativeFrame::new(0x5555_5555_a010)
                .with_function("_ZN4demo6worker17h1a2b3c4d5e6f7081E")
                .with_module("demo")
                .with_language("Rust")
                .with_arg("id", 2),
        ],
    );

    let program = Program::new(ProgramInfo::new(1, "demo"), target.clone(), config.clone());
    program.add_thread(1, Some("main"));
    program.add_thread(2, None);

    let engine = EvalEngine::new(program.info().clone(), target.clone(), config)?;
    let (listener, completions) = completion_channel();
    info!(workers = cli.workers, timeout_ms = ?cli.timeout_ms, "session started");

    println!("Simulated program '{}' with {} threads", program.info().name, program.threads().len());
    println!("The program is running; use 'stop' to break in.");
    println!();

    Ok(Session {
        program,
        engine,
        target,
        listener,
        completions,
        radix: 10,
    })
}

/// REPLループを実行する
fn run_repl(session: &mut Session) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        drain_completions(session);

        let readline = rl.readline("(tomari) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match Command::parse(line) {
                    Some(Command::Quit) => {
                        println!("Goodbye!");
                        break;
                    }
                    Some(command) => {
                        if let Err(e) = handle_command(session, command) {
                            eprintln!("Error: {}", e);
                        }
                    }
                    None => {
                        println!("Unknown command: {}", line);
                        println!("Type 'help' for available commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Help => print_help(),
        Command::Quit => {}
        Command::Threads => print_threads(session),
        Command::AddThread { tid, name } => {
            let thread = session.program.add_thread(tid, name.as_deref());
            session
                .target
                .set_stack(tid, vec![NativeFrame::new(0x5555_5555_c000).with_function("thread_start")]);
            println!("Thread {} '{}' created", thread.id(), thread.name());
        }
        Command::ExitThread(tid) => match session.program.remove_thread(tid) {
            Some(thread) => println!("Thread {} '{}' exited", tid, thread.name()),
            None => println!("No thread {}", tid),
        },
        Command::Stop => {
            session.program.set_running(false);
            println!("Program stopped");
        }
        Command::Continue => {
            session.program.set_running(true);
            println!("Continuing execution...");
        }
        Command::Suspend(tid) => {
            let count = require_thread(session, tid)?.suspend();
            println!("Thread {} suspend count: {}", tid, count);
        }
        Command::Resume(tid) => {
            let count = require_thread(session, tid)?.resume()?;
            println!("Thread {} suspend count: {}", tid, count);
        }
        Command::Backtrace(tid) => handle_backtrace(session, tid)?,
        Command::Properties(tid) => handle_properties(session, tid)?,
        Command::Rename { tid, name } => {
            require_thread(session, tid)?.set_display_name(name.clone());
            println!("Thread {} display name set to '{}'", tid, name);
        }
        Command::Radix(radix) => {
            session.radix = radix;
            println!("Radix set to {}", radix);
        }
        Command::Eval { tid, frame, text } => {
            let thread = require_thread(session, tid)?;
            let frame = thread
                .frames()?
                .into_iter()
                .nth(frame)
                .ok_or_else(|| anyhow::anyhow!("No frame #{} in thread {}", frame, tid))?;
            let expr = session.engine.parse_expression(&frame, text, session.radix);
            let property = expr.evaluate_sync(EvalFlags::default(), None)?;
            println!("{} = {}", property.name, property.value);
        }
        Command::EvalAsync { tid, frame, text } => {
            let thread = require_thread(session, tid)?;
            let frame = thread
                .frames()?
                .into_iter()
                .nth(frame)
                .ok_or_else(|| anyhow::anyhow!("No frame #{} in thread {}", frame, tid))?;
            let expr = session.engine.parse_expression(&frame, text, session.radix);
            let request = expr.evaluate_async(EvalFlags::default(), Arc::clone(&session.listener))?;
            println!("Evaluation {} queued", request);
        }
    }

    Ok(())
}

fn require_thread(session: &Session, tid: ThreadId) -> Result<Arc<Thread>> {
    session
        .program
        .thread(tid)
        .ok_or_else(|| anyhow::anyhow!("No thread {}", tid))
}

fn print_threads(session: &Session) {
    for thread in session.program.threads() {
        println!(
            "  {:>3}  {:<12} {:?} (suspend count {})",
            thread.id(),
            thread.display_name(),
            thread.state(),
            thread.suspend_count()
        );
    }
}

/// Backtraceコマンドを処理する
fn handle_backtrace(session: &Session, tid: ThreadId) -> Result<()> {
    let thread = require_thread(session, tid)?;
    let frames = thread.enumerate_frames(FrameInfoFields::all(), session.radix)?;

    if frames.is_empty() {
        println!("No frames");
        return Ok(());
    }

    for (i, info) in frames.iter().enumerate() {
        let name = info.function_name.as_deref().filter(|n| !n.is_empty()).unwrap_or("??");
        println!(
            "  #{} 0x{:016x} in {} ({})",
            i,
            info.address.unwrap_or_default(),
            name,
            info.module.as_deref().unwrap_or("?")
        );
    }
    Ok(())
}

/// Propertiesコマンドを処理する
fn handle_properties(session: &Session, tid: ThreadId) -> Result<()> {
    let thread = require_thread(session, tid)?;
    let props = thread.properties100(ExtendedPropertyFields::all());

    println!("Thread {}", tid);
    println!("  name:          {}", props.base.name.unwrap_or_default());
    println!("  display name:  {}", props.display_name.unwrap_or_default());
    println!("  state:         {:?}", props.base.state);
    println!("  suspend count: {}", props.base.suspend_count.unwrap_or_default());
    println!("  location:      {}", props.base.location.unwrap_or_default());
    println!("  priority:      {}", props.base.priority.unwrap_or_default());
    println!("  category:      {:?}", props.category);
    println!("  flags:         0x{:x}", props.flags.unwrap_or_default());
    Ok(())
}

/// 届いている完了通知をすべて表示する
fn drain_completions(session: &Session) {
    for event in session.completions.try_iter() {
        match event.result {
            Ok(property) => println!(
                "[{} thread {}] {} = {}",
                event.request, event.thread, property.name, property.value
            ),
            Err(e) => println!(
                "[{} thread {}] {}: {}",
                event.request,
                event.thread,
                event.expression.text(),
                e
            ),
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help                     - Show this help message");
    println!("  quit/exit/q              - Exit");
    println!();
    println!("Execution commands:");
    println!("  stop                     - Stop the program (invalidates frames)");
    println!("  continue (c)             - Resume the program (invalidates frames)");
    println!("  suspend <tid>            - Freeze a thread");
    println!("  resume <tid>             - Thaw a thread");
    println!();
    println!("Thread commands:");
    println!("  threads                  - List threads");
    println!("  thread add <tid> [name]  - Report a new thread");
    println!("  thread exit <tid>        - Report a thread exit");
    println!("  bt <tid>                 - Show the thread's stack frames");
    println!("  props <tid>              - Show thread properties");
    println!("  rename <tid> <name>      - Set the thread display name");
    println!();
    println!("Evaluation commands:");
    println!("  radix <10|16>            - Set the display radix");
    println!("  eval <tid> <frame> <expr>   - Evaluate synchronously");
    println!("  eval& <tid> <frame> <expr>  - Evaluate on a worker");
    println!();
    println!("Examples:");
    println!("  stop");
    println!("  bt 1");
    println!("  eval 1 0 n * acc");
    println!("  eval& 1 1 limit");
}
