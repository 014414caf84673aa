//! MedLit - 医学文献问答 CLI
//!
//! 入口：初始化日志、加载配置、装配 Agent，然后逐行读取 stdin 作为问题。
//! 回复写 stdout，过程事件与日志写 stderr；查询进行中按 Ctrl+C 取消当前查询，空闲时按 Ctrl+C 或输入 exit 退出。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use medlit::agent::{create_agent_components, process_message};
use medlit::config::load_config;
use medlit::core::{AgentError, SessionSupervisor};
use medlit::memory::{ConversationPersistence, Session};
use medlit::observability;
use medlit::react::ReactEvent;

#[derive(Parser, Debug)]
#[command(name = "medlit")]
#[command(about = "Answer medical research questions with PubMed tools")]
struct Args {
    /// Extra config file layered over config/default.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resume (or create) the session with this id; requires [app].session_dir to persist
    #[arg(long)]
    session: Option<String>,

    /// Only print final answers
    #[arg(long, short)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    observability::init(args.quiet);

    let cfg = load_config(args.config.clone()).context("Failed to load config")?;
    let components = create_agent_components(&cfg).context("Failed to create agent")?;

    let persistence = cfg.app.session_dir.as_ref().map(ConversationPersistence::new);
    let mut session = open_session(persistence.as_ref(), args.session.as_deref())?;
    tracing::info!(session = %session.id(), messages = session.messages().len(), "session ready");

    let supervisor = SessionSupervisor::new();
    let name = cfg.app.name.as_deref().unwrap_or("medlit");
    eprintln!("{name}: ask a research question (exit to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit_command(input) {
            break;
        }

        let cancel_token = supervisor.begin_query();
        let watcher = {
            let token = cancel_token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            })
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let printer = (!args.quiet).then(|| tokio::spawn(print_events(event_rx)));

        let result = process_message(
            &components,
            &mut session,
            input,
            cancel_token,
            Some(&event_tx),
        )
        .await;
        watcher.abort();
        drop(event_tx);
        if let Some(printer) = printer {
            let _ = printer.await;
        }

        match result {
            Ok(r) => println!("{}", r.response),
            Err(e) => eprintln!("{}", error_line(&e)),
        }

        if let Some(p) = persistence.as_ref() {
            if let Err(e) = p.save(&session) {
                tracing::warn!(error = %e, "failed to save session");
            }
        }
    }

    supervisor.shutdown();
    Ok(())
}

/// exit / quit（忽略大小写与首尾空白）结束会话
fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// 查询失败时打印的一行；打印后回到提示符
fn error_line(e: &AgentError) -> String {
    match e {
        AgentError::Cancelled => "[cancelled]".to_string(),
        e => format!("error [{}]: {}", e.kind(), e),
    }
}

/// 按 id 恢复已保存的会话；不存在则新建
fn open_session(
    persistence: Option<&ConversationPersistence>,
    id: Option<&str>,
) -> anyhow::Result<Session> {
    let Some(id) = id else {
        return Ok(Session::new());
    };
    if let Some(p) = persistence {
        if let Some(session) = p
            .load(id)
            .with_context(|| format!("Failed to load session {id}"))?
        {
            return Ok(session);
        }
    } else {
        tracing::warn!("--session given but [app].session_dir is not set; session will not be saved");
    }
    Ok(Session::with_id(id))
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<ReactEvent>) {
    while let Some(ev) = rx.recv().await {
        match ev {
            ReactEvent::StepUpdate { step, max_steps } => match max_steps {
                Some(max) => eprintln!("[step {step}/{max}]"),
                None => eprintln!("[step {step}]"),
            },
            ReactEvent::Thinking => eprintln!("  thinking..."),
            ReactEvent::AssistantText { text } => eprintln!("  {text}"),
            ReactEvent::ToolCall { tool, args, .. } => eprintln!("  -> {tool}({args})"),
            ReactEvent::Observation { tool, preview, .. } => eprintln!("  <- {tool}: {preview}"),
            ReactEvent::ToolFailure { tool, reason } => eprintln!("  !! {tool} failed: {reason}"),
            ReactEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens,
                cumulative_total,
            } => {
                if total_tokens > 0 {
                    eprintln!(
                        "[tokens: {prompt_tokens} prompt + {completion_tokens} completion = {total_tokens}, session {cumulative_total}]"
                    );
                }
            }
            ReactEvent::MessageDone | ReactEvent::Cancelled | ReactEvent::Error { .. } => {}
        }
    }
}
