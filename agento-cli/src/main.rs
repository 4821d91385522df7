//! Agento CLI binary (§6 "CLI surface"): `web` runs the HTTP server and scheduler, `ask` drives
//! one turn to completion without starting the server, `update` self-updates the binary.
//!
//! Grounded on the teacher's `cli/src/main.rs` shape: `clap::Parser` entry point, config loaded
//! and applied before any service is constructed, subcommands dispatched before building the
//! shared run backend.

mod logging;
mod startup;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "agento")]
#[command(about = "Agento — locally hosted agent orchestration")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server and scheduler until interrupted.
    Web(WebArgs),
    /// One-shot question, optionally continuing an existing session.
    Ask(AskArgs),
    /// Self-update this binary to the latest released version.
    Update,
}

#[derive(clap::Args, Debug)]
struct WebArgs {
    /// Listen port (default 8080).
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
    /// Do not open a browser tab once the server is listening.
    #[arg(long)]
    no_browser: bool,
}

#[derive(clap::Args, Debug)]
struct AskArgs {
    /// The question to ask.
    question: String,
    /// Existing chat session id to continue; a new direct-chat session is created when omitted.
    session_id: Option<Uuid>,
}

#[tokio::main]
async fn main() {
    logging::init();
    let args = Args::parse();

    let code = match args.cmd {
        Command::Web(web_args) => run_web(web_args).await,
        Command::Ask(ask_args) => run_ask(ask_args).await,
        Command::Update => run_update(),
    };
    std::process::exit(code);
}

async fn run_web(args: WebArgs) -> i32 {
    let app = match startup::bootstrap().await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("agento: failed to start: {e}");
            return 1;
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let scheduler_rx = shutdown_rx.clone();
    let scheduler = std::sync::Arc::clone(&app.scheduler);
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_rx).await });

    let state = agento_server::AppState {
        repos: app.repos,
        chat: app.chat,
        integrations: app.integrations,
        settings: app.settings,
        events: app.events,
        scheduler: app.scheduler,
        answers: agento_server::AnswerRegistry::new(),
    };

    let addr = args.port.map(|p| format!("127.0.0.1:{p}"));
    let listener = match tokio::net::TcpListener::bind(addr.as_deref().unwrap_or("127.0.0.1:8080")).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("agento: failed to bind: {e}");
            return 1;
        }
    };
    let bound_addr = listener.local_addr().expect("bound listener has a local address");

    if !args.no_browser {
        let url = format!("http://{bound_addr}");
        if let Err(e) = webbrowser::open(&url) {
            tracing::warn!("failed to open browser: {e}");
        }
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let result = agento_server::run_serve_on_listener(listener, state, shutdown_rx).await;
    let _ = scheduler_task.await;

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("agento: server error: {e}");
            1
        }
    }
}

async fn run_ask(args: AskArgs) -> i32 {
    let app = match startup::bootstrap().await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("agento: failed to start: {e}");
            return 1;
        }
    };

    let session_id = match args.session_id {
        Some(id) => id,
        None => match app.chat.create_session(None, None, None, None).await {
            Ok(session) => session.id,
            Err(e) => {
                eprintln!("agento: failed to create session: {e}");
                return 1;
            }
        },
    };

    let (mut session, chat_run_handle) = match app.chat.begin_message(session_id, args.question).await {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("agento: {e}");
            return 1;
        }
    };

    // Move only `handle` out; `chat_run_handle`'s lock guard (the remaining field) stays held
    // until this function returns, after the run has fully completed.
    let drive_result = app.chat.orchestrator().drive_to_completion(&mut session, chat_run_handle.handle).await;

    if let Err(e) = drive_result {
        eprintln!("agento: {e}");
        return 1;
    }

    match app.chat.get_session_with_history(session_id).await {
        Ok((_, messages)) => {
            if let Some(reply) = messages.iter().rev().find(|m| m.role == agento_core::model::ChatRole::Assistant) {
                println!("{}", reply.content);
            }
            println!("session-id: {session_id}");
            0
        }
        Err(e) => {
            eprintln!("agento: failed to read reply: {e}");
            1
        }
    }
}

fn run_update() -> i32 {
    let result = self_update::backends::github::Update::configure()
        .repo_owner("agento-dev")
        .repo_name("agento")
        .bin_name("agento")
        .show_download_progress(true)
        .current_version(env!("CARGO_PKG_VERSION"))
        .build()
        .and_then(|updater| updater.update());

    match result {
        Ok(status) => {
            println!("agento: {}", status.version());
            0
        }
        Err(e) => {
            eprintln!("agento: update failed: {e}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_positional_question_only() {
        let args = Args::parse_from(["agento", "ask", "what time is it?"]);
        match args.cmd {
            Command::Ask(a) => {
                assert_eq!(a.question, "what time is it?");
                assert!(a.session_id.is_none());
            }
            _ => panic!("expected Ask"),
        }
    }

    #[test]
    fn parses_ask_with_session_id() {
        let id = Uuid::new_v4();
        let args = Args::parse_from(["agento", "ask", "continue this", &id.to_string()]);
        match args.cmd {
            Command::Ask(a) => assert_eq!(a.session_id, Some(id)),
            _ => panic!("expected Ask"),
        }
    }

    #[test]
    fn parses_web_flags() {
        let args = Args::parse_from(["agento", "web", "--port", "9090", "--no-browser"]);
        match args.cmd {
            Command::Web(w) => {
                assert_eq!(w.port, Some(9090));
                assert!(w.no_browser);
            }
            _ => panic!("expected Web"),
        }
    }

    #[test]
    fn web_defaults_to_no_port_and_browser_enabled() {
        let args = Args::parse_from(["agento", "web"]);
        match args.cmd {
            Command::Web(w) => {
                assert!(w.port.is_none());
                assert!(!w.no_browser);
            }
            _ => panic!("expected Web"),
        }
    }

    #[test]
    fn parses_update() {
        let args = Args::parse_from(["agento", "update"]);
        assert!(matches!(args.cmd, Command::Update));
    }
}
