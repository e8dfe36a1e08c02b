use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chatrelay_appcore::ChatService;
use chatrelay_core::config::{ConfigOverrides, WidgetConfig};
use chatrelay_engine::renderer::DisplayEvent;
use chatrelay_engine::session::{AudioOutcome, FileOutcome};
use chatrelay_runtime::config_store::ConfigStore;
use chatrelay_runtime::files::LocalFile;
use chatrelay_runtime::init::{HostInit, resolve};
use chatrelay_runtime::transport::{ReqwestTransport, SharedNetworkStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: chatrelay-cli [--config <path>] [--query <querystring>]";

struct Args {
    config: Option<PathBuf>,
    query: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        query: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--config" => {
                args.config = Some(it.next().context("--config needs a path")?.into());
            }
            "--query" => {
                args.query = Some(it.next().context("--query needs a value")?);
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => return Err(anyhow!("unknown argument: {other}\n{USAGE}")),
        }
    }
    Ok(args)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_overrides() -> ConfigOverrides {
    let supabase_url = env_opt("SUPABASE_URL");
    ConfigOverrides {
        is_use_supabase: supabase_url.as_ref().map(|_| true),
        supabase_url,
        supabase_key: env_opt("SUPABASE_KEY"),
        webhook_url: env_opt("CHAT_WEBHOOK_URL"),
        table_name: env_opt("CHAT_TABLE"),
        chat_title: env_opt("CHAT_TITLE"),
        ..Default::default()
    }
}

fn print_event(ev: DisplayEvent) {
    match ev {
        DisplayEvent::Appended { unit, .. } => {
            let m = &unit.message;
            if m.is_typing() {
                println!("  ...");
            } else {
                println!("[{}] {}: {}", m.timestamp, m.role.as_str(), m.summary);
            }
        }
        DisplayEvent::Removed(_) => {}
        DisplayEvent::Cleared => println!("-- cleared --"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;

    let base = match &args.config {
        Some(p) => ConfigStore::at_path(p).load_or_default()?,
        None => WidgetConfig::default(),
    };

    let mut channels = vec![HostInit::Direct(env_overrides())];
    if let Some(q) = args.query {
        channels.push(HostInit::Query(q));
    }
    let cfg = resolve(&base, &channels)?;

    let svc = ChatService::start_with_default_microphone(
        cfg,
        Arc::new(ReqwestTransport::default()),
        Arc::new(SharedNetworkStatus::default()),
    )
    .await?;

    println!("== {} ({}) ==", svc.title(), svc.session());
    println!("commands: /image <path>, /record, /quit");

    for unit in svc.renderer().snapshot() {
        let m = &unit.message;
        println!("[{}] {}: {}", m.timestamp, m.role.as_str(), m.summary);
    }

    let mut events = svc.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => print_event(ev),
                Err(RecvError::Lagged(n)) => log::warn!("display lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        }

        if line == "/record" {
            match svc.toggle_recording().await {
                AudioOutcome::Started => println!("recording... /record again to send"),
                AudioOutcome::Disabled => println!("audio recording is disabled"),
                other => log::debug!("record: {other:?}"),
            }
            continue;
        }

        if let Some(path) = line.strip_prefix("/image ") {
            let file = match LocalFile::open(path.trim()).await {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("cannot open file: {e:#}");
                    continue;
                }
            };
            match svc.upload_file(&file).await {
                FileOutcome::Disabled => println!("file upload is disabled"),
                FileOutcome::Busy => println!("still sending the previous file"),
                other => log::debug!("upload: {other:?}"),
            }
            continue;
        }

        svc.send_text(line).await;
    }

    svc.teardown().await;
    printer.abort();
    Ok(())
}
