//! Amity terminal chat client.
//!
//! Connects to the realtime server with a persisted auth blob and drives one
//! conversation from stdin. Messages and status changes go to stdout; logs go
//! to stderr.
//!
//! # Usage
//!
//! ```bash
//! amity --server wss://chat.example/socket --api https://api.example \
//!     --auth ~/.config/amity/auth.json --conversation c1
//! ```
//!
//! Plain lines are sent as messages. Commands: `/open <id>`, `/close`,
//! `/more`, `/reload`, `/typing`, `/attach <path> [caption]`,
//! `/resend <temp-id>`, `/discard <temp-id>`, `/connect`, `/disconnect`,
//! `/quit`.

mod http;
mod input;
mod render;

use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use amity_client::{
    Attachment, AuthSession, ClientConfig, EventKind, Handle, Runtime, Scope, SystemEnv,
    TransportEvent, transport::WsConnector,
};
use amity_core::ConnectionConfig;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    http::HttpRest,
    input::{Input, mime_for},
    render::Renderer,
};

/// Amity chat client
#[derive(Parser, Debug)]
#[command(name = "amity")]
#[command(about = "Terminal client for the Amity realtime chat pipeline")]
#[command(version)]
struct Args {
    /// WebSocket URL of the realtime server
    #[arg(short, long, env = "AMITY_SERVER")]
    server: String,

    /// Base URL of the REST API
    #[arg(short, long, env = "AMITY_API")]
    api: String,

    /// Path to the persisted auth blob (JSON)
    #[arg(long, env = "AMITY_AUTH")]
    auth: PathBuf,

    /// Conversation to open on start
    #[arg(short, long)]
    conversation: Option<String>,

    /// Messages per history page
    #[arg(long, default_value_t = amity_client::DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Failed reconnects tolerated before giving up
    #[arg(long, default_value_t = amity_core::DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    reconnect_attempts: u32,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, default_value = "1000")]
    reconnect_delay_ms: u64,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connection: ConnectionConfig {
                max_reconnect_attempts: self.reconnect_attempts,
                reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            },
            page_size: self.page_size.max(1),
            ..ClientConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("amity=info"));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let session = AuthSession::load(&args.auth)?;
    tracing::info!(user_id = %session.user.id, server = %args.server, "starting");

    let connector = WsConnector::from_session(&args.server, &session);
    let rest = HttpRest::new(&args.api, &session.token)?;
    let (mut runtime, handle) =
        Runtime::new(SystemEnv::new(), session.identity(), args.client_config(), connector, rest);

    runtime.subscribe(Scope::Any, EventKind::ReconnectFailed, log_give_up);
    let driver = tokio::spawn(runtime.run());

    if let Some(conversation) = args.conversation {
        handle.open_conversation(conversation.into())?;
    }

    let printer = tokio::spawn(print_snapshots(handle.clone(), Renderer::new(session.user.id)));
    read_commands(&handle).await?;

    handle.logout()?;
    driver.await?;
    printer.abort();
    Ok(())
}

fn log_give_up(event: &TransportEvent) {
    if let TransportEvent::ReconnectFailed { attempts } = event {
        tracing::error!(attempts, "could not reconnect; /connect to try again");
    }
}

/// Forward stdin lines to the runtime until EOF or `/quit`.
async fn read_commands(handle: &Handle) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Disconnecting drops every subscription.
    let mut watching_give_up = true;

    while let Some(line) = lines.next_line().await? {
        let input = match Input::parse(&line) {
            Ok(input) => input,
            Err(error) => {
                writeln!(io::stdout(), "-- {error}")?;
                continue;
            },
        };

        match input {
            Input::Send(content) => handle.send_message(content, None)?,
            Input::Open(conversation_id) => handle.open_conversation(conversation_id)?,
            Input::Close => handle.close_conversation()?,
            Input::More => handle.load_more()?,
            Input::Reload => handle.retry_load()?,
            Input::Typing => handle.keystroke()?,
            Input::Attach { path, caption } => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let attachment = Attachment {
                        bytes,
                        mime: mime_for(&path).to_string(),
                        file_name: file_name(&path),
                    };
                    handle.send_message(caption, Some(attachment))?;
                },
                Err(error) => writeln!(io::stdout(), "-- cannot read {path}: {error}")?,
            },
            Input::Resend(temp_id) => handle.retry_send(temp_id)?,
            Input::Discard(temp_id) => handle.discard_failed(temp_id)?,
            Input::Connect => {
                if !watching_give_up {
                    handle.subscribe(Scope::Any, EventKind::ReconnectFailed, log_give_up).await?;
                    watching_give_up = true;
                }
                handle.connect()?;
            },
            Input::Disconnect => {
                handle.disconnect()?;
                watching_give_up = false;
            },
            Input::Quit => break,
            Input::Nothing => {},
        }
    }

    Ok(())
}

async fn print_snapshots(handle: Handle, mut renderer: Renderer) {
    let mut snapshots = handle.snapshots();
    let mut states = handle.connection_states();

    loop {
        let lines = tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                renderer.render(snapshot.as_ref())
            },
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                vec![format!("-- {:?}", *states.borrow_and_update()).to_lowercase()]
            },
        };

        let mut out = io::stdout().lock();
        for line in lines {
            if writeln!(out, "{line}").is_err() {
                return;
            }
        }
    }
}

fn file_name(path: &str) -> Option<String> {
    std::path::Path::new(path).file_name().map(|name| name.to_string_lossy().into_owned())
}
