//! Line Echo Demo
//!
//! Reads raw IRC lines from stdin and hands them to the default connection
//! module as if a server had sent them. Handlers installed through
//! registered packages classify each line and answer `PING` with `PONG`.
//!
//! ```text
//! MessageReceived ──▶ classify ──push_back──▶ Command::Ping ──▶ reply
//!                                         └─▶ Command::Privmsg ──▶ log
//! ```
//!
//! # Usage
//!
//! ```bash
//! printf 'PING :tolsun.oulu.fi\n' | cargo run --package line-echo
//! ```

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use ircbus::core::ModuleError;
use ircbus::core::modules::ConnectionModule;
use ircbus::prelude::*;
use ircbus::runtime::config::ConnectionConfig;
use linkme::distributed_slice;
use tracing::{info, warn};

event_codes! {
    /// Commands recognized by this demo.
    pub enum Command {
        Ping,
        Privmsg,
        Other,
    }
}

/// A parsed line, attached to the event by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Message {
    prefix: Option<String>,
    command: String,
    params: Vec<String>,
}

impl Message {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (prefix, rest) = match line.strip_prefix(':') {
            Some(rest) => {
                let (prefix, rest) = rest.split_once(' ')?;
                (Some(prefix.to_string()), rest)
            }
            None => (None, line),
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };
        let mut words = head.split_whitespace();
        let command = words.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = words.map(str::to_string).collect();
        params.extend(trailing.map(str::to_string));

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    fn code(&self) -> Command {
        match self.command.as_str() {
            "PING" => Command::Ping,
            "PRIVMSG" => Command::Privmsg,
            _ => Command::Other,
        }
    }
}

// ============================================================================
// Packages
// ============================================================================

/// Parses every received line and routes it to its command's handlers.
#[distributed_slice(PACKAGES)]
fn install_classifier(irc: &Arc<Irc>) -> ModuleResult<()> {
    irc.connect(ConnectionEvent::MessageReceived, |event: &Event| {
        let Ok(line) = event.data().get::<ReceivedLine>().map(|l| l.0.clone()) else {
            return;
        };
        match Message::parse(&line) {
            Some(message) => {
                event.push_back(message.code());
                event.data().emplace(message);
            }
            None => warn!(%line, "Malformed line"),
        }
    });
    Ok(())
}

/// Answers `PING` and logs `PRIVMSG`.
#[distributed_slice(PACKAGES)]
fn install_replies(irc: &Arc<Irc>) -> ModuleResult<()> {
    irc.connect(Command::Ping, |event: &Event| -> Result<(), ModuleError> {
        let token = event
            .data()
            .get::<Message>()
            .ok()
            .and_then(|m| m.params.first().cloned())
            .unwrap_or_default();
        let irc = event.irc().ok_or(ModuleError::ContextGone)?;
        irc.module::<dyn Connection>()?
            .send(&format!("PONG :{token}"))?;
        info!(%token, "Answered PING");
        Ok(())
    });

    irc.connect(Command::Privmsg, |event: &Event| {
        if let Ok(message) = event.data().get::<Message>() {
            let from = message.prefix.as_deref().unwrap_or("?");
            let target = message.params.first().map(String::as_str).unwrap_or("?");
            let text = message.params.get(1).map(String::as_str).unwrap_or("");
            info!("[{target}] <{from}> {text}");
        }
    });

    irc.connect(ConnectionEvent::ConnectionStatusChanged, |event: &Event| {
        if let Ok(change) = event.data().get::<StatusChange>() {
            info!(previous = ?change.previous, current = ?change.current, "Connection state");
        }
    });
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = IrcbusRuntime::builder()
        .merge(IrcbusConfig {
            connection: Some(ConnectionConfig {
                host: "irc.example.net".to_string(),
                port: 6667,
                auto_connect: true,
            }),
            ..Default::default()
        })
        .build()?;

    let module = runtime
        .irc()
        .module_as::<ConnectionModule>()
        .context("no default connection module loaded")?;
    module.report(ConnectionEvent::Connected)?;

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if module.receive(line).is_err() {
                break;
            }
        }
    });

    let stats = runtime.run().await?;
    info!(
        events = stats.events_fetched,
        failures = stats.handler_failures,
        "Bye"
    );
    Ok(())
}
