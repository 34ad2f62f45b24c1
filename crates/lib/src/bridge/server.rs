//! Bridge server: loopback TCP listener and per-connection handlers.
//!
//! The acceptor and every handler are independent tasks; the executor task is
//! the only place submitted code runs, so a slow approval or a long read on
//! one connection never stalls the others.

use crate::bridge::approval::{ApprovalDecision, ApprovalGate, ApprovalPrompt};
use crate::bridge::protocol::{self, Handshake, Request, Response};
use crate::config::{self, Config};
use crate::executor::{spawn_executor, ExecutorHandle};
use crate::host::HostBindings;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A running bridge: bound port plus stop control. `start_bridge`/`stop` is
/// the host's enable/disable toggle surface.
pub struct BridgeHandle {
    port: u16,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl BridgeHandle {
    /// The actually bound port (differs from config when the config says 0).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting, signal open handlers to close, release the port.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.accept_task.await {
            log::debug!("accept task ended: {}", e);
        }
        log::info!("bridge stopped");
    }
}

/// Start the bridge on `config.bridge.bind:config.bridge.port` with the
/// host's approval prompt and namespace bindings. Refuses non-loopback binds.
pub async fn start_bridge(
    config: &Config,
    prompt: Arc<dyn ApprovalPrompt>,
    bindings: HostBindings,
) -> Result<BridgeHandle> {
    let bind = config.bridge.bind.trim();
    if !config::is_loopback_bind(bind) {
        anyhow::bail!(
            "refusing to bind bridge to {} (loopback only; the bridge executes arbitrary code)",
            bind
        );
    }
    let addr = format!("{}:{}", bind, config.bridge.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    let port = listener.local_addr().context("reading bound address")?.port();
    log::info!("bridge listening on {}:{}", bind, port);

    let executor = spawn_executor(bindings.into_namespace());
    let gate = Arc::new(ApprovalGate::new(
        prompt,
        Duration::from_secs(config.bridge.approval_timeout_secs),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let accept_task = tokio::spawn(accept_loop(listener, gate, executor, shutdown_rx));

    Ok(BridgeHandle {
        port,
        shutdown: shutdown_tx,
        accept_task,
    })
}

/// Run a standalone bridge until ctrl-c: start, advertise the port in the
/// port file, stop cleanly. Hosts embedding the bridge use `start_bridge`
/// and keep the handle instead.
pub async fn run_bridge(
    config: Config,
    prompt: Arc<dyn ApprovalPrompt>,
    bindings: HostBindings,
) -> Result<()> {
    let handle = start_bridge(&config, prompt, bindings).await?;
    let port_file = match config::write_port_file(handle.port()) {
        Ok(path) => {
            log::debug!("wrote port file {}", path.display());
            Some(path)
        }
        Err(e) => {
            log::warn!("writing port file failed: {}", e);
            None
        }
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    log::info!("shutdown signal received, stopping bridge");
    handle.stop().await;
    if let Some(path) = port_file {
        let _ = std::fs::remove_file(path);
    }
    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    gate: Arc<ApprovalGate>,
    executor: ExecutorHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        log::info!("connection from {}", peer);
                        let gate = gate.clone();
                        let executor = executor.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(socket, peer, gate, executor, shutdown).await
                            {
                                log::debug!("connection {} ended: {}", peer, e);
                            }
                        });
                    }
                    // a failed accept must not stop the loop
                    Err(e) => log::warn!("accept failed: {}", e),
                }
            }
        }
    }
    log::info!("bridge accept loop stopped");
}

/// Serve one connection: `Open → Authorizing → Serving ⟲ → Closed`.
async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    gate: Arc<ApprovalGate>,
    executor: ExecutorHandle,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut approved = false;
    // lines that arrive while the approval prompt is pending
    let mut backlog: VecDeque<String> = VecDeque::new();

    'serve: loop {
        let line = match backlog.pop_front() {
            Some(line) => Some(line),
            None => tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break 'serve;
                    }
                    continue 'serve;
                }
                line = lines.next_line() => line?,
            },
        };
        let Some(line) = line else {
            break; // EOF
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            // keep-alive, no response
            continue;
        }

        if approved {
            respond(&executor, &mut write_half, trimmed).await?;
            continue;
        }

        // First message: resolve the approval verdict before anything runs.
        let request = protocol::decode_request(trimmed);
        let presented = match &request {
            Ok(Request::Auth { token }) => token.clone(),
            _ => None,
        };
        let peer_label = peer.to_string();
        let authorize = gate.authorize(&peer_label, presented.as_deref());
        tokio::pin!(authorize);
        let verdict = loop {
            tokio::select! {
                verdict = &mut authorize => break verdict,
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break 'serve;
                    }
                }
                more = lines.next_line() => match more? {
                    Some(extra) => backlog.push_back(extra),
                    None => {
                        log::debug!("connection {} closed during approval, abandoning prompt", peer);
                        return Ok(());
                    }
                },
            }
        };

        match verdict {
            ApprovalDecision::Approved => {
                let token = gate.issue_token().await;
                write_line(&mut write_half, &Handshake::approved(Some(token))).await?;
                approved = true;
                log::info!("connection {} approved", peer);
                match request {
                    // the auth message is consumed by the handshake
                    Ok(Request::Auth { .. }) => {}
                    Ok(request) => {
                        let response = executor.run(request).await;
                        write_line(&mut write_half, &response).await?;
                    }
                    Err(e) => {
                        write_line(&mut write_half, &Response::protocol_error(e.to_string()))
                            .await?;
                    }
                }
            }
            ApprovalDecision::Rejected => {
                write_line(&mut write_half, &Handshake::rejected()).await?;
                log::info!("connection {} rejected", peer);
                break;
            }
        }
    }
    Ok(())
}

/// Decode one serving-state line, run it, write the response.
async fn respond(
    executor: &ExecutorHandle,
    write_half: &mut OwnedWriteHalf,
    line: &str,
) -> std::io::Result<()> {
    let response = match protocol::decode_request(line) {
        Ok(request) => executor.run(request).await,
        Err(e) => Response::protocol_error(e.to_string()),
    };
    write_line(write_half, &response).await
}

async fn write_line<T: Serialize>(
    write_half: &mut OwnedWriteHalf,
    message: &T,
) -> std::io::Result<()> {
    write_half
        .write_all(protocol::encode_line(message).as_bytes())
        .await
}
