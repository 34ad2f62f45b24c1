//! Line client for the bridge wire protocol: connect, complete the approval
//! handshake, then send requests and read responses one line at a time.

use anyhow::{Context, Result};
use lib::bridge::{encode_line, Handshake, Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

pub struct BridgeClient {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
    /// Token returned by the server on approval; pass it to later sessions to
    /// skip the operator prompt.
    pub token: Option<String>,
}

impl BridgeClient {
    /// Connect to a bridge on localhost and complete the approval handshake.
    /// Blocks until the operator decides (or the server times the prompt out).
    pub async fn connect(port: u16, token: Option<String>) -> Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .with_context(|| {
                format!(
                    "connecting to 127.0.0.1:{} (is the bridge running? start it with `tether serve` or from the host application)",
                    port
                )
            })?;
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write
            .write_all(encode_line(&Request::Auth { token }).as_bytes())
            .await?;
        let line = lines
            .next_line()
            .await?
            .context("server closed before sending the approval verdict")?;
        let handshake: Handshake =
            serde_json::from_str(&line).context("parsing approval verdict")?;
        if !handshake.success {
            anyhow::bail!(
                "{}",
                handshake
                    .error
                    .unwrap_or_else(|| "connection rejected".to_string())
            );
        }
        Ok(Self {
            lines,
            write,
            token: handshake.token,
        })
    }

    /// Send one request and read its response.
    pub async fn send(&mut self, request: &Request) -> Result<Response> {
        self.write
            .write_all(encode_line(request).as_bytes())
            .await?;
        let line = self
            .lines
            .next_line()
            .await?
            .context("server closed mid-request")?;
        serde_json::from_str(&line).context("parsing response")
    }
}

/// Resolve the port to connect to: flag > TETHER_PORT > port file > config > default.
pub fn resolve_client_port(flag: Option<u16>) -> u16 {
    if let Some(port) = flag {
        return port;
    }
    if let Some(port) = std::env::var("TETHER_PORT")
        .ok()
        .and_then(|s| s.trim().parse().ok())
    {
        return port;
    }
    if let Some(port) = lib::config::read_port_file() {
        return port;
    }
    lib::config::load_config(None)
        .map(|(config, _)| config.bridge.port)
        .unwrap_or(9876)
}

/// Print a response the way the server saw it: captured stdout/stderr to the
/// matching local stream, then the result or error. Returns success.
pub fn print_response(response: &Response) -> bool {
    if !response.stdout.is_empty() {
        print!("{}", response.stdout);
    }
    if !response.stderr.is_empty() {
        eprint!("{}", response.stderr);
    }
    if response.success {
        if let Some(ref result) = response.result {
            println!("{}", result);
        }
        true
    } else {
        eprintln!(
            "error: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
        false
    }
}
