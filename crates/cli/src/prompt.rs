//! Terminal approval prompt for the standalone bridge.

use async_trait::async_trait;
use lib::bridge::{ApprovalDecision, ApprovalPrompt};

/// Asks y/N on the controlling terminal for each new connection. A prompt the
/// gate times out leaves the stdin read pending until the next line of input.
pub struct ConsolePrompt;

#[async_trait]
impl ApprovalPrompt for ConsolePrompt {
    async fn request(&self, peer: &str) -> ApprovalDecision {
        let peer = peer.to_string();
        let answered_yes = tokio::task::spawn_blocking(move || {
            use std::io::{self, BufRead, Write};
            let mut stderr = io::stderr();
            let _ = write!(
                stderr,
                "bridge: allow {} to execute code in this session? [y/N] ",
                peer
            );
            let _ = stderr.flush();
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(_) => {
                    let answer = line.trim();
                    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
                }
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false);
        if answered_yes {
            ApprovalDecision::Approved
        } else {
            ApprovalDecision::Rejected
        }
    }
}
