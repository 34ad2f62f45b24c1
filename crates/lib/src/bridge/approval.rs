//! Approval gate: the human trust boundary in front of execution.
//!
//! Every connection starts Pending and receives exactly one terminal verdict
//! before any of its code runs. The verdict comes from a session token match
//! or from the host's prompt, bounded by a timeout that counts as rejection.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Operator verdict for one connection. Terminal once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// Host-side prompt asking the operator whether a peer may control the
/// session. `peer` identifies the connecting side (at minimum its address).
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn request(&self, peer: &str) -> ApprovalDecision;
}

/// Prompt with a fixed decision (tests, trusted development bridges).
pub struct StaticPrompt(pub ApprovalDecision);

#[async_trait]
impl ApprovalPrompt for StaticPrompt {
    async fn request(&self, _peer: &str) -> ApprovalDecision {
        self.0
    }
}

/// One pending approval forwarded to the host UI. Answer by sending on
/// `responder`; dropping it rejects.
pub struct PendingApproval {
    pub peer: String,
    pub responder: oneshot::Sender<ApprovalDecision>,
}

/// Prompt that forwards each request to an mpsc queue the host UI consumes
/// (e.g. to pop a dialog). The wait is a plain future, so it is cancelled
/// cleanly when the connection goes away mid-prompt.
pub struct ChannelPrompt {
    tx: mpsc::Sender<PendingApproval>,
}

impl ChannelPrompt {
    /// Returns the prompt and the receiving end for the host UI.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingApproval>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ApprovalPrompt for ChannelPrompt {
    async fn request(&self, peer: &str) -> ApprovalDecision {
        let (responder, verdict) = oneshot::channel();
        let pending = PendingApproval {
            peer: peer.to_string(),
            responder,
        };
        if self.tx.send(pending).await.is_err() {
            // host UI gone; nobody can approve
            return ApprovalDecision::Rejected;
        }
        verdict.await.unwrap_or(ApprovalDecision::Rejected)
    }
}

/// Process-wide gate resolving one verdict per connection.
pub struct ApprovalGate {
    prompt: Arc<dyn ApprovalPrompt>,
    timeout: Duration,
    session_token: RwLock<Option<String>>,
}

impl ApprovalGate {
    pub fn new(prompt: Arc<dyn ApprovalPrompt>, timeout: Duration) -> Self {
        Self {
            prompt,
            timeout,
            session_token: RwLock::new(None),
        }
    }

    /// Resolve the verdict for a new connection: a matching session token
    /// approves silently; otherwise the operator is prompted, bounded by the
    /// configured timeout (elapsed counts as rejected).
    pub async fn authorize(&self, peer: &str, presented_token: Option<&str>) -> ApprovalDecision {
        if let Some(token) = presented_token {
            if self.token_matches(token).await {
                log::debug!("connection {} auto-approved by session token", peer);
                return ApprovalDecision::Approved;
            }
        }
        match tokio::time::timeout(self.timeout, self.prompt.request(peer)).await {
            Ok(decision) => decision,
            Err(_) => {
                log::info!("approval prompt for {} timed out, rejecting", peer);
                ApprovalDecision::Rejected
            }
        }
    }

    async fn token_matches(&self, presented: &str) -> bool {
        !presented.is_empty() && self.session_token.read().await.as_deref() == Some(presented)
    }

    /// The session token returned in approved handshakes, minted on first
    /// use. In-memory only; dies with the bridge.
    pub async fn issue_token(&self) -> String {
        let mut guard = self.session_token.write().await;
        if let Some(token) = guard.as_ref() {
            return token.clone();
        }
        let token = uuid::Uuid::new_v4().to_string();
        *guard = Some(token.clone());
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(prompt: impl ApprovalPrompt + 'static, timeout_ms: u64) -> ApprovalGate {
        ApprovalGate::new(Arc::new(prompt), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn static_verdicts() {
        let g = gate(StaticPrompt(ApprovalDecision::Approved), 1000);
        assert_eq!(
            g.authorize("127.0.0.1:1", None).await,
            ApprovalDecision::Approved
        );
        let g = gate(StaticPrompt(ApprovalDecision::Rejected), 1000);
        assert_eq!(
            g.authorize("127.0.0.1:1", None).await,
            ApprovalDecision::Rejected
        );
    }

    #[tokio::test]
    async fn prompt_timeout_rejects() {
        let (prompt, _rx) = ChannelPrompt::new(1);
        let g = gate(prompt, 50);
        // nobody answers _rx, so the timeout resolves the verdict
        assert_eq!(
            g.authorize("127.0.0.1:2", None).await,
            ApprovalDecision::Rejected
        );
    }

    #[tokio::test]
    async fn dropped_responder_rejects() {
        let (prompt, mut rx) = ChannelPrompt::new(1);
        let g = gate(prompt, 1000);
        let ui = tokio::spawn(async move {
            let pending = rx.recv().await.expect("pending approval");
            assert!(pending.peer.contains("127.0.0.1"));
            drop(pending.responder);
        });
        assert_eq!(
            g.authorize("127.0.0.1:3", None).await,
            ApprovalDecision::Rejected
        );
        ui.await.expect("ui task");
    }

    #[tokio::test]
    async fn channel_prompt_approves() {
        let (prompt, mut rx) = ChannelPrompt::new(1);
        let g = gate(prompt, 1000);
        let ui = tokio::spawn(async move {
            let pending = rx.recv().await.expect("pending approval");
            let _ = pending.responder.send(ApprovalDecision::Approved);
        });
        assert_eq!(
            g.authorize("127.0.0.1:4", None).await,
            ApprovalDecision::Approved
        );
        ui.await.expect("ui task");
    }

    #[tokio::test]
    async fn token_skips_prompt_and_is_stable() {
        let (prompt, mut rx) = ChannelPrompt::new(1);
        let g = gate(prompt, 1000);
        let token = g.issue_token().await;
        assert_eq!(g.issue_token().await, token);

        // matching token approves without consulting the prompt
        assert_eq!(
            g.authorize("127.0.0.1:5", Some(&token)).await,
            ApprovalDecision::Approved
        );
        assert!(rx.try_recv().is_err());

        // a wrong or empty token falls through to the prompt (which rejects)
        let g = ApprovalGate::new(
            Arc::new(StaticPrompt(ApprovalDecision::Rejected)),
            Duration::from_millis(50),
        );
        let minted = g.issue_token().await;
        assert_ne!(minted, "");
        assert_eq!(
            g.authorize("127.0.0.1:6", Some("wrong")).await,
            ApprovalDecision::Rejected
        );
        assert_eq!(
            g.authorize("127.0.0.1:6", Some("")).await,
            ApprovalDecision::Rejected
        );
    }
}
