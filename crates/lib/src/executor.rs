//! Serialized execution context.
//!
//! One dedicated task owns the shared namespace and drains a FIFO job queue,
//! so at most one piece of submitted code runs at a time across the whole
//! process and no connection can starve another. Connection handlers submit
//! requests and await the reply; they never touch the namespace directly.
//! A host embedding the bridge can treat this task as standing in for its
//! main loop.

use crate::bridge::{Request, Response};
use crate::script::{self, Captured, Namespace};
use tokio::sync::{mpsc, oneshot};

struct Job {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// Handle for submitting requests to the execution task. Cheap to clone;
/// the task stops when the last handle is dropped.
#[derive(Clone)]
pub struct ExecutorHandle {
    tx: mpsc::Sender<Job>,
}

/// Spawn the execution task owning `namespace`.
pub fn spawn_executor(namespace: Namespace) -> ExecutorHandle {
    let (tx, mut rx) = mpsc::channel::<Job>(64);
    tokio::spawn(async move {
        let mut ns = namespace;
        while let Some(job) = rx.recv().await {
            // a queued request whose connection already went away is skipped
            if job.reply.is_closed() {
                log::debug!("dropping queued request from a closed connection");
                continue;
            }
            let response = run_request(&job.request, &mut ns);
            let _ = job.reply.send(response);
        }
        log::debug!("executor stopped");
    });
    ExecutorHandle { tx }
}

impl ExecutorHandle {
    /// Run one request to completion. Never fails out-of-band: script
    /// failures and executor loss both map into a failed [`Response`].
    pub async fn run(&self, request: Request) -> Response {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            request,
            reply: reply_tx,
        };
        if self.tx.send(job).await.is_err() {
            return Response::protocol_error("execution context is gone");
        }
        match reply_rx.await {
            Ok(response) => response,
            Err(_) => Response::protocol_error("execution context dropped the request"),
        }
    }
}

fn run_request(request: &Request, ns: &mut Namespace) -> Response {
    let mut out = Captured::default();
    match request {
        Request::Exec { code } => match script::run_statements(code, ns, &mut out) {
            Ok(()) => Response::exec_ok(out.stdout, out.stderr),
            Err(e) => Response::failure(e.to_string(), out.stdout, out.stderr),
        },
        Request::Eval { code } => match script::eval_expression(code, ns, &mut out) {
            Ok(value) => Response::eval_ok(value.to_string(), out.stdout, out.stderr),
            Err(e) => Response::failure(e.to_string(), out.stdout, out.stderr),
        },
        Request::Auth { .. } => {
            Response::failure("auth is only valid during the connection handshake", out.stdout, out.stderr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_then_eval_shares_namespace() {
        let executor = spawn_executor(Namespace::new());
        let response = executor
            .run(Request::Exec {
                code: "x = 5".to_string(),
            })
            .await;
        assert!(response.success);
        assert_eq!(response.result, None);

        let response = executor
            .run(Request::Eval {
                code: "x".to_string(),
            })
            .await;
        assert!(response.success);
        assert_eq!(response.result.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn eval_round_trip() {
        let executor = spawn_executor(Namespace::new());
        let response = executor
            .run(Request::Eval {
                code: "1+1".to_string(),
            })
            .await;
        assert!(response.success);
        assert_eq!(response.result.as_deref(), Some("2"));
        assert_eq!(response.stdout, "");
        assert_eq!(response.stderr, "");
    }

    #[tokio::test]
    async fn failure_keeps_partial_output_and_executor_alive() {
        let executor = spawn_executor(Namespace::new());
        let response = executor
            .run(Request::Exec {
                code: "print(\"partial\")\n1/0".to_string(),
            })
            .await;
        assert!(!response.success);
        assert_eq!(response.result, None);
        assert_eq!(response.stdout, "partial\n");
        assert_eq!(response.error.as_deref(), Some("division by zero"));

        let response = executor
            .run(Request::Eval {
                code: "2*3".to_string(),
            })
            .await;
        assert!(response.success);
        assert_eq!(response.result.as_deref(), Some("6"));
    }

    #[tokio::test]
    async fn auth_is_not_executable() {
        let executor = spawn_executor(Namespace::new());
        let response = executor.run(Request::Auth { token: None }).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn requests_are_served_in_submission_order() {
        let executor = spawn_executor(Namespace::new());
        let mut pending = Vec::new();
        for i in 0..10 {
            let executor = executor.clone();
            pending.push(tokio::spawn(async move {
                executor
                    .run(Request::Exec {
                        code: format!("n = {}", i),
                    })
                    .await
            }));
        }
        for task in pending {
            assert!(task.await.expect("join").success);
        }
        // whichever assignment ran last, the namespace holds exactly one n
        let response = executor
            .run(Request::Eval {
                code: "n >= 0".to_string(),
            })
            .await;
        assert!(response.success);
        assert_eq!(response.result.as_deref(), Some("true"));
    }
}
