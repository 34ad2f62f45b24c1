//! Bridge wire protocol types (requests, responses, approval handshake).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error sent back when `Connection rejected by user` — also used for prompt
/// timeouts, which the gate folds into rejection.
pub const REJECTED_BY_USER: &str = "Connection rejected by user";

/// Wire request, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// Run `code` as a sequence of statements.
    Exec { code: String },
    /// Evaluate `code` as a single expression and return its representation.
    Eval { code: String },
    /// Present a session token during the handshake. Consumed by the
    /// handshake, never dispatched to execution.
    Auth {
        #[serde(default)]
        token: Option<String>,
    },
}

/// A line that is not a recognizable request.
#[derive(Debug, Error)]
#[error("malformed request: {0}")]
pub struct DecodeError(String);

/// Decode one line into a [`Request`]. Fails when the line is not valid JSON,
/// lacks a recognized `type`, or lacks `code`. Decode failures are reported to
/// the sender as a failed [`Response`], never treated as fatal.
pub fn decode_request(line: &str) -> Result<Request, DecodeError> {
    serde_json::from_str(line.trim()).map_err(|e| DecodeError(e.to_string()))
}

/// Wire response: `{ "success", "result"?, "stdout", "stderr", "error"? }`.
/// Exactly one of `result`/`error` is present when success is true/false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn exec_ok(stdout: String, stderr: String) -> Self {
        Self {
            success: true,
            result: None,
            stdout,
            stderr,
            error: None,
        }
    }

    pub fn eval_ok(result: String, stdout: String, stderr: String) -> Self {
        Self {
            success: true,
            result: Some(result),
            stdout,
            stderr,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, stdout: String, stderr: String) -> Self {
        Self {
            success: false,
            result: None,
            stdout,
            stderr,
            error: Some(error.into()),
        }
    }

    /// Failure with no captured output (decode and transport-level errors).
    pub fn protocol_error(error: impl Into<String>) -> Self {
        Self::failure(error, String::new(), String::new())
    }
}

/// One-time approval verdict, sent before (approved) or instead of (rejected)
/// the first message's response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Handshake {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Session token for auto-approving later connections. In-memory only,
    /// valid until the bridge stops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Handshake {
    pub fn approved(token: Option<String>) -> Self {
        Self {
            success: true,
            message: Some("Connection approved".to_string()),
            token,
            error: None,
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: false,
            message: None,
            token: None,
            error: Some(REJECTED_BY_USER.to_string()),
        }
    }
}

/// Encode a message as one newline-terminated JSON line. JSON string escaping
/// guarantees no embedded raw newline.
pub fn encode_line<T: Serialize>(message: &T) -> String {
    let mut line = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_exec_and_eval() {
        assert_eq!(
            decode_request(r#"{"type":"exec","code":"x=1"}"#).expect("exec"),
            Request::Exec {
                code: "x=1".to_string()
            }
        );
        assert_eq!(
            decode_request(r#" {"type":"eval","code":"x"} "#).expect("eval"),
            Request::Eval {
                code: "x".to_string()
            }
        );
    }

    #[test]
    fn decodes_auth_with_and_without_token() {
        assert_eq!(
            decode_request(r#"{"type":"auth","token":"t-1"}"#).expect("auth"),
            Request::Auth {
                token: Some("t-1".to_string())
            }
        );
        assert_eq!(
            decode_request(r#"{"type":"auth","token":null}"#).expect("auth null"),
            Request::Auth { token: None }
        );
        assert_eq!(
            decode_request(r#"{"type":"auth"}"#).expect("auth missing"),
            Request::Auth { token: None }
        );
    }

    #[test]
    fn rejects_unknown_type_missing_code_and_bad_json() {
        assert!(decode_request(r#"{"type":"frobnicate","code":"1"}"#).is_err());
        assert!(decode_request(r#"{"type":"exec"}"#).is_err());
        assert!(decode_request(r#"{"code":"1"}"#).is_err());
        assert!(decode_request("not json").is_err());
    }

    #[test]
    fn response_omits_absent_fields() {
        let line = encode_line(&Response::eval_ok("2".to_string(), String::new(), String::new()));
        assert_eq!(
            line,
            "{\"success\":true,\"result\":\"2\",\"stdout\":\"\",\"stderr\":\"\"}\n"
        );
        let line = encode_line(&Response::protocol_error("bad"));
        assert!(line.contains("\"error\":\"bad\""));
        assert!(!line.contains("result"));
    }

    #[test]
    fn handshake_wire_shapes() {
        let line = encode_line(&Handshake::approved(None));
        assert_eq!(line, "{\"success\":true,\"message\":\"Connection approved\"}\n");
        let line = encode_line(&Handshake::rejected());
        assert_eq!(
            line,
            "{\"success\":false,\"error\":\"Connection rejected by user\"}\n"
        );
    }

    #[test]
    fn encoded_lines_embed_no_raw_newline() {
        let response = Response::exec_ok("a\nb\n".to_string(), String::new());
        let line = encode_line(&response);
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));
        let decoded: Response = serde_json::from_str(line.trim()).expect("round trip");
        assert_eq!(decoded.stdout, "a\nb\n");
    }
}
