//! Scripted BillManager server stub for integration tests.
//!
//! Speaks just enough HTTP/1.1 for reqwest: one request per connection,
//! `Connection: close`. Tests mutate the stub's token state to simulate
//! expiry, rotation, and revocation, and read the per-endpoint call
//! counters to assert wire-level properties like single-flight refresh.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// The password the stub accepts for user `alice`.
pub const GOOD_PASSWORD: &str = "correct-pw";

#[derive(Default)]
pub struct StubState {
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub bills_calls: AtomicUsize,
    pub payments_calls: AtomicUsize,
    /// Access token the server currently accepts.
    access: Mutex<String>,
    /// Refresh token the server currently accepts; `None` = all rejected.
    refresh: Mutex<Option<String>>,
    serial: AtomicUsize,
    /// Milliseconds to hold each refresh exchange, to widen race windows.
    pub refresh_delay_ms: AtomicU64,
    /// Answer 500 to logout requests.
    pub fail_logout: AtomicBool,
    /// Serve the legacy flat current-user shape instead of the nested one.
    pub flat_me: AtomicBool,
    /// `X-Database` header seen on the most recent bills request.
    last_database_header: Mutex<Option<String>>,
}

pub struct StubServer {
    base_url: String,
    pub state: Arc<StubState>,
    _accept_task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub server");
        let addr = listener.local_addr().expect("stub server addr");
        let state = Arc::new(StubState::default());

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    handle_connection(state, stream).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            _accept_task: accept_task,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make the server accept exactly this pair, as if it had issued it
    /// in a previous run.
    pub fn seed_tokens(&self, access: &str, refresh: &str) {
        *self.state.access.lock().unwrap() = access.to_string();
        *self.state.refresh.lock().unwrap() = Some(refresh.to_string());
    }

    /// Invalidate the current access token server-side. The refresh token
    /// stays valid, so the next protected call 401s but is recoverable.
    pub fn expire_access(&self) {
        *self.state.access.lock().unwrap() = "__expired__".to_string();
    }

    /// Revoke the refresh token server-side: the next exchange is refused.
    pub fn revoke_refresh(&self) {
        *self.state.refresh.lock().unwrap() = None;
    }

    /// The access token the server currently accepts.
    pub fn current_access(&self) -> String {
        self.state.access.lock().unwrap().clone()
    }

    pub fn set_refresh_delay_ms(&self, ms: u64) {
        self.state.refresh_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_fail_logout(&self, fail: bool) {
        self.state.fail_logout.store(fail, Ordering::SeqCst);
    }

    pub fn set_flat_me(&self, flat: bool) {
        self.state.flat_me.store(flat, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn last_database_header(&self) -> Option<String> {
        self.state.last_database_header.lock().unwrap().clone()
    }
}

struct Request {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

impl Request {
    fn bearer(&self) -> Option<&str> {
        self.headers
            .get("authorization")?
            .strip_prefix("Bearer ")
    }

    fn body_field(&self, field: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        value.get(field)?.as_str().map(|s| s.to_string())
    }
}

fn issue_tokens(state: &StubState) -> (String, String) {
    let n = state.serial.fetch_add(1, Ordering::SeqCst) + 1;
    let access = format!("T{n}");
    let refresh = format!("R{n}");
    *state.access.lock().unwrap() = access.clone();
    *state.refresh.lock().unwrap() = Some(refresh.clone());
    (access, refresh)
}

fn authorized(state: &StubState, request: &Request) -> bool {
    match request.bearer() {
        Some(token) => token == state.access.lock().unwrap().as_str(),
        None => false,
    }
}

const DATABASES_JSON: &str =
    r#"[{"id": 1, "name": "alice_personal", "display_name": "Personal Finances"}]"#;

async fn route(state: &StubState, request: &Request) -> (u16, String) {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/api/v2/auth/login") => {
            state.login_calls.fetch_add(1, Ordering::SeqCst);
            if request.body_field("password").as_deref() != Some(GOOD_PASSWORD) {
                return (
                    401,
                    r#"{"success": false, "error": "Invalid username or password"}"#.to_string(),
                );
            }
            let (access, refresh) = issue_tokens(state);
            let body = format!(
                r#"{{"success": true, "data": {{"access_token": "{access}", "refresh_token": "{refresh}", "expires_in": 900, "token_type": "Bearer", "user": {{"id": 1, "username": "alice", "role": "admin"}}, "databases": {DATABASES_JSON}}}}}"#
            );
            (200, body)
        }
        ("POST", "/api/v2/auth/refresh") => {
            state.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            let presented = request.body_field("refresh_token");
            let valid = state.refresh.lock().unwrap().clone();
            match (presented, valid) {
                (Some(presented), Some(valid)) if presented == valid => {
                    let (access, refresh) = issue_tokens(state);
                    let body = format!(
                        r#"{{"success": true, "data": {{"access_token": "{access}", "refresh_token": "{refresh}", "expires_in": 900, "token_type": "Bearer"}}}}"#
                    );
                    (200, body)
                }
                _ => (
                    401,
                    r#"{"success": false, "error": "Invalid or expired refresh token"}"#
                        .to_string(),
                ),
            }
        }
        ("POST", "/api/v2/auth/logout") => {
            state.logout_calls.fetch_add(1, Ordering::SeqCst);
            if state.fail_logout.load(Ordering::SeqCst) {
                return (
                    500,
                    r#"{"success": false, "error": "Internal server error"}"#.to_string(),
                );
            }
            (
                200,
                r#"{"success": true, "message": "Logged out successfully"}"#.to_string(),
            )
        }
        ("GET", "/api/v2/me") => {
            state.me_calls.fetch_add(1, Ordering::SeqCst);
            if !authorized(state, request) {
                return (
                    401,
                    r#"{"success": false, "error": "Invalid or expired token"}"#.to_string(),
                );
            }
            let body = if state.flat_me.load(Ordering::SeqCst) {
                format!(
                    r#"{{"username": "alice", "role": "admin", "databases": {DATABASES_JSON}, "current_db": null, "is_account_owner": true}}"#
                )
            } else {
                format!(
                    r#"{{"success": true, "data": {{"user": {{"id": 1, "username": "alice", "email": "alice@example.com", "role": "admin", "is_account_owner": true}}, "databases": {DATABASES_JSON}, "current_db": null}}}}"#
                )
            };
            (200, body)
        }
        ("GET", "/api/v2/config") => (
            200,
            r#"{"success": true, "data": {"deployment_mode": "self-hosted", "registration_enabled": true, "email_enabled": false}}"#
                .to_string(),
        ),
        ("GET", path) if path.starts_with("/api/v2/bills") => {
            state.bills_calls.fetch_add(1, Ordering::SeqCst);
            *state.last_database_header.lock().unwrap() =
                request.headers.get("x-database").cloned();
            if !authorized(state, request) {
                return (
                    401,
                    r#"{"success": false, "error": "Invalid or expired token"}"#.to_string(),
                );
            }
            let body = r#"{"success": true, "data": [{"id": 12, "name": "Electric", "amount": 120.5, "varies": false, "frequency": "monthly", "frequency_type": "simple", "frequency_config": "{}", "next_due": "2025-07-01", "auto_payment": false, "icon": "bolt", "type": "bill", "account": null, "notes": null, "archived": false, "is_shared": false, "share_count": 0, "database_id": 1, "database_name": "Personal Finances"}]}"#;
            (200, body.to_string())
        }
        ("GET", "/api/v2/payments") => {
            state.payments_calls.fetch_add(1, Ordering::SeqCst);
            if !authorized(state, request) {
                return (
                    401,
                    r#"{"success": false, "error": "Invalid or expired token"}"#.to_string(),
                );
            }
            let body = r#"{"success": true, "data": [{"id": 31, "amount": 54.2, "payment_date": "2025-06-14", "notes": null, "bill_id": 12, "bill_name": "Electric", "bill_icon": "bolt", "bill_type": "expense", "is_share_payment": false, "is_received_payment": false, "database_id": 1, "database_name": "Personal Finances"}]}"#;
            (200, body.to_string())
        }
        _ => (
            404,
            r#"{"success": false, "error": "Not found"}"#.to_string(),
        ),
    }
}

async fn handle_connection(state: Arc<StubState>, mut stream: TcpStream) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let (status, body) = route(&state, &request).await;
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}

async fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];

    let header_end = loop {
        let n = stream.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > 65536 {
            return None;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut tmp).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }

    Some(Request {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
