use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sip::digest::compute_response;
use crate::sip::message::{build_request, build_response, parse, Method, ParsedMessage, RequestParams};
use crate::types::{
    CallHandle, CallState, CallStateHandler, EndCause, IncomingHandler, SignalingError,
    SignalingResult, SipConfig,
};
use crate::SignalingClient;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Outbound,
    Inbound,
}

struct CallContext {
    handle: CallHandle,
    direction: Direction,
    state: CallState,
    sip_call_id: String,
    local_tag: String,
    remote_tag: Option<String>,
    remote_uri: String,
    /// The inbound INVITE, retained so `answer()` can build a 200 OK that
    /// correctly echoes its Via/CSeq. `None` for outbound calls.
    invite_request: Option<ParsedMessage>,
}

fn new_tag() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn new_branch() -> String {
    format!("z9hG4bK{}", Uuid::new_v4().simple())
}

/// Real SIP/RTP signalling client: registers and places/answers calls over
/// UDP against the configured peer. Audio is out of scope for this module
/// (carried by the process-wide audio device once a call is `Connected`);
/// this client only drives SIP signalling state.
pub struct SipSignalingClient {
    config: SipConfig,
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    local_addr: String,
    cseq_counter: AtomicU32,
    registered: AtomicBool,
    calls: DashMap<CallHandle, CallContext>,
    call_id_index: DashMap<String, CallHandle>,
    incoming_handler: RwLock<Option<Arc<IncomingHandler>>>,
    state_handler: RwLock<Option<Arc<CallStateHandler>>>,
    pending: DashMap<String, oneshot::Sender<ParsedMessage>>,
    recv_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SipSignalingClient {
    pub async fn new(config: SipConfig) -> SignalingResult<Arc<Self>> {
        let socket = UdpSocket::bind(("0.0.0.0", config.local_port))
            .await
            .map_err(|e| SignalingError::NetworkError(e.to_string()))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| SignalingError::NetworkError(e.to_string()))?;

        let mut addrs = tokio::net::lookup_host((config.server_host.as_str(), config.server_port))
            .await
            .map_err(|e| SignalingError::NetworkError(e.to_string()))?;
        let server_addr = addrs
            .next()
            .ok_or_else(|| SignalingError::NetworkError("no address for SIP server".into()))?;

        let client = Arc::new(Self {
            config,
            socket: Arc::new(socket),
            server_addr,
            local_addr: local_addr.to_string(),
            cseq_counter: AtomicU32::new(1),
            registered: AtomicBool::new(false),
            calls: DashMap::new(),
            call_id_index: DashMap::new(),
            incoming_handler: RwLock::new(None),
            state_handler: RwLock::new(None),
            pending: DashMap::new(),
            recv_task: std::sync::Mutex::new(None),
        });

        let recv_client = client.clone();
        let handle = tokio::spawn(async move {
            recv_client.receive_loop().await;
        });
        *client.recv_task.lock().unwrap() = Some(handle);

        Ok(client)
    }

    fn next_cseq(&self) -> u32 {
        self.cseq_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn from_uri(&self) -> String {
        format!("sip:{}@{}", self.config.user, self.config.server_host)
    }

    async fn send_raw(&self, message: &str) -> SignalingResult<()> {
        self.socket
            .send_to(message.as_bytes(), self.server_addr)
            .await
            .map_err(|e| SignalingError::NetworkError(e.to_string()))?;
        Ok(())
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 4096];
        loop {
            let (len, _from) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "sip socket read failed, receive loop exiting");
                    return;
                }
            };
            let raw = String::from_utf8_lossy(&buf[..len]).to_string();
            let Some(parsed) = parse(&raw) else {
                debug!("dropped unparseable sip datagram");
                continue;
            };
            if parsed.method.is_some() {
                self.handle_incoming_request(parsed).await;
            } else {
                self.handle_incoming_response(parsed).await;
            }
        }
    }

    async fn handle_incoming_request(&self, msg: ParsedMessage) {
        let method = msg.method.clone().unwrap_or_default();
        match method.as_str() {
            "INVITE" => self.handle_invite(msg).await,
            "BYE" => self.handle_bye(msg).await,
            "CANCEL" => self.handle_cancel(msg).await,
            "ACK" => self.handle_ack(msg),
            other => debug!(method = other, "ignoring unsupported incoming request"),
        }
    }

    async fn handle_invite(&self, msg: ParsedMessage) {
        let Some(call_id) = msg.call_id().map(str::to_string) else {
            return;
        };
        if self.call_id_index.contains_key(&call_id) {
            return; // retransmission of an INVITE we already answered
        }
        let caller = msg
            .header("from")
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string());
        let handle = Uuid::new_v4();
        let local_tag = new_tag();
        self.calls.insert(
            handle,
            CallContext {
                handle,
                direction: Direction::Inbound,
                state: CallState::Ringing,
                sip_call_id: call_id.clone(),
                local_tag: local_tag.clone(),
                remote_tag: msg.header("from").and_then(extract_tag),
                remote_uri: caller.clone(),
                invite_request: Some(msg.clone()),
            },
        );
        self.call_id_index.insert(call_id, handle);

        let ringing = build_response(&msg, 180, "Ringing", Some(&local_tag), Some(&self.from_uri()), "");
        let _ = self.send_raw(&ringing).await;

        let handler = self.incoming_handler.read().clone();
        if let Some(handler) = handler {
            handler(handle, caller);
        }
        self.emit_state(handle, CallState::Ringing);
    }

    async fn handle_bye(&self, msg: ParsedMessage) {
        let ok = build_response(&msg, 200, "OK", None, None, "");
        let _ = self.send_raw(&ok).await;
        let Some(handle) = msg.call_id().and_then(|id| self.call_id_index.get(id).map(|r| *r))
        else {
            return;
        };
        self.end_call(handle, EndCause::Normal);
    }

    async fn handle_cancel(&self, msg: ParsedMessage) {
        let ok = build_response(&msg, 200, "OK", None, None, "");
        let _ = self.send_raw(&ok).await;
        let Some(handle) = msg.call_id().and_then(|id| self.call_id_index.get(id).map(|r| *r))
        else {
            return;
        };
        self.end_call(handle, EndCause::NoAnswer);
    }

    fn handle_ack(&self, msg: ParsedMessage) {
        let Some(handle) = msg.call_id().and_then(|id| self.call_id_index.get(id).map(|r| *r))
        else {
            return;
        };
        self.set_state(handle, CallState::Connected);
    }

    async fn handle_incoming_response(&self, msg: ParsedMessage) {
        let Some(call_id) = msg.call_id().map(str::to_string) else {
            return;
        };
        let key = format!("{}:{}", call_id, msg.cseq_method().unwrap_or_default());
        if let Some((_, tx)) = self.pending.remove(&key) {
            let _ = tx.send(msg);
            return;
        }
        if let Some(handle) = self.call_id_index.get(&call_id).map(|r| *r) {
            self.handle_call_response(handle, &msg);
        }
    }

    fn handle_call_response(&self, handle: CallHandle, msg: &ParsedMessage) {
        if msg.cseq_method() != Some("INVITE") {
            return;
        }
        let status = msg.status_code.unwrap_or(0);
        match status {
            183 => self.set_state(handle, CallState::EarlyMedia),
            100..=199 => self.set_state(handle, CallState::Ringing),
            200..=299 => {
                if let Some(mut ctx) = self.calls.get_mut(&handle) {
                    ctx.remote_tag = msg.to_tag();
                }
                self.send_ack(handle);
                self.set_state(handle, CallState::Answered);
                self.set_state(handle, CallState::Connected);
            }
            486 | 600 => self.end_call(handle, EndCause::Busy),
            408 | 480 => self.end_call(handle, EndCause::NoAnswer),
            _ if status >= 400 => self.end_call(handle, EndCause::NetworkError),
            _ => {}
        }
    }

    fn send_ack(&self, handle: CallHandle) {
        let Some(ctx) = self.calls.get(&handle) else {
            return;
        };
        let request = build_request(&RequestParams {
            method: Method::Ack,
            request_uri: &ctx.remote_uri,
            from_uri: &self.from_uri(),
            from_tag: &ctx.local_tag,
            to_uri: &ctx.remote_uri,
            to_tag: ctx.remote_tag.as_deref(),
            call_id: &ctx.sip_call_id,
            cseq: self.next_cseq(),
            via_branch: &new_branch(),
            local_addr: &self.local_addr,
            contact: &self.from_uri(),
            extra_headers: &[],
            body: "",
        });
        drop(ctx);
        let socket = self.socket.clone();
        let server_addr = self.server_addr;
        tokio::spawn(async move {
            let _ = socket.send_to(request.as_bytes(), server_addr).await;
        });
    }

    fn emit_state(&self, handle: CallHandle, state: CallState) {
        let handler = self.state_handler.read().clone();
        if let Some(handler) = handler {
            handler(handle, state);
        }
    }

    fn set_state(&self, handle: CallHandle, state: CallState) {
        if let Some(mut ctx) = self.calls.get_mut(&handle) {
            ctx.state = state;
        }
        self.emit_state(handle, state);
    }

    fn end_call(&self, handle: CallHandle, cause: EndCause) {
        self.set_state(handle, CallState::Ended(cause));
        if let Some((_, ctx)) = self.calls.remove(&handle) {
            self.call_id_index.remove(&ctx.sip_call_id);
        }
    }

    async fn send_and_wait(
        &self,
        call_id: &str,
        method_name: &str,
        request: String,
    ) -> SignalingResult<ParsedMessage> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .insert(format!("{call_id}:{method_name}"), tx);
        self.send_raw(&request).await?;
        tokio::time::timeout(self.config.registration_timeout, rx)
            .await
            .map_err(|_| SignalingError::RegistrationFailed {
                reason: "timed out waiting for response".to_string(),
            })?
            .map_err(|_| SignalingError::RegistrationFailed {
                reason: "response channel closed".to_string(),
            })
    }
}

fn extract_tag(header_value: &str) -> Option<String> {
    header_value
        .split(';')
        .find_map(|part| part.trim().strip_prefix("tag="))
        .map(|s| s.trim_matches('"').to_string())
}

#[async_trait]
impl SignalingClient for SipSignalingClient {
    async fn register(&self) -> SignalingResult<()> {
        let call_id = Uuid::new_v4().to_string();
        let from_tag = new_tag();
        let to_uri = self.from_uri();
        let contact = format!("sip:{}@{}", self.config.user, self.local_addr);
        let request_uri = format!("sip:{}", self.config.server_host);

        let initial = build_request(&RequestParams {
            method: Method::Register,
            request_uri: &request_uri,
            from_uri: &to_uri,
            from_tag: &from_tag,
            to_uri: &to_uri,
            to_tag: None,
            call_id: &call_id,
            cseq: self.next_cseq(),
            via_branch: &new_branch(),
            local_addr: &self.local_addr,
            contact: &contact,
            extra_headers: &[(
                "Expires".to_string(),
                self.config.register_interval.as_secs().to_string(),
            )],
            body: "",
        });

        let response = self
            .send_and_wait(&call_id, "REGISTER", initial)
            .await?;

        let response = match response.status_code {
            Some(200) => response,
            Some(401) | Some(407) => {
                let challenge = response
                    .header("www-authenticate")
                    .or_else(|| response.header("proxy-authenticate"))
                    .ok_or_else(|| SignalingError::RegistrationFailed {
                        reason: "challenge missing WWW-Authenticate".to_string(),
                    })?;
                let realm = extract_quoted(challenge, "realm").unwrap_or_default();
                let nonce = extract_quoted(challenge, "nonce").unwrap_or_default();
                let digest_response = compute_response(
                    &self.config.user,
                    &realm,
                    &self.config.credential.0,
                    "REGISTER",
                    &request_uri,
                    &nonce,
                );
                let auth_header = format!(
                    "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
                    self.config.user, realm, nonce, request_uri, digest_response
                );
                let authed = build_request(&RequestParams {
                    method: Method::Register,
                    request_uri: &request_uri,
                    from_uri: &to_uri,
                    from_tag: &from_tag,
                    to_uri: &to_uri,
                    to_tag: None,
                    call_id: &call_id,
                    cseq: self.next_cseq(),
                    via_branch: &new_branch(),
                    local_addr: &self.local_addr,
                    contact: &contact,
                    extra_headers: &[("Authorization".to_string(), auth_header)],
                    body: "",
                });
                self.send_and_wait(&call_id, "REGISTER", authed).await?
            }
            other => {
                return Err(SignalingError::RegistrationFailed {
                    reason: format!("unexpected status {other:?}"),
                })
            }
        };

        match response.status_code {
            Some(200) => {
                self.registered.store(true, Ordering::SeqCst);
                info!("sip registration succeeded");
                Ok(())
            }
            other => Err(SignalingError::RegistrationFailed {
                reason: format!("registrar returned {other:?}"),
            }),
        }
    }

    async fn place_call(&self, destination: &str) -> SignalingResult<CallHandle> {
        if self.calls.iter().any(|c| c.direction == Direction::Outbound) {
            return Err(SignalingError::Busy);
        }
        let handle = Uuid::new_v4();
        let sip_call_id = Uuid::new_v4().to_string();
        let local_tag = new_tag();
        let request_uri = if destination.starts_with("sip:") {
            destination.to_string()
        } else {
            format!("sip:{}@{}", destination, self.config.server_host)
        };

        self.calls.insert(
            handle,
            CallContext {
                handle,
                direction: Direction::Outbound,
                state: CallState::Initiating,
                sip_call_id: sip_call_id.clone(),
                local_tag: local_tag.clone(),
                remote_tag: None,
                remote_uri: request_uri.clone(),
                invite_request: None,
            },
        );
        self.call_id_index.insert(sip_call_id.clone(), handle);
        self.emit_state(handle, CallState::Initiating);

        let invite = build_request(&RequestParams {
            method: Method::Invite,
            request_uri: &request_uri,
            from_uri: &self.from_uri(),
            from_tag: &local_tag,
            to_uri: &request_uri,
            to_tag: None,
            call_id: &sip_call_id,
            cseq: self.next_cseq(),
            via_branch: &new_branch(),
            local_addr: &self.local_addr,
            contact: &self.from_uri(),
            extra_headers: &[],
            body: "",
        });
        self.send_raw(&invite).await?;
        Ok(handle)
    }

    async fn answer(&self, call: CallHandle) -> SignalingResult<()> {
        let ctx = self.calls.get(&call).ok_or(SignalingError::NotFound)?;
        if ctx.direction != Direction::Inbound {
            return Err(SignalingError::NotFound);
        }
        let invite = ctx
            .invite_request
            .clone()
            .ok_or(SignalingError::NotFound)?;
        let local_tag = ctx.local_tag.clone();
        drop(ctx);
        let ok = build_response(&invite, 200, "OK", Some(&local_tag), Some(&self.from_uri()), "");
        self.send_raw(&ok).await?;
        self.set_state(call, CallState::Answered);
        Ok(())
    }

    async fn reject(&self, call: CallHandle) -> SignalingResult<()> {
        self.calls.get(&call).ok_or(SignalingError::NotFound)?;
        self.end_call(call, EndCause::Rejected);
        Ok(())
    }

    async fn hangup(&self, call: CallHandle) -> SignalingResult<()> {
        let ctx = self.calls.get(&call).ok_or(SignalingError::NotFound)?;
        let bye = build_request(&RequestParams {
            method: Method::Bye,
            request_uri: &ctx.remote_uri,
            from_uri: &self.from_uri(),
            from_tag: &ctx.local_tag,
            to_uri: &ctx.remote_uri,
            to_tag: ctx.remote_tag.as_deref(),
            call_id: &ctx.sip_call_id,
            cseq: self.next_cseq(),
            via_branch: &new_branch(),
            local_addr: &self.local_addr,
            contact: &self.from_uri(),
            extra_headers: &[],
            body: "",
        });
        drop(ctx);
        self.send_raw(&bye).await?;
        self.end_call(call, EndCause::Normal);
        Ok(())
    }

    fn on_incoming(&self, handler: IncomingHandler) {
        *self.incoming_handler.write() = Some(Arc::new(handler));
    }

    fn on_call_state(&self, handler: CallStateHandler) {
        *self.state_handler.write() = Some(Arc::new(handler));
    }

    async fn shutdown(&self) -> SignalingResult<()> {
        let handles: Vec<CallHandle> = self.calls.iter().map(|c| *c.key()).collect();
        for handle in handles {
            let _ = self.hangup(handle).await;
        }
        self.registered.store(false, Ordering::SeqCst);
        if let Some(task) = self.recv_task.lock().unwrap().take() {
            task.abort();
        }
        Ok(())
    }
}

fn extract_quoted(header: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=\"");
    let start = header.find(&needle)? + needle.len();
    let rest = &header[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}
