use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::types::{
    CallHandle, CallState, CallStateHandler, EndCause, IncomingHandler, SignalingError,
    SignalingResult,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Outbound,
    Inbound,
}

struct ActiveCall {
    handle: CallHandle,
    state: CallState,
    direction: Direction,
}

struct Inner {
    registered: bool,
    active: Option<ActiveCall>,
    incoming_handler: Option<Arc<IncomingHandler>>,
    state_handler: Option<Arc<CallStateHandler>>,
}

/// Deterministic, network-free [`SignalingClient`](crate::SignalingClient)
/// used by the test suite. Real call progress (remote answer, remote
/// hang-up, network failure) is driven explicitly by tests via the
/// `simulate_*` methods rather than by any timer or I/O.
pub struct SimulatedSignalingClient {
    inner: Mutex<Inner>,
}

impl Default for SimulatedSignalingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSignalingClient {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                registered: false,
                active: None,
                incoming_handler: None,
                state_handler: None,
            }),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.inner.lock().registered
    }

    /// The currently active call's handle, if any. Lets a test harness that
    /// didn't itself place the call (e.g. the call manager did) drive
    /// `simulate_remote_answer`/`simulate_remote_hangup` without needing its
    /// own `on_call_state` registration, which would replace the manager's.
    pub fn active_handle(&self) -> Option<CallHandle> {
        self.inner.lock().active.as_ref().map(|a| a.handle)
    }

    fn emit_state(&self, handle: CallHandle, state: CallState) {
        let handler = { self.inner.lock().state_handler.clone() };
        if let Some(handler) = handler {
            handler(handle, state);
        }
    }

    fn set_active_state(&self, handle: CallHandle, state: CallState) {
        {
            let mut inner = self.inner.lock();
            if let Some(active) = inner.active.as_mut() {
                if active.handle == handle {
                    active.state = state;
                }
            }
        }
        self.emit_state(handle, state);
    }

    fn clear_if_matches(&self, handle: CallHandle) {
        let mut inner = self.inner.lock();
        if matches!(&inner.active, Some(a) if a.handle == handle) {
            inner.active = None;
        }
    }

    /// Simulate an inbound call arriving from `caller_id`. Fails with
    /// [`SignalingError::Busy`] if a call is already active.
    pub fn simulate_incoming(&self, caller_id: &str) -> SignalingResult<CallHandle> {
        let handle = Uuid::new_v4();
        {
            let mut inner = self.inner.lock();
            if inner.active.is_some() {
                return Err(SignalingError::Busy);
            }
            inner.active = Some(ActiveCall {
                handle,
                state: CallState::Ringing,
                direction: Direction::Inbound,
            });
        }
        let handler = { self.inner.lock().incoming_handler.clone() };
        if let Some(handler) = handler {
            handler(handle, caller_id.to_string());
        }
        self.emit_state(handle, CallState::Ringing);
        Ok(handle)
    }

    /// Simulate the remote party answering an outbound call this client
    /// placed: `Ringing -> Answered -> Connected`.
    pub fn simulate_remote_answer(&self, handle: CallHandle) -> SignalingResult<()> {
        self.require_active(handle)?;
        self.set_active_state(handle, CallState::Answered);
        self.set_active_state(handle, CallState::Connected);
        Ok(())
    }

    /// Simulate the remote party ending the call, either before or after
    /// answer. Before answer, this is reported as `NoAnswer` (a cancelled or
    /// unanswered ring); after, as a normal hang-up.
    pub fn simulate_remote_hangup(&self, handle: CallHandle) -> SignalingResult<()> {
        let was_answered = {
            let inner = self.inner.lock();
            matches!(&inner.active, Some(a) if a.handle == handle && matches!(a.state, CallState::Answered | CallState::Connected))
        };
        self.require_active(handle)?;
        let cause = if was_answered {
            EndCause::Normal
        } else {
            EndCause::NoAnswer
        };
        self.set_active_state(handle, CallState::Ended(cause));
        self.clear_if_matches(handle);
        Ok(())
    }

    /// Simulate a transport/network failure terminating the call
    /// unconditionally, regardless of its current phase.
    pub fn simulate_network_failure(&self, handle: CallHandle) -> SignalingResult<()> {
        self.require_active(handle)?;
        self.set_active_state(handle, CallState::Ended(EndCause::NetworkError));
        self.clear_if_matches(handle);
        Ok(())
    }

    fn require_active(&self, handle: CallHandle) -> SignalingResult<()> {
        let inner = self.inner.lock();
        match &inner.active {
            Some(a) if a.handle == handle => Ok(()),
            Some(_) => Err(SignalingError::Busy),
            None => Err(SignalingError::NotFound),
        }
    }
}

#[async_trait::async_trait]
impl crate::SignalingClient for SimulatedSignalingClient {
    async fn register(&self) -> SignalingResult<()> {
        self.inner.lock().registered = true;
        Ok(())
    }

    async fn place_call(&self, _destination: &str) -> SignalingResult<CallHandle> {
        let handle = Uuid::new_v4();
        {
            let mut inner = self.inner.lock();
            if inner.active.is_some() {
                return Err(SignalingError::Busy);
            }
            inner.active = Some(ActiveCall {
                handle,
                state: CallState::Initiating,
                direction: Direction::Outbound,
            });
        }
        self.emit_state(handle, CallState::Initiating);
        self.set_active_state(handle, CallState::Ringing);
        Ok(handle)
    }

    async fn answer(&self, call: CallHandle) -> SignalingResult<()> {
        let is_inbound = {
            let inner = self.inner.lock();
            match &inner.active {
                Some(a) if a.handle == call => a.direction == Direction::Inbound,
                Some(_) => return Err(SignalingError::Busy),
                None => return Err(SignalingError::NotFound),
            }
        };
        if !is_inbound {
            return Err(SignalingError::NotFound);
        }
        self.set_active_state(call, CallState::Answered);
        self.set_active_state(call, CallState::Connected);
        Ok(())
    }

    async fn reject(&self, call: CallHandle) -> SignalingResult<()> {
        self.require_active(call)?;
        self.set_active_state(call, CallState::Ended(EndCause::Rejected));
        self.clear_if_matches(call);
        Ok(())
    }

    async fn hangup(&self, call: CallHandle) -> SignalingResult<()> {
        self.require_active(call)?;
        self.set_active_state(call, CallState::Ended(EndCause::Normal));
        self.clear_if_matches(call);
        Ok(())
    }

    fn on_incoming(&self, handler: IncomingHandler) {
        self.inner.lock().incoming_handler = Some(Arc::new(handler));
    }

    fn on_call_state(&self, handler: CallStateHandler) {
        self.inner.lock().state_handler = Some(Arc::new(handler));
    }

    async fn shutdown(&self) -> SignalingResult<()> {
        let active = {
            let mut inner = self.inner.lock();
            inner.registered = false;
            inner.active.take()
        };
        if let Some(active) = active {
            self.emit_state(active.handle, CallState::Ended(EndCause::Normal));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignalingClient;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_place_call_while_busy_fails() {
        let sim = SimulatedSignalingClient::new();
        sim.register().await.unwrap();
        let _first = sim.place_call("+15551234567").await.unwrap();
        let second = sim.place_call("+15559999999").await;
        assert!(matches!(second, Err(SignalingError::Busy)));
    }

    #[tokio::test]
    async fn remote_answer_then_hangup_reports_normal() {
        let sim = SimulatedSignalingClient::new();
        let states = Arc::new(Mutex::new(Vec::new()));
        let s = states.clone();
        sim.on_call_state(Box::new(move |_h, state| s.lock().push(state)));

        let handle = sim.place_call("+15551234567").await.unwrap();
        sim.simulate_remote_answer(handle).unwrap();
        sim.simulate_remote_hangup(handle).unwrap();

        let recorded = states.lock().clone();
        assert_eq!(
            recorded,
            vec![
                CallState::Initiating,
                CallState::Ringing,
                CallState::Answered,
                CallState::Connected,
                CallState::Ended(EndCause::Normal),
            ]
        );
    }

    #[tokio::test]
    async fn incoming_call_invokes_handler_with_caller_id() {
        let sim = SimulatedSignalingClient::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        sim.on_incoming(Box::new(move |_h, caller| {
            assert_eq!(caller, "+15551234567");
            seen2.fetch_add(1, Ordering::SeqCst);
        }));

        sim.simulate_incoming("+15551234567").unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_hangup_before_answer_is_no_answer() {
        let sim = SimulatedSignalingClient::new();
        let handle = sim.simulate_incoming("+15551234567").unwrap();
        let states = Arc::new(Mutex::new(Vec::new()));
        let s = states.clone();
        sim.on_call_state(Box::new(move |_h, state| s.lock().push(state)));

        sim.simulate_remote_hangup(handle).unwrap();
        assert_eq!(
            states.lock().clone(),
            vec![CallState::Ended(EndCause::NoAnswer)]
        );
    }
}
