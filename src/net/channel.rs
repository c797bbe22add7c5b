//! Remote call channel
//!
//! Server calls are described by a [`CallDescriptor`] that bundles the
//! validation predicate with the body. The channel always validates first; a
//! rejected call is dropped without any state change or reply.

use std::collections::HashMap;

use tracing::debug;

use crate::game::entity::PeerId;
use crate::util::rate_limit::PeerCallLimiter;

use super::protocol::{Lane, MulticastEvent, NetMessage, ServerCall};

/// Who issued a server call and when it reached the authority
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallContext {
    pub sender: PeerId,
    pub received_at: f64,
}

/// Result of dispatching a server call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Executed,
    Rejected,
}

/// A validated server call on target `T` taking arguments `A`
pub struct CallDescriptor<T, A> {
    pub name: &'static str,
    pub validate: fn(&T, &CallContext, &A) -> bool,
    pub execute: fn(&mut T, &CallContext, A),
}

impl<T, A> CallDescriptor<T, A> {
    pub fn dispatch(&self, target: &mut T, ctx: &CallContext, args: A) -> CallOutcome {
        if !(self.validate)(target, ctx, &args) {
            debug!(call = self.name, sender = %ctx.sender, "Server call failed validation, dropping");
            return CallOutcome::Rejected;
        }
        (self.execute)(target, ctx, args);
        CallOutcome::Executed
    }
}

/// Destination of an outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Server,
    Peer(PeerId),
    AllPeers,
}

/// Message queued by a host until the session flushes it onto the links
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub route: Route,
    pub lane: Lane,
    pub message: NetMessage,
}

/// Per-host outbox plus the authority's per-peer call budgets
pub struct RemoteCallChannel {
    local: PeerId,
    outbox: Vec<Outgoing>,
    limiters: HashMap<PeerId, PeerCallLimiter>,
    calls_per_second: u32,
    calls_sent: u64,
    calls_rejected: u64,
}

impl RemoteCallChannel {
    pub fn new(local: PeerId, calls_per_second: u32) -> Self {
        Self {
            local,
            outbox: Vec::new(),
            limiters: HashMap::new(),
            calls_per_second,
            calls_sent: 0,
            calls_rejected: 0,
        }
    }

    /// Queue a call for the authority
    pub fn send_to_server(&mut self, call: ServerCall) {
        self.calls_sent += 1;
        self.push(
            Route::Server,
            NetMessage::Call {
                sender: self.local,
                call,
            },
        );
    }

    /// Queue an authority notification for every connected peer
    pub fn multicast(&mut self, event: MulticastEvent) {
        self.push(Route::AllPeers, NetMessage::Multicast { event });
    }

    pub fn push(&mut self, route: Route, message: NetMessage) {
        let lane = message.lane();
        self.outbox.push(Outgoing {
            route,
            lane,
            message,
        });
    }

    pub fn drain(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Check the sender's call budget (authority side)
    pub fn admit(&mut self, sender: PeerId) -> bool {
        let calls_per_second = self.calls_per_second;
        let allowed = self
            .limiters
            .entry(sender)
            .or_insert_with(|| PeerCallLimiter::new(calls_per_second))
            .check_call();
        if !allowed {
            self.note_rejected();
        }
        allowed
    }

    pub fn forget_peer(&mut self, peer: PeerId) {
        self.limiters.remove(&peer);
    }

    pub fn note_rejected(&mut self) {
        self.calls_rejected += 1;
    }

    pub fn calls_sent(&self) -> u64 {
        self.calls_sent
    }

    pub fn calls_rejected(&self) -> u64 {
        self.calls_rejected
    }
}
