//! Channel and subsystem negotiation on the device side.
//!
//! After the manager authenticates, it opens a `session` channel and asks
//! for the `netconf` subsystem on it. [`SubsystemNegotiator`] decides the
//! reply to every channel-open and channel request the manager sends, and
//! reports the outcome once the negotiation is settled. It performs no I/O.

use russh::{ChannelId, ChannelOpenFailure};

use crate::error::NegotiationError;
use crate::transport::ssh::NETCONF_SUBSYSTEM;

/// The channel type NETCONF sessions run on.
pub const SESSION_CHANNEL: &str = "session";

/// Reply to a channel-open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDecision {
    /// Confirm the channel.
    Accept,
    /// Refuse the channel.
    Reject {
        /// Reason code for the refusal.
        reason: ChannelOpenFailure,
        /// Human-readable description.
        message: &'static str,
    },
}

/// Reply to a channel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestReply {
    /// `SSH_MSG_CHANNEL_SUCCESS`.
    Success,
    /// `SSH_MSG_CHANNEL_FAILURE`.
    Failure,
}

/// A request received on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRequest<'a> {
    /// `subsystem` with the requested name.
    Subsystem(&'a str),
    /// Any other request type (`exec`, `shell`, `env`, `pty-req`, ...).
    Other(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State<C> {
    AwaitingChannel,
    AwaitingSubsystem(C),
    Ready(C),
    Failed(NegotiationError),
}

/// Device-side state machine for the netconf subsystem handshake.
///
/// `C` identifies channels; the SSH adapter uses russh's [`ChannelId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemNegotiator<C = ChannelId> {
    state: State<C>,
}

impl<C: Copy + Eq> Default for SubsystemNegotiator<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Copy + Eq> SubsystemNegotiator<C> {
    /// A negotiator waiting for the first session channel.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::AwaitingChannel,
        }
    }

    /// Decide on a channel-open request of type `kind`.
    ///
    /// Exactly one session channel is accepted; other types never are.
    pub fn on_channel_open(&mut self, id: C, kind: &str) -> ChannelDecision {
        if kind != SESSION_CHANNEL {
            return ChannelDecision::Reject {
                reason: ChannelOpenFailure::UnknownChannelType,
                message: "unknown channel type",
            };
        }
        match self.state {
            State::AwaitingChannel => {
                self.state = State::AwaitingSubsystem(id);
                ChannelDecision::Accept
            }
            _ => ChannelDecision::Reject {
                reason: ChannelOpenFailure::AdministrativelyProhibited,
                message: "only one session channel is allowed",
            },
        }
    }

    /// Decide on a request received on channel `id`.
    pub fn on_request(&mut self, id: C, request: ChannelRequest<'_>) -> RequestReply {
        match (&self.state, request) {
            (State::AwaitingSubsystem(channel), ChannelRequest::Subsystem(NETCONF_SUBSYSTEM))
                if *channel == id =>
            {
                self.state = State::Ready(id);
                RequestReply::Success
            }
            _ => RequestReply::Failure,
        }
    }

    /// Channel `id` closed or reached EOF; no more requests will arrive on it.
    pub fn on_requests_exhausted(&mut self, id: C) {
        if matches!(self.state, State::AwaitingSubsystem(channel) if channel == id) {
            self.state = State::Failed(NegotiationError::SubsystemNotRequested);
        }
    }

    /// Whether the negotiation has reached a final state.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self.state, State::Ready(_) | State::Failed(_))
    }

    /// The negotiated channel, or why there is none.
    ///
    /// Called before the negotiation settled, this reports what is missing
    /// so far, which is the outcome when the SSH session ends at that point.
    pub fn finish(&self) -> Result<C, NegotiationError> {
        match &self.state {
            State::Ready(channel) => Ok(*channel),
            State::AwaitingChannel => Err(NegotiationError::NoSessionChannel),
            State::AwaitingSubsystem(_) => Err(NegotiationError::SubsystemNotRequested),
            State::Failed(e) => Err(e.clone()),
        }
    }
}
