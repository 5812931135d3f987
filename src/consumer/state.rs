//! Connection lifecycle state machine.

// self
use crate::_prelude::*;

/// Lifecycle state of the broker connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
	/// No connection.
	#[default]
	Disconnected,
	/// Dialing the broker.
	Connecting,
	/// Connected; channel, queue, or bindings not yet established.
	ConnectedNotReady,
	/// Channel and every binding established; deliveries may flow.
	Ready,
	/// Broker denied access; terminal.
	FatalStop,
}
impl ConnectionState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::ConnectedNotReady => "connected_not_ready",
			Self::Ready => "ready",
			Self::FatalStop => "fatal_stop",
		}
	}

	/// Returns true for states no trigger leaves.
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::FatalStop)
	}

	/// Looks up the state `trigger` leads to, or `None` when no edge exists.
	pub fn on(self, trigger: Trigger) -> Option<Self> {
		TRANSITIONS
			.iter()
			.find(|(from, on, _)| *from == self && *on == trigger)
			.map(|(_, _, to)| *to)
	}
}
impl Display for ConnectionState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Lifecycle occurrences that move the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
	/// A connection attempt starts.
	Dial,
	/// The broker accepted the connection.
	Connected,
	/// The broker refused access.
	AccessRefused,
	/// The attempt failed for any other reason.
	DialFailed,
	/// Channel, queue, and all bindings are established.
	ChannelReady,
	/// Channel setup failed; it will be retried on the same connection.
	ChannelInitFailed,
	/// The channel closed asynchronously.
	ChannelClosed,
	/// The connection closed asynchronously.
	ConnectionClosed,
	/// Shutdown was requested.
	Shutdown,
}
impl Trigger {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Dial => "dial",
			Self::Connected => "connected",
			Self::AccessRefused => "access_refused",
			Self::DialFailed => "dial_failed",
			Self::ChannelReady => "channel_ready",
			Self::ChannelInitFailed => "channel_init_failed",
			Self::ChannelClosed => "channel_closed",
			Self::ConnectionClosed => "connection_closed",
			Self::Shutdown => "shutdown",
		}
	}
}
impl Display for Trigger {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Every legal edge of the lifecycle.
pub const TRANSITIONS: &[(ConnectionState, Trigger, ConnectionState)] = {
	use ConnectionState::*;
	use Trigger::*;

	&[
		(Disconnected, Dial, Connecting),
		(Connecting, Connected, ConnectedNotReady),
		(Connecting, AccessRefused, FatalStop),
		(Connecting, DialFailed, Disconnected),
		(ConnectedNotReady, ChannelReady, Ready),
		(ConnectedNotReady, ChannelInitFailed, ConnectedNotReady),
		(Ready, ChannelClosed, ConnectedNotReady),
		(Ready, ConnectionClosed, Disconnected),
		(ConnectedNotReady, ConnectionClosed, Disconnected),
		(Disconnected, Shutdown, Disconnected),
		(Connecting, Shutdown, Disconnected),
		(ConnectedNotReady, Shutdown, Disconnected),
		(Ready, Shutdown, Disconnected),
	]
};

/// One transition, broadcast to subscribers and logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
	/// State before the transition.
	pub from: ConnectionState,
	/// What caused it.
	pub trigger: Trigger,
	/// State after the transition.
	pub to: ConnectionState,
}
impl Display for LifecycleEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} --{}--> {}", self.from, self.trigger, self.to)
	}
}
