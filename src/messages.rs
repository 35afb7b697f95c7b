use serde_derive::Deserialize;

/// What kind of device the discovery stack reported.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PeerKind {
    None,
    Tag,
    PeerToPeer,
    Reader,
}

/// A presence change relayed from the event source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceEvent {
    Arrival(PeerKind),
    Departure,
}

/// Result of waiting for a peer to show up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arrival {
    Arrived(PeerKind),
    Cancelled,
}

/// Result of any other blocking wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    Cancelled,
}

impl WaitOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitOutcome::Cancelled)
    }
}

/// Non-error outcomes of a push hand-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// The transport accepted the payload and the session has since closed.
    Sent,
    /// The peer left before a session became usable.
    PeerLost,
    Cancelled,
}
