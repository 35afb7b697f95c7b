use log::{debug, info};
use thiserror::Error;

use crate::messages::{Arrival, PeerKind, PresenceEvent, PushOutcome, WaitOutcome};
use crate::presence::{DevicePresenceMachine, DevicePresenceState};
use crate::readiness::{ClientReadinessMachine, ClientReadinessState};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("push rejected by peer: {0}")]
    Rejected(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Pushes an opaque payload to the peer behind the current session.
///
/// May block, but must eventually return.
pub trait Transport: Send + Sync {
    fn send(&self, payload: &[u8]) -> Result<(), TransportError>;
}

/// Callback surface the discovery side drives from its own thread.
pub trait PresenceListener: Send + Sync {
    fn on_event(&self, event: PresenceEvent);
}

/// Binds device presence and client readiness into the blocking operations
/// the push worker needs.
///
/// The two machines are never locked together across a wait. Event delivery
/// updates presence, releases, then updates readiness; the push path only
/// peeks at readiness while holding presence and releases both before blocking.
pub struct RendezvousCoordinator {
    presence: DevicePresenceMachine,
    client: ClientReadinessMachine,
    transport: Box<dyn Transport>,
}

impl RendezvousCoordinator {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        RendezvousCoordinator {
            presence: DevicePresenceMachine::new(),
            client: ClientReadinessMachine::new(),
            transport,
        }
    }

    pub fn presence_state(&self) -> DevicePresenceState {
        self.presence.state()
    }

    pub fn client_state(&self) -> ClientReadinessState {
        self.client.state()
    }

    /// A peer-to-peer device came into range.
    pub fn on_arrival(&self) {
        self.on_arrival_of(PeerKind::PeerToPeer);
    }

    /// Tags and readers only update presence; no outbound session exists for them.
    /// An arrival without a kind is dropped.
    pub fn on_arrival_of(&self, kind: PeerKind) {
        if kind == PeerKind::None {
            debug!("Ignoring arrival with no peer kind");
            return;
        }
        info!("Device arrival ({kind:?})");
        self.presence.on_arrival(kind);
        if kind == PeerKind::PeerToPeer {
            self.client.on_arrival();
        }
    }

    pub fn on_departure(&self) {
        info!("Device departure");
        self.presence.on_departure();
        self.client.on_departure();
    }

    pub fn wait_for_arrival(&self) -> Arrival {
        self.presence.request_wait_arrival()
    }

    pub fn wait_for_client_ready(&self) -> WaitOutcome {
        self.client.request_ready()
    }

    pub fn wait_for_departure(&self) -> WaitOutcome {
        self.presence.request_wait_departure()
    }

    /// Sends `payload` once the session is usable, then waits for the session
    /// to be released so the next push never lands in the same session.
    ///
    /// Exactly one transport attempt is made. A failed attempt returns right
    /// away with the session left as is.
    ///
    /// Once the transport has accepted the payload the result is `Sent`, even
    /// if cancellation interrupts the wait for the session release. Callers see
    /// the shutdown on their next wait, which returns cancelled immediately.
    pub fn push_when_ready(&self, payload: &[u8]) -> Result<PushOutcome, TransportError> {
        let gate = self.presence.inspect(|presence, _| match self.client.state() {
            ClientReadinessState::Ready => Gate::Send,
            ClientReadinessState::Exiting => Gate::Cancelled,
            _ => match presence {
                DevicePresenceState::Exiting => Gate::Cancelled,
                DevicePresenceState::Present | DevicePresenceState::WaitingDeparture => Gate::Wait,
                _ => Gate::PeerLost,
            },
        });

        match gate {
            Gate::Cancelled => return Ok(PushOutcome::Cancelled),
            Gate::PeerLost => {
                debug!("Peer left before the session opened");
                return Ok(PushOutcome::PeerLost);
            }
            Gate::Wait => {
                debug!("Waiting for client session");
                if self.client.request_ready().is_cancelled() {
                    return Ok(PushOutcome::Cancelled);
                }
            }
            Gate::Send => {}
        }

        debug!("Pushing {} bytes", payload.len());
        self.transport.send(payload)?;
        info!("Push delivered ({} bytes)", payload.len());

        if self.client.request_off().is_cancelled() {
            debug!("Cancelled while waiting for session release");
        }
        Ok(PushOutcome::Sent)
    }

    pub fn cancel(&self) {
        self.presence.cancel();
        self.client.cancel();
    }
}

enum Gate {
    Send,
    Wait,
    PeerLost,
    Cancelled,
}

impl PresenceListener for RendezvousCoordinator {
    fn on_event(&self, event: PresenceEvent) {
        match event {
            PresenceEvent::Arrival(kind) => self.on_arrival_of(kind),
            PresenceEvent::Departure => self.on_departure(),
        }
    }
}
