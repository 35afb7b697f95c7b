use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::messages::WaitOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientReadinessState {
    WaitingOff,
    Off,
    WaitingReady,
    Ready,
    Exiting,
}

/// Tracks whether an outbound session to the present peer can take a message.
///
/// Guarded independently of presence; the coordinator relays arrival and
/// departure here only after releasing the presence lock.
#[derive(Debug)]
pub struct ClientReadinessMachine {
    state: Mutex<ClientReadinessState>,
    changed: Condvar,
}

impl Default for ClientReadinessMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientReadinessMachine {
    pub fn new() -> Self {
        ClientReadinessMachine {
            state: Mutex::new(ClientReadinessState::Off),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> ClientReadinessState {
        *self.state.lock()
    }

    pub fn on_arrival(&self) -> ClientReadinessState {
        use ClientReadinessState::*;

        let mut state = self.state.lock();
        let previous = *state;
        match previous {
            WaitingOff | WaitingReady => {
                *state = Ready;
                self.changed.notify_all();
            }
            Off => *state = Ready,
            Ready | Exiting => {}
        }
        debug!("client: arrival {previous:?} -> {:?}", *state);
        *state
    }

    pub fn on_departure(&self) -> ClientReadinessState {
        use ClientReadinessState::*;

        let mut state = self.state.lock();
        let previous = *state;
        match previous {
            WaitingOff | WaitingReady => {
                *state = Off;
                self.changed.notify_all();
            }
            Ready => *state = Off,
            Off | Exiting => {}
        }
        debug!("client: departure {previous:?} -> {:?}", *state);
        *state
    }

    /// Blocks until the session is ready or the machine is cancelled.
    pub fn request_ready(&self) -> WaitOutcome {
        self.wait_until(ClientReadinessState::Ready, ClientReadinessState::WaitingReady)
    }

    /// Blocks until the session has been released or the machine is cancelled.
    pub fn request_off(&self) -> WaitOutcome {
        self.wait_until(ClientReadinessState::Off, ClientReadinessState::WaitingOff)
    }

    fn wait_until(
        &self,
        target: ClientReadinessState,
        waiting: ClientReadinessState,
    ) -> WaitOutcome {
        let mut state = self.state.lock();
        loop {
            if *state == ClientReadinessState::Exiting {
                return WaitOutcome::Cancelled;
            }
            if *state == target {
                return WaitOutcome::Completed;
            }
            if *state != waiting {
                debug!("client: {:?} -> {waiting:?}", *state);
                *state = waiting;
            }
            self.changed.wait(&mut state);
        }
    }

    pub fn cancel(&self) {
        let mut state = self.state.lock();
        debug!("client: {:?} -> Exiting", *state);
        *state = ClientReadinessState::Exiting;
        self.changed.notify_all();
    }
}
