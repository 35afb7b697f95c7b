use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::messages::{Arrival, PeerKind, WaitOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DevicePresenceState {
    None,
    WaitingArrival,
    Present,
    WaitingDeparture,
    Departed,
    Exiting,
}

#[derive(Debug)]
struct PresenceSlot {
    state: DevicePresenceState,
    kind: PeerKind,
}

/// Tracks whether a peer is in range, and what kind it is.
///
/// State and kind live behind one lock so readers never see a torn pair.
/// Updates coalesce: a waiter only ever observes the latest state.
#[derive(Debug)]
pub struct DevicePresenceMachine {
    slot: Mutex<PresenceSlot>,
    changed: Condvar,
}

impl Default for DevicePresenceMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DevicePresenceMachine {
    pub fn new() -> Self {
        DevicePresenceMachine {
            slot: Mutex::new(PresenceSlot {
                state: DevicePresenceState::None,
                kind: PeerKind::None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn snapshot(&self) -> (DevicePresenceState, PeerKind) {
        let slot = self.slot.lock();
        (slot.state, slot.kind)
    }

    pub fn state(&self) -> DevicePresenceState {
        self.slot.lock().state
    }

    /// Runs `f` with the presence lock held. `f` must not block.
    pub fn inspect<R>(&self, f: impl FnOnce(DevicePresenceState, PeerKind) -> R) -> R {
        let slot = self.slot.lock();
        f(slot.state, slot.kind)
    }

    pub fn on_arrival(&self, kind: PeerKind) -> DevicePresenceState {
        let mut slot = self.slot.lock();
        self.apply_arrival(&mut slot, kind)
    }

    pub fn on_departure(&self) -> DevicePresenceState {
        let mut slot = self.slot.lock();
        self.apply_departure(&mut slot)
    }

    fn apply_arrival(&self, slot: &mut PresenceSlot, kind: PeerKind) -> DevicePresenceState {
        use DevicePresenceState::*;

        slot.kind = kind;
        let previous = slot.state;
        match previous {
            None | Departed | WaitingArrival | WaitingDeparture => slot.state = Present,
            Present | Exiting => {}
        }
        // A waiter may be parked even after a departure reset WaitingArrival
        // to None, so every entry into Present wakes.
        if previous != Present && slot.state == Present {
            self.changed.notify_all();
        }
        debug!("presence: arrival ({kind:?}) {previous:?} -> {:?}", slot.state);
        slot.state
    }

    fn apply_departure(&self, slot: &mut PresenceSlot) -> DevicePresenceState {
        use DevicePresenceState::*;

        slot.kind = PeerKind::None;
        let previous = slot.state;
        match previous {
            None | WaitingArrival => slot.state = None,
            Present => slot.state = Departed,
            WaitingDeparture => {
                slot.state = Departed;
                self.changed.notify_all();
            }
            Departed | Exiting => {}
        }
        debug!("presence: departure {previous:?} -> {:?}", slot.state);
        slot.state
    }

    /// Blocks until a peer is present or the machine is cancelled.
    pub fn request_wait_arrival(&self) -> Arrival {
        let mut slot = self.slot.lock();
        loop {
            match slot.state {
                DevicePresenceState::Exiting => return Arrival::Cancelled,
                DevicePresenceState::Present => return Arrival::Arrived(slot.kind),
                DevicePresenceState::WaitingArrival => {}
                other => {
                    debug!("presence: {other:?} -> WaitingArrival");
                    slot.state = DevicePresenceState::WaitingArrival;
                }
            }
            self.changed.wait(&mut slot);
        }
    }

    /// Blocks until the present peer leaves or the machine is cancelled.
    ///
    /// Returns immediately when no peer is present.
    pub fn request_wait_departure(&self) -> WaitOutcome {
        let mut slot = self.slot.lock();
        loop {
            match slot.state {
                DevicePresenceState::Exiting => return WaitOutcome::Cancelled,
                DevicePresenceState::Present => {
                    debug!("presence: Present -> WaitingDeparture");
                    slot.state = DevicePresenceState::WaitingDeparture;
                }
                DevicePresenceState::WaitingDeparture => {}
                _ => return WaitOutcome::Completed,
            }
            self.changed.wait(&mut slot);
        }
    }

    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        debug!("presence: {:?} -> Exiting", slot.state);
        slot.state = DevicePresenceState::Exiting;
        // Wake unconditionally: a parked waiter can outlive its Waiting* state.
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, mpsc};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::coordinator::testing::wait_until;

    fn wait_for_state(machine: &DevicePresenceMachine, expected: DevicePresenceState) {
        wait_until(|| machine.state() == expected);
    }

    fn spawn_arrival_waiter(machine: &Arc<DevicePresenceMachine>) -> mpsc::Receiver<Arrival> {
        let (tx, rx) = mpsc::channel();
        let machine = machine.clone();
        thread::spawn(move || {
            let _ = tx.send(machine.request_wait_arrival());
        });
        rx
    }

    #[test]
    fn test_arrival_table() {
        use DevicePresenceState::*;

        let machine = DevicePresenceMachine::new();
        assert_eq!(machine.on_arrival(PeerKind::PeerToPeer), Present);
        assert_eq!(machine.on_arrival(PeerKind::PeerToPeer), Present);
        assert_eq!(machine.on_departure(), Departed);
        assert_eq!(machine.snapshot(), (Departed, PeerKind::None));
        assert_eq!(machine.on_departure(), Departed);
        assert_eq!(machine.on_arrival(PeerKind::Tag), Present);
        assert_eq!(machine.snapshot(), (Present, PeerKind::Tag));
    }

    #[test]
    fn test_departure_without_arrival_is_noop() {
        let machine = DevicePresenceMachine::new();
        assert_eq!(machine.on_departure(), DevicePresenceState::None);
        assert_eq!(
            machine.snapshot(),
            (DevicePresenceState::None, PeerKind::None)
        );
    }

    #[test]
    fn test_waiter_wakes_on_arrival() {
        let machine = Arc::new(DevicePresenceMachine::new());
        let rx = spawn_arrival_waiter(&machine);
        wait_for_state(&machine, DevicePresenceState::WaitingArrival);

        machine.on_arrival(PeerKind::PeerToPeer);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(Arrival::Arrived(PeerKind::PeerToPeer))
        );
    }

    #[test]
    fn test_present_peer_returns_immediately() {
        let machine = DevicePresenceMachine::new();
        machine.on_arrival(PeerKind::Reader);
        assert_eq!(
            machine.request_wait_arrival(),
            Arrival::Arrived(PeerKind::Reader)
        );
    }

    #[test]
    fn test_cancel_wakes_arrival_waiter() {
        let machine = Arc::new(DevicePresenceMachine::new());
        let rx = spawn_arrival_waiter(&machine);
        wait_for_state(&machine, DevicePresenceState::WaitingArrival);

        machine.cancel();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(Arrival::Cancelled)
        );
    }

    #[test]
    fn test_cancel_wakes_waiter_after_stray_departure() {
        let machine = Arc::new(DevicePresenceMachine::new());
        let rx = spawn_arrival_waiter(&machine);
        wait_for_state(&machine, DevicePresenceState::WaitingArrival);

        // Departure drops WaitingArrival back to None while the waiter stays parked.
        machine.on_departure();
        assert_eq!(machine.state(), DevicePresenceState::None);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        machine.cancel();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(Arrival::Cancelled)
        );
    }

    #[test]
    fn test_coalesced_arrival_is_not_observed() {
        let machine = Arc::new(DevicePresenceMachine::new());
        let rx = spawn_arrival_waiter(&machine);
        wait_for_state(&machine, DevicePresenceState::WaitingArrival);

        // Deliver two arrival/departure pairs before the waiter can re-acquire
        // the lock; it wakes into Departed and re-arms.
        {
            let mut slot = machine.slot.lock();
            for _ in 0..2 {
                machine.apply_arrival(&mut slot, PeerKind::PeerToPeer);
                machine.apply_departure(&mut slot);
            }
            assert_eq!(slot.state, DevicePresenceState::Departed);
        }
        wait_for_state(&machine, DevicePresenceState::WaitingArrival);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        machine.on_arrival(PeerKind::PeerToPeer);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(Arrival::Arrived(PeerKind::PeerToPeer))
        );
    }

    #[test]
    fn test_history_before_wait_is_not_replayed() {
        let machine = DevicePresenceMachine::new();
        machine.on_arrival(PeerKind::PeerToPeer);
        machine.on_departure();

        let machine = Arc::new(machine);
        let rx = spawn_arrival_waiter(&machine);
        wait_for_state(&machine, DevicePresenceState::WaitingArrival);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        machine.cancel();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(Arrival::Cancelled)
        );
    }

    #[test]
    fn test_wait_departure() {
        let machine = Arc::new(DevicePresenceMachine::new());
        assert_eq!(machine.request_wait_departure(), WaitOutcome::Completed);

        machine.on_arrival(PeerKind::PeerToPeer);
        let (tx, rx) = mpsc::channel();
        let waiter = machine.clone();
        thread::spawn(move || {
            let _ = tx.send(waiter.request_wait_departure());
        });
        wait_for_state(&machine, DevicePresenceState::WaitingDeparture);

        // A re-arrival wakes the waiter, which re-arms and keeps waiting.
        machine.on_arrival(PeerKind::PeerToPeer);
        wait_for_state(&machine, DevicePresenceState::WaitingDeparture);
        assert!(rx.try_recv().is_err());

        machine.on_departure();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(WaitOutcome::Completed)
        );
        assert_eq!(machine.state(), DevicePresenceState::Departed);
    }

    #[test]
    fn test_exiting_is_terminal() {
        let machine = DevicePresenceMachine::new();
        machine.cancel();
        machine.cancel();
        assert_eq!(machine.on_arrival(PeerKind::PeerToPeer), DevicePresenceState::Exiting);
        assert_eq!(machine.snapshot().1, PeerKind::PeerToPeer);
        assert_eq!(machine.on_departure(), DevicePresenceState::Exiting);
        assert_eq!(machine.request_wait_arrival(), Arrival::Cancelled);
        assert_eq!(machine.request_wait_departure(), WaitOutcome::Cancelled);
    }

    #[test]
    fn test_cancel_wakes_departure_waiter() {
        let machine = Arc::new(DevicePresenceMachine::new());
        machine.on_arrival(PeerKind::PeerToPeer);
        let (tx, rx) = mpsc::channel();
        let waiter = machine.clone();
        thread::spawn(move || {
            let _ = tx.send(waiter.request_wait_departure());
        });
        wait_for_state(&machine, DevicePresenceState::WaitingDeparture);

        machine.cancel();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(WaitOutcome::Cancelled)
        );
    }
}
