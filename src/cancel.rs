use std::io::BufRead as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::{debug, info};

use crate::coordinator::RendezvousCoordinator;

/// One-shot shutdown trigger shared by every source of a quit request.
pub struct CancellationSignal {
    fired: AtomicBool,
    coordinator: Arc<RendezvousCoordinator>,
}

impl CancellationSignal {
    pub fn new(coordinator: Arc<RendezvousCoordinator>) -> Self {
        CancellationSignal {
            fired: AtomicBool::new(false),
            coordinator,
        }
    }

    /// Cancels the coordinator on the first call. Returns whether this call did it.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            debug!("Cancellation already requested");
            return false;
        }
        info!("Cancellation requested, shutting down");
        self.coordinator.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Fires the signal when a line is entered on stdin.
///
/// Closed stdin (e.g. running detached) never fires.
pub fn spawn_console_trigger(signal: Arc<CancellationSignal>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        println!("... press enter to quit ...");
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => debug!("stdin closed, console quit disabled"),
            Ok(_) => {
                signal.trigger();
            }
            Err(err) => debug!("Error reading stdin: {err:?}"),
        }
    })
}
