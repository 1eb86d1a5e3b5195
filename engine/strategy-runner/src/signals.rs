//! Bridge from OS signals to the event loop
//!
//! A background thread waits on SIGINT and SIGTERM and forwards each delivery through
//! the loop's notifier, where the registered signal callbacks run on the loop thread.

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::thread::{self, JoinHandle};
use strategy_scheduler::LoopNotifier;
use tracing::{debug, error, info};

/// Running signal forwarder; closing it (or dropping it) stops the thread
pub struct SignalBridge {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

/// Setup signal handlers that forward into `notifier`
pub fn setup_signal_handlers(notifier: LoopNotifier) -> Result<SignalBridge> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("signal-bridge".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                info!("Signal {} received, forwarding to event loop", signal);
                notifier.deliver_signal(signal);
            }
            debug!("Signal bridge stopped");
        })
        .context("Failed to spawn signal bridge thread")?;

    Ok(SignalBridge { handle, thread: Some(thread) })
}

impl SignalBridge {
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Signal bridge thread panicked");
            }
        }
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
