//! Bus Monitor: observes the streaming graph's asynchronous message bus and
//! flags the supervisor on error or EOS.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, error};

use crate::error::{PixelPilotError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exit signal shared with the supervisor's `pipeline_stop` wait.
pub struct BusExitSignal {
    pub mutex: Mutex<bool>,
    pub condvar: Condvar,
}

impl Default for BusExitSignal {
    fn default() -> Self {
        Self { mutex: Mutex::new(false), condvar: Condvar::new() }
    }
}

impl BusExitSignal {
    pub fn notify_exited(&self) {
        let mut exited = self.mutex.lock().unwrap();
        *exited = true;
        self.condvar.notify_all();
    }

    /// Wait up to `wait_ms` for the Bus Monitor to signal exit.
    pub fn wait(&self, wait_ms: u64) {
        let guard = self.mutex.lock().unwrap();
        if *guard {
            return;
        }
        let _ = self
            .condvar
            .wait_timeout(guard, Duration::from_millis(wait_ms))
            .unwrap();
    }
}

pub fn spawn(
    bus: gst::Bus,
    stop_requested: Arc<AtomicBool>,
    encountered_error: Arc<AtomicBool>,
    exit_signal: Arc<BusExitSignal>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("bus-monitor".into())
        .spawn(move || run(bus, stop_requested, encountered_error, exit_signal))
        .map_err(|e| PixelPilotError::ThreadSpawn(format!("bus monitor: {e}")))
}

fn run(
    bus: gst::Bus,
    stop_requested: Arc<AtomicBool>,
    encountered_error: Arc<AtomicBool>,
    exit_signal: Arc<BusExitSignal>,
) {
    loop {
        if stop_requested.load(Ordering::SeqCst) {
            break;
        }

        if let Some(msg) = bus.timed_pop(gst::ClockTime::from_mseconds(POLL_INTERVAL.as_millis() as u64)) {
            use gst::MessageView;
            match msg.view() {
                MessageView::Error(e) => {
                    error!(
                        error = %e.error(),
                        debug = e.debug().unwrap_or_default().as_str(),
                        "streaming graph reported an error"
                    );
                    encountered_error.store(true, Ordering::SeqCst);
                    stop_requested.store(true, Ordering::SeqCst);
                    break;
                }
                MessageView::Eos(_) => {
                    debug!("streaming graph reached end-of-stream");
                    stop_requested.store(true, Ordering::SeqCst);
                    break;
                }
                _ => {}
            }
        }
    }

    exit_signal.notify_exited();
}
