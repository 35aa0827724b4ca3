//! Signal Supervisor: translates process signals into intents the main
//! supervisor loop polls. Signals are blocked in every thread (masked
//! before any worker is spawned) so only this dedicated thread ever
//! receives them via `sigwaitinfo`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::info;

use crate::error::{PixelPilotError, Result};

const HANDLED_SIGNALS: &[libc::c_int] =
    &[libc::SIGINT, libc::SIGTERM, libc::SIGHUP, libc::SIGUSR1, libc::SIGUSR2];

/// Flags set by the Signal Supervisor thread and consumed by the main
/// loop on its polling cadence (≤200 ms).
#[derive(Default)]
pub struct SignalIntents {
    pub exit: AtomicBool,
    pub restart: AtomicBool,
    pub record_enable: AtomicBool,
    pub record_disable: AtomicBool,
}

impl SignalIntents {
    pub fn take_exit(&self) -> bool {
        self.exit.swap(false, Ordering::SeqCst)
    }
    pub fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::SeqCst)
    }
    pub fn take_record_enable(&self) -> bool {
        self.record_enable.swap(false, Ordering::SeqCst)
    }
    pub fn take_record_disable(&self) -> bool {
        self.record_disable.swap(false, Ordering::SeqCst)
    }
}

fn signal_set() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        for &sig in HANDLED_SIGNALS {
            libc::sigaddset(&mut set, sig);
        }
        set
    }
}

/// Block the handled signal set on the calling thread. Must run on the
/// main thread before any worker thread is spawned, since new threads
/// inherit the creating thread's signal mask.
pub fn block_signals() -> Result<()> {
    let set = signal_set();
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(PixelPilotError::ThreadSpawn(format!(
            "pthread_sigmask failed: {}",
            std::io::Error::from_raw_os_error(rc)
        )));
    }
    Ok(())
}

/// Spawn the dedicated signal-waiting thread. Runs for the lifetime of the
/// process; there is no clean shutdown path other than process exit, which
/// matches every other long-lived daemon thread's lifecycle here.
pub fn spawn_signal_supervisor(intents: Arc<SignalIntents>) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("signal-supervisor".into())
        .spawn(move || signal_loop(intents))
        .map_err(|e| PixelPilotError::ThreadSpawn(format!("signal supervisor: {e}")))
}

fn signal_loop(intents: Arc<SignalIntents>) {
    let set = signal_set();
    loop {
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let sig = unsafe { libc::sigwaitinfo(&set, &mut info) };
        if sig < 0 {
            continue; // EINTR or similar; keep waiting.
        }
        match sig {
            libc::SIGINT | libc::SIGTERM => {
                info!(signal = sig, "received exit signal");
                intents.exit.store(true, Ordering::SeqCst);
            }
            libc::SIGHUP => {
                info!("received SIGHUP, requesting restart");
                intents.restart.store(true, Ordering::SeqCst);
            }
            libc::SIGUSR1 => {
                info!("received SIGUSR1, requesting recording enable");
                intents.record_enable.store(true, Ordering::SeqCst);
            }
            libc::SIGUSR2 => {
                info!("received SIGUSR2, requesting recording disable");
                intents.record_disable.store(true, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}
