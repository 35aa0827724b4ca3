//! Socket Ingress: a non-blocking UDP receive worker that filters by RTP
//! payload type and hands matching datagrams to the Streaming Source under
//! a back-pressure rule that never blocks the producer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, warn};

use crate::datagram::{fill_streaming_buffer, StreamingBufferPool, BACKPRESSURE_WATERMARK_BYTES, DATAGRAM_MAX};
use crate::error::{PixelPilotError, Result};
use crate::source::StreamingSource;

const RECV_BUFFER_BYTES: usize = 8 * 1024 * 1024;
const EMPTY_RECV_SLEEP: Duration = Duration::from_millis(1);

/// Observability counters — exposed read-only so tests (and operators) can
/// see the drop policy acting without instrumenting the hot path.
#[derive(Default)]
pub struct IngestStats {
    pub datagrams_received: AtomicU64,
    pub datagrams_dropped_zero_len: AtomicU64,
    pub datagrams_dropped_filter: AtomicU64,
    pub datagrams_dropped_backpressure: AtomicU64,
    pub datagrams_pushed: AtomicU64,
}

/// Returns whether `datagram`'s RTP payload-type byte matches `expected_pt`.
/// `expected_pt < 0` accepts everything (filter disabled).
pub fn payload_type_matches(datagram: &[u8], expected_pt: i32) -> bool {
    if expected_pt < 0 {
        return true;
    }
    if datagram.len() < 2 {
        return false;
    }
    (datagram[1] & 0x7F) as i32 == expected_pt
}

/// Bumps the calling thread's scheduling priority to real-time
/// round-robin with a small bump; falls back to a best-effort niceness
/// bump on failure. Never returns an error — this is advisory.
fn raise_priority() {
    unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = 10;
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_RR, &param);
        if rc == 0 {
            debug!("socket ingress thread raised to SCHED_RR priority 10");
            return;
        }
        // Fallback: best-effort niceness bump (more negative = higher priority).
        if libc::setpriority(libc::PRIO_PROCESS as u32, 0, -10) != 0 {
            warn!("failed to raise socket ingress thread priority (RR and nice both failed)");
        } else {
            debug!("socket ingress thread fell back to nice(-10)");
        }
    }
}

pub struct SocketIngress {
    stop: Arc<AtomicBool>,
    socket: Socket,
    handle: Option<JoinHandle<()>>,
}

impl SocketIngress {
    /// Bind, configure, and spawn the receive worker.
    pub fn start(
        port: u16,
        expected_pt: i32,
        source: Arc<StreamingSource>,
        pool: Arc<StreamingBufferPool>,
        stats: Arc<IngestStats>,
    ) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| PixelPilotError::SocketSetup(format!("socket(): {e}")))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| PixelPilotError::SocketSetup(format!("SO_REUSEADDR: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| PixelPilotError::SocketSetup(format!("O_NONBLOCK: {e}")))?;
        let _ = socket.set_recv_buffer_size(RECV_BUFFER_BYTES);

        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        socket
            .bind(&SockAddr::from(addr))
            .map_err(|e| PixelPilotError::SocketSetup(format!("bind: {e}")))?;

        let worker_socket = socket
            .try_clone()
            .map_err(|e| PixelPilotError::SocketSetup(format!("try_clone: {e}")))?;
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name("socket-ingress".into())
            .spawn(move || {
                raise_priority();
                receive_loop(worker_socket, worker_stop, expected_pt, source, pool, stats);
            })
            .map_err(|e| PixelPilotError::ThreadSpawn(format!("socket ingress: {e}")))?;

        Ok(Self { stop, socket, handle: Some(handle) })
    }

    /// Signal the worker to stop, unblock any pending syscall, and join.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Half-close to kick the worker off a blocking syscall, if any.
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SocketIngress {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(
    socket: Socket,
    stop: Arc<AtomicBool>,
    expected_pt: i32,
    source: Arc<StreamingSource>,
    pool: Arc<StreamingBufferPool>,
    stats: Arc<IngestStats>,
) {
    let mut scratch = [std::mem::MaybeUninit::<u8>::uninit(); DATAGRAM_MAX];

    while !stop.load(Ordering::SeqCst) {
        match socket.recv(&mut scratch) {
            Ok(len) => {
                // Safety: `recv` initialized exactly `len` bytes.
                let datagram: &[u8] =
                    unsafe { std::slice::from_raw_parts(scratch.as_ptr() as *const u8, len) };
                handle_datagram(datagram, expected_pt, &source, &pool, &stats);
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                std::thread::sleep(EMPTY_RECV_SLEEP);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                continue;
            }
            Err(e) => {
                // Transient kernel error: log and keep ingesting.
                debug!(error = %e, "socket recv error, continuing");
                std::thread::sleep(EMPTY_RECV_SLEEP);
            }
        }
    }
}

fn handle_datagram(
    datagram: &[u8],
    expected_pt: i32,
    source: &StreamingSource,
    pool: &StreamingBufferPool,
    stats: &IngestStats,
) {
    stats.datagrams_received.fetch_add(1, Ordering::Relaxed);

    if datagram.is_empty() {
        stats.datagrams_dropped_zero_len.fetch_add(1, Ordering::Relaxed);
        return;
    }

    if !payload_type_matches(datagram, expected_pt) {
        stats.datagrams_dropped_filter.fetch_add(1, Ordering::Relaxed);
        return;
    }

    if source.current_level_bytes() > BACKPRESSURE_WATERMARK_BYTES {
        stats.datagrams_dropped_backpressure.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let buffer = fill_streaming_buffer(pool, datagram);
    match source.push(buffer) {
        Ok(_) => {
            stats.datagrams_pushed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            debug!(?e, "streaming source push returned non-OK, datagram leaked upstream");
        }
    }
}
