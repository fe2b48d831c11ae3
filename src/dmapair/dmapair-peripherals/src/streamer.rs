use probe_protocol::probe::generate_probe_packet;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dmapair_core::instrument::{DebugLines, Line};
use log::{debug, info, warn};

// Packets buffered between the interrupt side and the TCP thread
const QUEUE_DEPTH: usize = 1024;

/// Debug lines that mirror every edge to a TCP client as probe packets.
///
/// `set` runs inside the interrupt handler, so it never blocks: when the
/// forwarding thread falls behind, edges are dropped and counted.
pub struct ProbeStreamer {
    tx: Sender<[u8; 4]>,
    levels: AtomicU32,
    seq: AtomicU32,
    dropped: AtomicU64,
    local_addr: SocketAddr,
}

// Forwards packets to one client at a time; a new client picks up where the
// previous one left off
fn forward_thread(listener: TcpListener, rx: Receiver<[u8; 4]>) {
    for stream in listener.incoming() {
        match stream {
            Ok(mut client) => {
                info!("Probe client connected: {:?}", client.peer_addr().ok());
                loop {
                    let msg = match rx.recv() {
                        Ok(x) => x,
                        // Streamer dropped
                        _ => return,
                    };
                    if client.write_all(&msg).is_err() {
                        info!("Probe client disconnected");
                        break;
                    }
                }
            }
            Err(e) => warn!("Probe listener accept failed: {}", e),
        };
    }
}

impl ProbeStreamer {
    /// Listen on `addr` and start the forwarding thread
    pub fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = bounded(QUEUE_DEPTH);

        std::thread::spawn(move || forward_thread(listener, rx));
        info!("Streaming debug lines on {}", local_addr);
        Ok(ProbeStreamer {
            tx,
            levels: AtomicU32::new(0),
            seq: AtomicU32::new(0),
            dropped: AtomicU64::new(0),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Edges lost because the forwarding queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl DebugLines for ProbeStreamer {
    fn set(&self, line: Line, level: bool) {
        let bit = 1 << line.index();
        let previous = if level {
            self.levels.fetch_or(bit, Ordering::Relaxed)
        } else {
            self.levels.fetch_and(!bit, Ordering::Relaxed)
        };
        if (previous & bit != 0) == level {
            return;
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let packet = generate_probe_packet(line.index(), level, seq);
        match self.tx.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("Probe queue full, dropping edges");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Probe thread gone, edge on {:?} dropped", line);
            }
        }
    }

    fn get(&self, line: Line) -> bool {
        self.levels.load(Ordering::Relaxed) & (1 << line.index()) != 0
    }
}
