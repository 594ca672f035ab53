//! TCP transport.
//!
//! Frames are `u32 length | u64 sender | payload`, the length covering
//! everything after itself. An accept thread hands each inbound connection to
//! a reader thread; readers feed one channel drained by `recv`. The first
//! frame read on a connection registers it under its sender's id, which is how
//! client replies travel back on the client's own connection. Outbound
//! connections to replicas are opened on demand through the address book and
//! also get a reader, so a peer's replies on the same socket are seen. A
//! failed send discards the connection and is otherwise a silent drop.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::data::DataMut;
use crate::membership::Membership;
use crate::messages::{Message, ReturnCode};

use super::{encode_get_response, encode_put_response, Messenger, Network};

const MAX_FRAME: usize = 64 * 1024 * 1024;

pub fn write_frame<W: Write>(w: &mut W, sender: u64, payload: &[u8]) -> io::Result<()> {
    let len = 8 + payload.len();
    if len > MAX_FRAME {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame too large"));
    }
    let mut d = DataMut::with_capacity(4 + len);
    d.put_u32_be(len as u32);
    d.put_u64_be(sender);
    d.put_slice(payload);
    w.write_all(&d.finalize())
}

pub fn read_frame<R: Read>(r: &mut R) -> io::Result<(u64, Vec<u8>)> {
    let mut lenbuf = [0u8; 4];
    r.read_exact(&mut lenbuf)?;
    let len = u32::from_be_bytes(lenbuf) as usize;
    if len < 8 || len > MAX_FRAME {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad frame length"));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let mut sender = [0u8; 8];
    sender.copy_from_slice(&buf[..8]);
    Ok((u64::from_be_bytes(sender), buf.split_off(8)))
}

struct Shared {
    self_id: u64,
    members: Membership,
    conns: Mutex<HashMap<u64, TcpStream>>,
    inbound: channel::Sender<(u64, Vec<u8>)>,
}

pub struct TcpNetwork {
    shared: Arc<Shared>,
    receiver: channel::Receiver<(u64, Vec<u8>)>,
}

impl TcpNetwork {
    /// Binds the address the membership assigns to `self_id` and starts the
    /// accept thread.
    pub fn bind(self_id: u64, members: Membership) -> io::Result<TcpNetwork> {
        let addr = members.addr_of(self_id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "replica id not in membership")
        })?;
        let listener = TcpListener::bind(addr)?;
        let (inbound, receiver) = channel::unbounded();
        let shared = Arc::new(Shared {
            self_id,
            members,
            conns: Mutex::new(HashMap::new()),
            inbound,
        });

        let accept_shared = shared.clone();
        thread::spawn(move || accept_loop(accept_shared, listener));

        Ok(TcpNetwork { shared, receiver })
    }
}

fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let s = shared.clone();
                thread::spawn(move || reader_loop(s, stream));
            }
            Err(e) => warn!("accept failed: {}", e),
        }
    }
}

fn reader_loop(shared: Arc<Shared>, mut stream: TcpStream) {
    let mut registered = None;
    loop {
        match read_frame(&mut stream) {
            Ok((from, payload)) => {
                if registered.is_none() {
                    match stream.try_clone() {
                        Ok(out) => {
                            shared.conns.lock().insert(from, out);
                            registered = Some(from);
                        }
                        Err(e) => warn!("could not register connection from {:016x}: {}", from, e),
                    }
                }
                if shared.inbound.send((from, payload)).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("connection closed: {}", e);
                if let Some(id) = registered {
                    shared.conns.lock().remove(&id);
                }
                return;
            }
        }
    }
}

fn connect(shared: &Arc<Shared>, to: u64) -> Option<TcpStream> {
    let addr = match shared.members.addr_of(to) {
        Some(addr) => addr,
        None => {
            warn!("no route to {:016x}", to);
            return None;
        }
    };
    let stream = match TcpStream::connect(addr) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("could not connect to {:016x} at {}: {}", to, addr, e);
            return None;
        }
    };
    match stream.try_clone() {
        Ok(read_half) => {
            let s = shared.clone();
            thread::spawn(move || reader_loop(s, read_half));
            Some(stream)
        }
        Err(e) => {
            warn!("could not split connection to {:016x}: {}", to, e);
            None
        }
    }
}

fn send_frame(shared: &Arc<Shared>, to: u64, payload: &[u8]) {
    let mut conns = shared.conns.lock();
    if !conns.contains_key(&to) {
        match connect(shared, to) {
            Some(stream) => {
                conns.insert(to, stream);
            }
            None => return,
        }
    }

    let mut failed = false;
    if let Some(stream) = conns.get_mut(&to) {
        if let Err(e) = write_frame(stream, shared.self_id, payload) {
            warn!("send to {:016x} failed: {}", to, e);
            failed = true;
        }
    }
    if failed {
        conns.remove(&to);
    }
}

impl Messenger for TcpNetwork {
    fn send_message(&self, to: u64, msg: &Message) {
        send_frame(&self.shared, to, &msg.encode());
    }

    fn send_put_response(&self, client: u64, code: ReturnCode) {
        send_frame(&self.shared, client, &encode_put_response(code));
    }

    fn send_get_response(&self, client: u64, code: ReturnCode, value: &[u8]) {
        send_frame(&self.shared, client, &encode_get_response(code, value));
    }
}

impl Network for TcpNetwork {
    fn recv(&self, timeout: Duration) -> Option<(u64, Vec<u8>)> {
        self.receiver.recv_timeout(timeout).ok()
    }
}
