//! Message transport between replicas and clients.
//!
//! `Messenger` is the narrow send capability handed to the Paxos roles: peer
//! messages addressed by replica id, plus the two tagless client replies.
//! `Network` adds the receive side used by the daemon's message loop. Sends
//! never report failure to the caller; Paxos tolerates lost messages, so a
//! failed send is logged and dropped.

use std::time::Duration;

use crate::data::DataMut;
use crate::messages::{Message, PutResponse, ReturnCode};

pub mod mock;
pub mod tcp;

pub trait Messenger: Send + Sync {
    fn send_message(&self, to: u64, msg: &Message);

    fn send_put_response(&self, client: u64, code: ReturnCode);

    fn send_get_response(&self, client: u64, code: ReturnCode, value: &[u8]);
}

pub trait Network: Messenger {
    /// Waits up to `timeout` for the next inbound frame, returning the
    /// sender's id and the undecoded payload.
    fn recv(&self, timeout: Duration) -> Option<(u64, Vec<u8>)>;
}

pub(crate) fn encode_put_response(code: ReturnCode) -> Vec<u8> {
    PutResponse { code }.encode()
}

pub(crate) fn encode_get_response(code: ReturnCode, value: &[u8]) -> Vec<u8> {
    let mut d = DataMut::with_capacity(1 + 4 + value.len());
    d.put_u8(code.to_u8());
    d.put_prefixed(value);
    d.finalize()
}
