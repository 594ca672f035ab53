//! In-process network for tests: a hub routes `(sender, payload)` pairs
//! between registered endpoints over crossbeam channels. Sends to unknown or
//! departed endpoints are dropped silently, mirroring the real transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel;
use parking_lot::Mutex;

use crate::messages::{Message, ReturnCode};

use super::{encode_get_response, encode_put_response, Messenger, Network};

/// A cheaply cloneable handle to the shared routing table.
#[derive(Clone)]
pub struct Hub {
    routes: Arc<Mutex<HashMap<u64, channel::Sender<(u64, Vec<u8>)>>>>,
}

impl Hub {
    pub fn new() -> Hub {
        Hub {
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers (or replaces) the endpoint for `id`.
    pub fn register(&self, id: u64) -> MockNetwork {
        let (sender, receiver) = channel::unbounded();
        self.routes.lock().insert(id, sender);
        MockNetwork {
            id,
            hub: self.clone(),
            receiver,
        }
    }

    pub fn deregister(&self, id: u64) {
        self.routes.lock().remove(&id);
    }

    fn route(&self, from: u64, to: u64, frame: Vec<u8>) {
        if let Some(sender) = self.routes.lock().get(&to) {
            let _ = sender.send((from, frame));
        }
    }
}

impl Default for Hub {
    fn default() -> Hub {
        Hub::new()
    }
}

pub struct MockNetwork {
    id: u64,
    hub: Hub,
    receiver: channel::Receiver<(u64, Vec<u8>)>,
}

impl MockNetwork {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Messenger for MockNetwork {
    fn send_message(&self, to: u64, msg: &Message) {
        self.hub.route(self.id, to, msg.encode());
    }

    fn send_put_response(&self, client: u64, code: ReturnCode) {
        self.hub.route(self.id, client, encode_put_response(code));
    }

    fn send_get_response(&self, client: u64, code: ReturnCode, value: &[u8]) {
        self.hub
            .route(self.id, client, encode_get_response(code, value));
    }
}

impl Network for MockNetwork {
    fn recv(&self, timeout: Duration) -> Option<(u64, Vec<u8>)> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::messages::{ClientGet, PutResponse};

    use super::*;

    #[test]
    fn routes_between_endpoints() {
        let hub = Hub::new();
        let a = hub.register(1);
        let b = hub.register(2);

        let msg = Message::ClientGet(ClientGet {
            key: Bytes::from_static(b"k"),
        });
        a.send_message(2, &msg);

        let (from, frame) = b.recv(Duration::from_secs(1)).unwrap();
        assert_eq!(from, 1);
        assert_eq!(Message::decode(&frame), Ok(msg));
    }

    #[test]
    fn unknown_destination_dropped() {
        let hub = Hub::new();
        let a = hub.register(1);
        a.send_message(99, &Message::ClientGet(ClientGet {
            key: Bytes::from_static(b"k"),
        }));
        assert!(a.recv(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn replies_are_tagless() {
        let hub = Hub::new();
        let server = hub.register(1);
        let client = hub.register(7);

        server.send_put_response(7, ReturnCode::Success);
        let (from, frame) = client.recv(Duration::from_secs(1)).unwrap();
        assert_eq!(from, 1);
        assert_eq!(
            PutResponse::decode(&frame),
            Ok(PutResponse {
                code: ReturnCode::Success
            })
        );
    }
}
