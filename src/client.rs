//! Synchronous client library.
//!
//! Each request picks the next replica round-robin, sends a single tagged
//! message, and blocks for exactly one tagless reply on the same connection.
//! Gets are deliberately best-effort: they read whichever replica answers and
//! may observe a stale value. Transport and decode failures surface as
//! `ServerError`, matching the daemon's own catch-all.

use std::collections::HashMap;
use std::net::TcpStream;

use bytes::Bytes;

use crate::membership::Membership;
use crate::messages::{ClientGet, ClientPut, GetResponse, Message, PutResponse, ReturnCode};
use crate::network::tcp::{read_frame, write_frame};

pub struct Client {
    id: u64,
    members: Membership,
    reqno: usize,
    conns: HashMap<u64, TcpStream>,
}

impl Client {
    pub fn new(members: Membership) -> Client {
        // A random identity keeps concurrent clients' replies apart; replica
        // ids all carry zeroed low halves, so collision with a replica would
        // take a remarkably unlucky draw.
        let uuid = uuid::Uuid::new_v4();
        let mut id = [0u8; 8];
        id.copy_from_slice(&uuid.as_bytes()[..8]);
        Client {
            id: u64::from_be_bytes(id),
            members,
            reqno: 0,
            conns: HashMap::new(),
        }
    }

    fn pick(&mut self) -> u64 {
        let member = self.members.members()[self.reqno % self.members.members().len()];
        self.reqno += 1;
        member.id
    }

    // One request, one reply. Any failure tears down the cached connection so
    // the next request redials.
    fn request(&mut self, replica: u64, msg: &Message) -> Option<Vec<u8>> {
        if !self.conns.contains_key(&replica) {
            let addr = self.members.addr_of(replica)?;
            let stream = TcpStream::connect(addr).ok()?;
            self.conns.insert(replica, stream);
        }

        let id = self.id;
        let result = self.conns.get_mut(&replica).and_then(|stream| {
            write_frame(stream, id, &msg.encode()).ok()?;
            let (_from, payload) = read_frame(stream).ok()?;
            Some(payload)
        });
        if result.is_none() {
            self.conns.remove(&replica);
        }
        result
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> ReturnCode {
        let replica = self.pick();
        let msg = Message::ClientPut(ClientPut {
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value),
        });
        match self.request(replica, &msg) {
            None => ReturnCode::ServerError,
            Some(payload) => match PutResponse::decode(&payload) {
                Ok(resp) => resp.code,
                Err(_) => ReturnCode::ServerError,
            },
        }
    }

    pub fn get(&mut self, key: &[u8]) -> (ReturnCode, Option<Bytes>) {
        let replica = self.pick();
        let msg = Message::ClientGet(ClientGet {
            key: Bytes::copy_from_slice(key),
        });
        match self.request(replica, &msg) {
            None => (ReturnCode::ServerError, None),
            Some(payload) => match GetResponse::decode(&payload) {
                Ok(resp) if resp.code == ReturnCode::Success => (resp.code, Some(resp.value)),
                Ok(resp) => (resp.code, None),
                Err(_) => (ReturnCode::ServerError, None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_covers_the_cluster() {
        let members = Membership::standard();
        let mut c = Client::new(members.clone());
        let picks: Vec<u64> = (0..10).map(|_| c.pick()).collect();
        assert_eq!(&picks[..5], &members.ids()[..]);
        assert_eq!(&picks[5..], &members.ids()[..]);
    }

    #[test]
    fn distinct_clients_distinct_ids() {
        let a = Client::new(Membership::standard());
        let b = Client::new(Membership::standard());
        assert_ne!(a.id, b.id);
    }
}
