//! End-to-end scenarios: five daemons on mock stores wired through the
//! in-process hub, driven by hub-registered test clients.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;

use pocdb::daemon::{Daemon, ShutdownToken};
use pocdb::membership::Membership;
use pocdb::messages::{ClientGet, ClientPut, GetResponse, Message, PutResponse, ReturnCode};
use pocdb::network::mock::{Hub, MockNetwork};
use pocdb::network::{Messenger, Network};
use pocdb::store::mock::MockStore;
use pocdb::store::Store;

const CLIENT_BASE: u64 = 0xc11e;

struct Cluster {
    members: Membership,
    hub: Hub,
    stores: Vec<Arc<MockStore>>,
    tokens: Vec<ShutdownToken>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl Cluster {
    fn start(up: usize) -> Cluster {
        let stores = (0..5).map(|_| Arc::new(MockStore::new())).collect();
        Cluster::start_with(Membership::standard(), stores, up)
    }

    /// Starts daemons for the first `up` members on the given stores.
    fn start_with(members: Membership, stores: Vec<Arc<MockStore>>, up: usize) -> Cluster {
        let hub = Hub::new();
        let mut tokens = Vec::new();
        let mut threads = Vec::new();
        for (i, member) in members.members().iter().enumerate().take(up) {
            let net = hub.register(member.id);
            let daemon = Daemon::new(
                member.id,
                members.clone(),
                stores[i].clone(),
                Arc::new(net),
            );
            tokens.push(daemon.shutdown_token());
            threads.push(thread::spawn(move || daemon.run()));
        }
        Cluster {
            members,
            hub,
            stores,
            tokens,
            threads,
        }
    }

    fn ids(&self) -> Vec<u64> {
        self.members.ids()
    }

    fn client(&self, n: u64) -> TestClient {
        TestClient {
            net: self.hub.register(CLIENT_BASE + n),
        }
    }

    fn stop(&mut self) {
        for token in &self.tokens {
            token.signal();
        }
        for thread in self.threads.drain(..) {
            thread.join().expect("daemon thread panicked");
        }
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.stop();
    }
}

struct TestClient {
    net: MockNetwork,
}

impl TestClient {
    fn put(&self, replica: u64, key: &[u8], value: &[u8]) -> ReturnCode {
        self.net.send_message(
            replica,
            &Message::ClientPut(ClientPut {
                key: Bytes::copy_from_slice(key),
                value: Bytes::copy_from_slice(value),
            }),
        );
        let (_, payload) = self
            .net
            .recv(Duration::from_secs(10))
            .expect("no reply to put");
        PutResponse::decode(&payload).expect("bad put reply").code
    }

    fn get(&self, replica: u64, key: &[u8]) -> (ReturnCode, Bytes) {
        self.net.send_message(
            replica,
            &Message::ClientGet(ClientGet {
                key: Bytes::copy_from_slice(key),
            }),
        );
        let (_, payload) = self
            .net
            .recv(Duration::from_secs(10))
            .expect("no reply to get");
        let resp = GetResponse::decode(&payload).expect("bad get reply");
        (resp.code, resp.value)
    }
}

fn eventually<F: FnMut() -> bool>(mut cond: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("timed out waiting for {}", what);
}

// The learner record for `key`: value bytes and the trailing version.
fn learned(store: &MockStore, key: &[u8]) -> Option<(Bytes, u64)> {
    let mut k = key.to_vec();
    k.push(b'L');
    let raw = store.get(&k).unwrap()?;
    assert!(raw.len() >= 8, "learner record too short");
    let mut v = [0u8; 8];
    v.copy_from_slice(&raw[raw.len() - 8..]);
    Some((raw.slice(..raw.len() - 8), u64::from_le_bytes(v)))
}

#[test]
fn single_write_visible_everywhere() {
    let mut cluster = Cluster::start(5);
    let client = cluster.client(1);
    let ids = cluster.ids();

    assert_eq!(client.put(ids[0], b"k", b"v1"), ReturnCode::Success);

    // The learn broadcast races the put reply, so poll.
    for &replica in &ids {
        eventually(
            || client.get(replica, b"k") == (ReturnCode::Success, Bytes::from_static(b"v1")),
            "every replica to learn the value",
        );
    }

    // The uncontended write decides version 1.
    for store in &cluster.stores {
        assert_eq!(
            learned(store, b"k"),
            Some((Bytes::from_static(b"v1"), 1))
        );
    }

    cluster.stop();
}

#[test]
fn concurrent_writers_on_one_key_both_succeed() {
    let mut cluster = Cluster::start(5);
    let ids = cluster.ids();
    let c1 = cluster.client(1);
    let c2 = cluster.client(2);

    let target1 = ids[0];
    let target2 = ids[1];
    let t1 = thread::spawn(move || c1.put(target1, b"contended", b"v1"));
    let t2 = thread::spawn(move || c2.put(target2, b"contended", b"v2"));
    assert_eq!(t1.join().unwrap(), ReturnCode::Success);
    assert_eq!(t2.join().unwrap(), ReturnCode::Success);

    // Both writes were decreed, so every replica converges on the same final
    // record, at version two or later.
    eventually(
        || {
            let records: Vec<_> = cluster
                .stores
                .iter()
                .map(|s| learned(s, b"contended"))
                .collect();
            match &records[0] {
                None => false,
                Some((value, version)) => {
                    *version >= 2
                        && (value == &Bytes::from_static(b"v1")
                            || value == &Bytes::from_static(b"v2"))
                        && records.iter().all(|r| r.as_ref() == records[0].as_ref())
                }
            }
        },
        "replicas to converge on the final decree",
    );

    cluster.stop();
}

#[test]
fn write_succeeds_with_a_replica_down() {
    // Four of five replicas still form a quorum; sends to the fifth drop.
    let mut cluster = Cluster::start(4);
    let client = cluster.client(1);
    let ids = cluster.ids();

    assert_eq!(client.put(ids[0], b"k", b"v1"), ReturnCode::Success);
    for &replica in &ids[..4] {
        eventually(
            || client.get(replica, b"k") == (ReturnCode::Success, Bytes::from_static(b"v1")),
            "surviving replicas to learn the value",
        );
    }

    cluster.stop();
}

#[test]
fn get_of_missing_key_not_found() {
    let mut cluster = Cluster::start(5);
    let client = cluster.client(1);
    let ids = cluster.ids();

    for &replica in &ids {
        let (code, value) = client.get(replica, b"absent");
        assert_eq!(code, ReturnCode::NotFound);
        assert!(value.is_empty());
    }

    cluster.stop();
}

#[test]
fn restart_preserves_learned_state() {
    let members = Membership::standard();
    let stores: Vec<_> = (0..5).map(|_| Arc::new(MockStore::new())).collect();
    let ids = members.ids();

    {
        let mut cluster = Cluster::start_with(members.clone(), stores.clone(), 5);
        let client = cluster.client(1);
        assert_eq!(client.put(ids[0], b"k1", b"v1"), ReturnCode::Success);
        assert_eq!(client.put(ids[1], b"k2", b"v2"), ReturnCode::Success);
        for store in &stores {
            eventually(
                || learned(store, b"k1").is_some() && learned(store, b"k2").is_some(),
                "every replica to learn both keys",
            );
        }
        cluster.stop();
    }

    // Same stores, fresh processes.
    let mut cluster = Cluster::start_with(members, stores, 5);
    let client = cluster.client(2);

    for &replica in &ids {
        assert_eq!(
            client.get(replica, b"k1"),
            (ReturnCode::Success, Bytes::from_static(b"v1"))
        );
        assert_eq!(
            client.get(replica, b"k2"),
            (ReturnCode::Success, Bytes::from_static(b"v2"))
        );
        assert_eq!(client.get(replica, b"k3").0, ReturnCode::NotFound);
    }

    // The ladder continues where the durable state left off.
    assert_eq!(client.put(ids[2], b"k1", b"v9"), ReturnCode::Success);
    eventually(
        || {
            cluster
                .stores
                .iter()
                .all(|s| learned(s, b"k1") == Some((Bytes::from_static(b"v9"), 2)))
        },
        "the restarted cluster to decree the next version",
    );

    cluster.stop();
}
