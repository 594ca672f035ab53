//! The replica daemon: one receive loop dispatching to the three Paxos roles.
//!
//! Acceptor and learner messages are handled inline against the durable
//! store. Proposer messages take the key's state machine out of the state
//! table and run under its mutex; the mutex is held across the sends the
//! machine emits so peer replies arriving in that window cannot race the same
//! key's state. Error policy follows the protocol: corrupt messages and
//! store failures are logged and the triggering message dropped, and lost
//! sends are tolerated by Paxos itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use either::Either;
use log::{error, info, warn};
use parking_lot::Mutex;

use crate::membership::Membership;
use crate::messages::{
    ClientGet, ClientPut, Learn, Message, Phase1A, Phase1B, Phase2A, Phase2B, Retry, ReturnCode,
};
use crate::network::{Messenger, Network};
use crate::paxos::{Acceptor, Learner, Proposer};
use crate::state_table::StateTable;
use crate::store::Store;

/// Cooperative shutdown flag observed by the message loop.
#[derive(Clone)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> ShutdownToken {
        ShutdownToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_signalled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownToken {
    fn default() -> ShutdownToken {
        ShutdownToken::new()
    }
}

// How long recv may block before the shutdown flag is rechecked.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Daemon {
    id: u64,
    members: Membership,
    net: Arc<dyn Network>,
    // The same endpoint, narrowed to the send capability the Paxos roles get.
    outbox: Arc<dyn Messenger>,
    acceptor: Acceptor,
    learner: Learner,
    writes: StateTable<Mutex<Proposer>>,
    shutdown: ShutdownToken,
}

impl Daemon {
    pub fn new<N: Network + 'static>(
        id: u64,
        members: Membership,
        store: Arc<dyn Store>,
        net: Arc<N>,
    ) -> Daemon {
        Daemon {
            id,
            members,
            acceptor: Acceptor::new(store.clone()),
            learner: Learner::new(store),
            outbox: net.clone(),
            net,
            writes: StateTable::new(),
            shutdown: ShutdownToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Runs the message loop until the shutdown token is signalled. In-flight
    /// rounds are simply abandoned; the durable acceptor state is all that is
    /// needed for safety across a restart.
    pub fn run(&self) {
        info!("replica {:016x} serving", self.id);
        while !self.shutdown.is_signalled() {
            let (from, frame) = match self.net.recv(POLL_INTERVAL) {
                None => continue,
                Some(inbound) => inbound,
            };
            match Message::decode(&frame) {
                Ok(msg) => self.dispatch(from, msg),
                Err(e) => warn!("corrupt message from {:016x}: {}", from, e),
            }
        }
        info!("replica {:016x} exiting", self.id);
    }

    fn dispatch(&self, from: u64, msg: Message) {
        match msg {
            Message::ClientPut(m) => self.process_put(from, m),
            Message::ClientGet(m) => self.process_get(from, m),
            Message::Phase1A(m) => self.process_phase1a(from, m),
            Message::Phase1B(m) => self.process_phase1b(from, m),
            Message::Phase2A(m) => self.process_phase2a(from, m),
            Message::Phase2B(m) => self.process_phase2b(from, m),
            Message::Learn(m) => self.process_learn(m),
            Message::Retry(m) => self.process_retry(m),
        }
    }

    // Takes the key's proposer out of the table, runs `f` under its mutex,
    // then lets the table collect the machine if it went idle.
    fn with_proposer<F>(&self, key: &Bytes, f: F)
    where
        F: FnOnce(&mut Proposer),
    {
        let sm = self.writes.get_or_create(key, || {
            let version = match self.acceptor.state(key) {
                Ok(state) => state.version,
                Err(e) => {
                    warn!("could not seed proposer state: {}", e);
                    0
                }
            };
            Mutex::new(Proposer::new(
                key.clone(),
                self.id,
                self.members.ids(),
                version,
            ))
        });
        f(&mut sm.lock());
        drop(sm);
        self.writes
            .release_if(key, |m| m.try_lock().map_or(false, |p| p.is_idle()));
    }

    fn process_put(&self, from: u64, m: ClientPut) {
        let value = m.value.clone();
        self.with_proposer(&m.key, |p| p.write(from, value, &*self.outbox));
    }

    fn process_get(&self, from: u64, m: ClientGet) {
        match self.learner.read(&m.key) {
            Ok(Some((value, _version))) => {
                self.net.send_get_response(from, ReturnCode::Success, &value)
            }
            Ok(None) => self.net.send_get_response(from, ReturnCode::NotFound, &[]),
            Err(e) => {
                error!("could not read learned value: {}", e);
                self.net.send_get_response(from, ReturnCode::ServerError, &[]);
            }
        }
    }

    fn process_phase1a(&self, from: u64, m: Phase1A) {
        match self.acceptor.receive_phase1a(from, &m) {
            Ok(reply) => self.net.send_message(from, &Message::Phase1B(reply)),
            Err(e) => error!("could not access acceptor state: {}", e),
        }
    }

    fn process_phase2a(&self, from: u64, m: Phase2A) {
        match self.acceptor.receive_phase2a(&m) {
            Ok(Either::Left(accepted)) => {
                self.net.send_message(from, &Message::Phase2B(accepted))
            }
            Ok(Either::Right(retry)) => self.net.send_message(from, &Message::Retry(retry)),
            Err(e) => error!("could not access acceptor state: {}", e),
        }
    }

    fn process_phase1b(&self, from: u64, m: Phase1B) {
        let (version, promised, accepted) = (m.version, m.promised, m.accepted.clone());
        self.with_proposer(&m.key, |p| {
            p.phase1b(from, version, promised, accepted, &*self.outbox)
        });
    }

    fn process_phase2b(&self, from: u64, m: Phase2B) {
        self.with_proposer(&m.key, |p| p.phase2b(from, m.version, m.ballot, &*self.outbox));
    }

    fn process_learn(&self, m: Learn) {
        if let Err(e) = self.learner.receive_learn(&m) {
            error!("could not record learned value: {}", e);
        }
    }

    fn process_retry(&self, m: Retry) {
        self.with_proposer(&m.key, |p| p.retry(&*self.outbox));
    }
}
