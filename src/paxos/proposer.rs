//! The proposer role: one write state machine per key.
//!
//! Client writes queue on the machine and are decreed one version at a time.
//! A round opens with a wallclock-derived ballot, gathers a majority of
//! promises (adopting any previously accepted value of highest ballot),
//! gathers a majority of accepts, then broadcasts the decided value to every
//! replica. Losing a decree is not an error: the write stays queued and the
//! next round runs at the next version. All entry points are called under the
//! key's mutex; drive is written as a loop so requeued progress cannot grow
//! the stack.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;

use crate::membership::QUORUM;
use crate::messages::{Learn, Message, Phase1A, Phase2A, ReturnCode};
use crate::network::Messenger;
use crate::paxos::{wallclock_nanos, Ballot, PValue};

pub struct Proposer {
    key: Bytes,
    replica_id: u64,
    replicas: Vec<u64>,

    /// Client writes awaiting a successful decree, oldest first.
    pending: VecDeque<(u64, Bytes)>,

    executing: bool,
    leading: Ballot,
    version: u64,
    promises: HashSet<u64>,
    accepted: HashSet<u64>,
    max_accepted: PValue,
}

impl Proposer {
    /// `version` is seeded from the local acceptor record so a recreated
    /// machine rejoins the ladder where the durable state left off.
    pub fn new(key: Bytes, replica_id: u64, replicas: Vec<u64>, version: u64) -> Proposer {
        Proposer {
            key,
            replica_id,
            replicas,
            pending: VecDeque::new(),
            executing: false,
            leading: Ballot::ZERO,
            version,
            promises: HashSet::new(),
            accepted: HashSet::new(),
            max_accepted: PValue::zero(),
        }
    }

    /// True when no round is in flight and no write is queued; the state
    /// table may collect the machine.
    pub fn is_idle(&self) -> bool {
        !self.executing && self.pending.is_empty()
    }

    pub fn write(&mut self, client: u64, value: Bytes, net: &dyn Messenger) {
        self.pending.push_back((client, value));
        self.drive(net);
    }

    pub fn phase1b(
        &mut self,
        peer: u64,
        version: u64,
        promised: Ballot,
        accepted: PValue,
        net: &dyn Messenger,
    ) {
        // Either a later version is already open or we have been outbid;
        // abandon the round, adopt the reported version, and start over.
        if (self.version != 0 && version > self.version) || promised > self.leading {
            self.executing = false;
            self.version = version;
            return self.drive(net);
        }

        self.version = version;

        if !accepted.ballot.is_zero() && accepted.ballot > self.max_accepted.ballot {
            self.max_accepted = accepted;
        }

        self.promises.insert(peer);
        self.drive(net);
    }

    pub fn phase2b(&mut self, peer: u64, version: u64, ballot: Ballot, net: &dyn Messenger) {
        if version != self.version || ballot != self.leading {
            return;
        }
        self.accepted.insert(peer);
        self.drive(net);
    }

    pub fn retry(&mut self, net: &dyn Messenger) {
        self.executing = false;
        self.version += 1;
        self.drive(net);
    }

    // The only place that emits messages or mutates the round fields.
    fn drive(&mut self, net: &dyn Messenger) {
        loop {
            if !self.executing {
                let value = match self.pending.front() {
                    None => return,
                    Some((_, value)) => value.clone(),
                };

                self.executing = true;
                let mut number = wallclock_nanos();
                if number <= self.leading.number {
                    number = self.leading.number + 1;
                }
                self.leading = Ballot {
                    number,
                    leader: self.replica_id,
                };
                self.promises.clear();
                self.accepted.clear();
                self.max_accepted = PValue {
                    ballot: Ballot::ZERO,
                    value,
                };
            }

            // A reported acceptance already dominates the ballot we are
            // driving; only a fresh, higher ballot can make progress.
            if self.max_accepted.ballot > self.leading {
                self.executing = false;
                continue;
            }

            if self.promises.len() < QUORUM {
                for &replica in &self.replicas {
                    if self.promises.contains(&replica) {
                        continue;
                    }
                    net.send_message(
                        replica,
                        &Message::Phase1A(Phase1A {
                            key: self.key.clone(),
                            version: self.version,
                            ballot: self.leading,
                        }),
                    );
                }
                return;
            }

            if self.accepted.len() < QUORUM {
                // Commit to the value: ours, or the highest-ballot value some
                // acceptor already holds for this version.
                self.max_accepted.ballot = self.leading;
                for &replica in &self.replicas {
                    if self.accepted.contains(&replica) {
                        continue;
                    }
                    net.send_message(
                        replica,
                        &Message::Phase2A(Phase2A {
                            key: self.key.clone(),
                            version: self.version,
                            ballot: self.leading,
                            pvalue: self.max_accepted.clone(),
                        }),
                    );
                }
                return;
            }

            // Decision reached: tell every replica, close the round, and move
            // to the next version.
            for &replica in &self.replicas {
                net.send_message(
                    replica,
                    &Message::Learn(Learn {
                        key: self.key.clone(),
                        version: self.version,
                        value: self.max_accepted.value.clone(),
                    }),
                );
            }

            self.executing = false;
            self.version += 1;

            let won = match self.pending.front() {
                Some((_, value)) => *value == self.max_accepted.value,
                None => false,
            };
            if won {
                if let Some((client, _)) = self.pending.pop_front() {
                    net.send_put_response(client, ReturnCode::Success);
                }
            }
        }
    }
}
