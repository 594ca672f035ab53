//! The acceptor role: durable promise and accept bookkeeping.
//!
//! Per-key state lives under the key with an `'A'` suffix as
//! `version | promised ballot | accepted pvalue`. Version advance is driven
//! entirely by the read path: once the learner has recorded the version the
//! acceptor is holding, the record is reread as a fresh one at the next
//! version. Writes are synchronous; the rules below are what keep a decided
//! value decided across crashes.

use std::sync::Arc;

use either::{Either, Left, Right};

use crate::data::{DataMut, UnpackError, Unpacker};
use crate::messages::{Phase1A, Phase1B, Phase2A, Phase2B, Retry};
use crate::paxos::{learner, Ballot, PValue};
use crate::store::{self, Store};

const ACCEPTOR_SUFFIX: u8 = b'A';

fn record_key(key: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(key.len() + 1);
    k.extend_from_slice(key);
    k.push(ACCEPTOR_SUFFIX);
    k
}

/// One key's durable acceptor record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub version: u64,
    pub promised: Ballot,
    pub accepted: PValue,
}

impl State {
    fn fresh(version: u64) -> State {
        State {
            version,
            promised: Ballot::ZERO,
            accepted: PValue::zero(),
        }
    }

    fn pack(&self) -> Vec<u8> {
        let mut d = DataMut::with_capacity(8 + 16 + 16 + 4 + self.accepted.value.len());
        d.put_u64_be(self.version);
        self.promised.pack(&mut d);
        self.accepted.pack(&mut d);
        d.finalize()
    }

    fn unpack(raw: &[u8]) -> Result<State, UnpackError> {
        let mut up = Unpacker::new(raw);
        let version = up.get_u64_be()?;
        let promised = Ballot::unpack(&mut up)?;
        let accepted = PValue::unpack(&mut up)?;
        Ok(State {
            version,
            promised,
            accepted,
        })
    }
}

pub struct Acceptor {
    store: Arc<dyn Store>,
}

impl Acceptor {
    pub fn new(store: Arc<dyn Store>) -> Acceptor {
        Acceptor { store }
    }

    /// Reads the acceptor state for `key`, applying the sole version-advance
    /// rule: when the learner has recorded the version this record is
    /// holding, the instance is closed and the record is reread as a fresh
    /// one at the next version. Absent records read as version 0, so a key
    /// with no history comes back fresh at version 1.
    pub fn state(&self, key: &[u8]) -> Result<State, store::Error> {
        let state = match self.store.get(&record_key(key))? {
            None => State::fresh(0),
            Some(raw) => {
                State::unpack(&raw).map_err(|_| store::Error::Corrupt("acceptor record"))?
            }
        };

        let written = learner::learned_version(&*self.store, key)?.unwrap_or(0);
        if state.version == written {
            return Ok(State::fresh(written + 1));
        }
        Ok(state)
    }

    fn save(&self, key: &[u8], state: &State) -> Result<(), store::Error> {
        self.store.put(&record_key(key), &state.pack(), true)
    }

    /// Promise iff the ballot is being driven by its own leader, strictly
    /// outbids the standing promise, and names a current-or-later version.
    /// The reply always carries the resulting state; a rejected proposer
    /// reads its fate out of the version and promise it echoes.
    pub fn receive_phase1a(&self, from: u64, m: &Phase1A) -> Result<Phase1B, store::Error> {
        let mut cur = self.state(&m.key)?;

        if from == m.ballot.leader && m.ballot > cur.promised && m.version >= cur.version {
            cur.version = m.version;
            cur.promised = m.ballot;
            self.save(&m.key, &cur)?;
        }

        Ok(Phase1B {
            key: m.key.clone(),
            version: cur.version,
            promised: cur.promised,
            accepted: cur.accepted,
        })
    }

    /// Accept iff the proposer's view matches exactly; anything else means
    /// the proposer is stale and is told to retry.
    pub fn receive_phase2a(
        &self,
        m: &Phase2A,
    ) -> Result<Either<Phase2B, Retry>, store::Error> {
        let cur = self.state(&m.key)?;

        if m.version == cur.version && m.ballot == cur.promised {
            let next = State {
                version: cur.version,
                promised: cur.promised,
                accepted: m.pvalue.clone(),
            };
            self.save(&m.key, &next)?;
            Ok(Left(Phase2B {
                key: m.key.clone(),
                version: cur.version,
                ballot: cur.promised,
            }))
        } else {
            Ok(Right(Retry { key: m.key.clone() }))
        }
    }
}
