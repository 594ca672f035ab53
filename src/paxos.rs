//! Single-decree Paxos, one independent instance per (key, version) pair.
//!
//! Each replica plays all three roles for every key: the acceptor and learner
//! operate against the local durable store, while the proposer drives rounds
//! on behalf of queued client writes.

pub mod acceptor;
pub mod learner;
pub mod proposer;

pub use acceptor::Acceptor;
pub use learner::Learner;
pub use proposer::Proposer;

use bytes::Bytes;

use crate::data::{DataMut, UnpackError, Unpacker};

/// A proposal identifier with a strict total order.
///
/// Numbers are proposer-chosen (wallclock nanoseconds) and need not be unique
/// across replicas; the `leader` field breaks ties and prevents two replicas
/// from ever driving the same ballot.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Default)]
pub struct Ballot {
    pub number: u64,
    pub leader: u64,
}

impl Ballot {
    /// The "no ballot" sentinel.
    pub const ZERO: Ballot = Ballot {
        number: 0,
        leader: 0,
    };

    pub fn is_zero(&self) -> bool {
        *self == Ballot::ZERO
    }

    pub fn pack(&self, d: &mut DataMut) {
        d.put_u64_be(self.number);
        d.put_u64_be(self.leader);
    }

    pub fn unpack(up: &mut Unpacker) -> Result<Ballot, UnpackError> {
        let number = up.get_u64_be()?;
        let leader = up.get_u64_be()?;
        Ok(Ballot { number, leader })
    }
}

/// Records "this ballot accepted this value".
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct PValue {
    pub ballot: Ballot,
    pub value: Bytes,
}

impl PValue {
    /// The "nothing accepted yet" sentinel.
    pub fn zero() -> PValue {
        PValue {
            ballot: Ballot::ZERO,
            value: Bytes::new(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.ballot.is_zero() && self.value.is_empty()
    }

    pub fn pack(&self, d: &mut DataMut) {
        self.ballot.pack(d);
        d.put_prefixed(&self.value);
    }

    pub fn unpack(up: &mut Unpacker) -> Result<PValue, UnpackError> {
        let ballot = Ballot::unpack(up)?;
        let value = Bytes::copy_from_slice(up.get_prefixed()?);
        Ok(PValue { ballot, value })
    }
}

/// Wallclock nanoseconds since the epoch; the source of ballot numbers.
pub fn wallclock_nanos() -> u64 {
    let t = time::get_time();
    t.sec as u64 * 1_000_000_000 + t.nsec as u64
}
