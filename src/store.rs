//! The local durable store.
//!
//! Each replica keeps its Paxos acceptor and learner records in an ordered
//! byte-keyed store segregated by a one-byte key suffix (`'A'` vs `'L'`).
//! The store is deliberately small: point reads, point writes, and a `sync`
//! flag for writes that must reach stable storage before the replica replies.

use std::fmt;
use std::io;

use bytes::Bytes;

pub mod logfile;
pub mod mock;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Corrupt(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::Corrupt(what) => write!(f, "corrupt {}", what),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error>;

    /// Writes `key -> value`, replacing any previous binding. When `sync` is
    /// set the write has reached stable storage before this returns.
    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<(), Error>;
}
