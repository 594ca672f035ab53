//! The replica wire protocol.
//!
//! Every message is a one-byte type tag followed by a type-specific payload:
//! `u64`s big-endian, byte strings `u32`-length-prefixed, ballots as two
//! `u64`s, pvalues as a ballot then a byte string. Replies to client requests
//! are tagless (one status byte, plus the value bytes for a get); clients know
//! what they asked for.

use std::fmt;

use bytes::Bytes;

use crate::data::{DataMut, UnpackError, Unpacker};
use crate::paxos::{Ballot, PValue};

/// Status byte carried on every client reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Success = 0,
    NotFound = 1,
    SeeErrno = 2,
    ServerError = 3,
    Internal = 4,
    Garbage = 5,
}

impl ReturnCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Unknown bytes decode to `Garbage` rather than failing.
    pub fn from_u8(x: u8) -> ReturnCode {
        match x {
            0 => ReturnCode::Success,
            1 => ReturnCode::NotFound,
            2 => ReturnCode::SeeErrno,
            3 => ReturnCode::ServerError,
            4 => ReturnCode::Internal,
            _ => ReturnCode::Garbage,
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReturnCode::Success => write!(f, "success"),
            ReturnCode::NotFound => write!(f, "not found"),
            ReturnCode::SeeErrno => write!(f, "see errno"),
            ReturnCode::ServerError => write!(f, "server error"),
            ReturnCode::Internal => write!(f, "internal error"),
            ReturnCode::Garbage => write!(f, "garbage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    UnknownTag(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "truncated message"),
            DecodeError::UnknownTag(t) => write!(f, "unknown message tag {:#04x}", t),
        }
    }
}

impl From<UnpackError> for DecodeError {
    fn from(_: UnpackError) -> DecodeError {
        DecodeError::Truncated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPut {
    pub key: Bytes,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGet {
    pub key: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase1A {
    pub key: Bytes,
    pub version: u64,
    pub ballot: Ballot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase1B {
    pub key: Bytes,
    pub version: u64,
    pub promised: Ballot,
    pub accepted: PValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase2A {
    pub key: Bytes,
    pub version: u64,
    pub ballot: Ballot,
    pub pvalue: PValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase2B {
    pub key: Bytes,
    pub version: u64,
    pub ballot: Ballot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Learn {
    pub key: Bytes,
    pub version: u64,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retry {
    pub key: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ClientPut(ClientPut),
    ClientGet(ClientGet),
    Phase1A(Phase1A),
    Phase1B(Phase1B),
    Phase2A(Phase2A),
    Phase2B(Phase2B),
    Learn(Learn),
    Retry(Retry),
}

fn get_bytes(up: &mut Unpacker) -> Result<Bytes, UnpackError> {
    Ok(Bytes::copy_from_slice(up.get_prefixed()?))
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::ClientPut(m) => {
                let mut d = DataMut::with_capacity(1 + 4 + m.key.len() + 4 + m.value.len());
                d.put_u8(b'P');
                d.put_prefixed(&m.key);
                d.put_prefixed(&m.value);
                d.finalize()
            }
            Message::ClientGet(m) => {
                let mut d = DataMut::with_capacity(1 + 4 + m.key.len());
                d.put_u8(b'G');
                d.put_prefixed(&m.key);
                d.finalize()
            }
            Message::Phase1A(m) => {
                let mut d = DataMut::with_capacity(1 + 4 + m.key.len() + 8 + 16);
                d.put_u8(b'a');
                d.put_prefixed(&m.key);
                d.put_u64_be(m.version);
                m.ballot.pack(&mut d);
                d.finalize()
            }
            Message::Phase1B(m) => {
                let mut d = DataMut::with_capacity(
                    1 + 4 + m.key.len() + 8 + 16 + 16 + 4 + m.accepted.value.len(),
                );
                d.put_u8(b'b');
                d.put_prefixed(&m.key);
                d.put_u64_be(m.version);
                m.promised.pack(&mut d);
                m.accepted.pack(&mut d);
                d.finalize()
            }
            Message::Phase2A(m) => {
                let mut d = DataMut::with_capacity(
                    1 + 4 + m.key.len() + 8 + 16 + 16 + 4 + m.pvalue.value.len(),
                );
                d.put_u8(b'A');
                d.put_prefixed(&m.key);
                d.put_u64_be(m.version);
                m.ballot.pack(&mut d);
                m.pvalue.pack(&mut d);
                d.finalize()
            }
            Message::Phase2B(m) => {
                let mut d = DataMut::with_capacity(1 + 4 + m.key.len() + 8 + 16);
                d.put_u8(b'B');
                d.put_prefixed(&m.key);
                d.put_u64_be(m.version);
                m.ballot.pack(&mut d);
                d.finalize()
            }
            Message::Learn(m) => {
                let mut d = DataMut::with_capacity(1 + 4 + m.key.len() + 8 + 4 + m.value.len());
                d.put_u8(b'L');
                d.put_prefixed(&m.key);
                d.put_u64_be(m.version);
                d.put_prefixed(&m.value);
                d.finalize()
            }
            Message::Retry(m) => {
                let mut d = DataMut::with_capacity(1 + 4 + m.key.len());
                d.put_u8(b'R');
                d.put_prefixed(&m.key);
                d.finalize()
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Message, DecodeError> {
        let mut up = Unpacker::new(buf);
        let tag = up.get_u8()?;
        let msg = match tag {
            b'P' => Message::ClientPut(ClientPut {
                key: get_bytes(&mut up)?,
                value: get_bytes(&mut up)?,
            }),
            b'G' => Message::ClientGet(ClientGet {
                key: get_bytes(&mut up)?,
            }),
            b'a' => Message::Phase1A(Phase1A {
                key: get_bytes(&mut up)?,
                version: up.get_u64_be()?,
                ballot: Ballot::unpack(&mut up)?,
            }),
            b'b' => Message::Phase1B(Phase1B {
                key: get_bytes(&mut up)?,
                version: up.get_u64_be()?,
                promised: Ballot::unpack(&mut up)?,
                accepted: PValue::unpack(&mut up)?,
            }),
            b'A' => Message::Phase2A(Phase2A {
                key: get_bytes(&mut up)?,
                version: up.get_u64_be()?,
                ballot: Ballot::unpack(&mut up)?,
                pvalue: PValue::unpack(&mut up)?,
            }),
            b'B' => Message::Phase2B(Phase2B {
                key: get_bytes(&mut up)?,
                version: up.get_u64_be()?,
                ballot: Ballot::unpack(&mut up)?,
            }),
            b'L' => Message::Learn(Learn {
                key: get_bytes(&mut up)?,
                version: up.get_u64_be()?,
                value: get_bytes(&mut up)?,
            }),
            b'R' => Message::Retry(Retry {
                key: get_bytes(&mut up)?,
            }),
            t => return Err(DecodeError::UnknownTag(t)),
        };
        Ok(msg)
    }
}

/// Tagless reply to a `ClientPut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutResponse {
    pub code: ReturnCode,
}

impl PutResponse {
    pub fn encode(&self) -> Vec<u8> {
        vec![self.code.to_u8()]
    }

    pub fn decode(buf: &[u8]) -> Result<PutResponse, DecodeError> {
        let mut up = Unpacker::new(buf);
        Ok(PutResponse {
            code: ReturnCode::from_u8(up.get_u8()?),
        })
    }
}

/// Tagless reply to a `ClientGet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponse {
    pub code: ReturnCode,
    pub value: Bytes,
}

impl GetResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut d = DataMut::with_capacity(1 + 4 + self.value.len());
        d.put_u8(self.code.to_u8());
        d.put_prefixed(&self.value);
        d.finalize()
    }

    pub fn decode(buf: &[u8]) -> Result<GetResponse, DecodeError> {
        let mut up = Unpacker::new(buf);
        let code = ReturnCode::from_u8(up.get_u8()?);
        let value = get_bytes(&mut up)?;
        Ok(GetResponse { code, value })
    }
}
