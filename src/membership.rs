//! The fixed five-replica cluster membership.
//!
//! The wire protocol and algorithm are membership-agnostic; only the table
//! below pins the cluster to five replicas. The built-in table matches the
//! standard deployment (loopback, ports 2000 through 2004), and a cluster
//! file can substitute other identities and addresses.

use std::fmt;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::Path;

pub const NUM_REPLICAS: usize = 5;
pub const QUORUM: usize = NUM_REPLICAS / 2 + 1;

const REPLICA_LETTERS: [&str; NUM_REPLICAS] = ["A", "B", "C", "D", "E"];

const REPLICA_IDS: [u64; NUM_REPLICAS] = [
    0xdeadbeefu64 << 32,
    0xbad1deafu64 << 32,
    0x1eaff00du64 << 32,
    0xdefec8edu64 << 32,
    0xcafebabeu64 << 32,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub id: u64,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct Membership {
    members: Vec<Member>,
}

#[derive(Debug)]
pub enum ParseError {
    Io(io::Error),
    BadLine(usize),
    WrongCount(usize),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "i/o error: {}", e),
            ParseError::BadLine(lineno) => write!(f, "malformed member on line {}", lineno),
            ParseError::WrongCount(n) => {
                write!(f, "expected {} members, found {}", NUM_REPLICAS, n)
            }
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> ParseError {
        ParseError::Io(e)
    }
}

impl Membership {
    /// The hard-coded table from the standard deployment.
    pub fn standard() -> Membership {
        let members = REPLICA_IDS
            .iter()
            .enumerate()
            .map(|(i, &id)| Member {
                id,
                addr: SocketAddr::from(([127, 0, 0, 1], 2000 + i as u16)),
            })
            .collect();
        Membership { members }
    }

    /// Parses five lines of `<hex id> <host:port>`; `#` starts a comment.
    pub fn parse(text: &str) -> Result<Membership, ParseError> {
        let mut members = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let id = fields
                .next()
                .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok());
            let addr = fields.next().and_then(|s| s.parse::<SocketAddr>().ok());
            match (id, addr, fields.next()) {
                (Some(id), Some(addr), None) => members.push(Member { id, addr }),
                _ => return Err(ParseError::BadLine(i + 1)),
            }
        }
        if members.len() != NUM_REPLICAS {
            return Err(ParseError::WrongCount(members.len()));
        }
        Ok(Membership { members })
    }

    pub fn from_file(path: &Path) -> Result<Membership, ParseError> {
        Membership::parse(&fs::read_to_string(path)?)
    }

    /// Maps a replica letter (`A` through `E`) to its index in the table.
    pub fn index_for_letter(letter: &str) -> Option<usize> {
        REPLICA_LETTERS.iter().position(|&l| l == letter)
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn ids(&self) -> Vec<u64> {
        self.members.iter().map(|m| m.id).collect()
    }

    pub fn addr_of(&self, id: u64) -> Option<SocketAddr> {
        self.members.iter().find(|m| m.id == id).map(|m| m.addr)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.members.iter().any(|m| m.id == id)
    }
}
