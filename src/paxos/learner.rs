//! The learner role: durably records decided values.
//!
//! A learned record is the value followed by an 8-byte little-endian version,
//! stored under the key with an `'L'` suffix; only the latest learned version
//! is retained. This record is the only state a client `Get` ever reads.

use std::sync::Arc;

use bytes::Bytes;
use log::info;

use crate::messages::Learn;
use crate::store::{self, Store};

const LEARNED_SUFFIX: u8 = b'L';

pub(crate) fn learned_key(key: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(key.len() + 1);
    k.extend_from_slice(key);
    k.push(LEARNED_SUFFIX);
    k
}

/// Reads the version out of the learned record for `key`, if one exists.
pub(crate) fn learned_version(store: &dyn Store, key: &[u8]) -> Result<Option<u64>, store::Error> {
    match store.get(&learned_key(key))? {
        None => Ok(None),
        Some(raw) if raw.len() >= 8 => {
            let mut v = [0u8; 8];
            v.copy_from_slice(&raw[raw.len() - 8..]);
            Ok(Some(u64::from_le_bytes(v)))
        }
        Some(_) => Err(store::Error::Corrupt("learned record")),
    }
}

pub struct Learner {
    store: Arc<dyn Store>,
}

impl Learner {
    pub fn new(store: Arc<dyn Store>) -> Learner {
        Learner { store }
    }

    /// Records a decided value. A learn at a version no newer than the stored
    /// one is ignored, so reordered broadcasts cannot clobber a later decree.
    /// Returns whether the record was written.
    pub fn receive_learn(&self, m: &Learn) -> Result<bool, store::Error> {
        if let Some(current) = learned_version(&*self.store, &m.key)? {
            if current >= m.version {
                return Ok(false);
            }
        }

        let mut record = Vec::with_capacity(m.value.len() + 8);
        record.extend_from_slice(&m.value);
        record.extend_from_slice(&m.version.to_le_bytes());
        self.store.put(&learned_key(&m.key), &record, true)?;

        info!(
            "learned \"{}\" ({}) -> \"{}\"",
            String::from_utf8_lossy(&m.key),
            m.version,
            String::from_utf8_lossy(&m.value)
        );
        Ok(true)
    }

    /// The read path: the latest learned value and its version.
    pub fn read(&self, key: &[u8]) -> Result<Option<(Bytes, u64)>, store::Error> {
        let raw = match self.store.get(&learned_key(key))? {
            None => return Ok(None),
            Some(raw) => raw,
        };
        if raw.len() < 8 {
            return Err(store::Error::Corrupt("learned record"));
        }
        let mut v = [0u8; 8];
        v.copy_from_slice(&raw[raw.len() - 8..]);
        let value = raw.slice(..raw.len() - 8);
        Ok(Some((value, u64::from_le_bytes(v))))
    }
}

#[cfg(test)]
mod tests {
    use crate::store::mock::MockStore;

    use super::*;

    fn learn(key: &'static [u8], version: u64, value: &'static [u8]) -> Learn {
        Learn {
            key: Bytes::from_static(key),
            version,
            value: Bytes::from_static(value),
        }
    }

    #[test]
    fn learn_then_read() {
        let store = Arc::new(MockStore::new());
        let l = Learner::new(store);

        assert!(l.receive_learn(&learn(b"k", 1, b"v1")).unwrap());
        assert_eq!(
            l.read(b"k").unwrap(),
            Some((Bytes::from_static(b"v1"), 1))
        );
    }

    #[test]
    fn missing_key() {
        let store = Arc::new(MockStore::new());
        let l = Learner::new(store);
        assert_eq!(l.read(b"absent").unwrap(), None);
    }

    #[test]
    fn newer_version_overwrites() {
        let store = Arc::new(MockStore::new());
        let l = Learner::new(store);

        assert!(l.receive_learn(&learn(b"k", 1, b"v1")).unwrap());
        assert!(l.receive_learn(&learn(b"k", 2, b"v2")).unwrap());
        assert_eq!(
            l.read(b"k").unwrap(),
            Some((Bytes::from_static(b"v2"), 2))
        );
    }

    #[test]
    fn stale_learn_ignored() {
        let store = Arc::new(MockStore::new());
        let l = Learner::new(store);

        assert!(l.receive_learn(&learn(b"k", 3, b"v3")).unwrap());
        assert!(!l.receive_learn(&learn(b"k", 2, b"old")).unwrap());
        assert!(!l.receive_learn(&learn(b"k", 3, b"dup")).unwrap());
        assert_eq!(
            l.read(b"k").unwrap(),
            Some((Bytes::from_static(b"v3"), 3))
        );
    }

    #[test]
    fn empty_value_roundtrips() {
        let store = Arc::new(MockStore::new());
        let l = Learner::new(store);

        assert!(l.receive_learn(&learn(b"k", 1, b"")).unwrap());
        assert_eq!(l.read(b"k").unwrap(), Some((Bytes::new(), 1)));
    }

    #[test]
    fn learned_version_helper() {
        let store = MockStore::new();
        assert_eq!(learned_version(&store, b"k").unwrap(), None);

        let mut record = b"v".to_vec();
        record.extend_from_slice(&5u64.to_le_bytes());
        store.put(&learned_key(b"k"), &record, true).unwrap();
        assert_eq!(learned_version(&store, b"k").unwrap(), Some(5));
    }

    #[test]
    fn short_record_is_corrupt() {
        let store = MockStore::new();
        store.put(&learned_key(b"k"), b"tiny", true).unwrap();
        assert!(learned_version(&store, b"k").is_err());

        let l = Learner::new(Arc::new(MockStore::new()));
        l.store.put(&learned_key(b"k"), b"tiny", true).unwrap();
        assert!(l.read(b"k").is_err());
    }
}
