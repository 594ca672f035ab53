//! In-memory store for tests and local experiments.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;

use super::{Error, Store};

pub struct MockStore {
    entries: Mutex<HashMap<Vec<u8>, Bytes>>,
}

impl MockStore {
    pub fn new() -> MockStore {
        MockStore {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Copies out the full contents; test inspection only.
    pub fn snapshot(&self) -> HashMap<Vec<u8>, Bytes> {
        self.entries.lock().clone()
    }
}

impl Default for MockStore {
    fn default() -> MockStore {
        MockStore::new()
    }
}

impl Store for MockStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8], _sync: bool) -> Result<(), Error> {
        self.entries
            .lock()
            .insert(key.to_vec(), Bytes::copy_from_slice(value));
        Ok(())
    }
}
