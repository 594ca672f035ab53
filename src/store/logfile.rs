//! Append-only log-file store.
//!
//! Records are appended as `u32 key length | u32 value length | key | value`
//! (big-endian lengths) and indexed in memory; the last record for a key
//! wins. Opening replays the log to rebuild the index and truncates a torn
//! tail record left behind by a crash mid-append.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;
use log::warn;
use parking_lot::Mutex;

use crate::data::DataMut;

use super::{Error, Store};

const LOG_FILE: &str = "pocdb.log";

// Upper bound on a single record; anything larger read during recovery is
// treated as a torn or corrupt tail.
const MAX_RECORD: u64 = 1 << 30;

pub struct LogFileStore {
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    index: HashMap<Vec<u8>, Bytes>,
}

enum Scan {
    Record(Vec<u8>, Vec<u8>),
    End,
    Torn,
}

// Ok(false) means the input ended partway through the buffer.
fn read_fully<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match r.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn scan_one<R: Read>(r: &mut R) -> io::Result<Scan> {
    let mut header = [0u8; 8];
    let n = r.read(&mut header)?;
    if n == 0 {
        return Ok(Scan::End);
    }
    if n < 8 && !read_fully(r, &mut header[n..])? {
        return Ok(Scan::Torn);
    }

    let mut klen = [0u8; 4];
    let mut vlen = [0u8; 4];
    klen.copy_from_slice(&header[..4]);
    vlen.copy_from_slice(&header[4..]);
    let klen = u32::from_be_bytes(klen) as u64;
    let vlen = u32::from_be_bytes(vlen) as u64;
    if klen + vlen > MAX_RECORD {
        return Ok(Scan::Torn);
    }

    let mut key = vec![0u8; klen as usize];
    let mut value = vec![0u8; vlen as usize];
    if !read_fully(r, &mut key)? || !read_fully(r, &mut value)? {
        return Ok(Scan::Torn);
    }
    Ok(Scan::Record(key, value))
}

impl LogFileStore {
    pub fn open(dir: &Path) -> Result<LogFileStore, Error> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let size = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;

        let mut index = HashMap::new();
        let mut good = 0u64;
        {
            let mut reader = BufReader::new(&mut file);
            loop {
                match scan_one(&mut reader)? {
                    Scan::End => break,
                    Scan::Torn => {
                        warn!(
                            "discarding torn tail of {}: {} of {} bytes recovered",
                            path.display(),
                            good,
                            size
                        );
                        break;
                    }
                    Scan::Record(key, value) => {
                        good += 8 + key.len() as u64 + value.len() as u64;
                        index.insert(key, Bytes::from(value));
                    }
                }
            }
        }

        if good < size {
            file.set_len(good)?;
        }

        Ok(LogFileStore {
            inner: Mutex::new(Inner { file, index }),
        })
    }
}

impl Store for LogFileStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        Ok(self.inner.lock().index.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let mut d = DataMut::with_capacity(8 + key.len() + value.len());
        d.put_u32_be(key.len() as u32);
        d.put_u32_be(value.len() as u32);
        d.put_slice(key);
        d.put_slice(value);
        inner.file.write_all(&d.finalize())?;
        if sync {
            inner.file.sync_data()?;
        }
        inner.index.insert(key.to_vec(), Bytes::copy_from_slice(value));
        Ok(())
    }
}
