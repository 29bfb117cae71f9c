//! Ordered text records, aligned by position with the vector index.
//!
//! On-disk layout (little-endian, length-prefixed so records may hold any text):
//!
//! ```text
//! u32 count | count * (u32 byte_len | byte_len bytes of UTF-8)
//! ```

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use crate::errors::{RagError, RagResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStore {
    docs: Vec<String>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_batch<I, S>(&mut self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.docs.extend(texts.into_iter().map(Into::into));
    }

    pub fn get(&self, id: usize) -> RagResult<&str> {
        self.docs
            .get(id)
            .map(String::as_str)
            .ok_or(RagError::DocumentNotFound {
                id,
                count: self.docs.len(),
            })
    }

    pub fn count(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.docs.iter().map(String::as_str)
    }

    pub fn save(&self, path: &Path) -> RagResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&encode_len(self.docs.len())?)?;
        for doc in &self.docs {
            writer.write_all(&encode_len(doc.len())?)?;
            writer.write_all(doc.as_bytes())?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), count = self.docs.len(), "store written");
        Ok(())
    }

    pub fn load(path: &Path) -> RagResult<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RagError::StoreNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> RagResult<Self> {
        let mut reader = Reader { bytes, pos: 0 };
        let count = reader.u32()? as usize;

        // Every record needs at least its 4-byte prefix.
        if count > bytes.len() / 4 {
            return Err(RagError::CorruptStore(format!(
                "header claims {count} records in {} bytes",
                bytes.len()
            )));
        }

        let mut docs = Vec::with_capacity(count);
        for id in 0..count {
            let len = reader.u32()? as usize;
            let raw = reader.take(len)?;
            let text = std::str::from_utf8(raw).map_err(|e| {
                RagError::CorruptStore(format!("record {id} is not valid UTF-8: {e}"))
            })?;
            docs.push(text.to_owned());
        }

        if reader.pos != bytes.len() {
            return Err(RagError::CorruptStore(format!(
                "{} trailing bytes after {count} records",
                bytes.len() - reader.pos
            )));
        }
        Ok(Self { docs })
    }
}

fn encode_len(len: usize) -> RagResult<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| RagError::CorruptStore(format!("length {len} exceeds u32 prefix")))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> RagResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                RagError::CorruptStore(format!("truncated at byte {} (wanted {n} more)", self.pos))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> RagResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_resolves_positions() {
        let mut store = DocumentStore::new();
        store.append_batch(["alpha", "beta"]);
        store.append_batch(vec![String::from("gamma")]);
        assert_eq!(store.count(), 3);
        assert_eq!(store.get(2).unwrap(), "gamma");
        assert!(matches!(
            store.get(3),
            Err(RagError::DocumentNotFound { id: 3, count: 3 })
        ));
    }

    #[test]
    fn records_with_delimiters_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.store");
        let mut store = DocumentStore::new();
        store.append_batch([
            "line one\nline two",
            "",
            "\"quoted\", [bracketed], \u{0}nul",
            "Caf\u{e9} \u{1f980}",
        ]);
        store.save(&path).unwrap();
        assert_eq!(DocumentStore::load(&path).unwrap(), store);
    }

    #[test]
    fn missing_file_is_store_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = DocumentStore::load(&dir.path().join("nope.store")).unwrap_err();
        assert!(matches!(err, RagError::StoreNotFound(_)));
    }

    #[test]
    fn malformed_files_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.store");
        let mut store = DocumentStore::new();
        store.append_batch(["hello", "world"]);
        store.save(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        assert!(matches!(DocumentStore::load(&path), Err(RagError::CorruptStore(_))));

        let mut trailing = bytes.clone();
        trailing.push(0);
        std::fs::write(&path, &trailing).unwrap();
        assert!(matches!(DocumentStore::load(&path), Err(RagError::CorruptStore(_))));

        let mut bad_utf8 = 1u32.to_le_bytes().to_vec();
        bad_utf8.extend_from_slice(&2u32.to_le_bytes());
        bad_utf8.extend_from_slice(&[0xff, 0xfe]);
        std::fs::write(&path, &bad_utf8).unwrap();
        assert!(matches!(DocumentStore::load(&path), Err(RagError::CorruptStore(_))));

        std::fs::write(&path, u32::MAX.to_le_bytes()).unwrap();
        assert!(matches!(DocumentStore::load(&path), Err(RagError::CorruptStore(_))));
    }
}
