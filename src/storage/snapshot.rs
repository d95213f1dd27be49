//! Snapshot file format: a frozen index on disk
//!
//! Layout: a fixed 32-byte header followed by the index serialized with
//! bincode and compressed with ZSTD. The header carries a CRC32 of the
//! compressed payload so truncated or corrupted files are rejected before
//! decompression.

use crate::error::{Error, Result};
use crate::index::trie::PrefixIndex;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc32fast::Hasher as Crc32Hasher;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Snapshot file format version
pub const SNAPSHOT_VERSION: u8 = 1;

/// Snapshot header size (32 bytes)
pub const HEADER_SIZE: usize = 32;

/// Magic number: "QLOG1"
pub const MAGIC: &[u8; 5] = b"QLOG1";

/// Compression level for ZSTD (1-22, higher = better compression but slower)
pub const ZSTD_COMPRESSION_LEVEL: i32 = 3;

/// Snapshot header structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub k_max: u64,
    pub payload_size: u64,
    pub checksum: u32,
}

impl SnapshotHeader {
    /// Serialize header to bytes
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);

        // Magic number (5 bytes)
        buf.put_slice(MAGIC);

        // Version (1 byte)
        buf.put_u8(SNAPSHOT_VERSION);

        // Reserved (2 bytes)
        buf.put_u16(0);

        // k_max (8 bytes)
        buf.put_u64(self.k_max);

        // Payload size (8 bytes)
        buf.put_u64(self.payload_size);

        // Checksum (4 bytes)
        buf.put_u32(self.checksum);

        // Padding to 32 bytes: 5+1+2+8+8+4 = 28
        buf.put_bytes(0, 4);

        debug_assert_eq!(buf.len(), HEADER_SIZE);
        buf.freeze()
    }

    /// Deserialize header from bytes
    pub fn deserialize(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::Storage("Invalid header size".to_string()));
        }

        let magic = &buf[0..5];
        if magic != MAGIC {
            return Err(Error::Storage(format!("Invalid magic number: {:?}", magic)));
        }
        buf.advance(5);

        let version = buf.get_u8();
        if version != SNAPSHOT_VERSION {
            return Err(Error::Storage(format!("Unsupported version: {}", version)));
        }

        // Reserved
        buf.advance(2);

        let k_max = buf.get_u64();
        let payload_size = buf.get_u64();
        let checksum = buf.get_u32();

        Ok(Self {
            k_max,
            payload_size,
            checksum,
        })
    }
}

/// Write `index` to `path`, replacing any existing file.
///
/// The snapshot is written to a sibling temporary file and renamed into
/// place, so readers never observe a half-written snapshot.
pub fn save<P: AsRef<Path>>(path: P, index: &PrefixIndex) -> Result<SnapshotHeader> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let serialized = bincode::serialize(index)?;
    let compressed = zstd::encode_all(&serialized[..], ZSTD_COMPRESSION_LEVEL)
        .map_err(|e| Error::Storage(format!("ZSTD compression failed: {}", e)))?;

    let mut hasher = Crc32Hasher::new();
    hasher.update(&compressed);
    let header = SnapshotHeader {
        k_max: index.k_max() as u64,
        payload_size: compressed.len() as u64,
        checksum: hasher.finalize(),
    };

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    file.write_all(&header.serialize())?;
    file.write_all(&compressed)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;

    info!(
        path = %path.display(),
        nodes = index.node_count(),
        uncompressed = serialized.len(),
        compressed = compressed.len(),
        "Snapshot written"
    );
    Ok(header)
}

/// Read an index back from a snapshot written by [`save`]
pub fn load<P: AsRef<Path>>(path: P) -> Result<PrefixIndex> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    let header = SnapshotHeader::deserialize(&data)?;

    let payload = &data[HEADER_SIZE..];
    if payload.len() as u64 != header.payload_size {
        return Err(Error::Storage(format!(
            "Truncated snapshot: expected {} payload bytes, found {}",
            header.payload_size,
            payload.len()
        )));
    }

    let mut hasher = Crc32Hasher::new();
    hasher.update(payload);
    let checksum = hasher.finalize();
    if checksum != header.checksum {
        return Err(Error::Storage(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, checksum
        )));
    }

    let decompressed = zstd::decode_all(payload)
        .map_err(|e| Error::Storage(format!("ZSTD decompression failed: {}", e)))?;
    let index: PrefixIndex = bincode::deserialize(&decompressed)?;

    if index.k_max() as u64 != header.k_max {
        return Err(Error::Storage(format!(
            "Header k_max {} does not match index k_max {}",
            header.k_max,
            index.k_max()
        )));
    }
    index
        .validate()
        .map_err(|e| Error::Storage(format!("Invalid snapshot contents: {}", e)))?;

    info!(
        path = %path.display(),
        nodes = index.node_count(),
        events = index.event_count(),
        k_max = index.k_max(),
        "Snapshot loaded"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::QueryEvent;
    use std::io::{Seek, SeekFrom};
    use tempfile::TempDir;

    fn sample_index() -> PrefixIndex {
        let events = vec![
            QueryEvent::new("2015-08-01 00:03:43", "webrtc"),
            QueryEvent::new("2015-08-01 00:03:44", "webrtc"),
            QueryEvent::new("2015-08-02 10:00:00", "rust"),
            QueryEvent::new("2016-01-01 00:00:00", "zstd"),
        ];
        PrefixIndex::build(&events, 2).unwrap()
    }

    #[test]
    fn test_snapshot_header_serialization() {
        let header = SnapshotHeader {
            k_max: 50,
            payload_size: 1234,
            checksum: 0xDEADBEEF,
        };
        let bytes = header.serialize();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(SnapshotHeader::deserialize(&bytes).unwrap(), header);
    }

    #[test]
    fn test_snapshot_write_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("index.qlog");

        let index = sample_index();
        let header = save(&path, &index).unwrap();
        assert_eq!(header.k_max, 2);

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.distinct_count_for_prefix("2015-08"), 2);
        assert_eq!(loaded.top_queries_for_prefix("2015", 5)[0].query, "webrtc");
    }

    #[test]
    fn test_checksum_verification() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.qlog");
        save(&path, &sample_index()).unwrap();

        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(HEADER_SIZE as u64 + 3)).unwrap();
        file.write_all(&[0xFF]).unwrap();
        file.sync_all().unwrap();

        assert!(matches!(load(&path), Err(Error::Storage(_))));
    }

    #[test]
    fn test_truncated_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.qlog");
        save(&path, &sample_index()).unwrap();

        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 1]).unwrap();
        assert!(matches!(load(&path), Err(Error::Storage(_))));

        fs::write(&path, &data[..10]).unwrap();
        assert!(matches!(load(&path), Err(Error::Storage(_))));
    }

    #[test]
    fn test_wrong_magic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.qlog");
        fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(matches!(load(&path), Err(Error::Storage(_))));
    }
}
