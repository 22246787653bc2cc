//! RDB snapshot persistence
//!
//! Writes the keyspace in an RDB-shaped file: `REDIS0011` magic, aux fields,
//! one record per key, `EOF` opcode and a CRC64 trailer. Filters are stored
//! as module values tagged `MBcuckoo-` holding their complete serialized state.

use std::fs;
use std::io::Write;
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::storage::{DataType, Entry, ScalableCuckooFilter, Store};

/// RDB opcodes
pub const RDB_OPCODE_AUX: u8 = 0xFA;
pub const RDB_OPCODE_RESIZEDB: u8 = 0xFB;
pub const RDB_OPCODE_SELECTDB: u8 = 0xFE;
pub const RDB_OPCODE_EOF: u8 = 0xFF;

/// RDB value types
pub const RDB_TYPE_STRING: u8 = 0;
pub const RDB_TYPE_MODULE_2: u8 = 7;

/// Module type names (9 bytes)
pub const MODULE_TYPE_CUCKOOFILTER: &[u8] = b"MBcuckoo-";

const RDB_MAGIC: &[u8] = b"REDIS0011";

/// Generate an RDB snapshot of the store
pub fn generate_snapshot(store: &Store) -> Bytes {
    encode_snapshot(store).0
}

/// Snapshot bytes together with the number of keys written.
/// Filters still receiving LOADCHUNK data are left out
fn encode_snapshot(store: &Store) -> (Bytes, usize) {
    let mut body = BytesMut::with_capacity(64 * 1024);
    let mut keys = 0;
    store.for_each_entry(|key, entry| {
        if matches!(&entry.data, DataType::CuckooFilter(cf) if cf.is_loading()) {
            log::warn!(
                "skipping cuckoo filter '{}' in snapshot: load in progress",
                String::from_utf8_lossy(key)
            );
            return;
        }
        write_value(&mut body, key, &entry.data);
        keys += 1;
    });

    let mut rdb = BytesMut::with_capacity(body.len() + 64);

    // Magic number and version
    rdb.put_slice(RDB_MAGIC);

    // AUX fields
    write_aux(&mut rdb, b"redis-ver", b"7.0.0");
    write_aux(&mut rdb, b"redis-bits", b"64");

    rdb.put_u8(RDB_OPCODE_SELECTDB);
    write_length(&mut rdb, 0);
    rdb.put_u8(RDB_OPCODE_RESIZEDB);
    write_length(&mut rdb, keys);
    write_length(&mut rdb, 0);

    rdb.put_slice(&body);

    // EOF
    rdb.put_u8(RDB_OPCODE_EOF);

    let checksum = crc64(&rdb);
    rdb.put_u64_le(checksum);

    (rdb.freeze(), keys)
}

/// Write a key-value pair
fn write_value(rdb: &mut BytesMut, key: &[u8], data: &DataType) {
    match data {
        DataType::String(s) => {
            rdb.put_u8(RDB_TYPE_STRING);
            write_string(rdb, key);
            write_string(rdb, s);
        }
        DataType::CuckooFilter(cf) => {
            rdb.put_u8(RDB_TYPE_MODULE_2);
            write_string(rdb, key);
            write_string(rdb, MODULE_TYPE_CUCKOOFILTER);
            write_string(rdb, &cf.to_bytes());
        }
    }
}

fn write_aux(rdb: &mut BytesMut, key: &[u8], value: &[u8]) {
    rdb.put_u8(RDB_OPCODE_AUX);
    write_string(rdb, key);
    write_string(rdb, value);
}

/// Write length-prefixed string
fn write_string(rdb: &mut BytesMut, s: &[u8]) {
    write_length(rdb, s.len());
    rdb.put_slice(s);
}

/// Write length encoding
fn write_length(rdb: &mut BytesMut, len: usize) {
    if len < 64 {
        rdb.put_u8(len as u8);
    } else if len < 16384 {
        rdb.put_u8(0x40 | ((len >> 8) as u8));
        rdb.put_u8(len as u8);
    } else if len <= u32::MAX as usize {
        rdb.put_u8(0x80);
        rdb.put_u32(len as u32);
    } else {
        rdb.put_u8(0x81);
        rdb.put_u64(len as u64);
    }
}

fn corrupt(msg: impl Into<String>) -> Error {
    Error::Snapshot(msg.into())
}

/// Read length encoding
fn read_length(buf: &mut &[u8]) -> Result<usize> {
    if !buf.has_remaining() {
        return Err(corrupt("truncated length"));
    }
    let first = buf.get_u8();

    match first >> 6 {
        0 => Ok((first & 0x3F) as usize),
        1 => {
            if !buf.has_remaining() {
                return Err(corrupt("truncated length"));
            }
            Ok((((first & 0x3F) as usize) << 8) | buf.get_u8() as usize)
        }
        2 if first == 0x80 => {
            if buf.remaining() < 4 {
                return Err(corrupt("truncated length"));
            }
            Ok(buf.get_u32() as usize)
        }
        2 if first == 0x81 => {
            if buf.remaining() < 8 {
                return Err(corrupt("truncated length"));
            }
            usize::try_from(buf.get_u64()).map_err(|_| corrupt("length overflow"))
        }
        _ => Err(corrupt(format!("unsupported length encoding 0x{:02x}", first))),
    }
}

fn read_string(buf: &mut &[u8]) -> Result<Bytes> {
    let len = read_length(buf)?;
    if buf.remaining() < len {
        return Err(corrupt("truncated string"));
    }
    Ok(buf.copy_to_bytes(len))
}

/// Load an RDB snapshot into the store, replacing keys it contains.
/// Nothing is applied unless the whole file parses and its checksum matches.
/// Returns the number of keys loaded
pub fn load_snapshot(data: &[u8], store: &Store) -> Result<usize> {
    let records = parse_snapshot(data)?;
    let loaded = records.len();
    for (key, entry) in records {
        store.data_insert(key, entry);
    }
    Ok(loaded)
}

fn parse_snapshot(data: &[u8]) -> Result<Vec<(Bytes, Entry)>> {
    if data.len() < RDB_MAGIC.len() + 1 + 8 || &data[..5] != b"REDIS" {
        return Err(corrupt("invalid RDB magic"));
    }

    let mut buf = &data[RDB_MAGIC.len()..];
    let mut records = Vec::new();

    loop {
        if !buf.has_remaining() {
            return Err(corrupt("missing EOF"));
        }
        let opcode = buf.get_u8();

        match opcode {
            RDB_OPCODE_EOF => {
                if buf.remaining() < 8 {
                    return Err(corrupt("truncated checksum"));
                }
                let covered = data.len() - buf.remaining();
                let checksum = buf.get_u64_le();
                if checksum != 0 && crc64(&data[..covered]) != checksum {
                    return Err(corrupt("checksum mismatch"));
                }
                break;
            }
            RDB_OPCODE_AUX => {
                read_string(&mut buf)?;
                read_string(&mut buf)?;
            }
            RDB_OPCODE_SELECTDB => {
                let db = read_length(&mut buf)?;
                if db != 0 {
                    return Err(corrupt(format!("database index out of range: {}", db)));
                }
            }
            RDB_OPCODE_RESIZEDB => {
                read_length(&mut buf)?;
                read_length(&mut buf)?;
            }
            RDB_TYPE_STRING => {
                let key = read_string(&mut buf)?;
                let value = read_string(&mut buf)?;
                records.push((key, Entry::new(DataType::String(value))));
            }
            RDB_TYPE_MODULE_2 => {
                let key = read_string(&mut buf)?;
                let module_type = read_string(&mut buf)?;
                if module_type.as_ref() != MODULE_TYPE_CUCKOOFILTER {
                    return Err(corrupt(format!(
                        "unknown module type {}",
                        String::from_utf8_lossy(&module_type)
                    )));
                }
                let cf_data = read_string(&mut buf)?;
                let cf = ScalableCuckooFilter::from_bytes(&cf_data).map_err(|e| {
                    corrupt(format!(
                        "filter '{}': {}",
                        String::from_utf8_lossy(&key),
                        e
                    ))
                })?;
                records.push((key, Entry::new(DataType::CuckooFilter(Box::new(cf)))));
            }
            _ => {
                return Err(corrupt(format!("unknown RDB type: {}", opcode)));
            }
        }
    }

    Ok(records)
}

/// Write a snapshot to `path` atomically (temp file + rename)
pub fn save_to_file(store: &Store, path: &Path) -> Result<()> {
    let (snapshot, keys) = encode_snapshot(store);
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&snapshot)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    log::info!(
        "DB saved on disk: {} keys, {} bytes",
        keys,
        snapshot.len()
    );
    Ok(())
}

/// Load a snapshot file into the store. A missing file loads nothing
pub fn load_from_file(store: &Store, path: &Path) -> Result<usize> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let loaded = load_snapshot(&data, store)?;
    log::info!("DB loaded from disk: {} keys", loaded);
    Ok(loaded)
}

/// CRC64 (Jones polynomial, reflected) as used by Redis
fn crc64(data: &[u8]) -> u64 {
    const POLY: u64 = 0x95AC9329AC4BC9B5;
    let mut crc: u64 = 0;

    for &byte in data {
        crc ^= byte as u64;
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc64_check_value() {
        // Redis crc64 reference: crc64("123456789") == 0xe9c6d914c4b8d9ca
        assert_eq!(crc64(b"123456789"), 0xe9c6d914c4b8d9ca);
    }

    #[test]
    fn test_length_encoding() {
        for len in [0usize, 63, 64, 16383, 16384, 1 << 20, u32::MAX as usize + 1] {
            let mut buf = BytesMut::new();
            write_length(&mut buf, len);
            let mut slice = &buf[..];
            assert_eq!(read_length(&mut slice).unwrap(), len);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = Store::new();
        store.set(Bytes::from_static(b"greeting"), Bytes::from_static(b"hello"));
        store
            .cf_reserve(Bytes::from_static(b"cf"), 100, None, None, Some(2))
            .unwrap();
        let cf = Bytes::from_static(b"cf");
        for i in 0..500 {
            store.cf_add(&cf, format!("item{}", i).as_bytes()).unwrap();
        }
        for i in 0..50 {
            assert!(store.cf_del(&cf, format!("item{}", i).as_bytes()).unwrap());
        }
        let before = store.cf_debug(b"cf").unwrap();

        let snapshot = generate_snapshot(&store);
        let restored = Store::new();
        assert_eq!(load_snapshot(&snapshot, &restored).unwrap(), 2);

        assert_eq!(restored.get(b"greeting"), Some(Bytes::from_static(b"hello")));
        assert_eq!(restored.cf_debug(b"cf").unwrap(), before);
        assert!(before.contains("deletes:50"));
        for i in 50..500 {
            assert!(restored.cf_exists(b"cf", format!("item{}", i).as_bytes()).unwrap());
        }
    }

    #[test]
    fn test_corrupt_snapshot_rejected() {
        let store = Store::new();
        store.cf_add(&Bytes::from_static(b"cf"), b"a").unwrap();
        let snapshot = generate_snapshot(&store);

        let restored = Store::new();
        assert!(matches!(
            load_snapshot(b"NOTREDIS00000000000", &restored),
            Err(Error::Snapshot(_))
        ));

        let mut flipped = snapshot.to_vec();
        let mid = flipped.len() / 2;
        flipped[mid] ^= 0xFF;
        assert!(load_snapshot(&flipped, &restored).is_err());

        let truncated = &snapshot[..snapshot.len() - 12];
        assert!(load_snapshot(truncated, &restored).is_err());
    }

    #[test]
    fn test_failed_load_leaves_store_untouched() {
        let source = Store::new();
        source.set(Bytes::from_static(b"a"), Bytes::from_static(b"new"));
        source.set(Bytes::from_static(b"b"), Bytes::from_static(b"new"));
        let mut snapshot = generate_snapshot(&source).to_vec();
        let last = snapshot.len() - 1;
        snapshot[last] ^= 0x01;

        let store = Store::new();
        store.set(Bytes::from_static(b"a"), Bytes::from_static(b"old"));
        assert!(matches!(
            load_snapshot(&snapshot, &store),
            Err(Error::Snapshot(_))
        ));
        assert_eq!(store.get(b"a"), Some(Bytes::from_static(b"old")));
        assert!(!store.exists(b"b"));
    }

    #[test]
    fn test_snapshot_skips_filter_being_loaded() {
        let store = Store::new();
        let src = Bytes::from_static(b"src");
        store.cf_add(&src, b"x").unwrap();
        let (cursor, header) = store.cf_scandump(b"src", 0).unwrap();
        store
            .cf_loadchunk(&Bytes::from_static(b"partial"), cursor, &header)
            .unwrap();

        let restored = Store::new();
        assert_eq!(load_snapshot(&generate_snapshot(&store), &restored).unwrap(), 1);
        assert!(restored.cf_exists(b"src", b"x").unwrap());
        assert!(!restored.exists(b"partial"));
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("cuckoo-kv-{}.rdb", std::process::id()));
        let store = Store::new();
        let cf = Bytes::from_static(b"cf");
        store.cf_add(&cf, b"k1").unwrap();
        store.cf_add(&cf, b"k1").unwrap();
        assert!(store.cf_del(&cf, b"k1").unwrap());
        save_to_file(&store, &path).unwrap();

        let restored = Store::new();
        assert_eq!(load_from_file(&restored, &path).unwrap(), 1);
        fs::remove_file(&path).unwrap();
        assert_eq!(restored.cf_count(b"cf", b"k1").unwrap(), 1);
        assert_eq!(restored.cf_info(b"cf").unwrap().num_deletes, 1);

        assert_eq!(load_from_file(&restored, &path).unwrap(), 0);
    }
}
