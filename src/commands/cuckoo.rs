//! Cuckoo Filter command handlers
//!
//! Implements CF.* commands for probabilistic set membership with deletion support.

use std::str::FromStr;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::protocol::RespValue;
use crate::storage::Store;
use crate::storage::cuckoofilter::{MAX_BUCKET_SIZE, MAX_EXPANSION, MAX_ITERATIONS};
use crate::storage::ops::InsertOutcome;

/// Execute Cuckoo Filter commands
pub fn execute(store: &Store, cmd: &[u8], args: &[Bytes]) -> Result<RespValue> {
    match cmd.to_ascii_uppercase().as_slice() {
        b"CF.RESERVE" => cmd_cf_reserve(store, args),
        b"CF.ADD" => cmd_cf_add(store, args),
        b"CF.ADDNX" => cmd_cf_addnx(store, args),
        b"CF.INSERT" => cmd_cf_insert(store, args, false),
        b"CF.INSERTNX" => cmd_cf_insert(store, args, true),
        b"CF.EXISTS" => cmd_cf_exists(store, args),
        b"CF.MEXISTS" => cmd_cf_mexists(store, args),
        b"CF.COUNT" => cmd_cf_count(store, args),
        b"CF.DEL" => cmd_cf_del(store, args),
        b"CF.INFO" => cmd_cf_info(store, args),
        b"CF.DEBUG" => cmd_cf_debug(store, args),
        b"CF.SCANDUMP" => cmd_cf_scandump(store, args),
        b"CF.LOADCHUNK" => cmd_cf_loadchunk(store, args),
        _ => Err(Error::UnknownCommand(
            String::from_utf8_lossy(cmd).into_owned(),
        )),
    }
}

#[inline]
fn parse_num<T: FromStr>(arg: &[u8], err: Error) -> Result<T> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(err)
}

#[inline]
fn parse_capacity(arg: &[u8]) -> Result<usize> {
    match parse_num::<usize>(arg, Error::BadCapacity)? {
        0 => Err(Error::BadCapacity),
        n => Ok(n),
    }
}

/// CF.RESERVE key capacity [BUCKETSIZE size] [MAXITERATIONS num] [EXPANSION rate]
fn cmd_cf_reserve(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() < 2 || args.len() % 2 != 0 {
        return Err(Error::WrongArity("CF.RESERVE"));
    }

    let key = args[0].clone();
    let capacity = parse_capacity(&args[1])?;

    let mut bucket_size = None;
    let mut max_iterations = None;
    let mut expansion = None;

    for pair in args[2..].chunks_exact(2) {
        let value = &pair[1];
        match pair[0].to_ascii_uppercase().as_slice() {
            b"BUCKETSIZE" => {
                let bs: usize = parse_num(value, Error::BadBucketSize)?;
                if bs == 0 || bs > MAX_BUCKET_SIZE {
                    return Err(Error::BadBucketSize);
                }
                bucket_size = Some(bs);
            }
            b"MAXITERATIONS" => {
                let mi: usize = parse_num(value, Error::BadMaxIterations)?;
                if mi == 0 || mi > MAX_ITERATIONS {
                    return Err(Error::BadMaxIterations);
                }
                max_iterations = Some(mi);
            }
            b"EXPANSION" => {
                let ex: u32 = parse_num(value, Error::BadExpansion)?;
                if ex > MAX_EXPANSION {
                    return Err(Error::BadExpansion);
                }
                expansion = Some(ex);
            }
            _ => return Err(Error::Syntax),
        }
    }

    store.cf_reserve(key, capacity, bucket_size, max_iterations, expansion)?;
    Ok(RespValue::ok())
}

/// CF.ADD key item
fn cmd_cf_add(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 2 {
        return Err(Error::WrongArity("CF.ADD"));
    }

    store.cf_add(&args[0], &args[1])?;
    Ok(RespValue::integer(1))
}

/// CF.ADDNX key item
fn cmd_cf_addnx(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 2 {
        return Err(Error::WrongArity("CF.ADDNX"));
    }

    let added = store.cf_addnx(&args[0], &args[1])?;
    Ok(RespValue::flag(added))
}

/// CF.INSERT / CF.INSERTNX key [CAPACITY cap] [NOCREATE] ITEMS item [item ...]
fn cmd_cf_insert(store: &Store, args: &[Bytes], nx: bool) -> Result<RespValue> {
    let name = if nx { "CF.INSERTNX" } else { "CF.INSERT" };
    if args.len() < 3 {
        return Err(Error::WrongArity(name));
    }

    let key = &args[0];
    let mut capacity = None;
    let mut nocreate = false;
    let mut items_start_idx = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].to_ascii_uppercase().as_slice() {
            b"CAPACITY" => {
                let value = args.get(i + 1).ok_or(Error::Syntax)?;
                capacity = Some(parse_capacity(value)?);
                i += 2;
            }
            b"NOCREATE" => {
                nocreate = true;
                i += 1;
            }
            b"ITEMS" => {
                items_start_idx = Some(i + 1);
                break;
            }
            _ => return Err(Error::Syntax),
        }
    }

    let start = match items_start_idx {
        Some(start) if start < args.len() => start,
        _ => return Err(Error::WrongArity(name)),
    };

    let items: Vec<&[u8]> = args[start..].iter().map(|b| b.as_ref()).collect();
    let results = if nx {
        store.cf_insertnx(key, &items, capacity, nocreate)?
    } else {
        store.cf_insert(key, &items, capacity, nocreate)?
    };

    Ok(RespValue::array(
        results
            .into_iter()
            .map(|r| RespValue::integer(InsertOutcome::as_int(r)))
            .collect(),
    ))
}

/// CF.EXISTS key item
fn cmd_cf_exists(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 2 {
        return Err(Error::WrongArity("CF.EXISTS"));
    }

    Ok(RespValue::flag(store.cf_exists(&args[0], &args[1])?))
}

/// CF.MEXISTS key item [item ...]
fn cmd_cf_mexists(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() < 2 {
        return Err(Error::WrongArity("CF.MEXISTS"));
    }

    let items: Vec<&[u8]> = args[1..].iter().map(|b| b.as_ref()).collect();
    let results = store.cf_mexists(&args[0], &items)?;
    Ok(RespValue::array(
        results.into_iter().map(RespValue::flag).collect(),
    ))
}

/// CF.COUNT key item
fn cmd_cf_count(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 2 {
        return Err(Error::WrongArity("CF.COUNT"));
    }

    let count = store.cf_count(&args[0], &args[1])?;
    Ok(RespValue::integer(count as i64))
}

/// CF.DEL key item
fn cmd_cf_del(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 2 {
        return Err(Error::WrongArity("CF.DEL"));
    }

    Ok(RespValue::flag(store.cf_del(&args[0], &args[1])?))
}

/// CF.INFO key
fn cmd_cf_info(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 1 {
        return Err(Error::WrongArity("CF.INFO"));
    }

    let info = store.cf_info(&args[0])?;
    Ok(RespValue::array(vec![
        RespValue::bulk_string("Size"),
        RespValue::integer(info.size as i64),
        RespValue::bulk_string("Number of buckets"),
        RespValue::integer(info.num_buckets as i64),
        RespValue::bulk_string("Number of filters"),
        RespValue::integer(info.num_filters as i64),
        RespValue::bulk_string("Number of items inserted"),
        RespValue::integer(info.num_items as i64),
        RespValue::bulk_string("Number of items deleted"),
        RespValue::integer(info.num_deletes as i64),
        RespValue::bulk_string("Bucket size"),
        RespValue::integer(info.bucket_size as i64),
        RespValue::bulk_string("Expansion rate"),
        RespValue::integer(info.expansion as i64),
        RespValue::bulk_string("Max iterations"),
        RespValue::integer(info.max_iterations as i64),
    ]))
}

/// CF.DEBUG key
fn cmd_cf_debug(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 1 {
        return Err(Error::WrongArity("CF.DEBUG"));
    }

    let summary = store.cf_debug(&args[0])?;
    Ok(RespValue::bulk(Bytes::from(summary)))
}

/// CF.SCANDUMP key iterator
fn cmd_cf_scandump(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 2 {
        return Err(Error::WrongArity("CF.SCANDUMP"));
    }

    let iterator: u64 = parse_num(&args[1], Error::BadIterator)?;
    let (next_iter, data) = store.cf_scandump(&args[0], iterator)?;
    Ok(RespValue::array(vec![
        RespValue::integer(next_iter as i64),
        RespValue::bulk(data),
    ]))
}

/// CF.LOADCHUNK key iterator data
fn cmd_cf_loadchunk(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 3 {
        return Err(Error::WrongArity("CF.LOADCHUNK"));
    }

    let iterator: u64 = parse_num(&args[1], Error::BadIterator)?;
    store.cf_loadchunk(&args[0], iterator, &args[2])?;
    Ok(RespValue::ok())
}
