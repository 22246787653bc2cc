//! Redis command implementations
//!
//! Routes CF.* commands to the cuckoo filter handlers and serves the handful of
//! keyspace commands a filter host needs.

pub mod cuckoo;

use crate::error::{Error, Result};
use crate::protocol::RespValue;
use crate::storage::Store;
use bytes::Bytes;

/// Command dispatcher - routes commands to appropriate handlers
pub struct Dispatcher;

impl Dispatcher {
    /// Execute a command, turning any error into an error reply
    #[inline]
    pub fn execute(store: &Store, cmd: &[u8], args: &[Bytes]) -> RespValue {
        match Self::execute_inner(store, cmd, args) {
            Ok(resp) => resp,
            Err(e) => {
                log::debug!(
                    "command '{}' failed: {}",
                    String::from_utf8_lossy(cmd),
                    e
                );
                RespValue::error(&e.to_string())
            }
        }
    }

    /// Execute a command from its full argument vector (name first)
    pub fn execute_parts(store: &Store, parts: &[Bytes]) -> RespValue {
        match parts.split_first() {
            Some((cmd, args)) => Self::execute(store, cmd, args),
            None => RespValue::error(&Error::Protocol("empty command".to_string()).to_string()),
        }
    }

    fn execute_inner(store: &Store, cmd_name: &[u8], args: &[Bytes]) -> Result<RespValue> {
        if cmd_name.len() >= 3 && cmd_name[..3].eq_ignore_ascii_case(b"CF.") {
            return cuckoo::execute(store, cmd_name, args);
        }

        match cmd_name.to_ascii_uppercase().as_slice() {
            b"PING" => cmd_ping(args),
            b"DEL" => cmd_del(store, args),
            b"EXISTS" => cmd_exists(store, args),
            b"TYPE" => cmd_type(store, args),
            b"DBSIZE" => Ok(RespValue::integer(store.len() as i64)),
            b"FLUSHDB" | b"FLUSHALL" => {
                store.flush();
                Ok(RespValue::ok())
            }
            b"SET" => cmd_set(store, args),
            b"GET" => cmd_get(store, args),
            _ => Err(Error::UnknownCommand(
                String::from_utf8_lossy(cmd_name).into_owned(),
            )),
        }
    }
}

fn cmd_ping(args: &[Bytes]) -> Result<RespValue> {
    match args {
        [] => Ok(RespValue::PONG),
        [msg] => Ok(RespValue::bulk(msg.clone())),
        _ => Err(Error::WrongArity("PING")),
    }
}

fn cmd_del(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.is_empty() {
        return Err(Error::WrongArity("DEL"));
    }
    let count: i64 = args.iter().map(|k| if store.del(k) { 1 } else { 0 }).sum();
    Ok(RespValue::integer(count))
}

fn cmd_exists(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.is_empty() {
        return Err(Error::WrongArity("EXISTS"));
    }
    let count: i64 = args
        .iter()
        .map(|k| if store.exists(k) { 1 } else { 0 })
        .sum();
    Ok(RespValue::integer(count))
}

fn cmd_type(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 1 {
        return Err(Error::WrongArity("TYPE"));
    }
    let type_name = store.key_type(&args[0]).unwrap_or("none");
    Ok(RespValue::SimpleString(Bytes::from_static(
        type_name.as_bytes(),
    )))
}

fn cmd_set(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 2 {
        return Err(Error::WrongArity("SET"));
    }
    store.set(args[0].clone(), args[1].clone());
    Ok(RespValue::ok())
}

fn cmd_get(store: &Store, args: &[Bytes]) -> Result<RespValue> {
    if args.len() != 1 {
        return Err(Error::WrongArity("GET"));
    }
    Ok(match store.get_or_wrongtype(&args[0])? {
        Some(v) => RespValue::bulk(v),
        None => RespValue::null(),
    })
}
