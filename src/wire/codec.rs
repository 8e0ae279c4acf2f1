//! Binary encoding for [`Value`] and the small set of protocol-level primitives (null
//! terminated strings, length-prefixed byte blobs) used by the frame layer (§4.5, §6).
//!
//! Every multi-byte integer is big-endian, matching `tokio::io`'s `AsyncReadExt`/
//! `AsyncWriteExt` integer helpers, so no manual byte-order handling is needed here.

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::value::{OrderedObject, Value};

const TAG_UNDEFINED: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_LONG: u8 = 3;
const TAG_DOUBLE: u8 = 4;
const TAG_STRING: u8 = 5;
const TAG_BYTES: u8 = 6;
const TAG_LIST: u8 = 7;
const TAG_OBJECT: u8 = 8;

/// Writes `value` in the compact binary form: a one-byte variant tag followed by a
/// variant-specific body. Strings, byte blobs, lists, and objects are all
/// length-prefixed with a 4-byte count so a reader never has to scan for a terminator.
///
/// Boxed because `Value` is recursive (`List`/`Object` contain `Value`s) and async fns
/// cannot recurse into themselves without indirection.
pub fn write_value<'a, W>(
    w: &'a mut W,
    value: &'a Value,
) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>
where
    W: AsyncWrite + Unpin + Send,
{
    Box::pin(async move {
        match value {
            Value::Undefined => w.write_u8(TAG_UNDEFINED).await,
            Value::Bool(b) => {
                w.write_u8(TAG_BOOL).await?;
                w.write_u8(u8::from(*b)).await
            }
            Value::Int(i) => {
                w.write_u8(TAG_INT).await?;
                w.write_i32(*i).await
            }
            Value::Long(i) => {
                w.write_u8(TAG_LONG).await?;
                w.write_i64(*i).await
            }
            Value::Double(d) => {
                w.write_u8(TAG_DOUBLE).await?;
                w.write_f64(*d).await
            }
            Value::String(s) => {
                w.write_u8(TAG_STRING).await?;
                write_blob(w, s.as_bytes()).await
            }
            Value::Bytes(b) => {
                w.write_u8(TAG_BYTES).await?;
                write_blob(w, b).await
            }
            Value::List(items) => {
                w.write_u8(TAG_LIST).await?;
                w.write_u32(u32::try_from(items.len()).unwrap_or(u32::MAX)).await?;
                for item in items {
                    write_value(w, item).await?;
                }
                Ok(())
            }
            Value::Object(obj) => {
                w.write_u8(TAG_OBJECT).await?;
                w.write_u32(u32::try_from(obj.len()).unwrap_or(u32::MAX)).await?;
                for (key, value) in obj.iter() {
                    write_blob(w, key.as_bytes()).await?;
                    write_value(w, value).await?;
                }
                Ok(())
            }
        }
    })
}

/// Reads a [`Value`] previously written by [`write_value`].
pub fn read_value<'a, R>(r: &'a mut R) -> Pin<Box<dyn Future<Output = io::Result<Value>> + Send + 'a>>
where
    R: AsyncRead + Unpin + Send,
{
    Box::pin(async move {
        match r.read_u8().await? {
            TAG_UNDEFINED => Ok(Value::Undefined),
            TAG_BOOL => Ok(Value::Bool(r.read_u8().await? != 0)),
            TAG_INT => Ok(Value::Int(r.read_i32().await?)),
            TAG_LONG => Ok(Value::Long(r.read_i64().await?)),
            TAG_DOUBLE => Ok(Value::Double(r.read_f64().await?)),
            TAG_STRING => {
                let bytes = read_blob(r).await?;
                String::from_utf8(bytes)
                    .map(Value::String)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
            TAG_BYTES => Ok(Value::Bytes(read_blob(r).await?)),
            TAG_LIST => {
                let count = r.read_u32().await? as usize;
                let mut items = Vec::with_capacity(count.min(1 << 16));
                for _ in 0..count {
                    items.push(read_value(r).await?);
                }
                Ok(Value::List(items))
            }
            TAG_OBJECT => {
                let count = r.read_u32().await? as usize;
                let mut obj = OrderedObject::new();
                for _ in 0..count {
                    let key_bytes = read_blob(r).await?;
                    let key = String::from_utf8(key_bytes)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    let value = read_value(r).await?;
                    obj.set(key, value);
                }
                Ok(Value::Object(obj))
            }
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown value tag {other}"),
            )),
        }
    })
}

async fn write_blob<W: AsyncWrite + Unpin>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    w.write_u32(u32::try_from(bytes.len()).unwrap_or(u32::MAX)).await?;
    w.write_all(bytes).await
}

async fn read_blob<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u32().await? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Writes a null-terminated UTF-8 string, used for protocol-level identifiers
/// (host IDs, fragment location segments) rather than [`Value`] payloads.
pub async fn write_cstring<W: AsyncWrite + Unpin>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_all(s.as_bytes()).await?;
    w.write_u8(0).await
}

/// Reads a null-terminated UTF-8 string written by [`write_cstring`].
pub async fn read_cstring<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<String> {
    let mut buf = Vec::new();
    loop {
        let byte = r.read_u8().await?;
        if byte == 0 {
            break;
        }
        buf.push(byte);
    }
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
