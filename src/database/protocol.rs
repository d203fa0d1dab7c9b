//! Client/server wire protocol.
//!
//! Strings are null-terminated. A `0x00` or `0xFF` byte inside a string is
//! prefixed with `0xFF`.
//!
//! ```text
//! login:    S → nonce\0
//!           C → user\0 md5(md5(password) + nonce)\0
//!           S → 0x00 (accepted) | 0x01 (denied)
//! command:  C → command\0
//!           S → result\0 info\0 0x00 (ok) | 0x01 (error) | 0x02 (not found)
//!                                   info = diagnostic on failure
//! exit:     C → exit\0
//! ```

use md5::{Digest, Md5};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Command that ends a session.
pub const EXIT: &str = "exit";

/// Status byte for success.
pub const OK: u8 = 0x00;

/// Status byte for failure.
pub const ERROR: u8 = 0x01;

/// Status byte for a command that addressed a missing database or resource.
pub const NOT_FOUND: u8 = 0x02;

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0xFF;

/// Wire protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection in the middle of a message.
    #[error("Connection closed by peer")]
    Closed,

    #[error("Invalid UTF-8 in protocol string")]
    Encoding,
}

/// Lowercase hex MD5 digest of `input`.
pub fn md5_hex(input: &str) -> String {
    Md5::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Digest a client sends to log in: `md5(md5(password) + nonce)`.
pub fn login_digest(password: &str, nonce: &str) -> String {
    md5_hex(&format!("{}{}", md5_hex(password), nonce))
}

/// Read one null-terminated string, resolving escapes.
pub async fn read_string<R>(reader: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut bytes = Vec::new();
    loop {
        match read_byte(reader).await? {
            TERMINATOR => break,
            ESCAPE => bytes.push(read_byte(reader).await?),
            b => bytes.push(b),
        }
    }
    String::from_utf8(bytes).map_err(|_| ProtocolError::Encoding)
}

/// Read a single byte.
pub async fn read_byte<R>(reader: &mut R) -> Result<u8, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    if reader.fill_buf().await?.is_empty() {
        return Err(ProtocolError::Closed);
    }
    Ok(reader.read_u8().await?)
}

/// Write `value` as an escaped, null-terminated string. Does not flush.
pub async fn write_string<W>(writer: &mut W, value: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(value.len() + 1);
    for &b in value.as_bytes() {
        if b == TERMINATOR || b == ESCAPE {
            buf.push(ESCAPE);
        }
        buf.push(b);
    }
    buf.push(TERMINATOR);
    writer.write_all(&buf).await?;
    Ok(())
}
