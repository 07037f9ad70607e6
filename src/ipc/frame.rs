//! Discord IPC framing: little-endian opcode, little-endian length, JSON body.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

use crate::rpc::RpcError;

/// Largest payload accepted from the socket.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = RpcError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Handshake),
            1 => Ok(Self::Frame),
            2 => Ok(Self::Close),
            3 => Ok(Self::Ping),
            4 => Ok(Self::Pong),
            v => Err(RpcError::UnknownOpcode(v)),
        }
    }
}

/// Write one frame and flush it.
///
/// # Errors
///
/// Returns an error if the payload can't be serialized or the write fails.
pub async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(
    writer: &mut W,
    opcode: Opcode,
    payload: &Value,
) -> Result<(), RpcError> {
    let body = serde_json::to_vec(payload)?;
    let len = u32::try_from(body.len()).map_err(|_| RpcError::FrameTooLarge(body.len()))?;
    let mut frame = Vec::with_capacity(8 + body.len());
    frame.extend_from_slice(&(opcode as u32).to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// # Errors
///
/// Returns an error on I/O failure (including EOF), on an unknown opcode, on an oversized frame
/// or if the body is not JSON.
pub async fn read_frame<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
) -> Result<(Opcode, Value), RpcError> {
    let opcode = reader.read_u32_le().await?;
    let len = reader.read_u32_le().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge(len));
    }
    let mut body = vec![0; len];
    reader.read_exact(&mut body).await?;
    let opcode = Opcode::try_from(opcode)?;
    Ok((opcode, serde_json::from_slice(&body)?))
}
