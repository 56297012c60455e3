use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 8 * 1024;

/// Bytes read from one output stream, capped at a limit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedOutput {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

/// Read a stream to EOF, keeping at most `limit` bytes
///
/// The rest is drained and discarded so the child never blocks on a full
/// pipe. Output of exactly `limit` bytes is not truncated.
pub async fn read_bounded<R>(mut reader: R, limit: usize) -> std::io::Result<BoundedOutput>
where
    R: AsyncRead + Unpin,
{
    let mut output = BoundedOutput::default();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }

        let room = limit.saturating_sub(output.bytes.len());
        if n > room {
            output.bytes.extend_from_slice(&chunk[..room]);
            output.truncated = true;
        } else {
            output.bytes.extend_from_slice(&chunk[..n]);
        }
    }

    Ok(output)
}
