use std::io::{ErrorKind, Read, Write};

use anyhow::{bail, Context};
use serde::Serialize;

use crate::{config, protocol::Request};

/// Read one framed request. `Ok(None)` means the parent closed stdin.
pub fn read_message(stdin: &mut dyn Read) -> anyhow::Result<Option<Request>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match stdin.read(&mut len_buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("failed reading native message length"),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < 4 {
        bail!("incomplete length prefix (expected 4 bytes, got {filled})");
    }

    // Native messaging uses 32-bit little-endian length.
    let msg_len = u32::from_le_bytes(len_buf);
    if msg_len > config::native_messaging::MAX_MESSAGE_SIZE_BYTES {
        bail!("message too large: {msg_len} bytes");
    }

    let mut payload = vec![0u8; msg_len as usize];
    stdin
        .read_exact(&mut payload)
        .with_context(|| format!("failed reading native message payload ({msg_len} bytes)"))?;

    let req: Request = serde_json::from_slice(&payload).context("invalid JSON request")?;
    Ok(Some(req))
}

pub fn write_json<T: Serialize>(stdout: &mut dyn Write, v: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(v).context("failed serializing JSON response")?;
    let len: u32 = bytes
        .len()
        .try_into()
        .context("response too large for u32 length")?;
    stdout.write_all(&len.to_le_bytes())?;
    stdout.write_all(&bytes)?;
    stdout.flush().context("failed flushing stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn frame(json: &str) -> Vec<u8> {
        let mut out = (json.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(json.as_bytes());
        out
    }

    #[test]
    fn test_read_two_messages_then_eof() {
        let mut bytes = frame(r#"{"id":"1","method":"hello"}"#);
        bytes.extend(frame(r#"{"id":"2","method":"embed","params":{"texts":["a"]}}"#));
        let mut cur = Cursor::new(bytes);

        let first = read_message(&mut cur).unwrap().unwrap();
        assert_eq!(first.id, "1");
        let second = read_message(&mut cur).unwrap().unwrap();
        assert_eq!(second.method, "embed");
        assert_eq!(second.params["texts"][0], "a");
        assert!(read_message(&mut cur).unwrap().is_none());
    }

    #[test]
    fn test_truncated_length_prefix() {
        let mut cur = Cursor::new(vec![1u8, 0]);
        assert!(read_message(&mut cur).is_err());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let len = config::native_messaging::MAX_MESSAGE_SIZE_BYTES + 1;
        let mut cur = Cursor::new(len.to_le_bytes().to_vec());
        let err = read_message(&mut cur).unwrap_err();
        assert!(format!("{err}").contains("message too large"));
    }

    #[test]
    fn test_write_json_prefixes_length() {
        let mut out = Vec::new();
        write_json(&mut out, &serde_json::json!({ "id": "1", "result": { "ok": true } })).unwrap();
        let len = u32::from_le_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(len, out.len() - 4);
        let v: serde_json::Value = serde_json::from_slice(&out[4..]).unwrap();
        assert_eq!(v["result"]["ok"], true);
    }
}
