//! NDJSON / JSONL decoding (one JSON object per line).

use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde::de::DeserializeOwned;

/// Decode a byte stream into typed values, one per non-empty line.
///
/// Bytes are buffered until a full line is available so multi-byte characters split
/// across chunks survive. A line that fails to parse yields an error element; a trailing
/// unterminated line is parsed once at EOF.
pub fn decode_ndjson<T>(input: BoxStream<'static, Bytes>) -> BoxStream<'static, T>
where
    T: DeserializeOwned + Send + 'static,
{
    let stream = stream::unfold(
        (input, Vec::<u8>::new(), false),
        move |(mut input, mut buf, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(idx) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=idx).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    tracing::trace!(chunk = %line, "ndjson line");
                    let item = serde_json::from_str::<T>(line).map_err(crate::Error::Serialization);
                    return Some((item, (input, buf, false)));
                }

                match input.next().await {
                    Some(Ok(bytes)) => {
                        buf.extend_from_slice(&bytes);
                        continue;
                    }
                    Some(Err(e)) => return Some((Err(e), (input, buf, true))),
                    None => {
                        let rest = String::from_utf8_lossy(&buf).trim().to_string();
                        if rest.is_empty() {
                            return None;
                        }
                        let item =
                            serde_json::from_str::<T>(&rest).map_err(crate::Error::Serialization);
                        return Some((item, (input, Vec::new(), true)));
                    }
                }
            }
        },
    );

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn bytes_stream(chunks: Vec<&'static [u8]>) -> BoxStream<'static, Bytes> {
        Box::pin(tokio_stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let input = bytes_stream(vec![b"{\"a\":1}\n{\"a\"", b":2}\n\n{\"a\":3}"]);
        let values: Vec<Value> = decode_ndjson::<Value>(input)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(values.len(), 3);
        assert_eq!(values[1]["a"], 2);
        assert_eq!(values[2]["a"], 3);
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let text = "{\"t\":\"é\"}\n".as_bytes();
        let (head, tail) = text.split_at(7);
        let head: &'static [u8] = Box::leak(head.to_vec().into_boxed_slice());
        let tail: &'static [u8] = Box::leak(tail.to_vec().into_boxed_slice());
        let values: Vec<Value> = decode_ndjson::<Value>(bytes_stream(vec![head, tail]))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(values[0]["t"], "é");
    }

    #[test]
    fn test_invalid_line_yields_error() {
        let input = bytes_stream(vec![b"not json\n"]);
        let items: Vec<_> = tokio_test::block_on(decode_ndjson::<Value>(input).collect());
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
