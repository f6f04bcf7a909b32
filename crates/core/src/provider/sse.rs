//! Server-Sent Events decoding for streamed chat completions.
//!
//! SSE format: `data: {"choices":[{"delta":{"content":"hi"}}]}\n\n`, terminated by
//! `data: [DONE]`.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;

use crate::constants::{MAX_SSE_LINE_BYTES, SSE_DONE_SENTINEL};
use crate::error::ProviderError;

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
}

/// State threaded through the `unfold` stream.
struct DecodeState<E> {
    stream: BoxStream<'static, Result<Bytes, E>>,
    buf: BytesMut,
    phase: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    /// The body closed without `[DONE]` after a final delta was yielded.
    PendingEof,
    Finished,
}

enum Line {
    Skip,
    Done,
    Delta(String),
    Failed(ProviderError),
}

/// Decodes an SSE byte stream into content deltas.
///
/// Chunks without content (role announcements, usage records) are skipped. Empty content is
/// passed through; filtering is left to the caller. The stream ends after `[DONE]`, and ends with
/// `ProviderError::UnexpectedEof` if the body closes without it, even when the last line still
/// carried a delta. A line longer than `MAX_SSE_LINE_BYTES` fails with
/// `ProviderError::LineTooLong`. After yielding an error the stream yields nothing more.
pub fn decode_deltas<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, ProviderError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ProviderError> + 'static,
{
    let state = DecodeState {
        stream: byte_stream.boxed(),
        buf: BytesMut::new(),
        phase: Phase::Streaming,
    };

    stream::unfold(state, |mut st| async move {
        match st.phase {
            Phase::Finished => return None,
            Phase::PendingEof => {
                st.phase = Phase::Finished;
                return Some((Err(ProviderError::UnexpectedEof), st));
            }
            Phase::Streaming => {}
        }

        loop {
            if let Some(line_end) = st.buf.iter().position(|b| *b == b'\n') {
                let line = st.buf.split_to(line_end + 1);
                match parse_line(&String::from_utf8_lossy(&line)) {
                    Line::Skip => continue,
                    Line::Done => {
                        st.phase = Phase::Finished;
                        return None;
                    }
                    Line::Delta(content) => return Some((Ok(content), st)),
                    Line::Failed(err) => {
                        st.phase = Phase::Finished;
                        return Some((Err(err), st));
                    }
                }
            }

            if st.buf.len() > MAX_SSE_LINE_BYTES {
                st.phase = Phase::Finished;
                st.buf.clear();
                return Some((Err(ProviderError::LineTooLong(MAX_SSE_LINE_BYTES)), st));
            }

            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    st.phase = Phase::Finished;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.phase = Phase::Finished;
                    // A final line without a trailing newline is still decoded, but the
                    // missing `[DONE]` makes the result incomplete.
                    if !st.buf.is_empty() {
                        let rest = st.buf.split();
                        match parse_line(&String::from_utf8_lossy(&rest)) {
                            Line::Done => return None,
                            Line::Delta(content) => {
                                tracing::warn!("completion stream closed mid-event");
                                st.phase = Phase::PendingEof;
                                return Some((Ok(content), st));
                            }
                            Line::Failed(err) => return Some((Err(err), st)),
                            Line::Skip => {}
                        }
                    }
                    return Some((Err(ProviderError::UnexpectedEof), st));
                }
            }
        }
    })
}

fn parse_line(raw: &str) -> Line {
    let line = raw.trim();
    if line.is_empty() || line.starts_with(':') {
        return Line::Skip;
    }

    // `event:`, `id:` and `retry:` fields carry nothing we need.
    let Some(data) = line.strip_prefix("data:") else {
        return Line::Skip;
    };
    let data = data.trim();
    if data == SSE_DONE_SENTINEL {
        return Line::Done;
    }

    match serde_json::from_str::<ChunkPayload>(data) {
        Ok(ChunkPayload {
            error: Some(error), ..
        }) => Line::Failed(ProviderError::Upstream(error.message)),
        Ok(payload) => match payload.choices.into_iter().next() {
            Some(ChunkChoice {
                delta:
                    ChunkDelta {
                        content: Some(content),
                    },
            }) => Line::Delta(content),
            _ => Line::Skip,
        },
        Err(e) => Line::Failed(ProviderError::MalformedChunk(e)),
    }
}
