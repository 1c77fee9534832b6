//! Reassembles newline-delimited payloads from an HTTP byte stream.
//!
//! Network chunks do not respect line boundaries, so a JSON line from Ollama
//! or an SSE `data:` line from OpenAI can arrive split across two reads.

use crate::client::{LlmStream, LlmStreamChunk};
use faqroute_core::{AppError, AppResult};
use futures::StreamExt;

#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every complete, non-blank line.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever is left once the stream ends without a trailing newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = String::from_utf8_lossy(&rest);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

/// Turn a streaming HTTP response into an [`LlmStream`].
///
/// `parse` maps one complete line to a chunk; returning `None` skips the line
/// (keep-alives, SSE comments).
pub(crate) fn line_stream<F>(response: reqwest::Response, parse: F) -> LlmStream
where
    F: Fn(&str) -> Option<AppResult<LlmStreamChunk>> + Send + 'static,
{
    let bytes = Box::pin(response.bytes_stream());

    let lines = futures::stream::unfold(
        (bytes, LineBuffer::new(), false),
        |(mut bytes, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    let lines = buffer.push(&chunk);
                    Some((Ok(lines), (bytes, buffer, false)))
                }
                Some(Err(e)) => Some((
                    Err(AppError::Llm(format!("Stream error: {}", e))),
                    (bytes, buffer, true),
                )),
                None => {
                    let rest: Vec<String> = buffer.finish().into_iter().collect();
                    Some((Ok(rest), (bytes, buffer, true)))
                }
            }
        },
    );

    Box::pin(lines.flat_map(move |item: AppResult<Vec<String>>| {
        let chunks: Vec<AppResult<LlmStreamChunk>> = match item {
            Ok(lines) => lines.iter().filter_map(|line| parse(line)).collect(),
            Err(e) => vec![Err(e)],
        };
        futures::stream::iter(chunks)
    }))
}
