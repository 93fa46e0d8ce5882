use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One decoded line of the streaming generation protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Text fragment carried by this record, if any.
    #[serde(default)]
    pub response: Option<String>,
    /// True on the final record of a generation.
    #[serde(default)]
    pub done: bool,
    /// Opaque context token; present only when `done` is true.
    #[serde(default)]
    pub context: Option<Vec<i64>>,
    /// Model name as reported by the service.
    #[serde(default)]
    pub model: Option<String>,
}

/// One decoded line of the model-pull protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
}

/// Incremental decoder for newline-delimited JSON record streams.
///
/// Upstream chunks arrive with arbitrary boundaries: one network chunk
/// may carry zero, one or several records, and a record may span two
/// chunks. The decoder buffers the unterminated trailing line across
/// [`push`](ChunkDecoder::push) calls so record decoding never depends
/// on chunk alignment. Lines that fail to parse are logged and skipped;
/// they never abort the stream.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buf: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every record completed by this chunk
    /// in arrival order.
    pub fn push<T: DeserializeOwned>(&mut self, bytes: &[u8]) -> Vec<T> {
        self.buf.extend_from_slice(bytes);
        let mut records = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(record) = parse_line(&line[..line.len() - 1]) {
                records.push(record);
            }
        }
        records
    }

    /// Flush a trailing line left without a final newline when the
    /// stream ends.
    pub fn finish<T: DeserializeOwned>(&mut self) -> Option<T> {
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest)
    }
}

fn parse_line<T: DeserializeOwned>(line: &[u8]) -> Option<T> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str(text) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(error = %e, line = %text, "skipping malformed stream line");
            None
        }
    }
}

/// Folds [`ChunkRecord`]s into the accumulated response of one turn.
///
/// Fragments concatenate in arrival order; the context token is
/// overwritten, never merged, by the record carrying `done: true`.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
    context: Option<Vec<i64>>,
    model: Option<String>,
    done: bool,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, record: &ChunkRecord) {
        if let Some(fragment) = &record.response {
            self.text.push_str(fragment);
        }
        if record.model.is_some() {
            self.model = record.model.clone();
        }
        if record.done {
            self.done = true;
            self.context = record.context.clone();
        }
    }

    /// Accumulated response text so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True once a `done` record has been folded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Final context token, if the terminal record carried one.
    pub fn context(&self) -> Option<&Vec<i64>> {
        self.context.as_ref()
    }

    /// Model reported by the stream, if any record named one.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn into_parts(self) -> (String, Option<Vec<i64>>, Option<String>) {
        (self.text, self.context, self.model)
    }
}
