use async_trait::async_trait;
use gridsmith_core::Chunk;

use crate::collab::{ChunkGenerator, ChunkRequest, ChunkResponse};
use crate::error::GeneratorError;
use crate::executor::Progress;

/// Replays a fixed, ordered list of chunks.
///
/// The answer is a pure function of the request, so repeating a request with
/// the same `last_outcome` returns the same chunk. A request with `retry_of`
/// returns the next regeneration of that chunk: its registered variants in
/// order, then the original source again.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    variants: Vec<String>,
}

impl ScriptedGenerator {
    pub fn new(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        Self {
            entries: chunks
                .into_iter()
                .map(|chunk| Entry {
                    chunk,
                    variants: Vec::new(),
                })
                .collect(),
        }
    }

    /// Chunks from `(id, source)` pairs; each pair's position is its stage.
    pub fn from_named<I, S>(named: I) -> Self
    where
        I: IntoIterator<Item = (S, String)>,
        S: Into<String>,
    {
        Self::new(
            named
                .into_iter()
                .enumerate()
                .map(|(stage, (id, source))| Chunk::new(id, source, stage as u32)),
        )
    }

    /// Registers a regenerated source for `chunk_id`. Unknown ids are ignored.
    pub fn with_variant(mut self, chunk_id: &str, source: impl Into<String>) -> Self {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.chunk.id == chunk_id) {
            entry.variants.push(source.into());
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, chunk_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.chunk.id == chunk_id)
    }

    fn respond(&self, session_id: &str, index: usize, chunk: Chunk) -> ChunkResponse {
        let mut progress = Progress::new(session_id);
        progress.stage = index as u32;
        progress.total_chunks = self.entries.len() as u32;
        ChunkResponse {
            completed: false,
            chunk: Some(chunk),
            progress: Some(progress),
        }
    }
}

#[async_trait]
impl ChunkGenerator for ScriptedGenerator {
    async fn next_chunk(&self, request: &ChunkRequest) -> Result<ChunkResponse, GeneratorError> {
        if let Some(retry_of) = &request.retry_of {
            let index = self
                .position(retry_of)
                .ok_or_else(|| GeneratorError::Rejected(format!("unknown chunk id {retry_of}")))?;
            let entry = &self.entries[index];
            let attempt = request
                .last_outcome
                .as_ref()
                .filter(|o| o.chunk_id == *retry_of)
                .map_or(1, |o| o.attempt.max(1));
            let chunk = match entry.variants.get(attempt as usize - 1) {
                Some(variant) => entry.chunk.with_source(variant.clone()),
                None => entry.chunk.clone(),
            };
            return Ok(self.respond(&request.session_id, index, chunk));
        }

        let next = match &request.last_outcome {
            None => 0,
            Some(last) => match self.position(&last.chunk_id) {
                Some(i) => i + 1,
                None => {
                    return Err(GeneratorError::Rejected(format!(
                        "unknown chunk id {}",
                        last.chunk_id
                    )))
                }
            },
        };
        match self.entries.get(next) {
            Some(entry) => Ok(self.respond(&request.session_id, next, entry.chunk.clone())),
            None => Ok(ChunkResponse::completed()),
        }
    }
}
