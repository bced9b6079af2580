// ============================================================
// Layer 3 — TokenBatch
// ============================================================
// The immutable (batch, seq_len) block of token ids that a
// forward pass consumes and that is shipped verbatim to every
// selected peer. Stored flat in row-major order so it can be
// turned into a tensor (or a wire payload) without copying
// row by row.

use crate::domain::error::{SynapseError, SynapseResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    ids:        Vec<u32>,
    batch_size: usize,
    seq_len:    usize,
}

impl TokenBatch {
    /// Build a batch from equal-length rows.
    ///
    /// Fails on an empty batch, an empty row, or rows of
    /// differing length.
    pub fn from_rows(rows: Vec<Vec<u32>>) -> SynapseResult<Self> {
        let batch_size = rows.len();
        let seq_len = match rows.first() {
            Some(row) => row.len(),
            None => {
                return Err(SynapseError::InvalidTokens {
                    reason: "batch has no rows".to_string(),
                })
            }
        };
        if seq_len == 0 {
            return Err(SynapseError::InvalidTokens {
                reason: "rows are empty".to_string(),
            });
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != seq_len) {
            return Err(SynapseError::InvalidTokens {
                reason: format!("row {i} has {} tokens, row 0 has {seq_len}", row.len()),
            });
        }

        let ids = rows.into_iter().flatten().collect();
        Ok(Self { ids, batch_size, seq_len })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// `[batch_size, seq_len]`
    pub fn dims(&self) -> [usize; 2] {
        [self.batch_size, self.seq_len]
    }

    /// Row-major token ids.
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn row(&self, index: usize) -> Option<&[u32]> {
        let start = index.checked_mul(self.seq_len)?;
        self.ids.get(start..start + self.seq_len)
    }

    /// Largest token id in the batch.
    pub fn max_id(&self) -> u32 {
        self.ids.iter().copied().max().unwrap_or(0)
    }

    /// Parse the CLI notation: rows separated by `;`, ids by `,`.
    /// e.g. "1,2,3;4,5,6" → [[1,2,3],[4,5,6]]
    pub fn parse(text: &str) -> SynapseResult<Self> {
        let rows = text
            .split(';')
            .map(|row| {
                row.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|t| {
                        t.parse::<u32>().map_err(|e| SynapseError::InvalidTokens {
                            reason: format!("'{t}' is not a token id: {e}"),
                        })
                    })
                    .collect::<SynapseResult<Vec<u32>>>()
            })
            .collect::<SynapseResult<Vec<Vec<u32>>>>()?;
        Self::from_rows(rows)
    }
}
