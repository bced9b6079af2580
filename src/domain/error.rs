// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Two error types with very different lifetimes:
//
//   SynapseError   — returned to the caller of the synapse.
//                    Config and shape errors are fatal and
//                    never retried. NoPeerResponse is only
//                    ever seen by the forward pass, which
//                    recovers by running local-only.
//
//   TransportError — one peer's request went wrong. These are
//                    absorbed by the router: the peer is
//                    dropped from aggregation and nothing is
//                    surfaced to the caller.
//
// | Variant            | Raised by          | Recovery              |
// |--------------------|--------------------|-----------------------|
// | ConfigMismatch     | construction       | fix configuration     |
// | InvalidConfig      | construction       | fix configuration     |
// | ShapeMismatch      | fusion / head      | programmer error      |
// | InvalidTokens      | input validation   | fix the batch         |
// | NoPeerResponse     | router combine     | skip remote path      |
// | NumericInstability | loss composer      | inspect the step      |
// | TensorRead         | host readback      | backend fault         |

use std::time::Duration;

use thiserror::Error;

pub type SynapseResult<T> = Result<T, SynapseError>;

#[derive(Debug, Error)]
pub enum SynapseError {
    /// Embedding width or vocabulary size disagree with the network.
    #[error("config mismatch on {field}: network expects {expected}, config has {actual}")]
    ConfigMismatch {
        field:    &'static str,
        expected: usize,
        actual:   usize,
    },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// Tensors entering fusion or the task head disagree in shape.
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context:  &'static str,
        expected: Vec<usize>,
        actual:   Vec<usize>,
    },

    #[error("invalid token batch: {reason}")]
    InvalidTokens { reason: String },

    /// None of the queried peers returned a usable embedding.
    #[error("no peer responded ({queried} queried)")]
    NoPeerResponse { queried: usize },

    /// A loss term came out NaN or infinite.
    #[error("non-finite {term}: {value}")]
    NumericInstability { term: &'static str, value: f32 },

    #[error("cannot read tensor back to host: {reason}")]
    TensorRead { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    #[error("peer unreachable: {reason}")]
    Unreachable { reason: String },

    /// The peer answered, but not with a (batch, seq, dim) finite tensor.
    #[error("malformed response: {reason}")]
    Malformed { reason: String },
}
