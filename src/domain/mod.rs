// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe what a synapse node works
// with, independent of the tensor framework:
//
//   - the network-wide constants every component validates
//     against (embedding width, vocabulary size)
//   - peers as seen through a directory snapshot
//   - token batches handed in by the caller
//   - embeddings returned by remote peers
//   - the error taxonomy
//   - the two collaborator seams: PeerDirectory and
//     DispatchTransport
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO concrete network or file I/O
//   - Only plain structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Immutable network-wide constants
pub mod network;

// Peer handles and the embeddings they send back
pub mod peer;

// Validated (batch, seq_len) token input
pub mod token_batch;

// SynapseError and TransportError
pub mod error;

// PeerDirectory and DispatchTransport seams
pub mod traits;
