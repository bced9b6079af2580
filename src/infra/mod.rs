// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Concrete implementations of the outside world:
//
//   settings.rs         — NodeSettings (network parameters plus
//                         synapse config) persisted as JSON.
//
//   static_directory.rs — A PeerDirectory over a fixed list of
//                         peers, swappable as a whole.
//
//   simulated.rs        — An in-process DispatchTransport with
//                         configurable latency and failure
//                         modes, plus the peers file it reads.
//
// The core only sees these through the PeerDirectory and
// DispatchTransport traits, so a real network transport
// can replace simulated.rs without touching Layers 2-5.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Settings file persistence
pub mod settings;

/// File-backed peer directory
pub mod static_directory;

/// In-process simulated peers
pub mod simulated;
