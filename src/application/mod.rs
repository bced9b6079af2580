// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal (local inference or one training step).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Files are read through Layer 6, never directly
//   - Only workflow coordination
//
// Each use case has a thin execute() that picks the WGPU
// backend, and a backend-generic function that does the work,
// so the workflow is testable on the NdArray backend.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Local-only forward pass
pub mod infer_use_case;

// Forward + backward + Adam update against simulated peers
pub mod step_use_case;
