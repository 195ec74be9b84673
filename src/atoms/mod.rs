// ── omem Atoms ──────────────────────────────────────────────────────────────
// Pure data types, the canonical error enum, and the engine configuration.
// No logic, no DB access, no I/O — impls live in engine/.

pub mod config;
pub mod error;
pub mod types;
