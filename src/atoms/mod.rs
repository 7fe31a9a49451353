// ── Praxis Atoms ───────────────────────────────────────────────────────────
// Pure data types, constants, errors and trait seams. No logic, no I/O.
// Follows the project pattern: structs here, impls in engine/.

pub mod constants;
pub mod error;
pub mod simulation;
pub mod stream;
pub mod traits;
pub mod types;
