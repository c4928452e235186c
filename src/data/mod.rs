//! Data layer: typed values, loader arguments and the built-in loaders.
//!
//! Architecture:
//! ```text
//!  [section] loader_* options
//!        │
//!        ▼
//!   ┌───────────┐
//!   │   model    │  coerce → Value, collect → LoaderArgs
//!   └───────────┘
//!        │
//!        ▼
//!   ┌───────────┐
//!   │  loader    │  .csv / .json / .parquet → Table1D (Artifact)
//!   └───────────┘
//! ```

pub mod loader;
pub mod model;
