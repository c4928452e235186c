//! Configuration-driven loading of astronomical source data.
//!
//! A [`Source`] reads an INI-style configuration in which every data section
//! names a `type` and a `file`. Sections are loaded on first access through a
//! [`Registry`] of loaders and cached afterwards; `INFO` holds the source's
//! position and distances, and `type = subsource` sections describe
//! sub-regions.
//!
//! ```text
//!   Config ──▶ Source::get(section) ──▶ Registry::resolve(type) ──▶ loader
//!                    ▲                                                 │
//!                    └──────────────── cache ◀──── Artifact ◀──────────┘
//! ```

pub mod config;
pub mod container;
pub mod data;
pub mod error;
pub mod registry;
pub mod source;
pub mod subsource;
pub mod units;

pub use config::{Config, Section, SectionView};
pub use container::{Container, ContainerState, INFO_SECTION};
pub use data::loader::{Column, Table1D};
pub use data::model::{Artifact, LoaderArgs, Value, ValueKind};
pub use error::{Error, Result};
pub use registry::{default_registry, register, Loadable, Registry, SharedRegistry};
pub use source::Source;
pub use subsource::Subsource;
pub use units::{Angle, Quantity, SkyPosition};
