//! Frame descriptor registry.
//!
//! Maps machine return addresses to the compiler-emitted frame descriptors
//! that say which stack slots of a frame hold live references. The garbage
//! collector and any other stack walker resolve every return address they
//! meet through this registry, from many threads at once, while code loaders
//! may be registering new tables.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FrameRegistry                          │
//! │  tables: Mutex<Vec<FrameTable>>   (append-only, writer lock)│
//! │  current: ArcSwap<Version> ───────────────┐                 │
//! └───────────────────────────────────────────┼─────────────────┘
//!                                             ▼
//!                 ┌───────────────────────────────────────────┐
//!                 │ Version g=N                               │
//!                 │  index: [slot; 2^k]  retaddr → descriptor │
//!                 │  free_prev_after_cycle                    │
//!                 │  prev ──▶ Version g=N-1 ──▶ ...           │
//!                 └───────────────────────────────────────────┘
//!
//!   register(table):  lock → push → rebuild index → swap current
//!   lookup(addr):     load current → (addr >> 3) & mask → probe
//! ```
//!
//! # Modules
//!
//! - [`descriptor`]: descriptor layout and the variable-length decoder
//! - [`table`]: validated frame tables
//! - [`index`]: the open-addressing hash index
//! - [`version`]: published snapshots and deferred reclamation
//! - [`registry`]: the facade tying them together
//! - [`writer`]: producer-side encoder

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cycles;
pub mod descriptor;
pub mod error;
pub mod index;
pub mod registry;
pub mod table;
pub mod version;
pub mod writer;

mod cursor;
mod stats;

pub use config::RegistryConfig;
pub use cursor::WORD_SIZE;
pub use cycles::{CycleCounter, MajorCycles};
pub use descriptor::{DebugInfo, FrameDescriptor, LiveOffsets};
pub use error::{ConfigError, DecodeError};
pub use index::FrameDescriptorIndex;
pub use registry::{FrameRegistry, Snapshot};
pub use stats::RegistryStats;
pub use table::{Descriptors, FrameTable};
pub use version::{NO_PENDING_FREE, Version};
pub use writer::{DescriptorSpec, FrameTableWriter, OwnedFrameTable};
