//! Tidegate Simulation - an in-process torrent swarm.
//!
//! Implements the engine traits from `tidegate-core` on top of locally
//! seeded content so the gateway can be developed and tested without
//! network access. Downloads are paced, readers block on missing bytes and
//! completed files are written to the engine's storage directory.
//!
//! ```rust,no_run
//! use tidegate_sim::{SeedCatalog, SeedFile, SeedTorrent, SimulatedEngineBuilder, SimulationConfig};
//!
//! let catalog = SeedCatalog::new();
//! let magnet = catalog.seed(SeedTorrent::new(
//!     "Sample",
//!     vec![SeedFile::new("readme.txt", b"hello".to_vec())],
//! ));
//! let builder = SimulatedEngineBuilder::new(catalog, SimulationConfig::default());
//! println!("{magnet}");
//! # drop(builder);
//! ```

pub mod catalog;
pub mod config;
pub mod engine;

pub use catalog::{SeedCatalog, SeedFile, SeedTorrent};
pub use config::SimulationConfig;
pub use engine::{SimulatedEngine, SimulatedEngineBuilder, SimulatedTorrent, settings_for};
