//! Bridge between the GoldSim external element interface and the SWMM5 hydraulic engine.
//!
//! GoldSim loads this crate as a dynamic library and calls [`host::SwmmGoldSimBridge`] on
//! every step. The values exchanged on each call are described by a JSON mapping file
//! ([`mapping`]), resolved once against the open model ([`adapter`]) and exchanged with the
//! engine by a lifecycle controller ([`bridge`]).

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod host;
pub mod logging;
pub mod mapping;

pub use bridge::{Bridge, LifecycleState, ResolvedInterface};
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use mapping::{Descriptor, LoggingLevel, MappingFile};

/// Version reported to GoldSim.
pub const VERSION: f64 = 1.04;
