//! SMS bridge core: reassembly, deletion bookkeeping, fetch gating and the
//! driver loop tying them to the modem and the publisher.

pub mod assembly;
pub mod deletion;
pub mod fetch;
pub mod server;

pub use assembly::{AssembledMessage, AssemblyTable, Disposition, StorageIndex};
pub use deletion::DeletionCoordinator;
pub use fetch::{FetchGate, FetchSignal};
pub use server::{BridgeHandle, BridgeServer, BridgeSettings, DriverState};
