//! Scene Signal - the signal bus seen from the engine
//!
//! The engine depends on the bus only through [`SignalBus`]: a current-value
//! lookup plus change subscription. [`InMemorySignalBus`] is a reference
//! implementation used by tests, benches and embedders without a bus of
//! their own.

pub mod bus;

pub use bus::*;
