//! Traffic and letter counters with an optional file-backed persistence hook

pub mod persistence;
pub mod store;

#[cfg(test)]
mod tests;

pub use persistence::CounterFile;
pub use store::{CounterStore, Counters, DayCounts};
