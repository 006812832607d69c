//! Simulated host platform
//!
//! Stands in for the browser and the analytics SDK so the coordinator can be
//! driven from the terminal and exercised in tests.

pub mod browser;
pub mod sdk;

pub use browser::{PromptResponse, ShownNotification, SimulatedBrowser};
pub use sdk::SimulatedSdk;
