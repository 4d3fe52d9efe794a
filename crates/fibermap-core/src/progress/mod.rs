pub mod overlay;
pub mod session;
pub mod state;
pub mod stats;
