pub mod constants;
pub mod phase;
pub mod state;
pub mod zone;
