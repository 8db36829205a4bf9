pub mod batcher;
pub mod connection;
pub mod driver;
pub mod framing;
pub mod handler;
pub mod multiplexer;
pub mod protocol;
pub mod reliability;
pub mod router;
pub mod session;
pub mod transport;
