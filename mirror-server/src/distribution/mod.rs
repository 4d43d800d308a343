mod hub;
mod player;

pub use hub::{BroadcastHub, ChunkSink, SinkError, ViewerId};
pub use player::FfplaySink;

#[cfg(test)]
pub(crate) use hub::testing;
