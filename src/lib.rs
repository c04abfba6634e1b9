pub mod credential;
pub mod digest;
pub mod engine;
pub mod extract;
pub mod io;
pub mod logging;
pub mod report;
pub mod shard;
pub mod sink;
pub mod splitter;
pub mod stats;
pub mod walker;

pub mod prelude {
    pub use crate::credential::{Credential, HashedRecord};
    pub use crate::engine::{Engine, IngestOptions};
    pub use crate::shard::ShardKey;
    pub use crate::sink::{RecordSink, ShardSchema};
}
