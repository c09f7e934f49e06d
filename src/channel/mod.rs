//! The shared-memory channel protocols.
//!
//! Four channel shapes, all over raw word bands from [`crate::region`]:
//! SPSC rings ([`ring`]), the triple-buffered snapshot ([`triple`]),
//! single-slot query results ([`query`]), and the dirty-flag settings
//! gate ([`dirty`]). [`layout`] holds the shared header structs and the
//! magic/version bind discipline.

pub mod dirty;
pub mod layout;
pub mod query;
pub mod ring;
pub mod triple;

pub use dirty::{dirty_channel, DirtyConsumer, DirtyProducer};
pub use layout::{DirtyHeader, QueryHeader, RingHeader, TripleHeader, LAYOUT_VERSION};
pub use query::{query_channel, QueryPoller, QueryResponder, RayAnswer};
pub use ring::{ring_channel, Record, RingConsumer, RingProducer};
pub use triple::{triple_channel, TripleReader, TripleWriter};
