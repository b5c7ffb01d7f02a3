//! Provider adapters.
//!
//! | Adapter | Trait | Transport |
//! |---------|-------|-----------|
//! | [`PolygonAdapter`] | [`crate::ReferenceDataProvider`] | REST over [`crate::HttpClient`] |
//! | [`PolygonStream`] | [`crate::TradeFeed`] | WebSocket |

mod polygon;
mod polygon_stream;

pub use polygon::PolygonAdapter;
pub use polygon_stream::PolygonStream;
