//! PDF writing support for incremental updates.
//!
//! ## Architecture
//!
//! ```text
//! changed / new objects
//!     ↓
//! [IncrementalUpdate] (objects + xref section + trailer with /Prev)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! bytes appended after the previous revision
//! ```

mod incremental;
mod object_serializer;

pub use incremental::{find_startxref, read_startxref, IncrementalUpdate, WrittenUpdate};
pub use object_serializer::ObjectSerializer;
