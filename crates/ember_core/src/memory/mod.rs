//! # Memory Management
//!
//! Raw storage shared by the entity registry and the component store.
//!
//! ## Design Philosophy
//!
//! Arrays never shrink. When full they grow by a fixed extension, and freed
//! slots are reused before new ones are handed out.

mod column;
mod free_list;

pub use column::{ByteColumn, MAX_ELEMENT_ALIGN};
pub use free_list::SlotAllocator;
