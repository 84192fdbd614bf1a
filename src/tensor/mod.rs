//! Tensor model: descriptors, declarations and materialized storage.

pub mod blob;
pub mod data;
pub mod desc;
pub mod layout;
pub mod precision;
pub mod reorder;

pub use blob::{create_blob, Blob, Storage};
pub use data::Data;
pub use desc::{element_count, TensorDesc};
pub use layout::Layout;
pub use precision::{Precision, StorageKind};
