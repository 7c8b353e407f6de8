//! Helper traits for allocator trait bounds.
pub use refmap_traits::allocators::*;
