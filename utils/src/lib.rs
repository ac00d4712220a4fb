pub mod bitset;

pub use bitset::{BitSet, ImmutBitSet};
