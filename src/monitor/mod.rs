//! Storage observation: directory usage plus filesystem free space.

pub mod probe;
