//! OS abstraction: filesystem statistics and the mount table.

pub mod pal;
