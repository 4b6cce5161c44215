pub mod entry;

pub use entry::{Enclosure, Entry, MediaRef};
