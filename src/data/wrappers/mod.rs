#[cfg(feature = "mmap")]
pub mod mmap;
