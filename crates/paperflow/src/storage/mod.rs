pub mod filesystem;

pub use filesystem::{hash_file, FileStorage};
