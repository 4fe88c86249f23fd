pub mod client;
pub mod common;
pub mod submit;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::ArraySubError;
pub type Result<T> = std::result::Result<T, Error>;

pub use submit::chunk::Chunk;

/// 1-based index of a task within the eligible lines of a manifest.
pub type TaskIndex = u64;

pub const ARRAYSUB_VERSION: &str = {
    match option_env!("ARRAYSUB_BUILD_VERSION") {
        Some(version) => version,
        None => const_format::concatcp!(env!("CARGO_PKG_VERSION"), "-dev"),
    }
};
