pub mod probe;
pub mod submit;
pub mod task;
