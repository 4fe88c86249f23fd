pub mod chunk;
pub mod concurrency;
pub mod controller;
pub mod log;
pub mod manifest;
pub mod probe;
pub mod scheduler;
pub mod submitter;
pub mod template;
