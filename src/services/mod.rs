pub mod compressor;
pub mod conversion;
pub mod converters;
pub mod error;
pub mod job;
pub mod process;
pub mod staging;
pub mod worker;
