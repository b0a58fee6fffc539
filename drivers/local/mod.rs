//! Local filesystem driver: buckets are directories under a root / 本地文件系统驱动

mod driver;
pub mod presign;

pub use driver::LocalDriver;
