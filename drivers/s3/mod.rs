//! S3 compatible object storage driver (MinIO, AWS S3, ...) / S3兼容对象存储驱动

mod driver;

pub use driver::S3Driver;
