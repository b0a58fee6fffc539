// Driver package / 驱动包
pub mod local;
pub mod s3;
