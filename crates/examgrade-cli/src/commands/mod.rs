pub mod evaluate;
pub mod init;
pub mod ranking;
pub mod validate;
