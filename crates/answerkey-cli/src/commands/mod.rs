pub mod grade;
pub mod init;
pub mod preview;
pub mod validate;
