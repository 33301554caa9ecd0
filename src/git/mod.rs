pub mod command;
pub mod parse;
pub mod repo;

pub use command::{BlameOptions, FileLogOptions, GitCli};
pub use repo::{is_repository_root, GitRepo};
