use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unsupported protocol: {0}")]
    Unsupported(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("no {family} address on upstream device")]
    IpVersionTransition { family: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
