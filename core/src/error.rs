#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("code buffer mapping failed: {0}")]
    CodeBuffer(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to start the VU0 worker: {0}")]
    Worker(std::io::Error),

    #[error("guest memory size {0:#x} is not a supported power of two")]
    MemorySize(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
