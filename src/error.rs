use thiserror::Error;

#[derive(Debug, Error)]
pub enum PixelPilotError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("another instance is already running (pid {0})")]
    SingleInstance(u32),

    #[error("display modeset failed: {0}")]
    Display(String),

    #[error("socket setup failed: {0}")]
    SocketSetup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build streaming graph: {0}")]
    GraphBuild(String),

    #[error("failed to link streaming graph: {0}")]
    GraphLink(String),

    #[error("streaming graph failed to reach PLAYING: {0}")]
    GraphState(String),

    #[error("decoder init failed: {0}")]
    DecoderInit(String),

    #[error("decoder start failed: {0}")]
    DecoderStart(String),

    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(String),

    #[error("transient error: {0}")]
    Transient(String),
}

pub type Result<T> = std::result::Result<T, PixelPilotError>;
