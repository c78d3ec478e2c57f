use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("failed to load overlay '{app}'")]
    OverlayLoad { app: String },
    #[error("failed to load static shell '{path}'")]
    StaticLoad { path: String },
}

pub type Result<T, E = error_stack::Report<SlotError>> = std::result::Result<T, E>;
