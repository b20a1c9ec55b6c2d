use thiserror::Error;

use crate::record::{DoAfterId, DoAfterStatus};

pub type DoAfterResult<T> = Result<T, DoAfterError>;

#[derive(Debug, Error)]
pub enum DoAfterError {
    #[error("completion for doafter {id} was already resolved")]
    AlreadyResolved { id: DoAfterId },

    #[error("doafter {id} resolved with non-terminal status {status:?}")]
    NotTerminal { id: DoAfterId, status: DoAfterStatus },

    #[error("doafter {id} advanced while {status:?}")]
    NotRunning { id: DoAfterId, status: DoAfterStatus },

    #[error("invalid scheduler configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DoAfterError {
    pub fn config(msg: impl Into<String>) -> Self {
        DoAfterError::Config(msg.into())
    }
}
