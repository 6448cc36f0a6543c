//! Utility functions and types shared across the client.

pub mod error;
mod logging;
pub mod notice;

pub use error::Error;
pub use logging::{build_filter, init_logging, LOG_ENV};
pub use notice::{Notice, NoticeKind, Notices};

/// Re-export of commonly used types
pub mod prelude {
    pub use super::{
        error::{Error, Result},
        logging::init_logging,
        notice::{Notice, NoticeKind, Notices},
    };
}

/// Common result type for utility functions
pub type Result<T> = std::result::Result<T, Error>;
