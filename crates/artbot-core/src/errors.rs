/// Core error type.
///
/// Adapter crates map their specific errors into this type so handlers can tell
/// a user mistake (validation, not found) from a platform or storage failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("{0}")]
    Validation(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Errors worth showing verbatim: the user's own mistake, or a limit they can wait out.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Validation(_) | Error::RateLimited(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_user_mistakes_and_limits_are_user_facing() {
        assert!(Error::Validation("bad range".into()).is_user_facing());
        assert!(Error::NotFound("artwork 1".into()).is_user_facing());
        assert!(Error::RateLimited("pixiv".into()).is_user_facing());
        assert!(!Error::Platform("telegram".into()).is_user_facing());
        assert!(!Error::Persistence("disk full".into()).is_user_facing());
        assert!(!Error::External("timeout".into()).is_user_facing());
    }
}
