use thiserror::Error;

#[derive(Error, Debug)]
pub enum InboxError {
    #[error("Not logged in to GitHub.\n\nRun:\n  gh auth login -s notifications,read:org")]
    AuthRequired,

    #[error("Missing '{0}' scope.\n\nRun:\n  gh auth refresh -s notifications,read:org")]
    MissingScope(String),

    #[error(
        "GitHub CLI (gh) is not installed and no token is set.\n\n\
         Install it, then authenticate with:\n  gh auth login -s notifications,read:org"
    )]
    ToolingUnavailable,

    #[error("GitHub API error: {0}")]
    RemoteProtocol(String),

    #[error("{0}")]
    Unknown(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InboxError>;
