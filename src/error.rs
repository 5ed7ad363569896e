use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("webdriver: {0}")]
    WebDriver(#[from] fantoccini::error::CmdError),

    #[error("webdriver session: {0}")]
    Session(#[from] fantoccini::error::NewSessionError),

    #[error("script value: {0}")]
    Script(#[from] serde_json::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("{0} is not supported by this surface")]
    Unsupported(&'static str),
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("an all-pages acquisition is already in progress")]
    AcquisitionInProgress,

    #[error("could not navigate to page {0}")]
    Navigation(u32),

    #[error("expected page {target} but the listing shows page {shown}")]
    WrongPage { target: u32, shown: u32 },
}

pub type Result<T, E = HarvestError> = std::result::Result<T, E>;
