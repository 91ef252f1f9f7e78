pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed, truncated or unrecognized input (PBI, BAM, BAI or filter description).
    #[error("format error: {0}")]
    Format(String),

    /// Invalid combination of arguments supplied by the caller.
    #[error("construction error: {0}")]
    Construction(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    pub fn construction(message: impl Into<String>) -> Self {
        Error::Construction(message.into())
    }

    /// Short name used when reporting the error on the command line.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Format(_) => "FormatError",
            Error::Construction(_) => "ConstructionError",
            Error::Io(_) => "IoError",
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }
}
