use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unsupported date '{0}': expected a calendar date in YYYY-MM-DD form")]
    UnsupportedDate(String),
}
