#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid layout option `{name}`: {value}")]
    InvalidOption { name: &'static str, value: String },

    #[error("barnes-hut tree exceeded the maximum depth of {depth}")]
    TreeDepthExceeded { depth: usize },

    #[error("unknown node: {label}")]
    UnknownNode { label: String },
}

pub type Result<T> = std::result::Result<T, Error>;
