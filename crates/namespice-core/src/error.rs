//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid template {index} in class '{class}': {message}")]
    InvalidTemplate {
        class: String,
        index: usize,
        message: String,
    },

    #[error("Invalid object: {message}")]
    InvalidObject { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
