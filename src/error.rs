// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NvrError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera '{id}' ONVIF error: {reason}")]
    Onvif { id: String, reason: String },

    #[error("Camera '{id}' transport error: {reason}")]
    Transport { id: String, reason: String },

    #[error("Camera '{id}' encoder failure: {reason}")]
    Encoder { id: String, reason: String },

    #[error("Camera '{id}' refused: {reason}")]
    PolicyRefusal { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, NvrError>;
