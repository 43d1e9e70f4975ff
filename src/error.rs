use std::fmt;

#[derive(Debug)]
pub enum ColorizeError {
    MalformedStylesheet(String),
    MissingSeverityMarker(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for ColorizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorizeError::MalformedStylesheet(message) => {
                write!(f, "malformed stylesheet: {}", message)
            }
            ColorizeError::MissingSeverityMarker(message) => {
                write!(f, "missing severity marker: {}", message)
            }
            ColorizeError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ColorizeError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ColorizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ColorizeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ColorizeError {
    fn from(value: std::io::Error) -> Self {
        ColorizeError::Io(value)
    }
}
