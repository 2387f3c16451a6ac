use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, ImageGenError>;

#[derive(Debug, Error)]
pub enum ImageGenError {
    /// Unknown backend name, bad prompt source, or an out-of-range option.
    #[error("{0}")]
    Configuration(String),

    #[error("{variables} environment variable not set.")]
    Credential { variables: String, hint: String },

    /// Missing input file, unsupported extension, or too many input images.
    #[error("{0}")]
    Validation(String),

    /// The backend was not compiled in or its client could not be built.
    #[error("{message}")]
    Dependency { message: String, hint: String },

    /// The backend answered successfully but produced no images.
    #[error("No image data returned from API.")]
    NoImageData,

    #[error("{message}")]
    Backend {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ImageGenError {
    pub fn backend(message: impl Into<String>) -> Self {
        ImageGenError::Backend {
            message: message.into(),
            source: None,
        }
    }

    pub fn backend_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        ImageGenError::Backend {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Second line printed under the error, telling the user how to fix it.
    pub fn hint(&self) -> Option<&str> {
        match self {
            ImageGenError::Credential { hint, .. } | ImageGenError::Dependency { hint, .. } => {
                Some(hint.as_str())
            }
            _ => None,
        }
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, ImageGenError::Backend { .. })
    }
}
