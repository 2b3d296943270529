use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_format(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    /// A corpus record that cannot be parsed. `offset` is the byte position of the
    /// offending line within the input file.
    pub fn malformed_record(offset: u64, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::MalformedRecord {
                offset,
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn value_out_of_range(value: u64, max: u64) -> Error {
        Error(ErrorKind::ValueOutOfRange { value, max }.into())
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("invalid storage format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("malformed record at byte {offset}: {message}")]
    MalformedRecord { offset: u64, message: String },

    #[error("value {value} exceeds the encodable maximum {max}")]
    ValueOutOfRange { value: u64, max: u64 },

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        ErrorKind::ThreadPool(e).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::malformed_record(120, "missing review/score");
        assert_eq!(
            err.to_string(),
            "malformed record at byte 120: missing review/score"
        );

        let err = Error::value_out_of_range(1 << 30, (1 << 30) - 1);
        assert!(matches!(
            err.kind(),
            ErrorKind::ValueOutOfRange { value, .. } if *value == 1 << 30
        ));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        match err.into_kind() {
            ErrorKind::Io { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
