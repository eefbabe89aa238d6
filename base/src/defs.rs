use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    IoError,
    ImageError,
    MalformedData,
    InconsistentState,
    EmptyReconstruction,
    ReconstructionFailed,
    GeometryError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorKind::*;
        let name = match self {
            IoError => "I/O error",
            ImageError => "image error",
            MalformedData => "malformed data",
            InconsistentState => "inconsistent state",
            EmptyReconstruction => "empty reconstruction",
            ReconstructionFailed => "reconstruction failed",
            GeometryError => "geometry error",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub description: String,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind, description: String) -> Error {
        Error {
            kind,
            description,
            source: None,
        }
    }

    pub fn with_source<E: StdError + Send + Sync + 'static>(
        kind: ErrorKind,
        description: String,
        source: E,
    ) -> Error {
        Error {
            kind,
            description,
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)?;
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn StdError + 'static))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait IntoResult<T> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T>;
}

impl<T> IntoResult<T> for std::io::Result<T> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| Error::with_source(ErrorKind::IoError, desc_fn(), e))
    }
}

impl<T> IntoResult<T> for serde_json::Result<T> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| {
            Error::with_source(ErrorKind::MalformedData, desc_fn(), e)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::new(
            ErrorKind::EmptyReconstruction,
            "no voxels left".to_string(),
        );
        assert_eq!(err.to_string(), "empty reconstruction: no voxels left");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: Result<()> = Err(io).into_result(|| "writing".to_string());
        let err = err.unwrap_err();
        assert_eq!(err.kind, ErrorKind::IoError);
        assert_eq!(err.to_string(), "I/O error: writing (boom)");
        assert!(err.source().is_some());
    }
}
