use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} has wrong type: expected {expected}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
    },
}

/// Raised while bringing a listener up. The listener never enters its
/// receive loop after one of these.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("failed to bind UDP socket on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to configure UDP socket")]
    Configure(#[source] io::Error),

    #[error("failed to spawn listener thread")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("alert threshold {name} must be a finite number, got {value}")]
    NonFinite { name: &'static str, value: f64 },
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to create file: {path:?}")]
    FileCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("permission denied: {path:?}")]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file: {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("nothing to write")]
    EmptyInput,
}

impl WriteError {
    pub(crate) fn create(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => WriteError::Permission { path, source },
            _ => WriteError::FileCreate { path, source },
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: impl Into<io::Error>) -> Self {
        WriteError::Write {
            path: path.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn permission_denied_maps_to_permission() {
        let e = WriteError::create(
            "/var/log/sensor.csv",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );

        match e {
            WriteError::Permission { path, source } => {
                assert_eq!(path, Path::new("/var/log/sensor.csv"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected permission error, got {other:?}"),
        }
    }

    #[test]
    fn other_create_failures_map_to_file_create() {
        for kind in [io::ErrorKind::NotFound, io::ErrorKind::AlreadyExists] {
            let e = WriteError::create("missing/sensor.csv", io::Error::from(kind));
            assert!(
                matches!(e, WriteError::FileCreate { .. }),
                "{kind:?} mapped to {e:?}"
            );
        }
    }

    #[test]
    fn write_failures_keep_path_and_source() {
        let e = WriteError::write("sensor.csv", io::Error::other("disk full"));

        match &e {
            WriteError::Write { path, source } => {
                assert_eq!(path, Path::new("sensor.csv"));
                assert_eq!(source.to_string(), "disk full");
            }
            other => panic!("expected write error, got {other:?}"),
        }
        assert_eq!(e.to_string(), "failed to write file: \"sensor.csv\"");
    }

    #[test]
    fn write_failures_convert_csv_errors() {
        let csv_error = csv::Error::from(io::Error::other("broken pipe"));
        assert!(matches!(
            WriteError::write("sensor.csv", csv_error),
            WriteError::Write { .. }
        ));
    }
}
