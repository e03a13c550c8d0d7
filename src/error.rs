//! The error type shared by every module in this crate.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::result;
use std::str::Utf8Error;

use crate::types::EntityType;

// Error data structures are modeled just like in the `csv` crate by BurntSushi
// (and, in turn, like this crate's own teacher).

pub(crate) fn new_error(kind: ErrorKind) -> Error {
    Error(Box::new(kind))
}

/// A type alias for `Result<T, osmix::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur while ingesting, querying, or re-serializing an
/// OSM store.
///
/// Programmer errors (see [`ErrorKind`] docs) are not represented here; those
/// fail fast via `panic!`/`assert!` instead, per the invariant-violation
/// policy described in the crate's design notes.
#[derive(Debug)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        new_error(kind)
    }

    /// Return the specific type of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Unwrap this error into its underlying type.
    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }
}

/// The specific type of a recoverable (data or domain) error.
///
/// Invariant violations — add-after-finalize, out-of-bounds index access, an
/// `apply_changeset` pass that finds a `create` entry colliding with an
/// existing base entity — are programmer errors and are not modeled here;
/// they panic instead.
#[non_exhaustive]
#[derive(Debug)]
pub enum ErrorKind {
    /// An error for I/O operations (reading/writing a PBF byte stream).
    Io(io::Error),
    /// A string-table entry could not be decoded as valid UTF-8.
    StringTableUtf8 { err: Utf8Error, index: u32 },
    /// A way ref or relation member refers to an id this store doesn't have,
    /// encountered in a context that does not tolerate missing references.
    MissingReference { entity_type: EntityType, id: i64 },
    /// The PBF ingest encountered a non-dense node group; this format is
    /// rejected outright (see the crate's ingest design notes).
    NonDenseNodeBlock,
    /// A geometry was too degenerate for the requested operation (a ring
    /// with fewer than 3 distinct points, a way with fewer than 2 refs, an
    /// unclosed ring where closure was required).
    DegenerateGeometry(&'static str),
    /// An error surfaced by the concrete PBF reader/writer collaborator.
    Source(Box<dyn StdError + Send + Sync + 'static>),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        new_error(ErrorKind::Io(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, err)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &*self.0 {
            ErrorKind::Io(err) => Some(err),
            ErrorKind::StringTableUtf8 { err, .. } => Some(err),
            ErrorKind::MissingReference { .. } => None,
            ErrorKind::NonDenseNodeBlock => None,
            ErrorKind::DegenerateGeometry(_) => None,
            ErrorKind::Source(err) => Some(err.as_ref()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &*self.0 {
            ErrorKind::Io(err) => err.fmt(f),
            ErrorKind::StringTableUtf8 { err, index } => {
                write!(f, "invalid UTF-8 at string table index {index}: {err}")
            }
            ErrorKind::MissingReference { entity_type, id } => {
                write!(f, "missing {entity_type:?} reference: {id}")
            }
            ErrorKind::NonDenseNodeBlock => {
                write!(f, "encountered a non-dense node group; only dense nodes are supported")
            }
            ErrorKind::DegenerateGeometry(reason) => {
                write!(f, "degenerate geometry: {reason}")
            }
            ErrorKind::Source(err) => write!(f, "PBF collaborator error: {err}"),
        }
    }
}
