use std::fmt;

use thiserror::Error;

use crate::codec::CodecKind;
use crate::layout::{Architecture, TrackRevision};

/// Format version plus pointer width, the pair every layout is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Properties {
    pub version: u16,
    pub architecture: Architecture,
}

impl Properties {
    pub fn new(version: u16, architecture: Architecture) -> Self {
        Self {
            version,
            architecture,
        }
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} {}", self.version, self.architecture)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid header magic {0:#010x}")]
    InvalidHeader(u32),
    #[error("no layout registered for {0}")]
    InvalidVersion(Properties),
    #[error("animation is {found}, container expects {expected}")]
    PropertiesMismatch {
        expected: Properties,
        found: Properties,
    },
    #[error("standalone buffer size is zero")]
    TruncatedBuffer,
    #[error("expected a {expected} animation, found {found}")]
    ArchitectureMismatch {
        expected: Properties,
        found: Properties,
    },
    #[error("range {offset:#x}+{len:#x} lies outside of a {size:#x} byte buffer")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("malformed record: {0:?}")]
    Parse(nom::error::ErrorKind),
    #[error("frame step {step} does not fit into {kind:?}")]
    FrameOutOfRange { kind: CodecKind, step: i64 },
    #[error("keyframe {index} is past the end of a {len} key codec")]
    KeyframeOutOfRange { index: usize, len: usize },
    #[error("{kind:?} has no compression code in {revision:?} tracks")]
    UnsupportedCodec {
        kind: CodecKind,
        revision: TrackRevision,
    },
    #[error("bone id {0} does not fit into a byte field")]
    BoneOutOfRange(i32),
    #[error("pointer fixups are not paired")]
    UnbalancedFixups,
    #[error("cannot change properties of a loaded or populated container")]
    Locked,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serialize(String),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(e: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match e {
            nom::Err::Incomplete(_) => Error::Parse(nom::error::ErrorKind::Eof),
            nom::Err::Error(e) | nom::Err::Failure(e) => Error::Parse(e.code),
        }
    }
}

impl From<cookie_factory::GenError> for Error {
    fn from(e: cookie_factory::GenError) -> Self {
        match e {
            cookie_factory::GenError::IoError(e) => Error::Io(e),
            e => Error::Serialize(format!("{:?}", e)),
        }
    }
}
