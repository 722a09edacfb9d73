//! On-disk format shared by the classifier and scaler artifacts.
//!
//! Each file is a bincode-encoded envelope carrying a magic tag, a format
//! version and the artifact kind, followed by the payload itself.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAGIC: [u8; 4] = *b"TRSZ";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum ArtifactKind {
    Classifier,
    Scaler,
}

/// Leading fields of every envelope, readable without knowing the payload.
#[derive(Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
    kind: ArtifactKind,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    magic: [u8; 4],
    version: u32,
    kind: ArtifactKind,
    payload: T,
}

pub(crate) fn save<T: Serialize, P: AsRef<Path>>(path: P, kind: ArtifactKind, value: &T) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let envelope = Envelope {
        magic: MAGIC,
        version: FORMAT_VERSION,
        kind,
        payload: value,
    };

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let bytes = bincode::serialize(&envelope)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

pub(crate) fn load<T: DeserializeOwned, P: AsRef<Path>>(path: P, kind: ArtifactKind) -> Result<T> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::InvalidModel("not a size-estimation artifact".into()));
    }

    let header: Header = bincode::deserialize(&bytes)?;
    debug_assert_eq!(header.magic, MAGIC);
    if header.version != FORMAT_VERSION {
        return Err(Error::InvalidModel(format!(
            "unsupported artifact version {} (expected {})",
            header.version, FORMAT_VERSION
        )));
    }
    if header.kind != kind {
        return Err(Error::InvalidModel(format!(
            "expected a {:?} artifact, found {:?}",
            kind, header.kind
        )));
    }

    let envelope: Envelope<T> = bincode::deserialize(&bytes)?;
    Ok(envelope.payload)
}
