use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const READ_CHUNK: usize = 1024 * 1024;

/// Hex SHA-256 of the file's bytes, read once in chunks.
pub fn checksum(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|source| Error::Checksum {
        path: path.to_path_buf(),
        source,
    })?;
    checksum_reader(BufReader::new(file)).map_err(|source| Error::Checksum {
        path: path.to_path_buf(),
        source,
    })
}

pub fn checksum_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_checksum_known_value() {
        let sum = checksum_reader(&b"abc"[..]).unwrap();
        assert_eq!(
            sum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_checksum_ignores_name_and_location() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        fs::create_dir(dir.path().join("nested")).unwrap();
        let b = dir.path().join("nested").join("renamed.png");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();
        assert_eq!(checksum(&a).unwrap(), checksum(&b).unwrap());
        assert_eq!(checksum(&a).unwrap().len(), 64);
    }

    #[test]
    fn test_checksum_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let err = checksum(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Checksum { .. }));
    }
}
