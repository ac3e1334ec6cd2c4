use std::io::{Read, Seek};
use thiserror::Error;
use zip::ZipArchive;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("only ZIP archives are accepted (got '{0}')")]
    UnsupportedExtension(String),
    #[error("uploaded file is empty")]
    Empty,
    #[error("uploaded file is too large ({size} > {limit} bytes)")]
    TooLarge { size: usize, limit: usize },
    #[error("file is not a valid ZIP archive: {0}")]
    Corrupt(String),
}

/// Rejects anything whose name doesn't end in `.zip`.
pub fn check_file_name(name: &str) -> Result<(), ArchiveError> {
    let is_zip = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if is_zip {
        Ok(())
    } else {
        Err(ArchiveError::UnsupportedExtension(name.to_string()))
    }
}

pub fn check_size(len: usize, limit: usize) -> Result<(), ArchiveError> {
    if len == 0 {
        return Err(ArchiveError::Empty);
    }
    if len > limit {
        return Err(ArchiveError::TooLarge { size: len, limit });
    }
    Ok(())
}

/// Opens the archive's central directory; extension and content can disagree,
/// so this is what actually decides whether a `.zip` is a zip.
pub fn open<R: Read + Seek>(reader: R) -> Result<ZipArchive<R>, ArchiveError> {
    ZipArchive::new(reader).map_err(|e| ArchiveError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(check_file_name("course.ZIP").is_ok());
        assert!(check_file_name("dir/course.zip").is_ok());
        assert_eq!(
            check_file_name("course.tar.gz"),
            Err(ArchiveError::UnsupportedExtension("course.tar.gz".into()))
        );
        assert!(check_file_name("zip").is_err());
    }

    #[test]
    fn size_limits() {
        assert_eq!(check_size(0, 10), Err(ArchiveError::Empty));
        assert_eq!(check_size(11, 10), Err(ArchiveError::TooLarge { size: 11, limit: 10 }));
        assert!(check_size(10, 10).is_ok());
    }

    #[test]
    fn corrupt_bytes_are_rejected() {
        let err = open(Cursor::new(b"PK\x03\x04 definitely not a zip".to_vec())).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_)));
    }

    #[test]
    fn valid_archive_opens() {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        w.start_file("index.html", zip::write::FileOptions::default()).unwrap();
        w.write_all(b"<html></html>").unwrap();
        let bytes = w.finish().unwrap().into_inner();
        let zip = open(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 1);
    }
}
