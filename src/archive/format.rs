//! # Archive Wire Format
//!
//! Reader and writer for the append-only Harha archive layout.
//!
//! This module is the parsing boundary: it knows the bytes, and nothing
//! else in the crate does. The layout is little-endian throughout:
//!
//! ```text
//! magic       [u8; 4]   "HARC"
//! version     u32       currently 1
//! entry_count u32
//! strtab_len  u32
//! strtab      [u8]      concatenated entry paths
//! entries     entry_count records of:
//!     path_offset u32   into strtab
//!     path_len    u32
//!     size        u64
//!     mtime       i64   nanoseconds since the epoch
//!     data_offset u64   absolute file offset of the contents
//! data        [u8]
//! ```
//!
//! Entry paths are relative (`dir/file.txt`); directories are implied by
//! the paths and never stored.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// The four magic bytes opening every archive.
pub const MAGIC: [u8; 4] = *b"HARC";

/// The format version this module reads and writes.
pub const VERSION: u32 = 1;

const HEADER_LEN: u64 = 16;
const ENTRY_LEN: u64 = 32;

/// Errors from parsing an archive.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The file does not start with [`MAGIC`].
    #[error("bad archive magic")]
    BadMagic,

    /// The version field is newer than this reader.
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u32),

    /// An entry's path range falls outside the string table.
    #[error("entry path out of bounds")]
    PathOutOfBounds,

    /// An entry's path is not valid UTF-8.
    #[error("entry path is not valid utf-8")]
    PathNotUtf8,

    /// The underlying reader failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One file recorded in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path relative to the archive root.
    pub path: String,
    /// Content length in bytes.
    pub size: u64,
    /// Modification time, nanoseconds since the epoch.
    pub mtime: i64,
    /// Absolute offset of the contents within the archive file.
    pub data_offset: u64,
}

/// Validate the header and read every entry, in archive order.
///
/// The string table is loaded into one heap buffer and entry paths are
/// sliced out of it.
pub fn read_entries(reader: &mut (impl Read + Seek)) -> Result<Vec<Entry>, FormatError> {
    reader.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(FormatError::BadMagic);
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    let entry_count = reader.read_u32::<LittleEndian>()?;
    let strtab_len = reader.read_u32::<LittleEndian>()?;

    let mut strtab = vec![0u8; strtab_len as usize];
    reader.read_exact(&mut strtab)?;

    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let path_offset = reader.read_u32::<LittleEndian>()? as usize;
        let path_len = reader.read_u32::<LittleEndian>()? as usize;
        let size = reader.read_u64::<LittleEndian>()?;
        let mtime = reader.read_i64::<LittleEndian>()?;
        let data_offset = reader.read_u64::<LittleEndian>()?;

        let bytes = path_offset
            .checked_add(path_len)
            .and_then(|end| strtab.get(path_offset..end))
            .ok_or(FormatError::PathOutOfBounds)?;
        let path = std::str::from_utf8(bytes)
            .map_err(|_| FormatError::PathNotUtf8)?
            .to_string();

        entries.push(Entry {
            path,
            size,
            mtime,
            data_offset,
        });
    }
    Ok(entries)
}

/// Accumulates files and writes them out as one archive.
///
/// ```rust
/// use harha::ArchiveBuilder;
///
/// let mut builder = ArchiveBuilder::new();
/// builder.add_file("docs/readme.txt", 0, b"hello");
/// let mut bytes = Vec::new();
/// builder.write_to(&mut bytes).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    files: Vec<(String, i64, Vec<u8>)>,
}

impl ArchiveBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file. Paths are relative to the archive root; later
    /// duplicates shadow earlier ones on read, matching the append-only
    /// layout.
    pub fn add_file(&mut self, path: &str, mtime: i64, data: &[u8]) -> &mut Self {
        self.files.push((path.to_string(), mtime, data.to_vec()));
        self
    }

    /// Serialize the archive.
    pub fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let strtab_len: u64 = self.files.iter().map(|(p, _, _)| p.len() as u64).sum();
        let entries_start = HEADER_LEN + strtab_len;
        let data_start = entries_start + ENTRY_LEN * self.files.len() as u64;

        writer.write_all(&MAGIC)?;
        writer.write_u32::<LittleEndian>(VERSION)?;
        writer.write_u32::<LittleEndian>(self.files.len() as u32)?;
        writer.write_u32::<LittleEndian>(strtab_len as u32)?;

        for (path, _, _) in &self.files {
            writer.write_all(path.as_bytes())?;
        }

        let mut path_offset = 0u32;
        let mut data_offset = data_start;
        for (path, mtime, data) in &self.files {
            writer.write_u32::<LittleEndian>(path_offset)?;
            writer.write_u32::<LittleEndian>(path.len() as u32)?;
            writer.write_u64::<LittleEndian>(data.len() as u64)?;
            writer.write_i64::<LittleEndian>(*mtime)?;
            writer.write_u64::<LittleEndian>(data_offset)?;
            path_offset += path.len() as u32;
            data_offset += data.len() as u64;
        }

        for (_, _, data) in &self.files {
            writer.write_all(data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ArchiveBuilder::new();
        for (path, data) in files {
            builder.add_file(path, 7_000_000_000, data);
        }
        let mut bytes = Vec::new();
        builder.write_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn round_trips_entries_in_order() {
        let bytes = build(&[("a.txt", b"alpha"), ("dir/b.txt", b"bee")]);
        let entries = read_entries(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "a.txt");
        assert_eq!(entries[0].size, 5);
        assert_eq!(entries[0].mtime, 7_000_000_000);
        assert_eq!(entries[1].path, "dir/b.txt");
        assert_eq!(entries[1].size, 3);
    }

    #[test]
    fn data_offsets_point_at_the_contents() {
        let bytes = build(&[("a", b"xyz"), ("b", b"pq")]);
        let entries = read_entries(&mut Cursor::new(&bytes)).unwrap();
        for (entry, expected) in entries.iter().zip([&b"xyz"[..], &b"pq"[..]]) {
            let start = entry.data_offset as usize;
            assert_eq!(&bytes[start..start + entry.size as usize], expected);
        }
    }

    #[test]
    fn empty_archive_has_no_entries() {
        let bytes = build(&[]);
        assert!(read_entries(&mut Cursor::new(&bytes)).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = build(&[]);
        bytes[0] = b'X';
        assert!(matches!(
            read_entries(&mut Cursor::new(&bytes)),
            Err(FormatError::BadMagic)
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = build(&[]);
        bytes[4] = 9;
        assert!(matches!(
            read_entries(&mut Cursor::new(&bytes)),
            Err(FormatError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn rejects_path_range_outside_strtab() {
        let mut bytes = build(&[("abc", b"")]);
        // Corrupt the entry's path length (offset 16 strtab + 3 -> entry at 19, len at 23).
        let entry_start = 16 + 3;
        bytes[entry_start + 4] = 200;
        assert!(matches!(
            read_entries(&mut Cursor::new(&bytes)),
            Err(FormatError::PathOutOfBounds)
        ));
    }

    #[test]
    fn truncated_archive_is_an_io_error() {
        let bytes = build(&[("abc", b"data")]);
        let truncated = &bytes[..20];
        assert!(matches!(
            read_entries(&mut Cursor::new(truncated)),
            Err(FormatError::Io(_))
        ));
    }
}
