use flate2::{Decompress, FlushDecompress};
use log::debug;

use crate::errors::ZipError;
use crate::structs::{
    central_directory::CentralDirectory, eocd::EndOfCentralDirectory,
    local_file_header::LocalFileHeader,
};

/// A parsed ZIP archive (APK or JAR) held fully in memory.
///
/// The central directory is indexed once at open; entry bytes are read and
/// decompressed on demand. Iteration follows the central-directory order so
/// traversal over an archive is deterministic.
pub struct Archive {
    input: Vec<u8>,
    central_directory: CentralDirectory,
}

impl Archive {
    pub fn open(input: Vec<u8>) -> Result<Archive, ZipError> {
        // perform basic sanity check
        if !input.starts_with(b"PK\x03\x04") {
            return Err(ZipError::InvalidHeader);
        }

        let eocd_offset =
            EndOfCentralDirectory::find_eocd(&input, 4096).ok_or(ZipError::NotFoundEOCD)?;

        let eocd = EndOfCentralDirectory::parse(&mut &input[eocd_offset..])
            .map_err(|_| ZipError::ParseError)?;

        let central_directory =
            CentralDirectory::parse(&input, &eocd).map_err(|_| ZipError::ParseError)?;

        debug!(
            "archive opened: {} entries ({} listed in EOCD)",
            central_directory.entries.len(),
            eocd.total_entries
        );

        Ok(Archive {
            input,
            central_directory,
        })
    }

    /// Entry names in central-directory order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.central_directory
            .entries
            .iter()
            .map(|entry| entry.file_name.as_str())
    }

    /// Number of entries in the central directory.
    #[inline]
    pub fn len(&self) -> usize {
        self.central_directory.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.central_directory.entries.is_empty()
    }

    /// Read and decompress one entry by name.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, ZipError> {
        let index = *self
            .central_directory
            .by_name
            .get(name)
            .ok_or(ZipError::EntryNotFound)?;

        self.read_index(index)
    }

    fn read_index(&self, index: usize) -> Result<Vec<u8>, ZipError> {
        let entry = self
            .central_directory
            .entries
            .get(index)
            .ok_or(ZipError::EntryNotFound)?;

        let local_header = LocalFileHeader::parse(&self.input, entry.local_header_offset as usize)
            .map_err(|_| ZipError::ParseError)?;

        // streaming writers leave zeros in the local header and put the real
        // sizes in the central directory
        let (compressed_size, uncompressed_size) =
            if local_header.compressed_size == 0 || local_header.uncompressed_size == 0 {
                (
                    entry.compressed_size as usize,
                    entry.uncompressed_size as usize,
                )
            } else {
                (
                    local_header.compressed_size as usize,
                    local_header.uncompressed_size as usize,
                )
            };

        let offset = entry.local_header_offset as usize + local_header.size();
        let get_slice = |start: usize, end: usize| self.input.get(start..end).ok_or(ZipError::EOF);

        match local_header.compression_method {
            0 => {
                // stored (no compression)
                let slice = get_slice(offset, offset + uncompressed_size)?;
                Ok(slice.to_vec())
            }
            8 => {
                // raw deflate
                let compressed_data = get_slice(offset, offset + compressed_size)?;
                let mut uncompressed_data = Vec::with_capacity(uncompressed_size);

                Decompress::new(false)
                    .decompress_vec(
                        compressed_data,
                        &mut uncompressed_data,
                        FlushDecompress::Finish,
                    )
                    .map_err(|_| ZipError::DecompressionError(entry.file_name.clone()))?;

                Ok(uncompressed_data)
            }
            other => Err(ZipError::UnsupportedMethod(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a stored-only archive with the given entries, byte by byte.
    fn stored_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();
        let mut offsets = Vec::new();

        for (name, data) in entries {
            offsets.push(out.len() as u32);
            out.extend_from_slice(&0x04034b50u32.to_le_bytes());
            out.extend_from_slice(&[0u8; 2 * 5]); // version..mod date
            out.extend_from_slice(&0u32.to_le_bytes()); // crc32
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(data);
        }

        let central_offset = out.len() as u32;
        for ((name, data), offset) in entries.iter().zip(&offsets) {
            central.extend_from_slice(&0x02014b50u32.to_le_bytes());
            central.extend_from_slice(&[0u8; 2 * 6]); // versions..mod date
            central.extend_from_slice(&0u32.to_le_bytes()); // crc32
            central.extend_from_slice(&(data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&[0u8; 2 * 4]); // extra..attrs
            central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }
        out.extend_from_slice(&central);

        out.extend_from_slice(&0x06054b50u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 2 * 2]); // disk numbers
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&central.len().to_le_bytes()[..4]);
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment
        out
    }

    #[test]
    fn open_and_read_stored() {
        let bytes = stored_zip(&[("classes.dex", b"dexdata"), ("res/x.png", b"\x89PNG")]);
        let archive = Archive::open(bytes).unwrap();

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.read("classes.dex").unwrap(), b"dexdata");
        assert_eq!(archive.read("res/x.png").unwrap(), b"\x89PNG");
    }

    #[test]
    fn names_keep_directory_order() {
        let bytes = stored_zip(&[("classes2.dex", b"b"), ("classes.dex", b"a")]);
        let archive = Archive::open(bytes).unwrap();

        let names: Vec<&str> = archive.names().collect();
        assert_eq!(names, ["classes2.dex", "classes.dex"]);
    }

    #[test]
    fn missing_entry_is_an_error() {
        let bytes = stored_zip(&[("a.txt", b"a")]);
        let archive = Archive::open(bytes).unwrap();

        assert!(matches!(archive.read("b.txt"), Err(ZipError::EntryNotFound)));
    }

    #[test]
    fn rejects_non_zip() {
        assert!(matches!(
            Archive::open(b"dex\n035\x00".to_vec()),
            Err(ZipError::InvalidHeader)
        ));
    }
}
