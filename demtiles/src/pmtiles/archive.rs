use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, info, warn};

use super::directory::{deserialize_directory, find_tile};
use super::header::{deserialize_header, Compression, Header, HEADER_SIZE};
use crate::buffer::ScratchBuffers;
use crate::error::{DemError, Result};
use crate::source::{BoundingBox, TileSource};
use crate::tile_id::TileAddress;

/// Directory levels walked before a lookup gives up.
///
/// PMTiles writers emit a root directory plus at most one or two leaf levels;
/// anything deeper is treated as a corrupt or cyclic chain.
pub const DEFAULT_MAX_DIRECTORY_DEPTH: usize = 4;

/// Highest zoom at which cache keys stay unique.
const MAX_KEYED_ZOOM: u8 = 16;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Absolute offset of `length` bytes at `offset` within a section of `size`
/// bytes starting at `start`.
fn section_range(section: &str, start: u64, size: u64, offset: u64, length: u64) -> Result<u64> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(start + offset),
        _ => Err(DemError::Format(format!(
            "{section} range {offset}+{length} outside {size} byte section"
        ))),
    }
}

/// Remove `compression` from the bytes in the read buffer.
///
/// `Unknown` inflates when the bytes carry the gzip magic and passes them
/// through otherwise.
///
/// # Errors
///
/// [`DemError::UnsupportedCompression`] for brotli and zstd,
/// [`DemError::Decompress`] for corrupt gzip streams.
pub fn decompress(buffers: &mut ScratchBuffers, compression: Compression) -> Result<&[u8]> {
    match compression {
        Compression::None => Ok(buffers.read_bytes()),
        Compression::Gzip => buffers.inflate_read(),
        Compression::Unknown => {
            if buffers.read_bytes().starts_with(&GZIP_MAGIC) {
                buffers.inflate_read()
            } else {
                Ok(buffers.read_bytes())
            }
        }
        Compression::Brotli | Compression::Zstd => {
            Err(DemError::UnsupportedCompression { compression })
        }
    }
}

/// An open PMTiles archive.
///
/// Generic over the reader so archives can be served from memory in tests;
/// the default is a plain file handle.
#[derive(Debug)]
pub struct PmTilesArchive<R = File> {
    reader: R,
    header: Header,
    label: String,
    max_depth: usize,
}

impl PmTilesArchive<File> {
    /// Open the archive at `path`.
    ///
    /// # Errors
    ///
    /// [`DemError::FileNotFound`] if the path does not exist,
    /// [`DemError::Format`] if the header is invalid.
    pub fn open<P: AsRef<Path>>(path: P, max_depth: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DemError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path)?;
        Self::from_reader(file, path.display().to_string(), max_depth)
    }
}

impl<R: Read + Seek> PmTilesArchive<R> {
    /// Read and validate the header from `reader`.
    pub fn from_reader(mut reader: R, label: impl Into<String>, max_depth: usize) -> Result<Self> {
        let label = label.into();
        reader.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        reader
            .by_ref()
            .take(HEADER_SIZE as u64)
            .read_to_end(&mut bytes)?;
        let header = deserialize_header(&bytes)?;

        let file_length = reader.seek(SeekFrom::End(0))?;
        for (section, offset, length) in [
            ("root directory", header.root_offset, header.root_length),
            ("metadata", header.metadata_offset, header.metadata_length),
            ("leaf directories", header.leaf_offset, header.leaf_length),
            ("tile data", header.data_offset, header.data_length),
        ] {
            section_range(section, 0, file_length, offset, length)?;
        }

        if header.max_zoom > MAX_KEYED_ZOOM {
            warn!(
                archive = %label,
                max_zoom = header.max_zoom,
                "max zoom above {MAX_KEYED_ZOOM}, cache keys will truncate tile coordinates"
            );
        }
        info!(
            archive = %label,
            min_zoom = header.min_zoom,
            max_zoom = header.max_zoom,
            tile_type = ?header.tile_type,
            "opened PMTiles archive"
        );

        Ok(Self {
            reader,
            header,
            label,
            max_depth,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Resolve `address` to an absolute `(offset, length)` in the file.
    ///
    /// Walks at most `max_depth` directory levels. Returns `Ok(None)` if no
    /// entry covers the tile or the walk runs out of levels.
    ///
    /// # Errors
    ///
    /// [`DemError::Format`] if an entry points outside the leaf or tile data
    /// section.
    pub fn resolve_tile(
        &mut self,
        address: TileAddress,
        buffers: &mut ScratchBuffers,
    ) -> Result<Option<(u64, usize)>> {
        let tile_id = address.tile_id()?;
        let mut dir_offset = self.header.root_offset;
        let mut dir_length = self.header.root_length;

        for depth in 0..self.max_depth {
            let length = usize::try_from(dir_length)
                .map_err(|_| DemError::Format(format!("directory length {dir_length}")))?;
            buffers.read_range(&mut self.reader, dir_offset, length)?;
            let entries =
                deserialize_directory(decompress(buffers, self.header.internal_compression)?)?;

            let Some(entry) = find_tile(&entries, tile_id) else {
                return Ok(None);
            };
            if entry.is_leaf_pointer() {
                debug!(depth, tile_id, leaf = entry.offset, "descend into leaf directory");
                dir_length = u64::from(entry.length);
                dir_offset = section_range(
                    "leaf directory",
                    self.header.leaf_offset,
                    self.header.leaf_length,
                    entry.offset,
                    dir_length,
                )?;
                continue;
            }

            let offset = section_range(
                "tile",
                self.header.data_offset,
                self.header.data_length,
                entry.offset,
                u64::from(entry.length),
            )?;
            return Ok(Some((offset, entry.length as usize)));
        }

        warn!(
            archive = %self.label,
            tile = %address,
            max_depth = self.max_depth,
            "directory walk exceeded depth bound"
        );
        Ok(None)
    }
}

impl<R: Read + Seek> TileSource for PmTilesArchive<R> {
    fn label(&self) -> &str {
        &self.label
    }

    fn bounds(&self) -> BoundingBox {
        self.header.bounds()
    }

    fn max_zoom(&self) -> u8 {
        self.header.max_zoom
    }

    fn fetch_tile<'b>(
        &mut self,
        address: TileAddress,
        buffers: &'b mut ScratchBuffers,
    ) -> Result<Option<&'b [u8]>> {
        let Some((offset, length)) = self.resolve_tile(address, buffers)? else {
            return Ok(None);
        };
        buffers.read_range(&mut self.reader, offset, length)?;
        decompress(buffers, self.header.tile_compression).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pmtiles::{serialize_directory, serialize_header, to_e7, Entry, TileType};
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};

    const TARGET: TileAddress = TileAddress {
        zoom: 13,
        x: 4442,
        y: 2877,
    };
    const TARGET_ID: u64 = 79_295_500;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn entry(tile_id: u64, offset: u64, length: usize, run_length: u32) -> Entry {
        Entry {
            tile_id,
            offset,
            length: length as u32,
            run_length,
        }
    }

    fn assemble(
        root: &[u8],
        leaves: &[u8],
        data: &[u8],
        internal: Compression,
        tile: Compression,
    ) -> Cursor<Vec<u8>> {
        let root_offset = HEADER_SIZE as u64;
        let leaf_offset = root_offset + root.len() as u64;
        let data_offset = leaf_offset + leaves.len() as u64;
        let header = Header {
            root_offset,
            root_length: root.len() as u64,
            metadata_offset: leaf_offset,
            metadata_length: 0,
            leaf_offset,
            leaf_length: leaves.len() as u64,
            data_offset,
            data_length: data.len() as u64,
            n_addressed_tiles: 1,
            n_tile_entries: 1,
            n_tile_contents: 1,
            clustered: true,
            internal_compression: internal,
            tile_compression: tile,
            tile_type: TileType::Png,
            min_zoom: 0,
            max_zoom: 13,
            min_lon_e7: to_e7(15.0),
            min_lat_e7: to_e7(47.0),
            max_lon_e7: to_e7(15.5),
            max_lat_e7: to_e7(47.5),
            center_zoom: 13,
            center_lon_e7: to_e7(15.2),
            center_lat_e7: to_e7(47.1),
        };
        let mut file = serialize_header(&header);
        file.extend_from_slice(root);
        file.extend_from_slice(leaves);
        file.extend_from_slice(data);
        Cursor::new(file)
    }

    fn open(file: Cursor<Vec<u8>>, max_depth: usize) -> PmTilesArchive<Cursor<Vec<u8>>> {
        PmTilesArchive::from_reader(file, "test", max_depth).unwrap()
    }

    #[test]
    fn test_root_only_lookup() {
        let data = b"xxxxTILE";
        let root = serialize_directory(&[
            entry(TARGET_ID - 1, 0, 4, 1),
            entry(TARGET_ID, 4, 4, 1),
        ]);
        let file = assemble(&gzip(&root), &[], data, Compression::Gzip, Compression::None);
        let data_offset = file.get_ref().len() as u64 - data.len() as u64;
        let mut archive = open(file, DEFAULT_MAX_DIRECTORY_DEPTH);
        let mut buffers = ScratchBuffers::new().unwrap();

        assert_eq!(
            archive.resolve_tile(TARGET, &mut buffers).unwrap(),
            Some((data_offset + 4, 4))
        );
        assert_eq!(
            archive.fetch_tile(TARGET, &mut buffers).unwrap(),
            Some(&b"TILE"[..])
        );
    }

    #[test]
    fn test_missing_tile() {
        let root = serialize_directory(&[entry(TARGET_ID + 1, 0, 4, 1)]);
        let file = assemble(&root, &[], b"TILE", Compression::None, Compression::None);
        let mut archive = open(file, DEFAULT_MAX_DIRECTORY_DEPTH);
        let mut buffers = ScratchBuffers::new().unwrap();
        assert_eq!(archive.fetch_tile(TARGET, &mut buffers).unwrap(), None);
    }

    #[test]
    fn test_leaf_directory_lookup() {
        let leaf = gzip(&serialize_directory(&[entry(TARGET_ID, 0, 4, 1)]));
        let root = gzip(&serialize_directory(&[entry(0, 0, leaf.len(), 0)]));
        let file = assemble(&root, &leaf, b"TILE", Compression::Gzip, Compression::None);
        let mut archive = open(file, DEFAULT_MAX_DIRECTORY_DEPTH);
        let mut buffers = ScratchBuffers::new().unwrap();

        assert_eq!(
            archive.fetch_tile(TARGET, &mut buffers).unwrap(),
            Some(&b"TILE"[..])
        );
    }

    #[test]
    fn test_self_referencing_leaf_terminates() {
        // A leaf directory whose only entry points back at itself
        let size = serialize_directory(&[entry(0, 0, 0, 0)]).len();
        let leaf = serialize_directory(&[entry(0, 0, size, 0)]);
        assert_eq!(leaf.len(), size);
        let root = serialize_directory(&[entry(0, 0, leaf.len(), 0)]);
        let file = assemble(&root, &leaf, b"TILE", Compression::None, Compression::None);
        let mut archive = open(file, DEFAULT_MAX_DIRECTORY_DEPTH);
        let mut buffers = ScratchBuffers::new().unwrap();

        assert_eq!(archive.resolve_tile(TARGET, &mut buffers).unwrap(), None);
    }

    #[test]
    fn test_leaf_pointer_outside_section_rejected() {
        let root = serialize_directory(&[entry(0, 0, 256 << 20, 0)]);
        let leaf = serialize_directory(&[entry(TARGET_ID, 0, 4, 1)]);
        let file = assemble(&root, &leaf, b"TILE", Compression::None, Compression::None);
        let mut archive = open(file, DEFAULT_MAX_DIRECTORY_DEPTH);
        let mut buffers = ScratchBuffers::new().unwrap();

        assert!(matches!(
            archive.resolve_tile(TARGET, &mut buffers),
            Err(DemError::Format(_))
        ));
        assert!(buffers.capacities().0 < 1 << 20);
    }

    #[test]
    fn test_tile_entry_outside_section_rejected() {
        let root = serialize_directory(&[entry(TARGET_ID, 2, 4, 1)]);
        let file = assemble(&root, &[], b"TILE", Compression::None, Compression::None);
        let mut archive = open(file, DEFAULT_MAX_DIRECTORY_DEPTH);
        let mut buffers = ScratchBuffers::new().unwrap();

        assert!(matches!(
            archive.fetch_tile(TARGET, &mut buffers),
            Err(DemError::Format(_))
        ));
    }

    #[test]
    fn test_truncated_archive_rejected() {
        let root = serialize_directory(&[entry(TARGET_ID, 0, 4, 1)]);
        let mut bytes = assemble(&root, &[], b"TILE", Compression::None, Compression::None)
            .into_inner();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            PmTilesArchive::from_reader(Cursor::new(bytes), "truncated", 4),
            Err(DemError::Format(_))
        ));
    }

    #[test]
    fn test_depth_bound_is_configurable() {
        // root -> leaf1 -> leaf2 -> tile needs three levels
        let leaf2 = serialize_directory(&[entry(TARGET_ID, 0, 4, 1)]);
        let leaf1 = serialize_directory(&[entry(0, 0, leaf2.len(), 0)]);
        let root = serialize_directory(&[entry(0, leaf2.len() as u64, leaf1.len(), 0)]);
        let mut leaves = leaf2.clone();
        leaves.extend_from_slice(&leaf1);
        let file = assemble(&root, &leaves, b"TILE", Compression::None, Compression::None);
        let mut buffers = ScratchBuffers::new().unwrap();

        let mut shallow = open(file.clone(), 2);
        assert_eq!(shallow.fetch_tile(TARGET, &mut buffers).unwrap(), None);

        let mut deep = open(file, 3);
        assert_eq!(
            deep.fetch_tile(TARGET, &mut buffers).unwrap(),
            Some(&b"TILE"[..])
        );
    }

    #[test]
    fn test_unknown_compression_sniffs_gzip() {
        let root = serialize_directory(&[entry(TARGET_ID, 0, 4, 1)]);
        let mut buffers = ScratchBuffers::new().unwrap();

        for dir in [gzip(&root), root.clone()] {
            let file = assemble(&dir, &[], b"TILE", Compression::Unknown, Compression::Unknown);
            let mut archive = open(file, DEFAULT_MAX_DIRECTORY_DEPTH);
            assert_eq!(
                archive.fetch_tile(TARGET, &mut buffers).unwrap(),
                Some(&b"TILE"[..])
            );
        }
    }

    #[test]
    fn test_gzip_tile_blob() {
        let blob = gzip(b"compressed tile");
        let root = serialize_directory(&[entry(TARGET_ID, 0, blob.len(), 1)]);
        let file = assemble(&root, &[], &blob, Compression::None, Compression::Gzip);
        let mut archive = open(file, DEFAULT_MAX_DIRECTORY_DEPTH);
        let mut buffers = ScratchBuffers::new().unwrap();
        assert_eq!(
            archive.fetch_tile(TARGET, &mut buffers).unwrap(),
            Some(&b"compressed tile"[..])
        );
    }

    #[test]
    fn test_brotli_directory_rejected() {
        let root = serialize_directory(&[entry(TARGET_ID, 0, 4, 1)]);
        let file = assemble(&root, &[], b"TILE", Compression::Brotli, Compression::None);
        let mut archive = open(file, DEFAULT_MAX_DIRECTORY_DEPTH);
        let mut buffers = ScratchBuffers::new().unwrap();
        assert!(matches!(
            archive.resolve_tile(TARGET, &mut buffers),
            Err(DemError::UnsupportedCompression {
                compression: Compression::Brotli
            })
        ));
    }

    #[test]
    fn test_invalid_headers() {
        let file = assemble(&[0], &[], &[], Compression::None, Compression::None);
        let mut bytes = file.into_inner();

        let short = Cursor::new(bytes[..100].to_vec());
        assert!(matches!(
            PmTilesArchive::from_reader(short, "short", 4),
            Err(DemError::Format(_))
        ));

        bytes[1] = b'X';
        assert!(matches!(
            PmTilesArchive::from_reader(Cursor::new(bytes), "magic", 4),
            Err(DemError::Format(_))
        ));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            PmTilesArchive::open("/nonexistent/dem.pmtiles", 4),
            Err(DemError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_source_metadata() {
        let file = assemble(&[0], &[], &[], Compression::None, Compression::None);
        let archive = open(file, 4);
        assert_eq!(archive.label(), "test");
        assert_eq!(archive.max_zoom(), 13);
        assert!(archive.bounds().contains(47.12925176802318, 15.209778656353123));
    }
}
