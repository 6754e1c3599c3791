//! Synthetic terrain-RGB archives for integration tests and benchmarks.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use demtiles::pmtiles::{
    serialize_directory, serialize_header, to_e7, Compression, Entry, Header, TileType,
    HEADER_SIZE,
};
use demtiles::{BoundingBox, TileAddress};
use flate2::write::GzEncoder;

pub const STIWOLL: (f64, f64) = (47.12925176802318, 15.209778656353123);
pub const STIWOLL_ELEVATION: f64 = 865.8;
pub const STIWOLL_TILE: TileAddress = TileAddress {
    zoom: 13,
    x: 4442,
    y: 2877,
};
/// Pixel of the Stiwoll coordinate inside a 256 pixel tile.
pub const STIWOLL_PIXEL: (u32, u32) = (27, 6);

pub fn austria() -> BoundingBox {
    BoundingBox::new(46.37, 9.5, 49.02, 17.17)
}

/// Terrain-RGB encoding of `elevation`, rounded to 0.1 m.
pub fn encode_elevation(elevation: f64) -> [u8; 3] {
    let value = ((elevation + 10000.0) * 10.0).round() as u32;
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// RGB pixels of a square tile at `base` meters with single-pixel marks.
pub fn terrain_pixels(size: u32, base: f64, marks: &[((u32, u32), f64)]) -> Vec<u8> {
    let fill = encode_elevation(base);
    let mut data = Vec::with_capacity((size * size * 3) as usize);
    for y in 0..size {
        for x in 0..size {
            let rgb = marks
                .iter()
                .find(|(at, _)| *at == (x, y))
                .map(|(_, elevation)| encode_elevation(*elevation))
                .unwrap_or(fill);
            data.extend_from_slice(&rgb);
        }
    }
    data
}

pub fn png_tile(size: u32, base: f64, marks: &[((u32, u32), f64)]) -> Vec<u8> {
    let data = terrain_pixels(size, base, marks);
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, size, size);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&data).unwrap();
    }
    out
}

/// A PNG tile flagged as Adam7 interlaced.
pub fn interlaced_png_tile(size: u32) -> Vec<u8> {
    let mut out = png_tile(size, 0.0, &[]);
    out[28] = 1;
    let mut crc = flate2::Crc::new();
    crc.update(&out[12..29]);
    out[29..33].copy_from_slice(&crc.sum().to_be_bytes());
    out
}

pub fn webp_tile(size: u32, base: f64, marks: &[((u32, u32), f64)]) -> Vec<u8> {
    let data = terrain_pixels(size, base, marks);
    let mut out = Vec::new();
    image_webp::WebPEncoder::new(&mut out)
        .encode(&data, size, size, image_webp::ColorType::Rgb8)
        .unwrap();
    out
}

/// The Stiwoll tile: sea level everywhere except the reference pixel.
pub fn stiwoll_png() -> Vec<u8> {
    png_tile(256, 0.0, &[(STIWOLL_PIXEL, STIWOLL_ELEVATION)])
}

/// Writes PMTiles v3 archives from a list of tiles.
pub struct ArchiveBuilder {
    tiles: Vec<(TileAddress, Vec<u8>)>,
    bounds: BoundingBox,
    max_zoom: u8,
    internal: Compression,
    tile_compression: Compression,
    leaf_size: Option<usize>,
}

impl ArchiveBuilder {
    pub fn new(bounds: BoundingBox) -> Self {
        Self {
            tiles: Vec::new(),
            bounds,
            max_zoom: 13,
            internal: Compression::Gzip,
            tile_compression: Compression::None,
            leaf_size: None,
        }
    }

    pub fn tile(mut self, address: TileAddress, blob: Vec<u8>) -> Self {
        self.tiles.push((address, blob));
        self
    }

    pub fn max_zoom(mut self, zoom: u8) -> Self {
        self.max_zoom = zoom;
        self
    }

    pub fn internal_compression(mut self, compression: Compression) -> Self {
        self.internal = compression;
        self
    }

    pub fn tile_compression(mut self, compression: Compression) -> Self {
        self.tile_compression = compression;
        self
    }

    /// Split the directory into leaves of at most `entries` entries.
    pub fn leaf_size(mut self, entries: usize) -> Self {
        self.leaf_size = Some(entries);
        self
    }

    fn compress_dir(&self, entries: &[Entry]) -> Vec<u8> {
        let raw = serialize_directory(entries);
        match self.internal {
            Compression::Gzip => gzip(&raw),
            // Brotli and friends are never decoded, any bytes will do
            _ => raw,
        }
    }

    pub fn build(mut self) -> Vec<u8> {
        let mut tiles: Vec<(u64, Vec<u8>)> = self
            .tiles
            .drain(..)
            .map(|(address, blob)| (address.tile_id().unwrap(), blob))
            .collect();
        tiles.sort_by_key(|(id, _)| *id);

        let mut data = Vec::new();
        let mut entries = Vec::new();
        for (tile_id, blob) in &tiles {
            let blob = match self.tile_compression {
                Compression::Gzip => gzip(blob),
                _ => blob.clone(),
            };
            entries.push(Entry {
                tile_id: *tile_id,
                offset: data.len() as u64,
                length: blob.len() as u32,
                run_length: 1,
            });
            data.extend_from_slice(&blob);
        }

        let mut leaves = Vec::new();
        let root = match self.leaf_size {
            None => self.compress_dir(&entries),
            Some(size) => {
                let mut pointers = Vec::new();
                for chunk in entries.chunks(size.max(1)) {
                    let leaf = self.compress_dir(chunk);
                    pointers.push(Entry {
                        tile_id: chunk[0].tile_id,
                        offset: leaves.len() as u64,
                        length: leaf.len() as u32,
                        run_length: 0,
                    });
                    leaves.extend_from_slice(&leaf);
                }
                self.compress_dir(&pointers)
            }
        };

        let root_offset = HEADER_SIZE as u64;
        let leaf_offset = root_offset + root.len() as u64;
        let data_offset = leaf_offset + leaves.len() as u64;
        let [min_lon_e7, min_lat_e7, max_lon_e7, max_lat_e7] = self.bounds.to_e7();
        let header = Header {
            root_offset,
            root_length: root.len() as u64,
            metadata_offset: leaf_offset,
            metadata_length: 0,
            leaf_offset,
            leaf_length: leaves.len() as u64,
            data_offset,
            data_length: data.len() as u64,
            n_addressed_tiles: tiles.len() as u64,
            n_tile_entries: tiles.len() as u64,
            n_tile_contents: tiles.len() as u64,
            clustered: true,
            internal_compression: self.internal,
            tile_compression: self.tile_compression,
            tile_type: TileType::Png,
            min_zoom: 0,
            max_zoom: self.max_zoom,
            min_lon_e7,
            min_lat_e7,
            max_lon_e7,
            max_lat_e7,
            center_zoom: self.max_zoom,
            center_lon_e7: to_e7((self.bounds.min_lon + self.bounds.max_lon) / 2.0),
            center_lat_e7: to_e7((self.bounds.min_lat + self.bounds.max_lat) / 2.0),
        };

        let mut file = serialize_header(&header);
        file.extend_from_slice(&root);
        file.extend_from_slice(&leaves);
        file.extend_from_slice(&data);
        file
    }

    pub fn write(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Tile addresses neighbouring Stiwoll, so directories hold several entries.
pub fn neighbours(count: u32) -> Vec<TileAddress> {
    (0..count)
        .map(|i| TileAddress::new(13, 4440 + i % 8, 2875 + i / 8))
        .filter(|a| *a != STIWOLL_TILE)
        .collect()
}
