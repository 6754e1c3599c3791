use anyhow::{Context, Result};
use demtiles::buffer::ScratchBuffers;
use demtiles::pmtiles::Header;
use demtiles::projection::{pixel_offset, resolution, DEFAULT_TILE_SIZE};
use demtiles::{MbTilesArchive, PmTilesArchive, TileAddress, TileSource};
use std::path::PathBuf;

pub fn run(archive: PathBuf, max_depth: usize, coordinate: Option<(f64, f64)>) -> Result<()> {
    if !archive.exists() {
        anyhow::bail!("Archive not found: {}", archive.display());
    }
    let file_size = std::fs::metadata(&archive)?.len();

    let is_mbtiles = archive
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mbtiles"));

    println!("Archive: {}", archive.display());
    println!("File size: {}", format_size(file_size));
    println!();

    if is_mbtiles {
        let mut source = MbTilesArchive::open(&archive).context("Failed to open MBTiles")?;
        print_source(&source);
        if let Some((lat, lon)) = coordinate {
            print_lookup(&mut source, lat, lon)?;
        }
    } else {
        let mut source =
            PmTilesArchive::open(&archive, max_depth).context("Failed to read PMTiles header")?;
        print_header(source.header());
        if let Some((lat, lon)) = coordinate {
            let address = print_lookup(&mut source, lat, lon)?;
            let mut buffers = ScratchBuffers::new()?;
            match source.resolve_tile(address, &mut buffers)? {
                Some((offset, length)) => {
                    println!("Byte range: {}..{}", offset, offset + length as u64)
                }
                None => println!("Byte range: none within {} directory levels", max_depth),
            }
        }
    }

    Ok(())
}

fn print_header(header: &Header) {
    println!("Format: PMTiles v3");
    println!("Tile type: {:?}", header.tile_type);
    println!("Zoom: {}-{}", header.min_zoom, header.max_zoom);
    print_bounds(header.bounds());
    println!(
        "Compression: internal {:?}, tiles {:?}",
        header.internal_compression, header.tile_compression
    );
    println!("Clustered: {}", header.clustered);
    println!();
    println!(
        "Tiles: {} addressed, {} entries, {} contents",
        header.n_addressed_tiles, header.n_tile_entries, header.n_tile_contents
    );
    println!(
        "Root directory: {} at {}",
        format_size(header.root_length),
        header.root_offset
    );
    println!(
        "Metadata: {} at {}",
        format_size(header.metadata_length),
        header.metadata_offset
    );
    println!(
        "Leaf directories: {} at {}",
        format_size(header.leaf_length),
        header.leaf_offset
    );
    println!(
        "Tile data: {} at {}",
        format_size(header.data_length),
        header.data_offset
    );
}

fn print_source(source: &dyn TileSource) {
    println!("Format: MBTiles");
    println!("Max zoom: {}", source.max_zoom());
    print_bounds(source.bounds());
}

fn print_bounds(bounds: demtiles::BoundingBox) {
    println!(
        "Bounds: {:.7},{:.7} to {:.7},{:.7} (lat,lon)",
        bounds.min_lat, bounds.min_lon, bounds.max_lat, bounds.max_lon
    );
}

/// Print how a coordinate maps onto the archive and return its tile.
fn print_lookup<S: TileSource>(source: &mut S, lat: f64, lon: f64) -> Result<TileAddress> {
    let zoom = source.max_zoom();
    let offset = pixel_offset(lat, lon, zoom, DEFAULT_TILE_SIZE);
    let address = TileAddress::new(zoom, offset.tile_x, offset.tile_y);

    println!();
    println!("Coordinate: {}, {}", lat, lon);
    println!(
        "Inside bounds: {}",
        if source.bounds().contains(lat, lon) {
            "yes"
        } else {
            "no"
        }
    );
    println!("Tile: {}", address);
    println!("Tile id: {}", address.tile_id()?);
    println!(
        "Pixel offset: {}, {} ({}px tiles, {:.2} m/px)",
        offset.offset_x,
        offset.offset_y,
        DEFAULT_TILE_SIZE,
        resolution(lat, zoom)
    );

    let mut buffers = ScratchBuffers::new()?;
    match source.fetch_tile(address, &mut buffers)? {
        Some(blob) => println!("Tile blob (decompressed): {}", format_size(blob.len() as u64)),
        None => println!("Tile blob: not found"),
    }
    Ok(address)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
