//! Basic example demonstrating demtiles library usage.
//!
//! Run with: cargo run --example basic -- /path/to/terrain.pmtiles

use demtiles::{DemError, ElevationService};
use std::env;

fn main() -> Result<(), DemError> {
    let archive = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/terrain.pmtiles");
        std::process::exit(1);
    });

    let mut service = ElevationService::builder().archive(&archive).build()?;

    let locations = [
        ("Stiwoll, Austria", 47.12925176802318, 15.209778656353123),
        ("Grossglockner, Austria", 47.0742, 12.6947),
        ("Vienna, Austria", 48.2082, 16.3738),
    ];

    println!("Elevation queries:");
    println!("{:-<50}", "");

    for (name, lat, lon) in &locations {
        let info = service.resolve_elevation(*lat, *lon);
        match info.elevation() {
            Some(elevation) => println!("{}: {:.1}m", name, elevation),
            None => println!("{}: {}", name, info.status),
        }
    }

    let stats = service.cache_stats();
    println!("\nCache statistics:");
    println!("  Cached tiles: {}", stats.entry_count);
    println!("  Hits: {}", stats.hit_count);
    println!("  Misses: {}", stats.miss_count);
    println!("  Evictions: {}", stats.eviction_count);
    println!("  Hit rate: {:.1}%", stats.hit_rate() * 100.0);

    Ok(())
}
