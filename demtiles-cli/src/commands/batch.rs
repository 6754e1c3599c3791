use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use super::ServiceConfig;

/// Coordinates resolved per progress update.
const CHUNK_SIZE: usize = 1024;

pub fn run(
    config: &ServiceConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: String,
    lon_col: String,
) -> Result<()> {
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "csv" {
        bail!("Unsupported file format: {}. Use .csv", extension);
    }

    let mut service = config.build()?;

    let file = File::open(&input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let lat_idx = column_index(&headers, &lat_col)?;
    let lon_idx = column_index(&headers, &lon_col)?;

    let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    let coords = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let lat = parse_field(record, lat_idx)
                .with_context(|| format!("Row {}: invalid latitude", i + 1))?;
            let lon = parse_field(record, lon_idx)
                .with_context(|| format!("Row {}: invalid longitude", i + 1))?;
            Ok((lat, lon))
        })
        .collect::<Result<Vec<(f64, f64)>>>()?;

    let pb = ProgressBar::new(coords.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    // NaN marks coordinates that did not resolve
    let mut elevations = Vec::with_capacity(coords.len());
    for chunk in coords.chunks(CHUNK_SIZE) {
        elevations.extend(service.get_elevations_batch(chunk, f64::NAN));
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message("done");

    let output_path = match output {
        Some(path) => path,
        None => default_output(&input)?,
    };
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("elevation");
    writer.write_record(&new_headers)?;

    let mut missing = 0usize;
    for (record, elevation) in records.iter().zip(&elevations) {
        let value = if elevation.is_nan() {
            missing += 1;
            String::new()
        } else {
            format!("{:.1}", elevation)
        };
        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&value);
        writer.write_record(&new_record)?;
    }
    writer.flush()?;

    let stats = service.cache_stats();
    tracing::info!(
        rows = records.len(),
        missing,
        hits = stats.hit_count,
        misses = stats.miss_count,
        "batch finished"
    );

    println!("Output written to: {}", output_path.display());
    if missing > 0 {
        println!("{} of {} coordinates had no elevation", missing, records.len());
    }
    Ok(())
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .with_context(|| format!("Column '{}' not found in CSV", name))
}

fn parse_field(record: &csv::StringRecord, idx: usize) -> Result<f64> {
    let field = record.get(idx).context("Missing field")?;
    field
        .trim()
        .parse()
        .with_context(|| format!("'{}' is not a number", field))
}

fn default_output(input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .context("Input path has no file name")?
        .to_string_lossy();
    Ok(input.with_file_name(format!("{}_elevation.csv", stem)))
}
