use anyhow::Result;
use serde::Serialize;

use super::ServiceConfig;

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
    status: &'static str,
}

pub fn run(config: &ServiceConfig, lat: f64, lon: f64, json: bool) -> Result<()> {
    let mut service = config.build()?;
    let info = service.resolve_elevation(lat, lon);

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            elevation: info.elevation(),
            status: info.status.as_str(),
        };
        println!("{}", serde_json::to_string(&response)?);
    } else if let Some(elevation) = info.elevation() {
        println!("{:.1}", elevation);
    } else {
        println!("{}", info.status);
    }

    Ok(())
}
