use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use h3o::Resolution;

use crate::crime::ColumnHints;

#[derive(Debug, Clone, Parser)]
#[command(name = "saferoute", about = "Crime-aware route planning service")]
pub struct Config {
    /// Crime incidents CSV with latitude, longitude and a *score* column
    #[arg(long, env = "SAFEROUTE_CRIME_CSV", default_value = "data/crime_weighted_output.csv")]
    pub crime_csv: PathBuf,

    /// OpenStreetMap PBF extract covering the area
    #[arg(long, env = "SAFEROUTE_OSM_PBF", default_value = "assets/area.osm.pbf")]
    pub osm_pbf: PathBuf,

    /// Display name of the routed area
    #[arg(long, env = "SAFEROUTE_AREA", default_value = "Washington, D.C., USA")]
    pub area: String,

    #[arg(long, env = "SAFEROUTE_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// CSV of `name,lat,lon` rows used to resolve place names
    #[arg(long, env = "SAFEROUTE_GAZETTEER")]
    pub gazetteer: Option<PathBuf>,

    #[arg(long, env = "SAFEROUTE_LATITUDE_COLUMN")]
    pub latitude_column: Option<String>,

    #[arg(long, env = "SAFEROUTE_LONGITUDE_COLUMN")]
    pub longitude_column: Option<String>,

    /// H3 resolution of the crime heatmap cells (0-15)
    #[arg(long, env = "SAFEROUTE_HEATMAP_RESOLUTION", default_value_t = 9, value_parser = clap::value_parser!(u8).range(0..=15))]
    pub heatmap_resolution: u8,

    /// Build the road network on the first request instead of at startup
    #[arg(long, env = "SAFEROUTE_LAZY")]
    pub lazy: bool,
}

impl Config {
    pub fn column_hints(&self) -> ColumnHints {
        ColumnHints {
            latitude: self.latitude_column.clone(),
            longitude: self.longitude_column.clone(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::try_from(self.heatmap_resolution).unwrap_or(Resolution::Nine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["saferoute"]).unwrap();
        assert_eq!(config.crime_csv, PathBuf::from("data/crime_weighted_output.csv"));
        assert_eq!(config.bind.port(), 8000);
        assert_eq!(config.resolution(), Resolution::Nine);
        assert!(!config.lazy);
        assert!(config.column_hints().latitude.is_none());
    }

    #[test]
    fn overrides() {
        let config = Config::try_parse_from([
            "saferoute",
            "--latitude-column",
            "Y",
            "--heatmap-resolution",
            "7",
            "--lazy",
        ])
        .unwrap();
        assert_eq!(config.column_hints().latitude.as_deref(), Some("Y"));
        assert_eq!(config.resolution(), Resolution::Seven);
        assert!(config.lazy);
    }

    #[test]
    fn rejects_invalid_resolution() {
        assert!(Config::try_parse_from(["saferoute", "--heatmap-resolution", "16"]).is_err());
    }
}
