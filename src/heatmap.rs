use h3o::{CellIndex, LatLng, Resolution};
use serde::Serialize;
use std::collections::HashMap;

use crate::crime::CrimeRecord;

/// Crime intensity for one hexagonal cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatCell {
    pub cell: u64,
    pub lat: f64,
    pub lon: f64,
    pub incidents: usize,
    pub score: f64,
}

// Incidents binned into H3 cells at a fixed resolution.
pub struct CrimeHeatmap {
    resolution: Resolution,
    cells: HashMap<CellIndex, (usize, f64)>,
}

impl CrimeHeatmap {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            cells: HashMap::new(),
        }
    }

    pub fn from_records(records: &[CrimeRecord], resolution: Resolution) -> Self {
        let mut heatmap = Self::new(resolution);
        for record in records {
            heatmap.add(record);
        }
        heatmap
    }

    /// Returns false when the record has non-finite coordinates.
    pub fn add(&mut self, record: &CrimeRecord) -> bool {
        let Ok(position) = LatLng::new(record.lat, record.lon) else {
            return false;
        };
        let entry = self
            .cells
            .entry(position.to_cell(self.resolution))
            .or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.score;
        true
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Cells ordered by index, each located at its center.
    pub fn cells(&self) -> Vec<HeatCell> {
        let mut cells: Vec<HeatCell> = self
            .cells
            .iter()
            .map(|(&cell, &(incidents, score))| {
                let center = LatLng::from(cell);
                HeatCell {
                    cell: u64::from(cell),
                    lat: center.lat(),
                    lon: center.lng(),
                    incidents,
                    score,
                }
            })
            .collect();
        cells.sort_by_key(|c| c.cell);
        cells
    }
}
