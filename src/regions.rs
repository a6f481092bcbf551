use ahash::AHashMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub label: String,
    pub lat: f64,
    pub lon: f64,
}

impl Region {
    fn new(id: &str, label: &str, lat: f64, lon: f64) -> Self {
        Region {
            id: id.to_string(),
            label: label.to_string(),
            lat,
            lon,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegionCatalog {
    regions: Vec<Region>,
    /// lowercased id -> position in `regions`; the first occurrence of an id wins
    by_id: AHashMap<String, usize>,
}

impl RegionCatalog {
    pub fn new(regions: Vec<Region>) -> Self {
        let mut by_id = AHashMap::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            by_id.entry(region.id.to_lowercase()).or_insert(i);
        }
        RegionCatalog { regions, by_id }
    }

    pub fn builtin() -> Self {
        RegionCatalog::new(vec![
            Region::new("madrid", "Madrid", 40.4168, -3.7038),
            Region::new("barcelona", "Barcelona", 41.3874, 2.1686),
            Region::new("valencia", "Valencia", 39.4699, -0.3763),
            Region::new("sevilla", "Sevilla", 37.3891, -5.9845),
            Region::new("bilbao", "Bilbao", 43.263, -2.935),
            Region::new("malaga", "Málaga", 36.7213, -4.4214),
        ])
    }

    pub fn find(&self, id: &str) -> Option<&Region> {
        self.by_id
            .get(&id.to_lowercase())
            .and_then(|&i| self.regions.get(i))
    }

    /// First region of the catalog, the one selected on startup.
    pub fn default_region(&self) -> Option<&Region> {
        self.regions.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }
}

impl Default for RegionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
