use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One calendar day of air quality and weather measurements at one location.
///
/// `pm25` and `aqi` may be missing when the monitor did not report; weather
/// fields are always present in collected data. Records are immutable once
/// stored; corrections are appended as a new version for the same date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub location_id: String,
    /// PM2.5 concentration (µg/m³)
    pub pm25: Option<f64>,
    /// PM2.5-derived AQI (0-500)
    pub aqi: Option<u16>,
    /// Daily maximum temperature (°F)
    pub temp_max: f64,
    /// Daily average wind speed (mph)
    pub wind_avg: f64,
    /// Daily precipitation (inches)
    pub precip: f64,
    /// Daily average relative humidity (%)
    pub rh_avg: f64,
}

impl Observation {
    /// Validate that all measurements are physically possible
    pub fn validate(&self) -> Result<(), String> {
        if let Some(aqi) = self.aqi {
            if aqi > 500 {
                return Err(format!("aqi must be between 0 and 500, got {}", aqi));
            }
        }
        if let Some(pm25) = self.pm25 {
            if pm25 < 0.0 {
                return Err("pm25 must be non-negative".to_string());
            }
        }
        if self.wind_avg < 0.0 {
            return Err("wind_avg must be non-negative".to_string());
        }
        if self.precip < 0.0 {
            return Err("precip must be non-negative".to_string());
        }
        if !(0.0..=100.0).contains(&self.rh_avg) {
            return Err(format!("rh_avg must be between 0 and 100, got {}", self.rh_avg));
        }
        Ok(())
    }
}

/// Append-only store of daily observations, keyed by location and date.
///
/// Holds every recorded version per (location, date); reads resolve to the
/// latest version so a correction supersedes the original without mutating it.
#[derive(Debug, Clone, Default)]
pub struct ObservationStore {
    rows: HashMap<String, BTreeMap<NaiveDate, Vec<Observation>>>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, appending a new version if the date already exists.
    pub fn record(&mut self, obs: Observation) {
        self.rows
            .entry(obs.location_id.clone())
            .or_default()
            .entry(obs.date)
            .or_default()
            .push(obs);
    }

    /// Latest-version observations for a location on days strictly before
    /// `before`, limited to the trailing `days` days, ascending by date.
    pub fn history(&self, location: &str, before: NaiveDate, days: usize) -> Vec<Observation> {
        let earliest = before - chrono::Duration::days(days as i64);
        self.rows
            .get(location)
            .map(|by_date| {
                by_date
                    .range(earliest..before)
                    .filter_map(|(_, versions)| versions.last().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All latest-version observations for a location, ascending by date.
    pub fn full_history(&self, location: &str) -> Vec<Observation> {
        self.rows
            .get(location)
            .map(|by_date| {
                by_date
                    .values()
                    .filter_map(|versions| versions.last().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn locations(&self) -> Vec<&str> {
        self.rows.keys().map(String::as_str).collect()
    }

    /// Number of distinct (location, date) entries
    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(date: (i32, u32, u32), aqi: Option<u16>) -> Observation {
        Observation {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            location_id: "08901".to_string(),
            pm25: None,
            aqi,
            temp_max: 70.0,
            wind_avg: 8.0,
            precip: 0.0,
            rh_avg: 60.0,
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut o = obs((2024, 6, 1), Some(501));
        assert!(o.validate().is_err());

        o.aqi = Some(120);
        assert!(o.validate().is_ok());

        o.rh_avg = 120.0;
        assert!(o.validate().is_err());

        o.rh_avg = 60.0;
        o.precip = -0.1;
        assert!(o.validate().is_err());
    }

    #[test]
    fn test_history_is_ordered_and_bounded() {
        let mut store = ObservationStore::new();
        for day in 1..=10 {
            store.record(obs((2024, 6, day), Some(40 + day as u16)));
        }

        let before = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
        let hist = store.history("08901", before, 7);

        assert_eq!(hist.len(), 7);
        assert_eq!(hist.first().unwrap().date, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
        assert_eq!(hist.last().unwrap().date, NaiveDate::from_ymd_opt(2024, 6, 8).unwrap());
        assert!(hist.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_correction_appends_new_version() {
        let mut store = ObservationStore::new();
        store.record(obs((2024, 6, 1), Some(40)));
        store.record(obs((2024, 6, 1), Some(55)));

        let before = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let hist = store.history("08901", before, 7);

        // one entry per date, latest version wins
        assert_eq!(hist.len(), 1);
        assert_eq!(hist[0].aqi, Some(55));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_location_is_empty() {
        let store = ObservationStore::new();
        let before = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert!(store.history("07302", before, 7).is_empty());
    }
}
