//! Feature engineering for the AQI classifier.
//!
//! Turns an ordered observation history plus the target day's weather
//! forecast into a fixed-order feature vector. The same transform runs at
//! training and serving time; given identical inputs the output is
//! byte-identical, which is what training/serving parity depends on.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use strum::{EnumCount, IntoEnumIterator};

use crate::domain::Observation;
use crate::ml::error::PipelineError;

/// Model features, in canonical order. The declaration order here *is* the
/// feature-vector order recorded with every trained model; inference verifies
/// the artifact against this list before predicting.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::EnumIter,
    strum::EnumCount,
)]
pub enum Feature {
    // Persistence (AQI's own recent history)
    AqiPrev1,
    AqiPrev2,
    Aqi3DayAvg,
    Aqi7DayAvg,
    Aqi3DayMax,
    AqiTrend,
    // Weather for the target day
    TempMax,
    WindAvg,
    Precip,
    RhAvg,
    TempWindRatio,
    IsStagnant,
    HasRain,
    // Temporal
    Month,
    DayOfWeek,
    IsWeekend,
    Season,
    IsHoliday,
    MonthSin,
    MonthCos,
    DowSin,
    DowCos,
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Self::AqiPrev1 => "aqi_prev1",
            Self::AqiPrev2 => "aqi_prev2",
            Self::Aqi3DayAvg => "aqi_3day_avg",
            Self::Aqi7DayAvg => "aqi_7day_avg",
            Self::Aqi3DayMax => "aqi_3day_max",
            Self::AqiTrend => "aqi_trend",
            Self::TempMax => "temp_max",
            Self::WindAvg => "wind_avg",
            Self::Precip => "precip",
            Self::RhAvg => "rh_avg",
            Self::TempWindRatio => "temp_wind_ratio",
            Self::IsStagnant => "is_stagnant",
            Self::HasRain => "has_rain",
            Self::Month => "month",
            Self::DayOfWeek => "day_of_week",
            Self::IsWeekend => "is_weekend",
            Self::Season => "season",
            Self::IsHoliday => "is_holiday",
            Self::MonthSin => "month_sin",
            Self::MonthCos => "month_cos",
            Self::DowSin => "dow_sin",
            Self::DowCos => "dow_cos",
        }
    }

    /// Position in the canonical order
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Canonical feature-name list, in order
pub fn canonical_feature_names() -> Vec<String> {
    Feature::iter().map(|f| f.name().to_string()).collect()
}

/// Number of persistence + weather features; the imputation accounting that
/// drives the `low_quality` flag runs over these (temporal features are
/// derived from the date and can never be imputed).
const IMPUTABLE_FEATURES: usize = 13;

/// Fixed-order feature vector with imputation accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<f64>,
    imputed: usize,
    /// More than half of the persistence + weather features were imputed.
    /// Training excludes such samples; serving downgrades confidence a tier.
    pub low_quality: bool,
}

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    /// Values in canonical order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn imputed_count(&self) -> usize {
        self.imputed
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Weather forecast for the target day. Missing fields fall back to the
/// imputation baseline and count toward the low-quality accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetWeather {
    pub temp_max: Option<f64>,
    pub wind_avg: Option<f64>,
    pub precip: Option<f64>,
    pub rh_avg: Option<f64>,
}

impl From<&Observation> for TargetWeather {
    fn from(obs: &Observation) -> Self {
        Self {
            temp_max: Some(obs.temp_max),
            wind_avg: Some(obs.wind_avg),
            precip: Some(obs.precip),
            rh_avg: Some(obs.rh_avg),
        }
    }
}

/// Training-set medians baked into the model artifact. Last-resort imputation
/// values; never recomputed per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationBaseline {
    pub aqi: f64,
    pub temp_max: f64,
    pub wind_avg: f64,
    pub precip: f64,
    pub rh_avg: f64,
}

impl Default for ImputationBaseline {
    fn default() -> Self {
        Self {
            aqi: 50.0,
            temp_max: 70.0,
            wind_avg: 8.0,
            precip: 0.0,
            rh_avg: 60.0,
        }
    }
}

impl ImputationBaseline {
    /// Medians over the observed values of a training set
    pub fn from_observations(observations: &[Observation]) -> Self {
        let fallback = Self::default();
        let aqi: Vec<f64> = observations
            .iter()
            .filter_map(|o| o.aqi.map(f64::from))
            .collect();
        Self {
            aqi: median(&aqi).unwrap_or(fallback.aqi),
            temp_max: median(&observations.iter().map(|o| o.temp_max).collect::<Vec<_>>())
                .unwrap_or(fallback.temp_max),
            wind_avg: median(&observations.iter().map(|o| o.wind_avg).collect::<Vec<_>>())
                .unwrap_or(fallback.wind_avg),
            precip: median(&observations.iter().map(|o| o.precip).collect::<Vec<_>>())
                .unwrap_or(fallback.precip),
            rh_avg: median(&observations.iter().map(|o| o.rh_avg).collect::<Vec<_>>())
                .unwrap_or(fallback.rh_avg),
        }
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Fixed (month, day) holiday calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    days: Vec<(u32, u32)>,
}

impl HolidayCalendar {
    pub fn new(days: Vec<(u32, u32)>) -> Self {
        Self { days }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.days.contains(&(date.month(), date.day()))
    }
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        // New Year's Day, Independence Day, Christmas
        Self::new(vec![(1, 1), (7, 4), (12, 25)])
    }
}

/// Feature-builder knobs. The forward-fill lookback and the stagnation cutoff
/// are configuration with observed defaults, not hard-coded literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub forward_fill_lookback_days: u32,
    pub stagnation_wind_mph: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            forward_fill_lookback_days: 2,
            stagnation_wind_mph: 5.0,
        }
    }
}

/// Pure transform from observation history to the canonical feature vector
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    cfg: FeatureConfig,
    holidays: HolidayCalendar,
}

impl FeatureEngineer {
    pub fn new(cfg: FeatureConfig, holidays: HolidayCalendar) -> Self {
        Self { cfg, holidays }
    }

    /// Build the feature vector for `target_date` from the days before it.
    ///
    /// `history` must be ordered ascending and deduplicated per date (the
    /// observation store guarantees both); days on or after `target_date` are
    /// ignored. `weather` is the forecast for the target day itself.
    pub fn build(
        &self,
        history: &[Observation],
        weather: &TargetWeather,
        target_date: NaiveDate,
        baseline: &ImputationBaseline,
    ) -> Result<FeatureVector, PipelineError> {
        let observed_aqi: BTreeMap<NaiveDate, f64> = history
            .iter()
            .filter(|o| o.date < target_date)
            .filter_map(|o| o.aqi.map(|a| (o.date, f64::from(a))))
            .collect();

        if observed_aqi.is_empty() {
            return Err(PipelineError::InsufficientHistory(format!(
                "no prior days with observed AQI before {target_date}"
            )));
        }

        let (aqi_prev1, prev1_imputed) = self.lagged_aqi(&observed_aqi, target_date, 1, baseline);
        let (aqi_prev2, prev2_imputed) = self.lagged_aqi(&observed_aqi, target_date, 2, baseline);

        let window3 = trailing_window(&observed_aqi, target_date, 3);
        let window7 = trailing_window(&observed_aqi, target_date, 7);
        if window3.is_empty() {
            return Err(PipelineError::InsufficientHistory(format!(
                "no observed AQI in the 3 days before {target_date}"
            )));
        }
        if window7.is_empty() {
            return Err(PipelineError::InsufficientHistory(format!(
                "no observed AQI in the 7 days before {target_date}"
            )));
        }

        let aqi_3day_avg = mean(&window3);
        let aqi_7day_avg = mean(&window7);
        let aqi_3day_max = window3.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let aqi_trend = aqi_prev1 - aqi_7day_avg;

        let (temp_max, temp_imputed) = imputed(weather.temp_max, baseline.temp_max);
        let (wind_avg, wind_imputed) = imputed(weather.wind_avg, baseline.wind_avg);
        let (precip, precip_imputed) = imputed(weather.precip, baseline.precip);
        let (rh_avg, rh_imputed) = imputed(weather.rh_avg, baseline.rh_avg);

        // Floor at 1 mph keeps the ratio bounded in near-calm conditions
        let temp_wind_ratio = temp_max / wind_avg.max(1.0);
        let is_stagnant = if wind_avg < self.cfg.stagnation_wind_mph { 1.0 } else { 0.0 };
        let has_rain = if precip > 0.0 { 1.0 } else { 0.0 };

        let month = target_date.month();
        let day_of_week = target_date.weekday().num_days_from_monday();
        let is_weekend = if day_of_week >= 5 { 1.0 } else { 0.0 };
        let season = season_of(month);
        let is_holiday = if self.holidays.is_holiday(target_date) { 1.0 } else { 0.0 };
        let (month_sin, month_cos) = cyclical_encode(month as f64, 12.0);
        let (dow_sin, dow_cos) = cyclical_encode(day_of_week as f64, 7.0);

        // Derived features inherit imputedness from their inputs; the rolling
        // aggregates only ever use observed days.
        let imputed_flags = [
            prev1_imputed,
            prev2_imputed,
            false, // aqi_3day_avg
            false, // aqi_7day_avg
            false, // aqi_3day_max
            prev1_imputed, // aqi_trend
            temp_imputed,
            wind_imputed,
            precip_imputed,
            rh_imputed,
            temp_imputed || wind_imputed, // temp_wind_ratio
            wind_imputed,                 // is_stagnant
            precip_imputed,               // has_rain
        ];
        debug_assert_eq!(imputed_flags.len(), IMPUTABLE_FEATURES);
        let imputed_count = imputed_flags.iter().filter(|&&f| f).count();
        let low_quality = imputed_count * 2 > IMPUTABLE_FEATURES;

        let values = vec![
            aqi_prev1,
            aqi_prev2,
            aqi_3day_avg,
            aqi_7day_avg,
            aqi_3day_max,
            aqi_trend,
            temp_max,
            wind_avg,
            precip,
            rh_avg,
            temp_wind_ratio,
            is_stagnant,
            has_rain,
            month as f64,
            day_of_week as f64,
            is_weekend,
            season as f64,
            is_holiday,
            month_sin,
            month_cos,
            dow_sin,
            dow_cos,
        ];
        debug_assert_eq!(values.len(), Feature::COUNT);

        Ok(FeatureVector {
            values,
            imputed: imputed_count,
            low_quality,
        })
    }

    /// AQI at `target_date - offset`; forward-filled from the nearest prior
    /// observed day within the lookback window, then the baked median.
    fn lagged_aqi(
        &self,
        observed: &BTreeMap<NaiveDate, f64>,
        target_date: NaiveDate,
        offset: i64,
        baseline: &ImputationBaseline,
    ) -> (f64, bool) {
        let wanted = target_date - chrono::Duration::days(offset);
        if let Some(&v) = observed.get(&wanted) {
            return (v, false);
        }
        for back in 1..=i64::from(self.cfg.forward_fill_lookback_days) {
            if let Some(&v) = observed.get(&(wanted - chrono::Duration::days(back))) {
                return (v, true);
            }
        }
        (baseline.aqi, true)
    }
}

/// Observed AQI values over the trailing `days`-day window ending at t-1
fn trailing_window(
    observed: &BTreeMap<NaiveDate, f64>,
    target_date: NaiveDate,
    days: i64,
) -> Vec<f64> {
    let start = target_date - chrono::Duration::days(days);
    observed.range(start..target_date).map(|(_, &v)| v).collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn imputed(value: Option<f64>, fallback: f64) -> (f64, bool) {
    match value {
        Some(v) => (v, false),
        None => (fallback, true),
    }
}

/// Season from month: 0=winter, 1=spring, 2=summer, 3=fall
fn season_of(month: u32) -> u32 {
    match month {
        12 | 1 | 2 => 0,
        3 | 4 | 5 => 1,
        6 | 7 | 8 => 2,
        _ => 3,
    }
}

/// (sin, cos) encoding so period boundaries stay adjacent in feature space
fn cyclical_encode(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}
