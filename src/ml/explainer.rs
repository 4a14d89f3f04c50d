//! Natural-language explanation of a prediction.
//!
//! The model's feature-importance weights are ranked (ties broken by the
//! canonical feature order) and the top features are rendered through a fixed
//! per-feature template. The template dispatch is an exhaustive match over
//! the `Feature` enum, so a feature without a template cannot compile.

use ordered_float::OrderedFloat;
use strum::IntoEnumIterator;

use crate::ml::artifact::TrainedModel;
use crate::ml::features::{Feature, FeatureVector};

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const SEASONS: [&str; 4] = ["Winter", "Spring", "Summer", "Fall"];

/// At most `top_n` clauses for the highest-importance features, in importance
/// order. Zero-importance features are never used to pad the list.
pub fn explain(vector: &FeatureVector, model: &TrainedModel, top_n: usize) -> Vec<String> {
    let mut ranked: Vec<(usize, f64)> = model
        .importances
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, weight)| weight > 0.0)
        .collect();
    ranked.sort_by(|a, b| OrderedFloat(b.1).cmp(&OrderedFloat(a.1)).then(a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .take(top_n)
        .filter_map(|(index, _)| Feature::iter().nth(index))
        .map(|feature| describe(feature, vector))
        .collect()
}

/// One clause per feature, phrased around its current value
fn describe(feature: Feature, vector: &FeatureVector) -> String {
    let v = vector.get(feature);
    match feature {
        Feature::AqiPrev1 => {
            if v >= 80.0 {
                format!("High AQI yesterday ({v:.0}) carrying into today")
            } else if v < 30.0 {
                format!("Low AQI yesterday ({v:.0})")
            } else {
                format!("Yesterday's AQI was moderate ({v:.0})")
            }
        }
        Feature::AqiPrev2 => format!("AQI two days ago was {v:.0}"),
        Feature::Aqi3DayAvg => {
            if v > 60.0 {
                format!("Elevated 3-day average AQI ({v:.0})")
            } else {
                format!("3-day average AQI of {v:.0}")
            }
        }
        Feature::Aqi7DayAvg => format!("Past week's AQI averaged {v:.0}"),
        Feature::Aqi3DayMax => format!("3-day peak AQI of {v:.0}"),
        Feature::AqiTrend => {
            if v > 0.0 {
                format!("AQI running {v:.0} points above the weekly average")
            } else if v < 0.0 {
                format!("AQI running {:.0} points below the weekly average", -v)
            } else {
                "AQI holding at the weekly average".to_string()
            }
        }
        Feature::TempMax => {
            if v > 85.0 {
                format!("High temperature ({v:.0}\u{b0}F) increases pollutant formation")
            } else {
                format!("Forecast high of {v:.0}\u{b0}F")
            }
        }
        Feature::WindAvg => {
            if vector.get(Feature::IsStagnant) > 0.5 {
                format!("Low wind ({v:.1} mph) limits pollutant dispersion")
            } else if v > 12.0 {
                format!("Strong wind ({v:.1} mph) disperses pollutants")
            } else {
                format!("Wind averaging {v:.1} mph")
            }
        }
        Feature::Precip => {
            if vector.get(Feature::HasRain) > 0.5 {
                format!("Rain expected ({v:.2} in) washes particles out")
            } else {
                "No rain expected, so particles are not washed out".to_string()
            }
        }
        Feature::RhAvg => format!("Relative humidity near {v:.0}%"),
        Feature::TempWindRatio => {
            if v > 15.0 {
                format!("Heat with little wind (ratio {v:.1}), poor dispersion")
            } else {
                format!("Temperature-to-wind ratio of {v:.1}")
            }
        }
        Feature::IsStagnant => {
            if v > 0.5 {
                "Stagnant air below the dispersion cutoff".to_string()
            } else {
                "Winds strong enough to mix the air".to_string()
            }
        }
        Feature::HasRain => {
            if v > 0.5 {
                "Precipitation keeping particle levels down".to_string()
            } else {
                "No recent rain to wash particles out".to_string()
            }
        }
        Feature::Month => format!("Seasonal pattern for month {v:.0}"),
        Feature::DayOfWeek => {
            let name = WEEKDAYS[(v as usize).min(WEEKDAYS.len() - 1)];
            format!("Typical {name} traffic pattern")
        }
        Feature::IsWeekend => {
            if v > 0.5 {
                "Weekend, typically lower emissions".to_string()
            } else {
                "Weekday commute emissions".to_string()
            }
        }
        Feature::Season => {
            let name = SEASONS[(v as usize).min(SEASONS.len() - 1)];
            format!("{name} baseline air quality")
        }
        Feature::IsHoliday => {
            if v > 0.5 {
                "Holiday, reduced traffic and industry".to_string()
            } else {
                "Regular working day".to_string()
            }
        }
        Feature::MonthSin => format!("Annual cycle signal ({v:.2})"),
        Feature::MonthCos => format!("Annual cycle signal ({v:.2})"),
        Feature::DowSin => format!("Weekly cycle signal ({v:.2})"),
        Feature::DowCos => format!("Weekly cycle signal ({v:.2})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::artifact::{ModelMetadata, TrainedModel};
    use crate::ml::features::{
        canonical_feature_names, FeatureEngineer, ImputationBaseline, TargetWeather,
    };
    use crate::ml::logistic::LogisticBaseline;
    use crate::ml::metrics::ClassificationMetrics;
    use crate::ml::training::ThresholdStrategy;
    use crate::ml::ClassifierState;
    use chrono::NaiveDate;

    fn model_with_importances(weights: &[(&str, f64)]) -> TrainedModel {
        let names = canonical_feature_names();
        let importances: Vec<f64> = names
            .iter()
            .map(|name| {
                weights
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, w)| *w)
                    .unwrap_or(0.0)
            })
            .collect();
        TrainedModel {
            classifier: ClassifierState::Logistic(LogisticBaseline::prior(names.len(), 0.5)),
            feature_names: names,
            threshold: 0.4,
            importances,
            imputation: ImputationBaseline::default(),
            metadata: ModelMetadata {
                model_id: "test".to_string(),
                kind: "logistic".to_string(),
                version: "0.1.0".to_string(),
                trained_at: chrono::Utc::now(),
                training_samples: 0,
                validation_samples: 0,
                positive_samples: 0,
                metrics: ClassificationMetrics {
                    precision: 0.0,
                    recall: 0.0,
                    f1: 0.0,
                    pr_auc: 0.0,
                    roc_auc: 0.5,
                    brier: 0.25,
                },
                threshold_strategy: ThresholdStrategy::RecallAtPrecisionFloor,
            },
        }
    }

    fn sample_vector() -> crate::ml::features::FeatureVector {
        let target = NaiveDate::from_ymd_opt(2024, 7, 9).unwrap();
        let history: Vec<crate::domain::Observation> = (1..=2)
            .map(|back| crate::domain::Observation {
                date: target - chrono::Duration::days(back),
                location_id: "08901".to_string(),
                pm25: None,
                aqi: Some(if back == 1 { 45 } else { 38 }),
                temp_max: 70.0,
                wind_avg: 8.0,
                precip: 0.0,
                rh_avg: 60.0,
            })
            .rev()
            .collect();
        let weather = TargetWeather {
            temp_max: Some(75.0),
            wind_avg: Some(3.5),
            precip: Some(0.0),
            rh_avg: Some(60.0),
        };
        FeatureEngineer::default()
            .build(&history, &weather, target, &ImputationBaseline::default())
            .unwrap()
    }

    #[test]
    fn test_ranking_follows_importances() {
        let model = model_with_importances(&[
            ("aqi_prev1", 0.5),
            ("wind_avg", 0.3),
            ("precip", 0.2),
        ]);
        let factors = explain(&sample_vector(), &model, 3);

        assert_eq!(factors.len(), 3);
        assert!(factors[0].contains("AQI"), "{}", factors[0]);
        assert!(factors[1].contains("wind"), "{}", factors[1]);
        assert!(factors[2].contains("rain"), "{}", factors[2]);
    }

    #[test]
    fn test_zero_importance_features_never_pad() {
        let model = model_with_importances(&[("aqi_prev1", 0.7), ("wind_avg", 0.3)]);
        let factors = explain(&sample_vector(), &model, 3);
        assert_eq!(factors.len(), 2);
    }

    #[test]
    fn test_ties_break_by_canonical_order() {
        // wind_avg precedes has_rain in the canonical order
        let model = model_with_importances(&[("has_rain", 0.5), ("wind_avg", 0.5)]);
        let factors = explain(&sample_vector(), &model, 1);
        assert_eq!(factors.len(), 1);
        assert!(factors[0].contains("wind"), "{}", factors[0]);
    }

    #[test]
    fn test_top_n_caps_output() {
        let model = model_with_importances(&[
            ("aqi_prev1", 0.4),
            ("wind_avg", 0.3),
            ("precip", 0.2),
            ("temp_max", 0.1),
        ]);
        let factors = explain(&sample_vector(), &model, 3);
        assert_eq!(factors.len(), 3);
    }

    #[test]
    fn test_every_feature_has_a_template() {
        let vector = sample_vector();
        for feature in Feature::iter() {
            let clause = describe(feature, &vector);
            assert!(!clause.is_empty(), "{} rendered empty", feature.name());
        }
    }

    #[test]
    fn test_stagnant_wind_phrasing_uses_vector_flag() {
        // wind 3.5 mph is below the default 5 mph cutoff
        let vector = sample_vector();
        let clause = describe(Feature::WindAvg, &vector);
        assert!(clause.contains("dispersion"), "{clause}");
    }
}
