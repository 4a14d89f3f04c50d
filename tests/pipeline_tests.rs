//! End-to-end pipeline scenarios: train on history, persist, reload, predict,
//! and explain, with the decision procedure checked against known values.

use chrono::NaiveDate;

use airwatch::domain::{Classification, ConfidenceTier, Observation};
use airwatch::ml::artifact::{self, ModelMetadata, TrainedModel};
use airwatch::ml::features::{
    canonical_feature_names, FeatureEngineer, ImputationBaseline, TargetWeather,
};
use airwatch::ml::gbdt::GbdtParams;
use airwatch::ml::logistic::LogisticBaseline;
use airwatch::ml::metrics::ClassificationMetrics;
use airwatch::ml::training::{
    build_training_set, synthetic_observations, ModelTrainer, ThresholdStrategy, TrainingConfig,
};
use airwatch::ml::{ClassifierState, PipelineError, Predictor};

fn fixed_probability_model(probability: f64, threshold: f64) -> TrainedModel {
    let names = canonical_feature_names();
    let n = names.len();
    let mut importances = vec![0.0; n];
    // aqi_prev1, wind_avg, precip
    importances[0] = 0.5;
    importances[7] = 0.3;
    importances[8] = 0.2;
    TrainedModel {
        classifier: ClassifierState::Logistic(LogisticBaseline::prior(n, probability)),
        feature_names: names,
        threshold,
        importances,
        imputation: ImputationBaseline::default(),
        metadata: ModelMetadata {
            model_id: "scenario".to_string(),
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

fn observation(date: NaiveDate, aqi: u16) -> Observation {
    Observation {
        date,
        location_id: "08901".to_string(),
        pm25: None,
        aqi: Some(aqi),
        temp_max: 70.0,
        wind_avg: 8.0,
        precip: 0.0,
        rh_avg: 60.0,
    }
}

#[test]
fn end_to_end_scenario_safe_low_confidence() {
    // history: day-2 AQI 38, day-1 AQI 45; target day: 75°F, 8.5 mph wind,
    // no rain, a Tuesday in July; model yields 0.37 against threshold 0.40
    let target = NaiveDate::from_ymd_opt(2024, 7, 9).unwrap();
    let history = vec![
        observation(target - chrono::Duration::days(2), 38),
        observation(target - chrono::Duration::days(1), 45),
    ];
    let weather = TargetWeather {
        temp_max: Some(75.0),
        wind_avg: Some(8.5),
        precip: Some(0.0),
        rh_avg: Some(60.0),
    };
    let model = fixed_probability_model(0.37, 0.40);
    let predictor = Predictor::default();

    let result = predictor
        .predict_with_explanation(&model, &history, &weather, target, "08901", None)
        .unwrap();

    assert!((result.probability - 0.37).abs() < 1e-9);
    assert_eq!(result.classification, Classification::Safe);
    assert_eq!(result.confidence, ConfidenceTier::Low);
    assert_eq!(result.top_factors.len(), 3);
    // importances rank aqi_prev1 > wind_avg > precip
    assert!(result.top_factors[0].contains("AQI"));
    assert!(result.top_factors[1].to_lowercase().contains("wind"));
    assert!(result.top_factors[2].to_lowercase().contains("rain"));
}

#[test]
fn exact_threshold_ties_toward_unhealthy() {
    let target = NaiveDate::from_ymd_opt(2024, 7, 9).unwrap();
    let history = vec![
        observation(target - chrono::Duration::days(2), 38),
        observation(target - chrono::Duration::days(1), 45),
    ];
    let model = fixed_probability_model(0.40, 0.40);
    let predictor = Predictor::default();

    let result = predictor
        .predict_with_explanation(
            &model,
            &history,
            &TargetWeather::from(&history[1]),
            target,
            "08901",
            None,
        )
        .unwrap();
    assert_eq!(result.classification, Classification::Unhealthy);
}

#[test]
fn zero_history_fails_instead_of_fabricating() {
    let model = fixed_probability_model(0.37, 0.40);
    let predictor = Predictor::default();
    let target = NaiveDate::from_ymd_opt(2024, 7, 9).unwrap();

    let err = predictor
        .predict(&model, &[], &TargetWeather::default(), target)
        .unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientHistory(_)));
}

#[test]
fn train_save_load_predict_roundtrip() {
    let observations = synthetic_observations(400, 42, "statewide-nj");
    let engineer = FeatureEngineer::default();
    let baseline = ImputationBaseline::from_observations(&observations);
    let samples = build_training_set(&observations, &engineer, &baseline);

    let config = TrainingConfig {
        gbdt: GbdtParams {
            n_trees: 60,
            ..GbdtParams::default()
        },
        ..TrainingConfig::default()
    };
    let model = ModelTrainer::new(config).fit(&samples, baseline).unwrap();

    assert_eq!(model.feature_names, canonical_feature_names());
    assert!((model.importances.iter().sum::<f64>() - 1.0).abs() < 1e-6);

    let dir = tempfile::tempdir().unwrap();
    artifact::save(&model, dir.path()).unwrap();
    let loaded = artifact::load(dir.path()).unwrap();

    let last_date = observations.last().unwrap().date;
    let target = last_date.succ_opt().unwrap();
    let history = observations[observations.len() - 10..].to_vec();
    let weather = TargetWeather {
        temp_max: Some(78.0),
        wind_avg: Some(6.0),
        precip: Some(0.0),
        rh_avg: Some(55.0),
    };
    let predictor = Predictor::default();

    let from_memory = predictor
        .predict_with_explanation(&model, &history, &weather, target, "statewide-nj", None)
        .unwrap();
    let from_disk = predictor
        .predict_with_explanation(&loaded, &history, &weather, target, "statewide-nj", None)
        .unwrap();

    // persistence round-trip must not change a single decision input
    assert_eq!(from_memory, from_disk);
    assert!((0.0..=1.0).contains(&from_memory.probability));
    assert!(!from_memory.top_factors.is_empty());
    assert!(from_memory.top_factors.len() <= 3);
}

#[test]
fn training_is_deterministic_given_identical_data() {
    let observations = synthetic_observations(300, 7, "statewide-nj");
    let engineer = FeatureEngineer::default();
    let baseline = ImputationBaseline::from_observations(&observations);
    let samples = build_training_set(&observations, &engineer, &baseline);

    let config = TrainingConfig {
        gbdt: GbdtParams {
            n_trees: 40,
            ..GbdtParams::default()
        },
        ..TrainingConfig::default()
    };
    let a = ModelTrainer::new(config.clone())
        .fit(&samples, baseline.clone())
        .unwrap();
    let b = ModelTrainer::new(config).fit(&samples, baseline).unwrap();

    // metadata carries a fresh id and timestamp, but the fitted state,
    // threshold, and importances must be identical
    assert_eq!(
        bincode::serialize(&a.classifier).unwrap(),
        bincode::serialize(&b.classifier).unwrap()
    );
    assert_eq!(a.threshold, b.threshold);
    assert_eq!(a.importances, b.importances);
}

#[test]
fn operator_threshold_override_shifts_the_decision() {
    let target = NaiveDate::from_ymd_opt(2024, 7, 9).unwrap();
    let history = vec![
        observation(target - chrono::Duration::days(2), 38),
        observation(target - chrono::Duration::days(1), 45),
    ];
    let weather = TargetWeather::from(&history[1]);
    let model = fixed_probability_model(0.37, 0.40);
    let predictor = Predictor::default();

    let default = predictor
        .predict_with_explanation(&model, &history, &weather, target, "08901", None)
        .unwrap();
    let overridden = predictor
        .predict_with_explanation(&model, &history, &weather, target, "08901", Some(0.25))
        .unwrap();

    assert_eq!(default.classification, Classification::Safe);
    assert_eq!(overridden.classification, Classification::Unhealthy);
    assert_eq!(overridden.threshold, 0.25);
}
