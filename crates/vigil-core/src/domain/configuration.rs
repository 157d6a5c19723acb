//! Nested task configuration and the merge that builds it.
//!
//! A `Configuration` is immutable once built. Stages that need to add or
//! rewrite keys call `merged`/`with_value` and get a fresh copy back, so the
//! same document can be handed to several stages without ordering surprises.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::calibration::CalibrationParameters;
use crate::error::{PipelineError, Result};

const MODEL_CONFIGURATION: [&str; 3] = ["model", "configuration", "model_configuration"];
const TRANSFORMER_CONFIGURATION: [&str; 2] = ["transformer", "configuration"];
const CALIBRATION: &str = "calibration";

/// Recursively merges `overlay` into `base`.
///
/// When both sides hold an object under the same key the two objects are
/// merged; in every other case the overlay value replaces the base value
/// wholesale (arrays are never merged element-wise).
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => Value::Object(merge_maps(base, overlay)),
        _ => overlay.clone(),
    }
}

fn merge_maps(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        let next = match merged.get(key) {
            Some(existing) if existing.is_object() && value.is_object() => merge(existing, value),
            _ => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(Map<String, Value>);

impl Configuration {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get(*first)?, |value, key| value.get(*key))
    }

    /// Returns `self` with `overlay` merged on top.
    pub fn merged(&self, overlay: &Configuration) -> Configuration {
        Self(merge_maps(&self.0, &overlay.0))
    }

    /// Returns a copy with `value` set at `path`, creating parents as needed.
    pub fn with_value(&self, path: &[&str], value: Value) -> Configuration {
        let overlay = path
            .iter()
            .rev()
            .fold(value, |inner, key| {
                let mut map = Map::new();
                map.insert((*key).to_string(), inner);
                Value::Object(map)
            });
        match overlay {
            Value::Object(map) => self.merged(&Self(map)),
            // empty path: nothing to set
            _ => self.clone(),
        }
    }

    fn required_str(&self, path: &[&str]) -> Result<&str> {
        self.get(path).and_then(Value::as_str).ok_or_else(|| {
            PipelineError::Config(format!("missing string value at `{}`", path.join(".")))
        })
    }

    pub fn model_configuration(&self) -> Option<&Map<String, Value>> {
        self.get(&MODEL_CONFIGURATION).and_then(Value::as_object)
    }

    fn model_value(&self, key: &str) -> Option<&Value> {
        self.model_configuration().and_then(|m| m.get(key))
    }

    fn required_model_str(&self, key: &str) -> Result<&str> {
        self.model_value(key).and_then(Value::as_str).ok_or_else(|| {
            PipelineError::Config(format!(
                "missing string value at `model.configuration.model_configuration.{key}`"
            ))
        })
    }

    pub fn save_path(&self) -> Option<&str> {
        self.model_value("save_path").and_then(Value::as_str)
    }

    pub fn load_path(&self) -> Option<&str> {
        self.model_value("load_path").and_then(Value::as_str)
    }

    pub fn train_iters(&self) -> Option<u64> {
        self.model_value("train_iters").and_then(Value::as_u64)
    }

    pub fn learning_rate(&self) -> Option<f64> {
        self.model_value("learning_rate").and_then(Value::as_f64)
    }

    pub fn transformer_value(&self, key: &str) -> Option<&Value> {
        self.get(&TRANSFORMER_CONFIGURATION).and_then(|t| t.get(key))
    }

    /// Whether the transformer runs a spectral (DFT) pass.
    ///
    /// Absent means enabled; an explicit `null` means disabled.
    pub fn has_fft_enabled(&self) -> bool {
        match self.transformer_value("enable_fft") {
            None => true,
            Some(value) => value.as_bool().unwrap_or(false),
        }
    }

    pub fn datasource_class(&self) -> Result<&str> {
        self.required_str(&["datasource_class"])
    }

    pub fn model_class(&self) -> Result<&str> {
        self.required_str(&["model", "class_name"])
    }

    pub fn transformer_class(&self) -> Result<&str> {
        self.required_str(&["transformer", "class_name"])
    }

    /// Optional analyzer class; falls back to the registry default.
    pub fn analyzer_class(&self) -> Option<&str> {
        self.get(&["performance", "class_name"]).and_then(Value::as_str)
    }

    /// Stored calibration, if every parameter is present and non-zero.
    pub fn calibration(&self) -> Option<CalibrationParameters> {
        let calibration = self.0.get(CALIBRATION)?;
        let read = |key: &str| calibration.get(key).and_then(Value::as_f64);
        CalibrationParameters::new(read("k")?, read("x0")?, read("anomaly_prior")?).usable()
    }

    pub fn with_calibration(&self, calibration: &CalibrationParameters) -> Configuration {
        self.with_value(
            &[CALIBRATION],
            serde_json::json!({
                "k": calibration.k,
                "x0": calibration.x0,
                "anomaly_prior": calibration.anomaly_prior,
            }),
        )
    }

    fn with_model_value(&self, key: &str, value: Value) -> Configuration {
        let mut path = MODEL_CONFIGURATION.to_vec();
        path.push(key);
        self.with_value(&path, value)
    }

    pub fn with_load_path(&self, load_path: Option<&str>) -> Configuration {
        self.with_model_value("load_path", load_path.map_or(Value::Null, Value::from))
    }

    /// Rewrites the relative load/save paths under `root`.
    pub fn with_root_folder(&self, root: &Path) -> Result<Configuration> {
        let load = root.join(self.required_model_str("load_path")?);
        let save = root.join(self.required_model_str("save_path")?);
        Ok(self
            .with_model_value("load_path", Value::from(load.to_string_lossy().into_owned()))
            .with_model_value("save_path", Value::from(save.to_string_lossy().into_owned())))
    }

    /// Points the load path at the trained model so detection and diagnosis
    /// restore the checkpoint training produced.
    pub fn for_inference(&self) -> Result<Configuration> {
        let save = self
            .save_path()
            .ok_or_else(|| PipelineError::Config("configuration has no save_path".to_string()))?
            .to_string();
        Ok(self.with_load_path(Some(&save)))
    }
}

impl From<Map<String, Value>> for Configuration {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Configuration {
    type Error = PipelineError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PipelineError::Config(format!(
                "configuration must be an object, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn starting_configuration() -> Value {
        json!({
            "datasource_class": "flight",
            "datasource_interpreter": "FlightDatasourceInterpreter",
            "model": {
                "class_name": "baseline",
                "configuration": {
                    "model_configuration": {
                        "train_iters": 50000,
                        "number_of_timesteps": 2
                    }
                }
            },
            "transformer": {
                "class_name": "window",
                "configuration": {
                    "do_local_normalisation": false,
                    "number_of_sensors": 8,
                    "number_of_timesteps": 392,
                    "perform_pca": false
                }
            }
        })
    }

    #[test]
    fn nested_overrides_keep_sibling_keys() {
        let overlay = json!({
            "model": {"configuration": {"model_configuration": {"train_iters": 0}}},
            "transformer": {"configuration": {"perform_fft": false}}
        });

        let merged = merge(&starting_configuration(), &overlay);

        assert_eq!(
            merged,
            json!({
                "datasource_class": "flight",
                "datasource_interpreter": "FlightDatasourceInterpreter",
                "model": {
                    "class_name": "baseline",
                    "configuration": {
                        "model_configuration": {
                            "train_iters": 0,
                            "number_of_timesteps": 2
                        }
                    }
                },
                "transformer": {
                    "class_name": "window",
                    "configuration": {
                        "do_local_normalisation": false,
                        "number_of_sensors": 8,
                        "perform_fft": false,
                        "number_of_timesteps": 392,
                        "perform_pca": false
                    }
                }
            })
        );
    }

    #[rstest]
    #[case::full(starting_configuration())]
    #[case::flat(json!({"a": 1, "b": [1, 2]}))]
    #[case::empty(json!({}))]
    fn empty_object_is_identity(#[case] value: Value) {
        assert_eq!(merge(&value, &json!({})), value);
        assert_eq!(merge(&json!({}), &value), value);
    }

    #[test]
    fn arrays_and_scalars_are_replaced_wholesale() {
        let base = json!({"list": [1, 2, 3], "nested": {"x": 1}});
        let overlay = json!({"list": [9], "nested": 5});
        assert_eq!(merge(&base, &overlay), json!({"list": [9], "nested": 5}));
    }

    #[test]
    fn merged_does_not_touch_the_original() {
        let base = Configuration::try_from(starting_configuration()).unwrap();
        let next = base.with_value(&["model", "class_name"], json!("other"));
        assert_eq!(base.model_class().unwrap(), "baseline");
        assert_eq!(next.model_class().unwrap(), "other");
    }

    #[test]
    fn fft_flag_defaults_to_enabled() {
        let config = Configuration::try_from(starting_configuration()).unwrap();
        assert!(config.has_fft_enabled());

        let disabled =
            config.with_value(&["transformer", "configuration", "enable_fft"], Value::Null);
        assert!(!disabled.has_fft_enabled());

        let enabled =
            config.with_value(&["transformer", "configuration", "enable_fft"], json!(true));
        assert!(enabled.has_fft_enabled());
    }

    #[test]
    fn root_folder_and_inference_paths() {
        let config = Configuration::try_from(json!({
            "model": {"configuration": {"model_configuration": {
                "load_path": "parent/model",
                "save_path": "7/code/code"
            }}}
        }))
        .unwrap();

        let rooted = config.with_root_folder(Path::new("/data/train")).unwrap();
        assert_eq!(rooted.load_path(), Some("/data/train/parent/model"));
        assert_eq!(rooted.save_path(), Some("/data/train/7/code/code"));

        let inference = rooted.for_inference().unwrap();
        assert_eq!(inference.load_path(), Some("/data/train/7/code/code"));
    }

    #[test]
    fn root_folder_requires_paths() {
        let err = Configuration::default()
            .with_root_folder(Path::new("/x"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[rstest]
    #[case::complete(json!({"k": 2.0, "x0": 0.5, "anomaly_prior": 0.1}), true)]
    #[case::zero_k(json!({"k": 0.0, "x0": 0.5, "anomaly_prior": 0.1}), false)]
    #[case::missing_prior(json!({"k": 2.0, "x0": 0.5}), false)]
    fn calibration_requires_all_non_zero(#[case] calibration: Value, #[case] usable: bool) {
        let config = Configuration::try_from(json!({"calibration": calibration})).unwrap();
        assert_eq!(config.calibration().is_some(), usable);
    }

    #[test]
    fn with_calibration_keeps_other_keys() {
        let config = Configuration::try_from(starting_configuration()).unwrap();
        let calibrated = config.with_calibration(&CalibrationParameters::new(1.5, 0.2, 0.05));

        assert_eq!(calibrated.datasource_class().unwrap(), "flight");
        assert_eq!(
            calibrated.calibration(),
            Some(CalibrationParameters::new(1.5, 0.2, 0.05))
        );
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(Configuration::try_from(json!([1, 2])).is_err());
    }
}
