use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::ValidationError;

/// Scalar value a caller may supply for a training parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        Self::Float(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Flat caller-supplied parameter map. `None` marks a key that was mentioned
/// without a value; such keys never reach the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterMap {
    entries: BTreeMap<String, Option<ParamValue>>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a defined value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.entries.insert(key.into(), Some(value.into()));
        self
    }

    /// Insert a possibly absent value.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<ParamValue>) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a map from a JSON object. `null` values are kept as absent; arrays
    /// and objects are rejected because the map must stay flat.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let Value::Object(object) = value else {
            return Err(ValidationError::Shape("parameters must be an object".into()));
        };
        let mut map = Self::new();
        for (key, value) in object {
            let value = match value {
                Value::Null => None,
                Value::Bool(flag) => Some(ParamValue::Bool(*flag)),
                Value::Number(number) => Some(match number.as_i64() {
                    Some(int) => ParamValue::Int(int),
                    None => ParamValue::Float(number.as_f64().ok_or_else(|| {
                        ValidationError::Parameter {
                            key: key.clone(),
                            reason: format!("number {number} is out of range"),
                        }
                    })?),
                }),
                Value::String(text) => Some(ParamValue::Text(text.clone())),
                Value::Array(_) | Value::Object(_) => {
                    return Err(ValidationError::Parameter {
                        key: key.clone(),
                        reason: "nested values are not supported".into(),
                    });
                }
            };
            map.insert(key.clone(), value);
        }
        Ok(map)
    }
}

/// String-to-string parameter map in the form the native engine consumes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalParams(BTreeMap<String, String>);

impl CanonicalParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Stringify every defined value and drop absent keys entirely.
///
/// The engine treats "present but empty" differently from "absent", so an
/// absent value must not become `""` or `"undefined"`.
pub fn canonicalize_parameters(params: &ParameterMap) -> CanonicalParams {
    CanonicalParams(
        params
            .entries
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|value| (key.clone(), value.to_string()))
            })
            .collect(),
    )
}

/// Learning objectives the engine understands out of the box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Objective {
    /// Regression with squared loss.
    SquaredError,
    /// Regression with squared log loss.
    SquaredLogError,
    /// Logistic regression producing a value in `[0, 1]`.
    Logistic,
    /// Binary classification producing a probability.
    BinaryLogistic,
    /// Binary classification producing the raw margin.
    BinaryLogitRaw,
    /// Poisson regression for count data.
    CountPoisson,
    /// Multiclass classification producing the class index.
    MultiSoftmax,
    /// Pairwise learning to rank.
    RankPairwise,
    /// Any other objective string, passed through verbatim.
    Custom(String),
}

impl Objective {
    pub fn as_str(&self) -> &str {
        match self {
            Objective::SquaredError => "reg:squarederror",
            Objective::SquaredLogError => "reg:squaredlogerror",
            Objective::Logistic => "reg:logistic",
            Objective::BinaryLogistic => "binary:logistic",
            Objective::BinaryLogitRaw => "binary:logitraw",
            Objective::CountPoisson => "count:poisson",
            Objective::MultiSoftmax => "multi:softmax",
            Objective::RankPairwise => "rank:pairwise",
            Objective::Custom(name) => name,
        }
    }
}

/// Typed training configuration.
///
/// Every field left as `None` is omitted from the parameter map, letting the
/// engine apply its own default. `extra` carries engine options not modeled
/// here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainParams {
    /// Maximum tree depth. Deeper trees fit more interactions and overfit sooner.
    pub max_depth: Option<u32>,
    /// Learning rate applied to each boosting round's contribution.
    pub eta: Option<f64>,
    /// Loss function to optimize.
    pub objective: Option<Objective>,
    /// Metric reported on evaluation sets, e.g. `rmse` or `logloss`.
    pub eval_metric: Option<String>,
    /// Number of boosting rounds. Consumed by the engine wrapper, default 10.
    pub num_round: Option<u32>,
    /// Random seed for row/column sampling.
    pub seed: Option<u64>,
    /// Native worker threads used during training and prediction.
    pub nthread: Option<u32>,
    /// Native log verbosity, 0 (silent) to 3 (debug).
    pub verbosity: Option<u8>,
    /// Fraction of rows sampled per tree.
    pub subsample: Option<f64>,
    /// Fraction of columns sampled per tree.
    pub colsample_bytree: Option<f64>,
    /// Minimum hessian weight required in a child.
    pub min_child_weight: Option<f64>,
    /// Minimum loss reduction required to split a leaf.
    pub gamma: Option<f64>,
    /// L2 regularization on leaf weights.
    pub lambda: Option<f64>,
    /// L1 regularization on leaf weights.
    pub alpha: Option<f64>,
    /// Additional engine options, passed through after canonicalization.
    pub extra: BTreeMap<String, ParamValue>,
}

impl TrainParams {
    /// Merge `extra` with the typed fields. A typed field that is set wins
    /// over an `extra` entry of the same name; an unset one leaves it alone.
    pub fn to_parameter_map(&self) -> ParameterMap {
        let mut map = ParameterMap::new();
        for (key, value) in &self.extra {
            map.insert(key.clone(), Some(value.clone()));
        }
        let typed = [
            ("max_depth", self.max_depth.map(ParamValue::from)),
            ("eta", self.eta.map(ParamValue::from)),
            (
                "objective",
                self.objective
                    .as_ref()
                    .map(|objective| ParamValue::from(objective.as_str())),
            ),
            ("eval_metric", self.eval_metric.clone().map(ParamValue::from)),
            ("num_round", self.num_round.map(ParamValue::from)),
            (
                "seed",
                self.seed
                    .map(|seed| ParamValue::Int(i64::try_from(seed).unwrap_or(i64::MAX))),
            ),
            ("nthread", self.nthread.map(ParamValue::from)),
            (
                "verbosity",
                self.verbosity.map(|level| ParamValue::Int(level.into())),
            ),
            ("subsample", self.subsample.map(ParamValue::from)),
            ("colsample_bytree", self.colsample_bytree.map(ParamValue::from)),
            ("min_child_weight", self.min_child_weight.map(ParamValue::from)),
            ("gamma", self.gamma.map(ParamValue::from)),
            ("lambda", self.lambda.map(ParamValue::from)),
            ("alpha", self.alpha.map(ParamValue::from)),
        ];
        for (key, value) in typed {
            if let Some(value) = value {
                map.insert(key, Some(value));
            }
        }
        map
    }
}

impl From<&TrainParams> for ParameterMap {
    fn from(params: &TrainParams) -> Self {
        params.to_parameter_map()
    }
}

impl From<TrainParams> for ParameterMap {
    fn from(params: TrainParams) -> Self {
        params.to_parameter_map()
    }
}

/// Score used when ranking feature importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportanceType {
    Weight,
    #[default]
    Gain,
    Cover,
    TotalGain,
    TotalCover,
}

impl ImportanceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportanceType::Weight => "weight",
            ImportanceType::Gain => "gain",
            ImportanceType::Cover => "cover",
            ImportanceType::TotalGain => "total_gain",
            ImportanceType::TotalCover => "total_cover",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_values_are_dropped_not_stringified() {
        let mut params = ParameterMap::new().with("max_depth", 3).with(
            "objective",
            "reg:squarederror",
        );
        params.insert("eta", None);
        let canonical = canonicalize_parameters(&params);
        assert_eq!(canonical.len(), 2);
        assert_eq!(canonical.get("max_depth"), Some("3"));
        assert_eq!(canonical.get("objective"), Some("reg:squarederror"));
        assert!(!canonical.contains_key("eta"));
    }

    #[test]
    fn scalars_stringify_like_script_values() {
        let params = ParameterMap::new()
            .with("eta", 0.1)
            .with("whole", 3.0)
            .with("flag", true)
            .with("seed", 0);
        let canonical = canonicalize_parameters(&params);
        assert_eq!(canonical.get("eta"), Some("0.1"));
        assert_eq!(canonical.get("whole"), Some("3"));
        assert_eq!(canonical.get("flag"), Some("true"));
        assert_eq!(canonical.get("seed"), Some("0"));
    }

    #[test]
    fn json_nulls_become_absent() {
        let params = ParameterMap::from_json(&json!({
            "max_depth": 3,
            "eta": null,
            "objective": "reg:squarederror"
        }))
        .unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params.get("eta"), None);
        let canonical = canonicalize_parameters(&params);
        assert_eq!(
            canonical.into_inner(),
            BTreeMap::from([
                ("max_depth".to_string(), "3".to_string()),
                ("objective".to_string(), "reg:squarederror".to_string()),
            ])
        );
    }

    #[test]
    fn json_rejects_nested_values_and_non_objects() {
        let err = ParameterMap::from_json(&json!({"tree": {"depth": 3}})).unwrap_err();
        assert!(matches!(err, ValidationError::Parameter { ref key, .. } if key == "tree"));
        let err = ParameterMap::from_json(&json!({"metrics": ["rmse"]})).unwrap_err();
        assert!(matches!(err, ValidationError::Parameter { .. }));
        assert!(matches!(
            ParameterMap::from_json(&json!([1, 2])),
            Err(ValidationError::Shape(_))
        ));
    }

    #[test]
    fn typed_params_only_emit_set_fields() {
        let params = TrainParams {
            max_depth: Some(3),
            eta: Some(0.1),
            objective: Some(Objective::SquaredError),
            extra: BTreeMap::from([("tree_method".to_string(), ParamValue::from("hist"))]),
            ..TrainParams::default()
        };
        let canonical = canonicalize_parameters(&params.to_parameter_map());
        assert_eq!(
            canonical.into_inner(),
            BTreeMap::from([
                ("eta".to_string(), "0.1".to_string()),
                ("max_depth".to_string(), "3".to_string()),
                ("objective".to_string(), "reg:squarederror".to_string()),
                ("tree_method".to_string(), "hist".to_string()),
            ])
        );
    }

    #[test]
    fn typed_fields_override_extra_entries() {
        let params = TrainParams {
            max_depth: Some(6),
            extra: BTreeMap::from([("max_depth".to_string(), ParamValue::Int(2))]),
            ..TrainParams::default()
        };
        let canonical = canonicalize_parameters(&ParameterMap::from(&params));
        assert_eq!(canonical.get("max_depth"), Some("6"));
    }

    #[test]
    fn unset_typed_fields_keep_extra_entries() {
        let params = TrainParams {
            eta: Some(0.3),
            extra: BTreeMap::from([
                ("max_depth".to_string(), ParamValue::Int(2)),
                ("eta".to_string(), ParamValue::Float(0.05)),
                ("tree_method".to_string(), ParamValue::from("hist")),
            ]),
            ..TrainParams::default()
        };
        let canonical = canonicalize_parameters(&ParameterMap::from(&params));
        assert_eq!(canonical.get("max_depth"), Some("2"));
        assert_eq!(canonical.get("eta"), Some("0.3"));
        assert_eq!(canonical.get("tree_method"), Some("hist"));
        assert_eq!(canonical.len(), 3);
    }

    #[test]
    fn custom_objective_passes_through() {
        assert_eq!(
            Objective::Custom("survival:cox".into()).as_str(),
            "survival:cox"
        );
        assert_eq!(ImportanceType::default().as_str(), "gain");
    }
}
