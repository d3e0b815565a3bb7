use serde_json::Value;

use super::ValidationError;

/// Rectangular, non-empty matrix of finite values stored row-major as `f32`.
///
/// `f32` is the element type of the native engine, so finiteness is checked
/// after narrowing: a finite `f64` that overflows `f32` is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    values: Vec<f32>,
    rows: usize,
    columns: usize,
}

impl FeatureMatrix {
    /// Validate typed rows and flatten them into a row-major buffer.
    pub fn from_rows<R, T>(rows: &[R]) -> Result<Self, ValidationError>
    where
        R: AsRef<[T]>,
        T: Copy + Into<f64>,
    {
        let first = rows
            .first()
            .ok_or_else(|| ValidationError::Shape("feature matrix has no rows".into()))?;
        let columns = first.as_ref().len();
        if columns == 0 {
            return Err(ValidationError::Shape("feature rows have no columns".into()));
        }
        let mut values = Vec::with_capacity(rows.len() * columns);
        for (row_idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            check_row_len(row_idx, row.len(), columns)?;
            for (column, &value) in row.iter().enumerate() {
                values.push(narrow(value.into(), row_idx, column)?);
            }
        }
        Ok(Self {
            values,
            rows: rows.len(),
            columns,
        })
    }

    /// Validate loosely typed input such as a decoded JSON request body.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let Value::Array(rows) = value else {
            return Err(ValidationError::Shape(
                "features must be an array of rows".into(),
            ));
        };
        let mut columns = None;
        let mut values = Vec::new();
        for (row_idx, row) in rows.iter().enumerate() {
            let Value::Array(row) = row else {
                return Err(ValidationError::Shape(format!(
                    "feature row {row_idx} must be an array"
                )));
            };
            let expected = *columns.get_or_insert(row.len());
            if expected == 0 {
                return Err(ValidationError::Shape("feature rows have no columns".into()));
            }
            check_row_len(row_idx, row.len(), expected)?;
            for (column, cell) in row.iter().enumerate() {
                let number = cell
                    .as_f64()
                    .ok_or(ValidationError::Numeric { row: row_idx, column })?;
                values.push(narrow(number, row_idx, column)?);
            }
        }
        let Some(columns) = columns else {
            return Err(ValidationError::Shape("feature matrix has no rows".into()));
        };
        Ok(Self {
            rows: rows.len(),
            columns,
            values,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Row-major view of every value.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Borrow a single row, if it exists.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.columns;
        Some(&self.values[start..start + self.columns])
    }

    /// Ensure `labels` has exactly one entry per row.
    pub fn check_labels(&self, labels: &LabelVector) -> Result<(), ValidationError> {
        if labels.len() != self.rows {
            return Err(ValidationError::LabelCount {
                rows: self.rows,
                labels: labels.len(),
            });
        }
        Ok(())
    }
}

/// Flat sequence of finite label values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabelVector {
    values: Vec<f32>,
}

impl LabelVector {
    pub fn from_slice<T>(labels: &[T]) -> Result<Self, ValidationError>
    where
        T: Copy + Into<f64>,
    {
        let values = labels
            .iter()
            .enumerate()
            .map(|(row, &value)| narrow(value.into(), row, 0))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }

    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let Value::Array(items) = value else {
            return Err(ValidationError::Shape("labels must be an array".into()));
        };
        let mut values = Vec::with_capacity(items.len());
        for (row, item) in items.iter().enumerate() {
            if item.is_array() || item.is_object() {
                return Err(ValidationError::Shape(format!(
                    "labels must be a flat array (entry {row} is nested)"
                )));
            }
            let number = item
                .as_f64()
                .ok_or(ValidationError::Numeric { row, column: 0 })?;
            values.push(narrow(number, row, 0)?);
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

/// Validate a typed feature matrix. Shorthand for [`FeatureMatrix::from_rows`].
pub fn validate_feature_matrix<R, T>(rows: &[R]) -> Result<FeatureMatrix, ValidationError>
where
    R: AsRef<[T]>,
    T: Copy + Into<f64>,
{
    FeatureMatrix::from_rows(rows)
}

/// Validate a typed label vector. Shorthand for [`LabelVector::from_slice`].
pub fn validate_label_vector<T>(labels: &[T]) -> Result<LabelVector, ValidationError>
where
    T: Copy + Into<f64>,
{
    LabelVector::from_slice(labels)
}

fn check_row_len(row: usize, len: usize, expected: usize) -> Result<(), ValidationError> {
    if len != expected {
        return Err(ValidationError::Shape(format!(
            "row {row} has {len} values, expected {expected}"
        )));
    }
    Ok(())
}

fn narrow(value: f64, row: usize, column: usize) -> Result<f32, ValidationError> {
    let narrowed = value as f32;
    if narrowed.is_finite() {
        Ok(narrowed)
    } else {
        Err(ValidationError::Numeric { row, column })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_rows_in_order() {
        let matrix = FeatureMatrix::from_rows(&[vec![1.0f32, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.columns(), 2);
        assert_eq!(matrix.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(matrix.row(1), Some(&[3.0f32, 4.0][..]));
        assert_eq!(matrix.row(2), None);
    }

    #[test]
    fn accepts_integer_and_double_rows() {
        let ints = FeatureMatrix::from_rows(&[[1i32, 2, 3]]).unwrap();
        assert_eq!(ints.as_slice(), &[1.0, 2.0, 3.0]);
        let doubles = FeatureMatrix::from_rows(&[[0.5f64], [1.5]]).unwrap();
        assert_eq!(doubles.rows(), 2);
    }

    #[test]
    fn rejects_empty_matrix_and_empty_rows() {
        let empty: Vec<Vec<f32>> = Vec::new();
        assert!(matches!(
            FeatureMatrix::from_rows(&empty[..]),
            Err(ValidationError::Shape(_))
        ));
        assert!(matches!(
            FeatureMatrix::from_rows(&[Vec::<f32>::new()]),
            Err(ValidationError::Shape(_))
        ));
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = FeatureMatrix::from_rows(&[vec![1.0f32, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Shape("row 1 has 1 values, expected 2".into())
        );
    }

    #[test]
    fn rejects_nan_regardless_of_position() {
        let err = FeatureMatrix::from_rows(&[vec![1.0f32, 2.0], vec![3.0, f32::NAN]]).unwrap_err();
        assert_eq!(err, ValidationError::Numeric { row: 1, column: 1 });
        let err = FeatureMatrix::from_rows(&[[f64::NEG_INFINITY]]).unwrap_err();
        assert_eq!(err, ValidationError::Numeric { row: 0, column: 0 });
    }

    #[test]
    fn rejects_values_that_overflow_f32() {
        let err = FeatureMatrix::from_rows(&[[1.0e300f64]]).unwrap_err();
        assert_eq!(err, ValidationError::Numeric { row: 0, column: 0 });
    }

    #[test]
    fn json_requires_nested_arrays() {
        assert!(matches!(
            FeatureMatrix::from_json(&json!([1, 2, 3])),
            Err(ValidationError::Shape(_))
        ));
        assert!(matches!(
            FeatureMatrix::from_json(&json!({"rows": []})),
            Err(ValidationError::Shape(_))
        ));
        assert!(matches!(
            FeatureMatrix::from_json(&json!([])),
            Err(ValidationError::Shape(_))
        ));
    }

    #[test]
    fn json_rejects_non_numeric_cells() {
        let err = FeatureMatrix::from_json(&json!([[1, 2], [3, "four"]])).unwrap_err();
        assert_eq!(err, ValidationError::Numeric { row: 1, column: 1 });
        let err = FeatureMatrix::from_json(&json!([[null]])).unwrap_err();
        assert_eq!(err, ValidationError::Numeric { row: 0, column: 0 });
    }

    #[test]
    fn json_matrix_matches_typed_matrix() {
        let from_json = FeatureMatrix::from_json(&json!([[1200, 8.5], [800, 14]])).unwrap();
        let typed = FeatureMatrix::from_rows(&[[1200.0f32, 8.5], [800.0, 14.0]]).unwrap();
        assert_eq!(from_json, typed);
    }

    #[test]
    fn labels_must_be_flat_and_numeric() {
        assert!(matches!(
            LabelVector::from_json(&json!([[1.0], [2.0]])),
            Err(ValidationError::Shape(_))
        ));
        assert!(matches!(
            LabelVector::from_json(&json!("250")),
            Err(ValidationError::Shape(_))
        ));
        assert_eq!(
            LabelVector::from_json(&json!([1, true])).unwrap_err(),
            ValidationError::Numeric { row: 1, column: 0 }
        );
        assert_eq!(
            LabelVector::from_slice(&[1.0f64, f64::NAN]).unwrap_err(),
            ValidationError::Numeric { row: 1, column: 0 }
        );
    }

    #[test]
    fn check_labels_requires_one_label_per_row() {
        let matrix = FeatureMatrix::from_rows(&[[1.0f32], [2.0]]).unwrap();
        let labels = LabelVector::from_slice(&[1.0f32]).unwrap();
        assert_eq!(
            matrix.check_labels(&labels).unwrap_err(),
            ValidationError::LabelCount { rows: 2, labels: 1 }
        );
        let labels = LabelVector::from_slice(&[1.0f32, 0.0]).unwrap();
        assert!(matrix.check_labels(&labels).is_ok());
    }
}
