use std::path::PathBuf;

use thiserror::Error;

/// Type alias for Result with TriageError
pub type Result<T> = std::result::Result<T, TriageError>;

/// Error types for feature extraction, training and model persistence
#[derive(Error, Debug)]
pub enum TriageError {
    /// Prediction or save attempted before `fit`
    #[error("Model not trained: call fit() first")]
    NotTrained,

    /// Feature matrix or vector width differs from the trained feature order
    #[error("Feature shape mismatch: expected {expected} features, found {found}")]
    FeatureShapeMismatch { expected: usize, found: usize },

    /// Number of labels differs from number of samples
    #[error("Label count mismatch: {samples} samples but {labels} labels")]
    LabelCountMismatch { samples: usize, labels: usize },

    /// Row data could not be shaped into a feature matrix
    #[error("Matrix error: {0}")]
    Matrix(#[from] ndarray::ShapeError),

    /// No samples supplied to fit
    #[error("Training set is empty")]
    EmptyTrainingSet,

    /// Classification needs at least two distinct labels
    #[error("Training requires at least 2 classes, found {found}")]
    TooFewClasses { found: usize },

    /// A class has too few members for a stratified split
    #[error("Class '{class}' has {count} sample(s); at least {required} are required to stratify")]
    InsufficientClassMembers {
        class: String,
        count: usize,
        required: usize,
    },

    /// Validation fraction outside (0, 1)
    #[error("Invalid validation split {0}: must be between 0 and 1 (exclusive)")]
    InvalidValidationSplit(f64),

    /// Model file does not exist
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// Model artifact written by an incompatible format version
    #[error("Unsupported model format version {found} (expected {expected})")]
    UnsupportedModelVersion { found: u32, expected: u32 },

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TriageError {
    /// Integration bugs: wrong shapes or calling into an unfitted model
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TriageError::NotTrained
                | TriageError::FeatureShapeMismatch { .. }
                | TriageError::LabelCountMismatch { .. }
                | TriageError::Matrix(_)
        )
    }

    /// Problems with the data handed to `fit`
    pub fn is_training_data_error(&self) -> bool {
        matches!(
            self,
            TriageError::EmptyTrainingSet
                | TriageError::TooFewClasses { .. }
                | TriageError::InsufficientClassMembers { .. }
                | TriageError::InvalidValidationSplit(_)
        )
    }

    /// Failures reading or writing model artifacts
    pub fn is_persistence_error(&self) -> bool {
        matches!(
            self,
            TriageError::ModelNotFound(_)
                | TriageError::UnsupportedModelVersion { .. }
                | TriageError::IoError(_)
                | TriageError::SerializationError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors() {
        assert!(TriageError::NotTrained.is_input_error());
        assert!(TriageError::FeatureShapeMismatch {
            expected: 68,
            found: 3
        }
        .is_input_error());
        assert!(!TriageError::NotTrained.is_persistence_error());
    }

    #[test]
    fn test_training_data_errors() {
        let err = TriageError::InsufficientClassMembers {
            class: "archive".to_string(),
            count: 1,
            required: 2,
        };
        assert!(err.is_training_data_error());
        assert!(!err.is_input_error());

        assert!(TriageError::EmptyTrainingSet.is_training_data_error());
        assert!(TriageError::InvalidValidationSplit(1.5).is_training_data_error());
    }

    #[test]
    fn test_persistence_errors() {
        let missing = TriageError::ModelNotFound(PathBuf::from("/tmp/model.json"));
        assert!(missing.is_persistence_error());

        let io = TriageError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(io.is_persistence_error());
    }

    #[test]
    fn test_error_display() {
        let display = format!("{}", TriageError::NotTrained);
        assert!(display.contains("Model not trained"));

        let missing = TriageError::ModelNotFound(PathBuf::from("models/unified.json"));
        assert_eq!(
            missing.to_string(),
            "Model file not found: models/unified.json"
        );

        let err = TriageError::InsufficientClassMembers {
            class: "critical".to_string(),
            count: 1,
            required: 2,
        };
        let display = err.to_string();
        assert!(display.contains("critical"));
        assert!(display.contains("1 sample"));
    }
}
