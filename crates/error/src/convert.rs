use crate::{ErrorCode, VantageError};

impl From<std::io::Error> for VantageError {
    fn from(err: std::io::Error) -> Self {
        VantageError::new(ErrorCode::Internal, err.to_string())
    }
}

impl From<serde_json::Error> for VantageError {
    fn from(err: serde_json::Error) -> Self {
        VantageError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

impl From<serde_yaml::Error> for VantageError {
    fn from(err: serde_yaml::Error) -> Self {
        VantageError::new(ErrorCode::InvalidYaml, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let io_err = std::io::Error::other("File error");
        let err: VantageError = io_err.into();
        assert_eq!(err.code, ErrorCode::Internal);
        assert!(err.message.contains("File error"));
    }

    #[test]
    fn test_yaml_error_mapping() {
        let yaml_err = serde_yaml::from_str::<usize>("[not a number").unwrap_err();
        let err: VantageError = yaml_err.into();
        assert_eq!(err.code, ErrorCode::InvalidYaml);
    }
}
