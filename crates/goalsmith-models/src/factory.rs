//! Builds the model an agent config asks for.

use crate::{MockModel, UniversalModel};
use goalsmith_abstraction::{Model, ModelError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Scripted replies, for tests and offline runs.
    #[default]
    Mock,
    /// Any OpenAI-compatible chat completions server.
    Universal,
}

/// Everything needed to construct one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub model_type: ModelType,
    /// Model identifier sent to the server (e.g. "meta.llama3-70b-instruct-v1:0").
    pub model_id: String,
    /// Bearer token, already resolved.
    pub api_key: Option<String>,
    /// Server base URL. Required for `Universal`.
    pub base_url: Option<String>,
    /// Reply script for `Mock`. Without one the mock echoes the conversation.
    pub script_path: Option<PathBuf>,
}

/// Factory for creating model instances.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates a model instance from the given configuration.
    ///
    /// # Errors
    /// Returns a `ModelError` if a universal model has no base URL or a mock
    /// script cannot be loaded.
    pub fn create(config: ModelConfig) -> Result<Arc<dyn Model + Send + Sync>, ModelError> {
        debug!(
            model_type = ?config.model_type,
            model_id = %config.model_id,
            scripted = config.script_path.is_some(),
            "Creating model instance"
        );

        match config.model_type {
            ModelType::Mock => {
                let model = match config.script_path {
                    Some(path) => MockModel::from_script_file(config.model_id, &path)?,
                    None => MockModel::new(config.model_id),
                };
                Ok(Arc::new(model))
            }
            ModelType::Universal => {
                let base_url = config.base_url.ok_or_else(|| {
                    ModelError::UnsupportedModelProvider(format!(
                        "model '{}' is universal but has no base_url",
                        config.model_id
                    ))
                })?;
                let model = match config.api_key {
                    Some(api_key) => UniversalModel::with_api_key(config.model_id, base_url, api_key),
                    None => UniversalModel::without_auth(config.model_id, base_url),
                };
                Ok(Arc::new(model))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goalsmith_abstraction::ChatMessage;
    use std::io::Write;

    fn config(model_type: ModelType, model_id: &str) -> ModelConfig {
        ModelConfig { model_type, model_id: model_id.to_string(), api_key: None, base_url: None, script_path: None }
    }

    #[test]
    fn test_model_type_is_lowercase_in_config() {
        let parsed: ModelType = serde_json::from_str("\"universal\"").unwrap();
        assert_eq!(parsed, ModelType::Universal);
        assert_eq!(serde_json::to_string(&ModelType::Mock).unwrap(), "\"mock\"");
    }

    #[test]
    fn test_factory_create_mock() {
        let model = ModelFactory::create(config(ModelType::Mock, "test-mock")).unwrap();
        assert_eq!(model.model_id(), "test-mock");
    }

    #[test]
    fn test_universal_requires_base_url() {
        let result = ModelFactory::create(config(ModelType::Universal, "m"));
        assert!(matches!(result, Err(ModelError::UnsupportedModelProvider(_))));

        let with_url = ModelConfig {
            base_url: Some("http://localhost:8000/v1".into()),
            api_key: Some("k".into()),
            ..config(ModelType::Universal, "m")
        };
        assert_eq!(ModelFactory::create(with_url).unwrap().model_id(), "m");
    }

    #[tokio::test]
    async fn test_mock_with_script_replays_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["scripted answer"]"#).unwrap();

        let scripted = ModelConfig { script_path: Some(file.path().to_path_buf()), ..config(ModelType::Mock, "scripted") };
        let model = ModelFactory::create(scripted).unwrap();
        let response = model.generate_chat_completion(&[ChatMessage::user("hi")], None).await.unwrap();
        assert_eq!(response.content, "scripted answer");
    }

    #[test]
    fn test_mock_with_missing_script_fails() {
        let missing =
            ModelConfig { script_path: Some(PathBuf::from("/nonexistent/script.json")), ..config(ModelType::Mock, "s") };
        assert!(ModelFactory::create(missing).is_err());
    }
}
