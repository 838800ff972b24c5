//! Semantic model definitions and the registry that serves them.
//!
//! Metric formulas are raw SQL aggregate expressions authored by the model
//! owner, not end-user input; the only end-user influence is the choice of
//! which named metric to include. Table and column names are validated as
//! identifiers at load time so they can be quoted safely later.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use vantage_error::{ErrorCode, ErrorContext, Result, VantageError};

/// A business-facing dimension mapped onto a physical column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub column_name: String,
    pub data_type: String,
}

/// A named aggregate. `formula` is owner-authored SQL, e.g. `SUM(revenue)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub formula: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticModel {
    pub id: String,
    pub table_name: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

impl SemanticModel {
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// All business-facing names, for UnknownField context and hints.
    pub fn field_names(&self) -> Vec<String> {
        self.dimensions
            .iter()
            .map(|d| d.name.clone())
            .chain(self.metrics.iter().map(|m| m.name.clone()))
            .collect()
    }

    /// Enforced at load: unique names within the model, valid identifiers
    /// for everything that will be quoted into SQL.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table_name)
            .map_err(|e| invalid_model(&self.id, format!("table_name: {}", e)))?;

        let mut seen = std::collections::HashSet::new();
        for d in &self.dimensions {
            if !seen.insert(d.name.as_str()) {
                return Err(invalid_model(
                    &self.id,
                    format!("duplicate field name '{}'", d.name),
                ));
            }
            validate_identifier(&d.column_name)
                .map_err(|e| invalid_model(&self.id, format!("dimension '{}': {}", d.name, e)))?;
        }
        for m in &self.metrics {
            if !seen.insert(m.name.as_str()) {
                return Err(invalid_model(
                    &self.id,
                    format!("duplicate field name '{}'", m.name),
                ));
            }
            if m.formula.trim().is_empty() {
                return Err(invalid_model(
                    &self.id,
                    format!("metric '{}' has an empty formula", m.name),
                ));
            }
        }
        Ok(())
    }
}

fn invalid_model(id: &str, detail: String) -> VantageError {
    VantageError::new(ErrorCode::InvalidModel, format!("Model '{}': {}", id, detail))
        .with_context(ErrorContext::Config {
            file_path: None,
            field: Some(id.to_string()),
        })
}

/// Reject names that cannot be safely double-quoted into SQL.
pub fn validate_identifier(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("empty identifier".to_string());
    }
    if name.len() > 128 {
        return Err(format!("identifier too long: {}", name.len()));
    }
    if name.contains('"')
        || name.contains('\x00')
        || name.contains(';')
        || name.contains('`')
        || name.contains('\\')
    {
        return Err(format!("forbidden characters in identifier: {}", name));
    }
    Ok(())
}

/// Double-quote a pre-validated identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Supplies semantic model definitions to the compiler. The file-backed
/// implementation below is the default; callers can supply their own.
pub trait ModelRegistry: Send + Sync {
    fn get(&self, id: &str) -> Option<Arc<SemanticModel>>;
    fn list(&self) -> Vec<Arc<SemanticModel>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelsFile {
    models: Vec<SemanticModel>,
}

/// In-memory registry loaded from a YAML models file.
pub struct FileModelRegistry {
    models: HashMap<String, Arc<SemanticModel>>,
}

impl FileModelRegistry {
    pub fn from_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VantageError::new(
                ErrorCode::InvalidConfig,
                format!("Failed to read models file '{}': {}", path, e),
            )
        })?;
        let file: ModelsFile = serde_yaml::from_str(&text)?;
        Self::from_models(file.models)
    }

    pub fn from_models(models: Vec<SemanticModel>) -> Result<Self> {
        let mut map = HashMap::new();
        for model in models {
            model.validate()?;
            tracing::debug!(model_id = %model.id, table = %model.table_name, "Registered semantic model");
            map.insert(model.id.clone(), Arc::new(model));
        }
        Ok(Self { models: map })
    }

    /// Empty registry for deployments without a semantic layer.
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }
}

impl ModelRegistry for FileModelRegistry {
    fn get(&self, id: &str) -> Option<Arc<SemanticModel>> {
        self.models.get(id).cloned()
    }

    fn list(&self) -> Vec<Arc<SemanticModel>> {
        let mut all: Vec<Arc<SemanticModel>> = self.models.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}
