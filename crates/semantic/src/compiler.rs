//! Lowers a business query to parameterized SQL.
//!
//! Filter values are the one place raw end-user values reach the query; they
//! always travel as bind parameters, never interpolated. Dimension columns
//! and metric formulas come from the validated model.

use vantage_common::config::QueryLimits;
use vantage_common::models::{FilterValue, SemanticQuery};
use vantage_error::{find_closest_match, ErrorCode, ErrorContext, Result, VantageError};

use crate::model::{quote_ident, SemanticModel};

/// A compiled statement plus its bind parameters, in `$n` order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<FilterValue>,
}

pub struct SqlCompiler {
    limits: QueryLimits,
}

impl SqlCompiler {
    pub fn new(limits: QueryLimits) -> Self {
        Self { limits }
    }

    /// Compile `query` against `model`.
    ///
    /// Fails with `UnknownField` when a requested dimension, metric, or
    /// filter field is not defined on the model; unknown names are never
    /// silently dropped.
    pub fn compile(&self, model: &SemanticModel, query: &SemanticQuery) -> Result<CompiledQuery> {
        if query.dimensions.is_empty() && query.metrics.is_empty() {
            return Err(VantageError::new(
                ErrorCode::UnknownField,
                "Query selects no dimensions and no metrics",
            )
            .with_hint("Select at least one dimension or metric"));
        }

        let mut select_parts = Vec::new();
        let mut group_by = Vec::new();

        for name in &query.dimensions {
            let dim = model
                .dimension(name)
                .ok_or_else(|| self.unknown_field(model, name))?;
            select_parts.push(format!(
                "{} AS {}",
                quote_ident(&dim.column_name),
                quote_ident(&dim.name)
            ));
            group_by.push(quote_ident(&dim.column_name));
        }

        for name in &query.metrics {
            let metric = model
                .metric(name)
                .ok_or_else(|| self.unknown_field(model, name))?;
            select_parts.push(format!("{} AS {}", metric.formula, quote_ident(&metric.name)));
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_parts.join(", "),
            quote_ident(&model.table_name)
        );

        let mut params = Vec::with_capacity(query.filters.len());
        if !query.filters.is_empty() {
            let mut predicates = Vec::with_capacity(query.filters.len());
            for filter in &query.filters {
                let dim = model
                    .dimension(&filter.field)
                    .ok_or_else(|| self.unknown_field(model, &filter.field))?;
                params.push(filter.value.clone());
                predicates.push(format!("{} = ${}", quote_ident(&dim.column_name), params.len()));
            }
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        // Standard aggregation rule: every non-aggregated selected column
        // must appear in GROUP BY.
        if !query.metrics.is_empty() && !group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by.join(", "));
        }

        let limit = query
            .limit
            .unwrap_or(self.limits.default_limit)
            .min(self.limits.max_limit);
        sql.push_str(&format!(" LIMIT {}", limit));

        Ok(CompiledQuery { sql, params })
    }

    fn unknown_field(&self, model: &SemanticModel, name: &str) -> VantageError {
        let available = model.field_names();
        let mut err = VantageError::new(
            ErrorCode::UnknownField,
            format!("Field '{}' not found in model '{}'", name, model.id),
        )
        .with_context(ErrorContext::UnknownField {
            field: name.to_string(),
            model: model.id.clone(),
            available_fields: available.clone(),
        });

        if let Some(closest) = find_closest_match(name, &available) {
            err = err.with_hint(format!("Did you mean '{}'?", closest));
        }
        err
    }
}
