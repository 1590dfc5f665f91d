//! GraphQL response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GraphQL response from the server.
///
/// A response is syntactically usable only when `data` is present and
/// non-null; [`into_result`](Self::into_result) is the gate that turns
/// request-level errors or a missing `data` key into a failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphQLResponse<T = Value> {
    /// The data returned by the operation.
    #[serde(default)]
    pub data: Option<T>,
    /// Errors returned by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLResponseError>>,
    /// Extensions (tracing, caching info, etc.).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl<T> GraphQLResponse<T> {
    /// Check if the response has errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Get the data, returning an error if there are GraphQL errors or no
    /// data was returned.
    pub fn into_result(self) -> crate::Result<T> {
        if let Some(errors) = self.errors
            && !errors.is_empty()
        {
            return Err(crate::GraphQLError::GraphQL(errors));
        }
        self.data
            .ok_or_else(|| crate::GraphQLError::Parse("Response contained no data".to_string()))
    }

    /// Get the data, ignoring any errors.
    pub fn data(self) -> Option<T> {
        self.data
    }

    /// Get the errors.
    pub fn errors(&self) -> Option<&[GraphQLResponseError]> {
        self.errors.as_deref()
    }
}

/// A GraphQL error from the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphQLResponseError {
    /// Error message.
    pub message: String,
    /// Locations in the query where the error occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ErrorLocation>>,
    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Additional error extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl std::fmt::Display for GraphQLResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(locations) = &self.locations
            && !locations.is_empty()
        {
            write!(f, " at ")?;
            for (i, loc) in locations.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}:{}", loc.line, loc.column)?;
            }
        }
        Ok(())
    }
}

/// Location in the GraphQL query.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

/// Path segment in a GraphQL error.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Field name.
    Field(String),
    /// Array index.
    Index(usize),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{}", name),
            Self::Index(idx) => write!(f, "[{}]", idx),
        }
    }
}

/// Format a path as a string.
pub fn format_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_result_requires_data() {
        let response: GraphQLResponse = serde_json::from_value(json!({})).unwrap();
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, crate::GraphQLError::Parse(_)));
    }

    #[test]
    fn test_into_result_surfaces_errors() {
        let response: GraphQLResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "boom"}]
        }))
        .unwrap();
        let err = response.into_result().unwrap_err();
        let errors = err.graphql_errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "boom");
    }

    #[test]
    fn test_error_display_includes_locations() {
        let error: GraphQLResponseError = serde_json::from_value(json!({
            "message": "unknown field",
            "locations": [{"line": 2, "column": 7}]
        }))
        .unwrap();
        assert_eq!(error.to_string(), "unknown field at 2:7");
    }

    #[test]
    fn test_format_path() {
        let path = vec![
            PathSegment::Field("user".to_string()),
            PathSegment::Index(0),
            PathSegment::Field("name".to_string()),
        ];
        assert_eq!(format_path(&path), "user.[0].name");
    }
}
