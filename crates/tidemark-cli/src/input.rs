//! Invocation input parsing with environment variable substitution.
//!
//! The platform delivers the invocation document on stdin (or, for local
//! runs, a file). `${VAR_NAME}` references inside the document are
//! substituted from the environment before parsing, so secrets can stay
//! out of files checked into a scheduler.

use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use tidemark_types::protocol::SyncRequest;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Errors reading or parsing the invocation document.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read invocation input: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing environment variable(s): {0}")]
    MissingEnv(String),

    #[error("invalid invocation JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns [`InputError::MissingEnv`] naming every unset variable.
pub fn substitute_env_vars(input: &str) -> Result<String, InputError> {
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => missing.push(var_name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(InputError::MissingEnv(missing.join(", ")));
    }

    Ok(result)
}

/// Parse an invocation document from a string.
///
/// # Errors
///
/// Returns an error if env var substitution fails or the JSON is invalid.
pub fn parse_invocation_str(raw: &str) -> Result<SyncRequest, InputError> {
    let substituted = substitute_env_vars(raw)?;
    Ok(serde_json::from_str(&substituted)?)
}

/// Read the invocation document from `path`, or stdin when absent.
///
/// # Errors
///
/// Returns an error if the input cannot be read or parsed.
pub fn read_invocation(path: Option<&Path>) -> Result<SyncRequest, InputError> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    parse_invocation_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation_json(api_key: &str) -> String {
        format!(
            r#"{{
                "state": {{}},
                "limit": 100,
                "secrets": {{
                    "API_KEY": "{api_key}",
                    "API_SECRET": "s3cret",
                    "AUTH_URL": "https://auth.example.com",
                    "API_URL": "https://api.example.com"
                }}
            }}"#
        )
    }

    #[test]
    fn plain_document_passes_through() {
        let request = parse_invocation_str(&invocation_json("key-1")).unwrap();
        assert_eq!(request.limit, 100);
        assert_eq!(request.secrets.api_key, "key-1");
    }

    #[test]
    fn env_vars_substituted() {
        std::env::set_var("TM_TEST_API_KEY", "from-env");
        let request = parse_invocation_str(&invocation_json("${TM_TEST_API_KEY}")).unwrap();
        assert_eq!(request.secrets.api_key, "from-env");
        std::env::remove_var("TM_TEST_API_KEY");
    }

    #[test]
    fn missing_env_vars_all_reported() {
        let err = substitute_env_vars("${TM_MISSING_ONE} and ${TM_MISSING_TWO}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("TM_MISSING_ONE"));
        assert!(msg.contains("TM_MISSING_TWO"));
    }

    #[test]
    fn invalid_json_reported() {
        let err = parse_invocation_str("{not json").unwrap_err();
        assert!(matches!(err, InputError::Json(_)));
    }

    #[test]
    fn file_not_found_reported() {
        let err = read_invocation(Some(Path::new("/nonexistent/invocation.json"))).unwrap_err();
        assert!(matches!(err, InputError::Io(_)));
    }
}
