//! Request body validation.
//!
//! Bodies are parsed as loose JSON and checked field by field so that every
//! malformed request gets a 400 with a specific message, instead of the
//! extractor's generic rejection.

use serde_json::{Map, Value};
use thiserror::Error;

use gpuburst_lifecycle::JobRequest;
use gpuburst_state::JobConfig;

/// A request body that cannot be turned into a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No data provided")]
    MissingBody,

    #[error("request body is not valid JSON: {0}")]
    Malformed(String),

    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("invalid {field}: expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Parse a job submission, filling in defaults for absent fields.
///
/// A field set to `null` counts as absent.
pub fn parse_job_request(body: &[u8]) -> Result<JobRequest, ValidationError> {
    let fields = parse_object(body)?;
    if fields.is_empty() {
        return Err(ValidationError::MissingBody);
    }

    let defaults = JobConfig::default();
    let job_id = match field(&fields, "job_id") {
        None => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(_) => {
            return Err(ValidationError::InvalidField {
                field: "job_id",
                expected: "a non-empty string",
            });
        }
    };

    Ok(JobRequest {
        job_id,
        config: JobConfig {
            node_count: optional_count(&fields, "node_count")?.unwrap_or(defaults.node_count),
            duration: optional_u64(&fields, "duration")?.unwrap_or(defaults.duration),
            gpu_type: optional_string(&fields, "gpu_type")?.unwrap_or(defaults.gpu_type),
            task_type: optional_string(&fields, "task_type")?.unwrap_or(defaults.task_type),
        },
    })
}

/// Parse a manual scale request. `node_count` defaults to 0.
pub fn parse_scale_request(body: &[u8]) -> Result<u32, ValidationError> {
    let fields = parse_object(body)?;
    Ok(optional_count(&fields, "node_count")?.unwrap_or(0))
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::MissingBody);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(Value::Null) => Err(ValidationError::MissingBody),
        Ok(_) => Err(ValidationError::NotAnObject),
        Err(e) => Err(ValidationError::Malformed(e.to_string())),
    }
}

fn field<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| !v.is_null())
}

fn optional_u64(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<u64>, ValidationError> {
    match field(fields, name) {
        None => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or(ValidationError::InvalidField {
            field: name,
            expected: "a non-negative integer",
        }),
    }
}

fn optional_count(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<u32>, ValidationError> {
    match optional_u64(fields, name)? {
        None => Ok(None),
        Some(n) => u32::try_from(n).map(Some).map_err(|_| ValidationError::InvalidField {
            field: name,
            expected: "a non-negative integer below 2^32",
        }),
    }
}

fn optional_string(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, ValidationError> {
    match field(fields, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::InvalidField {
            field: name,
            expected: "a string",
        }),
    }
}
