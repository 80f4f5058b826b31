use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(gcp) = expect_optional_object(root, "gcp")? {
        validate_optional_string_field(gcp, "gcp.project", "project")?;
        validate_optional_string_field(gcp, "gcp.location", "location")?;
        validate_optional_string_field(gcp, "gcp.access_token", "access_token")?;
        validate_optional_string_field(gcp, "gcp.api_endpoint", "api_endpoint")?;
    }

    if let Some(store) = expect_optional_object(root, "store")? {
        validate_optional_string_field(store, "store.db_path", "db_path")?;
        // Identifier checks happen per request so a bad name never blocks startup.
        if store.get("table").is_some_and(|table| !table.is_string()) {
            return Err(config_type_error("store.table", "string"));
        }
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_enum_field(
            embedding,
            "embedding.provider",
            "provider",
            &["local", "remote"],
        )?;
        validate_optional_string_field(embedding, "embedding.local_model", "local_model")?;
        validate_optional_string_field(embedding, "embedding.model_dir", "model_dir")?;
        validate_optional_string_field(embedding, "embedding.remote_model", "remote_model")?;
        validate_u64_field(
            embedding,
            "embedding.max_sequence_length",
            "max_sequence_length",
            8,
            8_192,
        )?;
        validate_u64_field(embedding, "embedding.batch_size", "batch_size", 1, 250)?;
        validate_u64_field(
            embedding,
            "embedding.batch_sleep_ms",
            "batch_sleep_ms",
            0,
            600_000,
        )?;
        validate_u64_field(embedding, "embedding.max_retries", "max_retries", 0, 20)?;
        validate_u64_field(
            embedding,
            "embedding.backoff_base_ms",
            "backoff_base_ms",
            0,
            600_000,
        )?;
        validate_u64_field(
            embedding,
            "embedding.backoff_cap_ms",
            "backoff_cap_ms",
            0,
            3_600_000,
        )?;
    }

    if let Some(generation) = expect_optional_object(root, "generation")? {
        validate_optional_string_field(generation, "generation.model", "model")?;
        validate_u64_field(
            generation,
            "generation.max_output_tokens",
            "max_output_tokens",
            1,
            65_536,
        )?;
        validate_f64_field(generation, "generation.temperature", "temperature", 0.0, 2.0)?;
        validate_f64_field(generation, "generation.top_p", "top_p", 0.0, 1.0)?;
        validate_u64_field(
            generation,
            "generation.timeout_secs",
            "timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_u64_field(
            rag,
            "rag.max_context_chunks",
            "max_context_chunks",
            0,
            1_000,
        )?;
        validate_u64_field(rag, "rag.max_chunk_chars", "max_chunk_chars", 1, 1_000_000)?;
        validate_u64_field(rag, "rag.default_top_k", "default_top_k", 1, 10_000)?;
        validate_u64_field(rag, "rag.max_top_k", "max_top_k", 1, 10_000)?;
        validate_u64_field(rag, "rag.chunk_max_words", "chunk_max_words", 1, 100_000)?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    Ok(())
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn is_valid_table_name(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("static regex"))
        .is_match(name)
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if allowed.contains(&text) {
        return Ok(());
    }
    Err(ApiError::Misconfigured(format!(
        "Invalid config at '{}': expected one of {}",
        path,
        allowed.join(", ")
    )))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::Misconfigured(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(ApiError::Misconfigured(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::Misconfigured(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::Misconfigured(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
