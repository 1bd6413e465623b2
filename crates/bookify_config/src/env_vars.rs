//! Environment variable naming for Bookify configuration.
//!
//! Plain settings use `BOOKIFY__SECTION__KEY` (read by the `config` crate),
//! secrets use `BOOKIFY_SECRET_SECTION_KEY` with a `SECTION_KEY` fallback.

use std::env;

/// The default prefix for configuration environment variables
pub const DEFAULT_PREFIX: &str = "BOOKIFY";

/// The prefix for secret environment variables
pub const SECRET_PREFIX: &str = "BOOKIFY_SECRET";

/// The separator for configuration environment variables
pub const CONFIG_SEPARATOR: &str = "__";

/// The separator for secret environment variables
pub const SECRET_SEPARATOR: &str = "_";

/// Marker string that is replaced by the matching secret environment variable.
pub const SECRET_MARKER: &str = "secret_from_env";

/// Get the prefix for configuration environment variables
pub fn get_config_prefix() -> String {
    env::var("PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string())
}

/// Convert a configuration path (`server.host`) to `BOOKIFY__SERVER__HOST`.
pub fn config_path_to_env_var(path: &str) -> String {
    let prefix = get_config_prefix();
    let path = path.replace('.', CONFIG_SEPARATOR);
    format!("{}{}{}", prefix, CONFIG_SEPARATOR, path).to_uppercase()
}

/// Convert a secret path (`google.client_secret`) to `BOOKIFY_SECRET_GOOGLE_CLIENT_SECRET`.
pub fn secret_path_to_env_var(path: &str) -> String {
    let path = path.replace('.', SECRET_SEPARATOR);
    format!("{}{}{}", SECRET_PREFIX, SECRET_SEPARATOR, path).to_uppercase()
}

/// Convert a secret path to the short form (`GOOGLE_CLIENT_SECRET`).
pub fn legacy_secret_path_to_env_var(path: &str) -> String {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() < 2 {
        return path.to_uppercase();
    }

    let service = parts[0];
    let key = parts[1..].join(SECRET_SEPARATOR);
    format!("{}_{}", service, key).to_uppercase()
}

/// Look up a secret, trying the prefixed name first and the short name second.
pub fn get_secret_env_var(path: &str) -> Option<String> {
    if let Ok(value) = env::var(secret_path_to_env_var(path)) {
        return Some(value);
    }
    env::var(legacy_secret_path_to_env_var(path)).ok()
}

/// Paths containing "secret", "password", "token" or "key" are treated as secrets.
pub fn is_secret_path(path: &str) -> bool {
    let path_lower = path.to_lowercase();
    path_lower.contains("secret")
        || path_lower.contains("password")
        || path_lower.contains("token")
        || path_lower.contains("key")
}

/// Recursively replaces every `"secret_from_env"` string with the matching secret
/// environment variable. Returns the dotted paths that could not be resolved.
pub fn inject_env_vars(value: &mut serde_json::Value) -> Vec<String> {
    use serde_json::Value;

    fn walk(path: Vec<String>, obj: &mut Value, missing: &mut Vec<String>) {
        match obj {
            Value::Object(map) => {
                for (k, v) in map.iter_mut() {
                    let mut new_path = path.clone();
                    new_path.push(k.to_string());
                    walk(new_path, v, missing);
                }
            }
            Value::Array(arr) => {
                for (i, v) in arr.iter_mut().enumerate() {
                    let mut new_path = path.clone();
                    new_path.push(i.to_string());
                    walk(new_path, v, missing);
                }
            }
            Value::String(s) if s == SECRET_MARKER => {
                let path_str = path.join(".");
                match get_secret_env_var(&path_str) {
                    Some(env_val) => *s = env_val,
                    None => missing.push(path_str),
                }
            }
            _ => {}
        }
    }

    let mut missing = Vec::new();
    walk(vec![], value, &mut missing);
    missing
}
