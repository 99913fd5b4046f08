//! Upload path generation
//!
//! Produces storage paths of the form
//! `<users/{user_id}/ | {category}/><timestamp>-<random>-<sanitized>.<ext>`.
//! Paths are generated once and never re-parsed by this crate; backends
//! treat them as opaque keys.

use uuid::Uuid;

/// Longest sanitized base name kept in a generated path
const MAX_BASE_NAME_LEN: usize = 48;

/// Generate a unique storage path for an uploaded file
///
/// `user_id` takes precedence over `category` for the prefix; with
/// neither, files land under `uploads/`.
pub fn generate_upload_path(
    original_name: &str,
    user_id: Option<&str>,
    category: Option<&str>,
) -> String {
    let prefix = match (user_id, category) {
        (Some(user), _) => format!("users/{}/", sanitize_component(user)),
        (None, Some(category)) => format!("{}/", sanitize_component(category)),
        (None, None) => "uploads/".to_string(),
    };

    let (base, ext) = split_name(original_name);
    let timestamp = chrono::Utc::now().timestamp_millis();
    let random = short_id();
    let sanitized = sanitize_component(base);

    match ext {
        Some(ext) => format!(
            "{}{}-{}-{}.{}",
            prefix,
            timestamp,
            random,
            sanitized,
            sanitize_component(ext)
        ),
        None => format!("{}{}-{}-{}", prefix, timestamp, random, sanitized),
    }
}

/// Lowercase and collapse anything outside `[a-z0-9._-]` into single dashes
pub fn sanitize_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = false;
    for c in input.to_lowercase().chars().take(MAX_BASE_NAME_LEN) {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() && !ext.is_empty() => (base, Some(ext)),
        _ => (name, None),
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
