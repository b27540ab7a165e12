//! URL helpers

use std::collections::BTreeMap;

/// Build a full URL from a template
///
/// Every `{key}` placeholder is replaced by its value in `params`.
/// Absolute `http://` / `https://` URLs are returned as-is; anything else is
/// prefixed with `base_url`.
///
/// ```
/// use std::collections::BTreeMap;
/// use netqueue::utils::build_params;
///
/// let params = BTreeMap::from([("id".to_string(), "123".to_string())]);
/// assert_eq!(build_params("/users/{id}", &params, Some("https://api.example.com")), "https://api.example.com/users/123");
/// ```
pub fn build_params(url: &str, params: &BTreeMap<String, String>, base_url: Option<&str>) -> String {
    let mut url = url.to_string();
    for (key, value) in params {
        url = url.replace(&format!("{{{}}}", key), value);
    }

    if url.starts_with("https://") || url.starts_with("http://") {
        url
    } else {
        format!("{}{}", base_url.unwrap_or_default(), url)
    }
}
