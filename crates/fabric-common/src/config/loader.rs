use serde::Deserialize;

/// Deserialize a string where the empty string stands for an unset value.
///
/// Environment variables and TOML files cannot express [`None`] directly,
/// so optional string settings default to `""` instead.
pub fn deserialize_non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

/// Interpret the usual spellings of a boolean flag.
pub fn str_is_truthy(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("1")
        | value.eq_ignore_ascii_case("true")
        | value.eq_ignore_ascii_case("on")
        | value.eq_ignore_ascii_case("yes")
        | value.eq_ignore_ascii_case("y")
}
