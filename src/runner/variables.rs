use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::UnresolvedVariable;

/// Variable lookup and `${name}` substitution, supplied by the host.
pub trait VariableProvider: Send + Sync {
    /// Current value of a variable
    fn get(&self, name: &str) -> Option<String>;

    /// Assign a variable, replacing any previous value
    fn set(&mut self, name: &str, value: String);

    /// True when the provider itself holds `name`, ignoring any fallback
    /// source such as the process environment
    fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Substitute every `${...}` reference in `raw`.
    ///
    /// Text without references comes back unchanged. A reference to an
    /// undefined variable is an error, never an empty string.
    fn resolve(&self, raw: &str) -> Result<String, UnresolvedVariable>;
}

/// Matches `${key}` where key can contain dots
fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").expect("reference pattern compiles"))
}

fn whole_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\$\{[a-zA-Z0-9_.]+\}$").expect("whole reference pattern compiles")
    })
}

/// True when the entire value is one `${name}` reference.
pub fn is_variable_reference(value: &str) -> bool {
    whole_reference_pattern().is_match(value.trim())
}

/// Check that every `${` opens a well-formed reference.
///
/// Returns the first malformed fragment on failure.
pub fn check_references(value: &str) -> Result<(), String> {
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let candidate = &rest[start..];
        match reference_pattern().find(candidate) {
            Some(m) if m.start() == 0 => rest = &candidate[m.end()..],
            _ => {
                let end = candidate.find('}').map(|i| i + 1).unwrap_or(candidate.len());
                return Err(candidate[..end].to_string());
            }
        }
    }
    Ok(())
}

/// Default variable table: script variables, then the process environment,
/// plus the dynamic `time`, `date` and `timestamp` names.
///
/// `${name.path.to.field}` reads into a variable holding JSON.
#[derive(Debug, Clone)]
pub struct VariableTable {
    vars: HashMap<String, String>,
    use_env: bool,
}

impl Default for VariableTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableTable {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
            use_env: true,
        }
    }

    /// Table that ignores the process environment
    pub fn isolated() -> Self {
        Self {
            vars: HashMap::new(),
            use_env: false,
        }
    }

    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.vars.insert(k.into(), v.into());
        }
        self
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(val) = self.get(key) {
            return Some(val);
        }

        match key {
            "time" => return Some(chrono::Local::now().format("%H:%M:%S").to_string()),
            "date" => return Some(chrono::Local::now().format("%Y-%m-%d").to_string()),
            "timestamp" => return Some(chrono::Utc::now().timestamp().to_string()),
            _ => {}
        }

        let (var_name, json_path) = key.split_once('.')?;
        let json_str = self.get(var_name)?;
        let value = serde_json::from_str::<serde_json::Value>(&json_str).ok()?;
        // JSON pointer requires / separator instead of .
        let pointer = format!("/{}", json_path.replace('.', "/"));
        let target = value.pointer(&pointer)?;
        Some(match target.as_str() {
            Some(s) => s.to_string(),
            None => target.to_string(),
        })
    }
}

impl VariableProvider for VariableTable {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned().or_else(|| {
            if self.use_env {
                std::env::var(name).ok()
            } else {
                None
            }
        })
    }

    fn set(&mut self, name: &str, value: String) {
        self.vars.insert(name.to_string(), value);
    }

    fn is_set(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    fn resolve(&self, raw: &str) -> Result<String, UnresolvedVariable> {
        let mut result = String::with_capacity(raw.len());
        let mut last = 0;
        for caps in reference_pattern().captures_iter(raw) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = self.lookup(key.as_str()).ok_or_else(|| UnresolvedVariable {
                name: key.as_str().to_string(),
            })?;
            result.push_str(&raw[last..whole.start()]);
            result.push_str(&value);
            last = whole.end();
        }
        result.push_str(&raw[last..]);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_unchanged() {
        let table = VariableTable::isolated();
        assert_eq!(table.resolve("https://example.com/a{b}").unwrap(), "https://example.com/a{b}");
        assert_eq!(table.resolve("").unwrap(), "");
    }

    #[test]
    fn test_substitutes_known_variables() {
        let table = VariableTable::isolated().with_vars([("host", "example.com"), ("page", "docs")]);
        assert_eq!(
            table.resolve("https://${host}/${page}?q=${host}").unwrap(),
            "https://example.com/docs?q=example.com"
        );
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let table = VariableTable::isolated().with_vars([("host", "example.com")]);
        let err = table.resolve("${host}/${lumi_missing_var}").unwrap_err();
        assert_eq!(err.name, "lumi_missing_var");
    }

    #[test]
    fn test_json_path_lookup() {
        let table = VariableTable::isolated()
            .with_vars([("user", r#"{"name":"An","address":{"city":"Hanoi"},"age":30}"#)]);
        assert_eq!(table.resolve("${user.name}").unwrap(), "An");
        assert_eq!(table.resolve("${user.address.city}").unwrap(), "Hanoi");
        assert_eq!(table.resolve("${user.age}").unwrap(), "30");
        assert!(table.resolve("${user.phone}").is_err());
    }

    #[test]
    fn test_dynamic_names() {
        let table = VariableTable::isolated();
        let ts = table.resolve("${timestamp}").unwrap();
        assert!(ts.parse::<i64>().is_ok());
        assert_eq!(table.resolve("${date}").unwrap().len(), 10);
    }

    #[test]
    fn test_set_overrides() {
        let mut table = VariableTable::isolated();
        table.set("x", "1".to_string());
        table.set("x", "2".to_string());
        assert_eq!(table.get("x").as_deref(), Some("2"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_environment_does_not_count_as_set() {
        std::env::set_var("LUMI_VARIABLES_IS_SET_CHECK", "from-env");
        let mut table = VariableTable::new();

        assert_eq!(table.get("LUMI_VARIABLES_IS_SET_CHECK").as_deref(), Some("from-env"));
        assert!(!table.is_set("LUMI_VARIABLES_IS_SET_CHECK"));

        table.set("LUMI_VARIABLES_IS_SET_CHECK", "local".to_string());
        assert!(table.is_set("LUMI_VARIABLES_IS_SET_CHECK"));
    }

    #[test]
    fn test_reference_syntax_checks() {
        assert!(is_variable_reference("${engine}"));
        assert!(is_variable_reference(" ${a.b} "));
        assert!(!is_variable_reference("Chrome ${engine}"));
        assert!(!is_variable_reference("${}"));

        assert!(check_references("plain").is_ok());
        assert!(check_references("a ${b} c ${d.e}").is_ok());
        assert_eq!(check_references("a ${b c").unwrap_err(), "${b c");
        assert_eq!(check_references("${ok} ${bad name}").unwrap_err(), "${bad name}");
        assert_eq!(check_references("${}").unwrap_err(), "${}");
    }
}
