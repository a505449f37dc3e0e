use crate::config::SyncConfig;
use crate::utils::error::{Result, SyncError};
use crate::utils::validation::Validate;
use regex::Regex;
use std::path::Path;

impl SyncConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SyncError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a TOML document. Missing sections and keys fall
    /// back to the defaults used by [`SyncConfig::from_env`].
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content, |name| std::env::var(name).ok())?;

        let config: SyncConfig =
            toml::from_str(&processed).map_err(|e| SyncError::ConfigError {
                message: format!("TOML parsing error: {}", e),
            })?;

        config.validate()?;
        Ok(config)
    }
}

/// Replaces `${VAR_NAME}` with the variable's value. Unknown variables are
/// left untouched so validation can point at them.
pub fn substitute_env_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SyncError::ConfigError {
        message: format!("Invalid substitution pattern: {}", e),
    })?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        lookup(var_name).unwrap_or_else(|| format!("${{{}}}", var_name))
    });

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
log_level = "debug"

[collaboratemd]
username = "cmd-user"
password = "cmd-pass"
customer = "10027191"
report_seq = "10060198"
filter_seq = "10140792"
poll_delay_secs = 0.0

[salesforce]
instance_url = "https://example.my.salesforce.com"
username = "sync@example.com"
password = "sf-pass"
security_token = "tok"
batch_size = 25

[retry]
max_retries = 2
"#;

    #[test]
    fn test_parse_basic_toml_config() {
        let config = SyncConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.collaboratemd.customer, "10027191");
        assert_eq!(config.collaboratemd.poll_delay_secs, 0.0);
        assert_eq!(config.collaboratemd.poll_max_retries, 10);
        assert_eq!(config.salesforce.batch_size, 25);
        assert_eq!(config.salesforce.external_id_field, "Claim_Number__c");
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.backoff_factor, 2.0);
        assert_eq!(config.state.sync_id, "default");
    }

    #[test]
    fn test_env_var_substitution() {
        let content = r#"password = "${CMD_PASSWORD}"
other = "${NOT_SET}""#;
        let out = substitute_env_vars(content, |name| {
            (name == "CMD_PASSWORD").then(|| "s3cret".to_string())
        })
        .unwrap();

        assert!(out.contains(r#"password = "s3cret""#));
        assert!(out.contains(r#"other = "${NOT_SET}""#));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let content = BASIC.replace("batch_size = 25", "batch_size = 0");
        assert!(matches!(
            SyncConfig::from_toml_str(&content).unwrap_err(),
            SyncError::InvalidConfigValueError { .. }
        ));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        assert!(matches!(
            SyncConfig::from_toml_str("[collaboratemd\nusername = 1").unwrap_err(),
            SyncError::ConfigError { .. }
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = SyncConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.salesforce.username, "sync@example.com");
    }
}
