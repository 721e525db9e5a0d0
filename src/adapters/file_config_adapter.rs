//! INI file configuration adapter.

use crate::domain::error::FactorpickError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

/// INI settings. Section and key names are case-insensitive.
#[derive(Debug)]
pub struct FileConfigAdapter {
    ini: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FactorpickError> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path).map_err(|reason| FactorpickError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, FactorpickError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| FactorpickError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { ini })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini.getint(section, key).ok().flatten().unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.ini.getfloat(section, key).ok().flatten().unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[data]
factor_table = data/basics.csv
price_dir = data/prices

[universe]
rules = npr > 0, name !contains "ST"
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("data", "factor_table"),
            Some("data/basics.csv".to_string())
        );
        assert_eq!(
            adapter.get_string("universe", "rules"),
            Some("npr > 0, name !contains \"ST\"".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[label]\ninitial_cash = 100\n").unwrap();
        assert_eq!(adapter.get_string("label", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let adapter = FileConfigAdapter::from_string("[Evaluate]\nTop_K = 3\n").unwrap();
        assert_eq!(adapter.get_int("evaluate", "top_k", 0), 3);
    }

    #[test]
    fn get_int_returns_value() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nlot_size = 100\n").unwrap();
        assert_eq!(adapter.get_int("backtest", "lot_size", 0), 100);
    }

    #[test]
    fn get_int_returns_default_for_missing() {
        let adapter = FileConfigAdapter::from_string("[backtest]\n").unwrap();
        assert_eq!(adapter.get_int("backtest", "missing", 42), 42);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nlot_size = abc\n").unwrap();
        assert_eq!(adapter.get_int("backtest", "lot_size", 42), 42);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nallocation_fraction = 0.85\n").unwrap();
        assert_eq!(adapter.get_double("backtest", "allocation_fraction", 0.0), 0.85);
    }

    #[test]
    fn get_double_returns_default_for_missing() {
        let adapter = FileConfigAdapter::from_string("[label]\n").unwrap();
        assert_eq!(adapter.get_double("label", "initial_cash", 99.9), 99.9);
    }

    #[test]
    fn get_double_returns_default_for_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[label]\ninitial_cash = not_a_number\n").unwrap();
        assert_eq!(adapter.get_double("label", "initial_cash", 99.9), 99.9);
    }

    #[test]
    fn get_bool_returns_true_values() {
        let adapter =
            FileConfigAdapter::from_string("[label]\na = true\nb = yes\nc = 1\nd = On\n").unwrap();
        assert!(adapter.get_bool("label", "d", false));
        assert!(adapter.get_bool("label", "a", false));
        assert!(adapter.get_bool("label", "b", false));
        assert!(adapter.get_bool("label", "c", false));
    }

    #[test]
    fn get_bool_returns_false_values() {
        let adapter =
            FileConfigAdapter::from_string("[label]\na = false\nb = no\nc = 0\n").unwrap();
        assert!(!adapter.get_bool("label", "a", true));
        assert!(!adapter.get_bool("label", "b", true));
        assert!(!adapter.get_bool("label", "c", true));
    }

    #[test]
    fn get_bool_returns_default_for_missing_or_garbage() {
        let adapter = FileConfigAdapter::from_string("[label]\nuse_cache = maybe\n").unwrap();
        assert!(adapter.get_bool("label", "missing", true));
        assert!(!adapter.get_bool("label", "missing", false));
        assert!(adapter.get_bool("label", "use_cache", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[evaluate]\nreport = out/report.csv\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("evaluate", "report"),
            Some("out/report.csv".to_string())
        );
    }

    #[test]
    fn from_file_returns_config_parse_error_for_missing_file() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/config.ini").unwrap_err();
        assert!(matches!(err, FactorpickError::ConfigParse { ref file, .. } if file.contains("config.ini")));
    }
}
