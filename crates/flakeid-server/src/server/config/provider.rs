//! Layered lookup of the core configuration keys.
//!
//! Each key can be supplied five ways. Providers are queried from highest to
//! lowest priority and the first one that knows the key wins:
//!
//! 1. long CLI flag (`--machine-id-bits 8`)
//! 2. short CLI alias (`-M 8`)
//! 3. environment variable (`MACHINE_ID_BITS=8`)
//! 4. TOML file (`[bitcount] machine = 8`)
//! 5. the key's built-in default

use anyhow::Context;
use core::{fmt::Display, str::FromStr};
use std::{collections::HashMap, path::Path};

/// One configuration value and every name it goes by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigKey {
    /// Human readable name used in error messages.
    pub name: &'static str,
    pub flag: &'static str,
    pub alias: char,
    pub env: &'static str,
    /// Dotted path into the TOML document.
    pub toml_path: &'static str,
    pub default: &'static str,
}

pub const MACHINE_ID_BITS: ConfigKey = ConfigKey {
    name: "machine id bits",
    flag: "machine-id-bits",
    alias: 'M',
    env: "MACHINE_ID_BITS",
    toml_path: "bitcount.machine",
    default: "10",
};

pub const SEQUENCE_BITS: ConfigKey = ConfigKey {
    name: "sequence bits",
    flag: "sequence-bits",
    alias: 'S',
    env: "SEQUENCE_BITS",
    toml_path: "bitcount.sequence",
    default: "12",
};

pub const EPOCH: ConfigKey = ConfigKey {
    name: "epoch",
    flag: "epoch",
    alias: 'E',
    env: "EPOCH",
    toml_path: "epoch",
    default: "1704067200000",
};

/// `-1` means no static id.
pub const MACHINE_ID: ConfigKey = ConfigKey {
    name: "machine id",
    flag: "machine-id",
    alias: 'I',
    env: "MACHINE_ID",
    toml_path: "machineid",
    default: "-1",
};

/// `none` means no orchestrator.
pub const ORCHESTRATOR: ConfigKey = ConfigKey {
    name: "orchestrator address",
    flag: "orchestrator",
    alias: 'O',
    env: "ORCHESTRATOR_ADDR",
    toml_path: "orchestrator.address",
    default: "none",
};

/// A source of configuration values.
pub trait Provider {
    /// Where values come from, for error messages.
    fn name(&self) -> &str;

    fn lookup(&self, key: &ConfigKey) -> Option<String>;
}

/// Values captured up front, such as parsed command line arguments.
#[derive(Debug, Default)]
pub struct ArgProvider {
    name: &'static str,
    values: HashMap<&'static str, String>,
}

impl ArgProvider {
    pub fn new<'a>(
        name: &'static str,
        values: impl IntoIterator<Item = (&'a ConfigKey, Option<String>)>,
    ) -> Self {
        let values = values
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key.env, v)))
            .collect();
        Self { name, values }
    }
}

impl Provider for ArgProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn lookup(&self, key: &ConfigKey) -> Option<String> {
        self.values.get(key.env).cloned()
    }
}

/// Process environment, looked up by [`ConfigKey::env`]. Empty values count
/// as unset.
#[derive(Debug, Default)]
pub struct EnvProvider;

impl Provider for EnvProvider {
    fn name(&self) -> &str {
        "environment"
    }

    fn lookup(&self, key: &ConfigKey) -> Option<String> {
        std::env::var(key.env).ok().filter(|v| !v.is_empty())
    }
}

/// A parsed TOML document.
#[derive(Debug)]
pub struct FileProvider {
    name: String,
    table: toml::Table,
}

impl FileProvider {
    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid TOML.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(path.display().to_string(), &text)
    }

    /// Parses `text`; `name` identifies the document in error messages.
    ///
    /// # Errors
    ///
    /// Fails if `text` is not valid TOML.
    pub fn parse(name: impl Into<String>, text: &str) -> anyhow::Result<Self> {
        let name = name.into();
        let table = text
            .parse::<toml::Table>()
            .with_context(|| format!("failed to parse config file {name}"))?;
        Ok(Self { name, table })
    }
}

impl Provider for FileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: &ConfigKey) -> Option<String> {
        let mut segments = key.toml_path.split('.');
        let first = segments.next()?;
        let mut value = self.table.get(first)?;
        for segment in segments {
            value = value.as_table()?.get(segment)?;
        }
        match value {
            toml::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// A value together with the provider that supplied it.
#[derive(Debug, PartialEq, Eq)]
pub struct Resolved<'a> {
    pub value: String,
    pub source: &'a str,
}

/// Providers in priority order, highest first.
#[derive(Default)]
pub struct Layered {
    providers: Vec<Box<dyn Provider>>,
}

impl Layered {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `provider` below every provider already present.
    #[must_use]
    pub fn with(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Returns the first value any provider has for `key`, or its default.
    pub fn resolve(&self, key: &ConfigKey) -> Resolved<'_> {
        self.providers
            .iter()
            .find_map(|p| {
                p.lookup(key).map(|value| Resolved {
                    value,
                    source: p.name(),
                })
            })
            .unwrap_or_else(|| Resolved {
                value: key.default.to_owned(),
                source: "default",
            })
    }

    /// Resolves `key` and parses it.
    ///
    /// # Errors
    ///
    /// Names the key, the offending value and the provider that supplied it.
    pub fn get<T>(&self, key: &ConfigKey) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Resolved { value, source } = self.resolve(key);
        value.trim().parse().map_err(|err| {
            anyhow::anyhow!("invalid {} {value:?} (from {source}): {err}", key.name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [&ConfigKey; 5] = [&MACHINE_ID_BITS, &SEQUENCE_BITS, &EPOCH, &MACHINE_ID, &ORCHESTRATOR];

    fn args(name: &'static str, pairs: &[(&ConfigKey, &str)]) -> ArgProvider {
        ArgProvider::new(
            name,
            pairs.iter().map(|(key, value)| (*key, Some((*value).to_owned()))),
        )
    }

    const FILE: &str = r#"
epoch = 1700000000000
machineid = 4

[bitcount]
machine = 6
sequence = 14

[orchestrator]
address = "orch.internal:9568"
"#;

    #[test]
    fn defaults_when_nothing_is_set() {
        let layers = Layered::new().with(args("flag", &[]));
        for key in ALL {
            let resolved = layers.resolve(key);
            assert_eq!(resolved.value, key.default);
            assert_eq!(resolved.source, "default");
        }
    }

    #[test]
    fn each_layer_outranks_the_ones_below() {
        let file = FileProvider::parse("test.toml", FILE).unwrap();
        let layers = Layered::new()
            .with(args("flag", &[(&MACHINE_ID_BITS, "1")]))
            .with(args("alias", &[(&MACHINE_ID_BITS, "2"), (&SEQUENCE_BITS, "3")]))
            .with(args(
                "env",
                &[(&MACHINE_ID_BITS, "4"), (&SEQUENCE_BITS, "5"), (&EPOCH, "6")],
            ))
            .with(file);

        let check = |key: &ConfigKey, value: &str, source: &str| {
            assert_eq!(
                layers.resolve(key),
                Resolved {
                    value: value.to_owned(),
                    source
                }
            );
        };
        check(&MACHINE_ID_BITS, "1", "flag");
        check(&SEQUENCE_BITS, "3", "alias");
        check(&EPOCH, "6", "env");
        check(&MACHINE_ID, "4", "test.toml");
        check(&ORCHESTRATOR, "orch.internal:9568", "test.toml");
    }

    #[test]
    fn file_reads_nested_paths() {
        let file = FileProvider::parse("test.toml", FILE).unwrap();
        assert_eq!(file.lookup(&MACHINE_ID_BITS).as_deref(), Some("6"));
        assert_eq!(file.lookup(&SEQUENCE_BITS).as_deref(), Some("14"));
        assert_eq!(file.lookup(&EPOCH).as_deref(), Some("1700000000000"));

        let empty = FileProvider::parse("empty.toml", "").unwrap();
        assert_eq!(empty.lookup(&MACHINE_ID_BITS), None);

        let flat = FileProvider::parse("flat.toml", "bitcount = 3").unwrap();
        assert_eq!(flat.lookup(&MACHINE_ID_BITS), None);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(FileProvider::parse("bad.toml", "[bitcount\nmachine = ").is_err());
    }

    #[test]
    fn parse_failure_names_key_and_source() {
        let layers = Layered::new().with(args("alias", &[(&SEQUENCE_BITS, "twelve")]));
        let err = layers.get::<i64>(&SEQUENCE_BITS).unwrap_err().to_string();
        assert!(err.contains("sequence bits"), "{err}");
        assert!(err.contains("twelve"), "{err}");
        assert!(err.contains("alias"), "{err}");

        assert_eq!(layers.get::<i64>(&MACHINE_ID_BITS).unwrap(), 10);
    }
}
