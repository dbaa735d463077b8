//! Tag-resolving YAML loader

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_yaml::value::{Tag as YamlTag, TaggedValue};
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};

/// Tags resolved at load time; any other tag is kept as is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Include,
    IncludeDirMergeList,
    EnvVar,
}

impl Tag {
    fn parse(tag: &YamlTag) -> Option<Self> {
        if tag == "!include" {
            Some(Self::Include)
        } else if tag == "!include_dir_merge_list" {
            Some(Self::IncludeDirMergeList)
        } else if tag == "!env_var" {
            Some(Self::EnvVar)
        } else {
            None
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Include => "!include",
            Self::IncludeDirMergeList => "!include_dir_merge_list",
            Self::EnvVar => "!env_var",
        }
    }
}

/// Loads YAML documents, resolving `!include`, `!include_dir_merge_list`
/// and `!env_var`
///
/// Include paths are relative to the file containing the tag.
#[derive(Debug)]
pub struct YamlLoader {
    root: PathBuf,
    /// Files being loaded, outermost first
    chain: Vec<PathBuf>,
}

impl YamlLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chain: Vec::new(),
        }
    }

    /// Directory that top-level relative paths are resolved against
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a file relative to the root directory
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.root.join(path);
        self.load_path(path)
    }

    /// Load a document held in memory; `origin` anchors its includes
    pub fn load_string(&mut self, content: &str, origin: &Path) -> ConfigResult<Value> {
        let document = serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;
        self.resolve(document, origin)
    }

    fn load_path(&mut self, path: PathBuf) -> ConfigResult<Value> {
        if self.chain.contains(&path) {
            let mut cycle = self.chain.clone();
            cycle.push(path);
            return Err(ConfigError::IncludeCycle(cycle));
        }

        debug!(path = %path.display(), "Loading YAML file");
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        self.chain.push(path.clone());
        let result = self.load_string(&content, &path);
        self.chain.pop();
        result
    }

    fn resolve(&mut self, value: Value, origin: &Path) -> ConfigResult<Value> {
        let resolved = match value {
            Value::Tagged(tagged) => {
                let TaggedValue { tag, value } = *tagged;
                match Tag::parse(&tag) {
                    Some(known) => self.apply(known, value, origin)?,
                    None => Value::Tagged(Box::new(TaggedValue {
                        tag,
                        value: self.resolve(value, origin)?,
                    })),
                }
            }
            Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|item| self.resolve(item, origin))
                    .collect::<ConfigResult<_>>()?,
            ),
            Value::Mapping(entries) => {
                let mut out = Mapping::with_capacity(entries.len());
                for (key, value) in entries {
                    out.insert(self.resolve(key, origin)?, self.resolve(value, origin)?);
                }
                Value::Mapping(out)
            }
            scalar => scalar,
        };
        Ok(resolved)
    }

    fn apply(&mut self, tag: Tag, argument: Value, origin: &Path) -> ConfigResult<Value> {
        let Value::String(argument) = argument else {
            return Err(ConfigError::TagArgument {
                tag: tag.name(),
                path: origin.to_path_buf(),
            });
        };
        trace!(tag = tag.name(), argument = %argument, "Resolving tag");

        match tag {
            Tag::Include => {
                let target = self.beside(origin, &argument);
                self.load_path(target)
            }
            Tag::IncludeDirMergeList => {
                let dir = self.beside(origin, &argument);
                self.merge_dir(&dir)
            }
            Tag::EnvVar => env_var(&argument),
        }
    }

    /// Concatenate the lists of every YAML file in `dir`, by file name
    ///
    /// A file holding a single item contributes that item; empty files
    /// contribute nothing.
    fn merge_dir(&mut self, dir: &Path) -> ConfigResult<Value> {
        let mut merged = Vec::new();
        for file in yaml_files(dir)? {
            match self.load_path(file)? {
                Value::Sequence(items) => merged.extend(items),
                Value::Null => {}
                item => merged.push(item),
            }
        }
        debug!(dir = %dir.display(), items = merged.len(), "Merged directory list");
        Ok(Value::Sequence(merged))
    }

    fn beside(&self, origin: &Path, target: &str) -> PathBuf {
        origin
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(&self.root)
            .join(target)
    }
}

/// `NAME` or `NAME default`; the default is read as YAML
fn env_var(argument: &str) -> ConfigResult<Value> {
    let argument = argument.trim();
    let (name, default) = match argument.split_once(char::is_whitespace) {
        Some((name, default)) => (name, Some(default.trim())),
        None => (argument, None),
    };

    if let Ok(value) = std::env::var(name) {
        trace!(var = name, "Substituted environment variable");
        return Ok(Value::String(value));
    }

    default
        .map(|text| serde_yaml::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn yaml_files(dir: &Path) -> ConfigResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConfigError::MissingDirectory(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yaml" | "yml")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Load `file` from `root` with tags resolved
pub fn load_yaml(root: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(root).load_file(file)
}

/// Load an in-memory document; `origin` names it in errors
pub fn load_yaml_string(
    root: impl Into<PathBuf>,
    content: &str,
    origin: &str,
) -> ConfigResult<Value> {
    YamlLoader::new(root).load_string(content, Path::new(origin))
}

/// Load a configuration file into `T`
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> ConfigResult<T> {
    let path = path.as_ref();
    let document = YamlLoader::new(".").load_path(path.to_path_buf())?;
    serde_yaml::from_value(document).map_err(|source| ConfigError::Schema {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        value.get(key).unwrap()
    }

    #[test]
    fn test_load_plain_document() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "configuration.yaml",
            "queues:\n  manual:\n    capacity: 5\nrules:\n  - name: r1\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(get(get(get(&value, "queues"), "manual"), "capacity").as_u64(), Some(5));
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "conf/timers.yaml", "1Hz:\n  interval_ms: 1000\n");
        write_file(dir.path(), "conf/main.yaml", "timers: !include timers.yaml\n");

        let value = load_yaml(dir.path(), "conf/main.yaml").unwrap();
        let timers = get(&value, "timers");
        assert_eq!(get(get(timers, "1Hz"), "interval_ms").as_u64(), Some(1000));
    }

    #[test]
    fn test_include_dir_merge_list() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "rules/a.yaml", "- name: lights-off\n- name: lights-on\n");
        write_file(dir.path(), "rules/b.yaml", "name: heating\n");
        write_file(dir.path(), "rules/c.yml", "");
        write_file(dir.path(), "rules/notes.txt", "ignored\n");
        write_file(dir.path(), "configuration.yaml", "rules: !include_dir_merge_list rules\n");

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        let rules = get(&value, "rules").as_sequence().unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(get(&rules[2], "name").as_str(), Some("heating"));
    }

    #[test]
    fn test_missing_include_dir() {
        let result = load_yaml_string(".", "rules: !include_dir_merge_list nowhere\n", "inline.yaml");
        assert!(matches!(result, Err(ConfigError::MissingDirectory(_))));
    }

    #[test]
    fn test_env_var() {
        std::env::set_var("TEST_RULEQ_CONFIG_VAR", "env_value");
        let value = load_yaml_string(".", "from_env: !env_var TEST_RULEQ_CONFIG_VAR\n", "inline.yaml")
            .unwrap();
        assert_eq!(get(&value, "from_env").as_str(), Some("env_value"));
        std::env::remove_var("TEST_RULEQ_CONFIG_VAR");
    }

    #[test]
    fn test_env_var_default() {
        let value = load_yaml_string(
            ".",
            "interval: !env_var TEST_RULEQ_UNSET_INTERVAL 250\nname: !env_var TEST_RULEQ_UNSET_NAME fallback name\n",
            "inline.yaml",
        )
        .unwrap();
        assert_eq!(get(&value, "interval").as_u64(), Some(250));
        assert_eq!(get(&value, "name").as_str(), Some("fallback name"));
    }

    #[test]
    fn test_env_var_missing() {
        let result = load_yaml_string(".", "x: !env_var TEST_RULEQ_UNSET_VAR\n", "inline.yaml");
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(var)) if var == "TEST_RULEQ_UNSET_VAR"));
    }

    #[test]
    fn test_tag_argument_must_be_string() {
        let result = load_yaml_string(".", "x: !include [a, b]\n", "inline.yaml");
        assert!(matches!(
            result,
            Err(ConfigError::TagArgument { tag: "!include", .. })
        ));
    }

    #[test]
    fn test_unknown_tag_is_kept() {
        let value = load_yaml_string(".", "x: !secret password\n", "inline.yaml").unwrap();
        assert!(matches!(get(&value, "x"), Value::Tagged(_)));
    }

    #[test]
    fn test_include_cycle() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write_file(dir.path(), "b.yaml", "a: !include a.yaml\n");

        match load_yaml(dir.path(), "a.yaml") {
            Err(ConfigError::IncludeCycle(chain)) => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain.first(), chain.last());
            }
            other => panic!("expected include cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = load_yaml(dir.path(), "missing.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        rules: Vec<String>,
    }

    #[test]
    fn test_load_config_typed() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "conf/rules/a.yaml", "- lights-off\n- lights-on\n");
        write_file(
            dir.path(),
            "conf/sample.yaml",
            "name: lights\nrules: !include_dir_merge_list rules\n",
        );

        let sample: Sample = load_config(dir.path().join("conf/sample.yaml")).unwrap();
        assert_eq!(sample.name, "lights");
        assert_eq!(sample.rules, vec!["lights-off", "lights-on"]);

        write_file(dir.path(), "bad.yaml", "rules: three\n");
        let result: ConfigResult<Sample> = load_config(dir.path().join("bad.yaml"));
        assert!(matches!(result, Err(ConfigError::Schema { .. })));
    }
}
