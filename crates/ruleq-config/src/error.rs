use std::path::PathBuf;

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration loading errors
///
/// Variants raised while reading a file carry its path.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed but does not have the expected shape
    #[error("{}: {source}", .path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{tag} in {} expects a string argument", .path.display())]
    TagArgument { tag: &'static str, path: PathBuf },

    #[error("included directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("include cycle: {}", format_chain(.0))]
    IncludeCycle(Vec<PathBuf>),

    #[error("environment variable {0} is not set and has no default")]
    MissingEnvVar(String),
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_chain() {
        let err = ConfigError::IncludeCycle(vec![
            PathBuf::from("a.yaml"),
            PathBuf::from("b.yaml"),
            PathBuf::from("a.yaml"),
        ]);
        assert_eq!(err.to_string(), "include cycle: a.yaml -> b.yaml -> a.yaml");
    }
}
