//! Loading synthesis input from disk.
//!
//! Two layouts are supported: a single file holding `defaults` and
//! `environments`, or a directory with `defaults.yaml` and one descriptor per
//! file under `environments/`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::environment::{EnvironmentDescriptor, GlobalDefaults};
use crate::error::{IacError, IacResult};

/// Caller input for one synthesis run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub defaults: GlobalDefaults,
    #[serde(default)]
    pub environments: Vec<EnvironmentDescriptor>,
}

impl SynthesisConfig {
    /// Load from a file or a config directory.
    pub fn load(path: &Path) -> IacResult<Self> {
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_file(path)
        }
    }

    /// Load a single file; the format follows the extension.
    pub fn from_file(path: &Path) -> IacResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = parse(path, &content)?;
        info!(
            "Loaded {} environment(s) from {}",
            config.environments.len(),
            path.display()
        );
        Ok(config)
    }

    /// Load `defaults.yaml` and every descriptor under `environments/`.
    pub fn from_dir(dir: &Path) -> IacResult<Self> {
        let defaults_path = dir.join("defaults.yaml");
        let defaults = if defaults_path.exists() {
            parse(&defaults_path, &fs::read_to_string(&defaults_path)?)?
        } else {
            debug!("No defaults.yaml in {}, using built-in defaults", dir.display());
            GlobalDefaults::default()
        };

        let env_dir = dir.join("environments");
        if !env_dir.is_dir() {
            return Err(IacError::ConfigLoad {
                path: env_dir,
                message: "environments directory not found".to_string(),
            });
        }

        let mut files: Vec<_> = WalkDir::new(&env_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && is_supported(p))
            .collect();
        files.sort();

        let mut environments = Vec::with_capacity(files.len());
        for file in &files {
            debug!("Reading environment descriptor {}", file.display());
            environments.push(parse(file, &fs::read_to_string(file)?)?);
        }

        info!("Loaded {} environment(s) from {}", environments.len(), dir.display());
        Ok(Self { defaults, environments })
    }

    /// Write the config as YAML.
    pub fn to_file(&self, path: &Path) -> IacResult<()> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

fn is_supported(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json" | "toml")
    )
}

fn parse<T: for<'de> Deserialize<'de>>(path: &Path, content: &str) -> IacResult<T> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Ok(serde_yaml::from_str(content)?),
        Some("json") => Ok(serde_json::from_str(content)?),
        Some("toml") => Ok(toml::from_str(content)?),
        other => Err(IacError::ConfigLoad {
            path: path.to_path_buf(),
            message: format!("unsupported extension {:?}", other.unwrap_or("")),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentClass, Feature, SizingValue};
    use tempfile::tempdir;

    const RUN_YAML: &str = r#"
defaults:
  naming_prefix: shop
  default_tags:
    ManagedBy: mity
    Owner: platform
    Project: shop
environments:
  - name: dev
    class: non-prod
    network: 10.0.0.0/16
  - name: prod
    class: production
    network: 10.1.0.0/16
    sizing:
      instance_class: m5.large
      min_capacity: 2
      max_capacity: 8
    features:
      autoscaling: true
    tags:
      CostCenter: "42"
"#;

    #[test]
    fn test_load_yaml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(&path, RUN_YAML).unwrap();

        let config = SynthesisConfig::load(&path).unwrap();
        assert_eq!(config.defaults.naming_prefix, "shop");
        assert_eq!(config.defaults.mandatory_tags.len(), 4);
        assert_eq!(config.environments.len(), 2);

        let prod = &config.environments[1];
        assert_eq!(prod.class, EnvironmentClass::Production);
        assert_eq!(prod.features.get(&Feature::Autoscaling), Some(&true));
        assert_eq!(prod.sizing["min_capacity"], SizingValue::Integer(2));
        assert_eq!(prod.sizing["instance_class"], SizingValue::Text("m5.large".to_string()));
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(
            &path,
            r#"
[defaults]
naming_prefix = "shop"

[[environments]]
name = "dev"
class = "non-production"
network = "10.0.0.0/16"
"#,
        )
        .unwrap();

        let config = SynthesisConfig::load(&path).unwrap();
        assert_eq!(config.environments[0].name, "dev");
        assert_eq!(config.defaults.default_instance_class, "t3.micro");
    }

    #[test]
    fn test_load_directory_layout() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("defaults.yaml"), "naming_prefix: shop\n").unwrap();
        let envs = dir.path().join("environments");
        fs::create_dir_all(&envs).unwrap();
        fs::write(envs.join("b-prod.yaml"), "name: prod\nclass: prod\nnetwork: 10.1.0.0/16\n").unwrap();
        fs::write(envs.join("a-dev.yaml"), "name: dev\nclass: non-prod\nnetwork: 10.0.0.0/16\n").unwrap();
        fs::write(envs.join("README.md"), "ignored").unwrap();

        let config = SynthesisConfig::load(dir.path()).unwrap();
        let names: Vec<_> = config.environments.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["dev", "prod"]);
        assert_eq!(config.defaults.naming_prefix, "shop");
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(
            &path,
            "environments:\n  - name: dev\n    class: non-prod\n    network: 10.0.0.0/16\n    features:\n      teleport: true\n",
        )
        .unwrap();

        assert!(matches!(SynthesisConfig::load(&path), Err(IacError::Yaml(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.ini");
        fs::write(&path, "").unwrap();
        assert!(matches!(SynthesisConfig::load(&path), Err(IacError::ConfigLoad { .. })));
    }
}
