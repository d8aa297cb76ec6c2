//! Multi-file configuration loading.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a root file and merges the files it includes.
pub struct ConfigLoader {
	base_path: PathBuf,
	/// Canonical paths already read, for cycle detection.
	loaded_files: HashSet<PathBuf>,
	/// Top-level section name to the file that defined it.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let config_path = self.resolve_path(config_path)?;
		let mut root = self.load_file(&config_path).await?;

		let includes = Self::take_includes(&mut root)?;
		self.record_sections(&root, &config_path)?;

		for include in includes {
			let include_path = self.resolve_path(&include)?;
			let mut included = self.load_file(&include_path).await?;

			// Nested includes are not followed, but a file naming one that is
			// already loaded is still reported as a cycle.
			for nested in Self::take_includes(&mut included)? {
				let nested = self.resolve_path(&nested)?;
				self.check_not_loaded(&nested)?;
			}
			self.record_sections(&included, &include_path)?;

			if let (Some(root_table), Some(included_table)) =
				(root.as_table_mut(), included.as_table())
			{
				for (key, value) in included_table {
					root_table.insert(key.clone(), value.clone());
				}
			}
		}

		let merged = toml::to_string(&root)
			.map_err(|e| ConfigError::Parse(format!("Failed to serialize merged config: {}", e)))?;
		merged.parse()
	}

	/// Reads a file, resolves environment references and parses it as TOML.
	async fn load_file(&mut self, path: &Path) -> Result<toml::Value, ConfigError> {
		let canonical = self.check_not_loaded(path)?;
		self.loaded_files.insert(canonical);

		let content = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&content)?;
		Ok(toml::from_str(&resolved)?)
	}

	fn check_not_loaded(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if self.loaded_files.contains(&canonical) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}
		Ok(canonical)
	}

	/// Removes and returns the `include` directive of a parsed file.
	fn take_includes(toml: &mut toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
		let Some(include) = toml.as_table_mut().and_then(|t| t.remove("include")) else {
			return Ok(Vec::new());
		};

		match include {
			toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
			toml::Value::Array(items) => items
				.into_iter()
				.map(|item| match item {
					toml::Value::String(path) => Ok(PathBuf::from(path)),
					_ => Err(ConfigError::Validation(
						"Include array must contain only strings".into(),
					)),
				})
				.collect(),
			_ => Err(ConfigError::Validation(
				"Include must be a string or array of strings".into(),
			)),
		}
	}

	fn record_sections(&mut self, toml: &toml::Value, source: &Path) -> Result<(), ConfigError> {
		let Some(table) = toml.as_table() else {
			return Ok(());
		};

		for key in table.keys() {
			if let Some(existing) = self.section_sources.get(key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be unique across all configuration files.",
					key,
					existing.display(),
					source.display()
				)));
			}
			self.section_sources.insert(key.clone(), source.to_path_buf());
		}
		Ok(())
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::MINIMAL;
	use std::fs;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(temp_dir.path().join("config.toml"), MINIMAL).unwrap();

		let config = Config::from_file(temp_dir.path().join("config.toml").to_str().unwrap())
			.await
			.unwrap();
		assert_eq!(config.pipeline.id, "mint-pipeline");
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();

		let (head, tail) = MINIMAL.split_at(MINIMAL.find("[status]").unwrap());
		let main = format!("include = [\"status.toml\"]\n{}", head);
		fs::write(temp_dir.path().join("main.toml"), main).unwrap();
		fs::write(temp_dir.path().join("status.toml"), tail).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();

		assert_eq!(config.pipeline.id, "mint-pipeline");
		assert_eq!(config.status.primary.chain, "base");
		assert_eq!(config.webhook.url, "https://backend.example");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();

		let main = format!("include = [\"duplicate.toml\"]\n{}", MINIMAL);
		fs::write(temp_dir.path().join("main.toml"), main).unwrap();
		fs::write(
			temp_dir.path().join("duplicate.toml"),
			"[webhook]\nurl = \"https://other.example\"\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let err = loader.load_config("main.toml").await.unwrap_err();
		assert!(err.to_string().contains("Duplicate section 'webhook'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("self.toml"),
			"include = [\"self.toml\"]\n[pipeline]\nid = \"x\"\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let err = loader.load_config("self.toml").await.unwrap_err();
		assert!(err.to_string().contains("already loaded"));
	}

	#[tokio::test]
	async fn test_missing_include() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			"include = \"nowhere.toml\"\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		assert!(matches!(
			loader.load_config("main.toml").await,
			Err(ConfigError::Io(_))
		));
	}
}
