use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use glam::DVec3;
use mapforge_core::definition::{DefinitionCatalog, EntityDefinition};
use mapforge_core::geometry::BBox3;
use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub definitions: Vec<DefinitionConfig>,
}

/// 环境变量，指向显式配置文件。
pub const CONFIG_ENV: &str = "MAPFORGE_CONFIG";

/// 相对工作目录依次查找的配置文件。
const SEARCH_PATHS: [&str; 2] = ["mapforge.toml", "config/default.toml"];

impl AppConfig {
    /// 从显式路径加载并校验配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|err| match err {
            ConfigError::Syntax(source) => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// 解析 TOML 文本并校验。
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Syntax)?;
        config.validate()?;
        Ok(config)
    }

    /// `MAPFORGE_CONFIG` 指定的文件必须存在；否则在工作目录下依次查找
    /// `mapforge.toml` 与 `config/default.toml`，都没有时返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }
        let root = env::current_dir().map_err(ConfigError::WorkingDir)?;
        Self::discover_in(&root)
    }

    pub fn discover_in(root: &Path) -> Result<Self, ConfigError> {
        match SEARCH_PATHS.iter().map(|relative| root.join(relative)).find(|path| path.is_file()) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// 世界范围必须为正的有限值，点实体定义必须给出包围盒。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let half_extent = self.world.half_extent;
        if !half_extent.is_finite() || half_extent <= 0.0 {
            return Err(ConfigError::InvalidWorld(half_extent));
        }
        for definition in &self.definitions {
            definition.to_definition()?;
        }
        Ok(())
    }

    /// 以原点为中心、半边长为 `world.half_extent` 的世界范围。
    pub fn world_bounds(&self) -> BBox3 {
        BBox3::cube(self.world.half_extent)
    }

    /// 内置定义加上配置中的定义，同名时以配置为准。
    pub fn catalog(&self) -> Result<DefinitionCatalog, ConfigError> {
        let mut catalog = DefinitionCatalog::with_builtin_definitions();
        for definition in &self.definitions {
            catalog.insert(definition.to_definition()?);
        }
        Ok(catalog)
    }
}

/// `tracing` 过滤表达式，例如 `info` 或 `mapforge_core=trace`。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 世界范围为以原点为中心的立方体。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub half_extent: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { half_extent: 8192.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKindConfig {
    Point,
    Brush,
}

/// `[[definitions]]` 条目。点实体需要给出 `mins` 与 `maxs`。
#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionConfig {
    pub name: String,
    pub kind: DefinitionKindConfig,
    #[serde(default)]
    pub mins: Option<[f64; 3]>,
    #[serde(default)]
    pub maxs: Option<[f64; 3]>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DefinitionConfig {
    pub fn to_definition(&self) -> Result<EntityDefinition, ConfigError> {
        let definition = match self.kind {
            DefinitionKindConfig::Brush => EntityDefinition::brush(self.name.as_str()),
            DefinitionKindConfig::Point => {
                let (Some(mins), Some(maxs)) = (self.mins, self.maxs) else {
                    return Err(ConfigError::InvalidDefinition {
                        name: self.name.clone(),
                        message: "点实体缺少 mins 或 maxs".to_string(),
                    });
                };
                EntityDefinition::point(
                    self.name.as_str(),
                    BBox3::new(DVec3::from(mins), DVec3::from(maxs)),
                )
            }
        };
        Ok(match &self.description {
            Some(description) => definition.with_description(description.as_str()),
            None => definition,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("MapForge 配置语法错误: {0}")]
    Syntax(#[source] toml::de::Error),
    #[error("无法确定 MapForge 工作目录: {0}")]
    WorkingDir(#[source] std::io::Error),
    #[error("世界范围无效: half_extent = {0}")]
    InvalidWorld(f64),
    #[error("实体定义 {name} 无效: {message}")]
    InvalidDefinition { name: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let cfg = AppConfig::discover_in(dir.path()).expect("discover should succeed");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.world.half_extent, 8192.0);
        assert!(cfg.definitions.is_empty());
        assert_eq!(cfg.world_bounds().max(), DVec3::splat(8192.0));
    }

    #[test]
    fn discovery_prefers_project_file_over_default() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/default.toml"), "[world]\nhalf_extent = 1024.0\n").unwrap();
        let cfg = AppConfig::discover_in(dir.path()).expect("default file");
        assert_eq!(cfg.world.half_extent, 1024.0);

        fs::write(dir.path().join("mapforge.toml"), "[logging]\nlevel = \"trace\"\n").unwrap();
        let cfg = AppConfig::discover_in(dir.path()).expect("project file");
        assert_eq!(cfg.logging.level, "trace");
        assert_eq!(cfg.world.half_extent, 8192.0);
    }

    #[test]
    fn parse_reports_syntax_without_path() {
        assert!(matches!(AppConfig::parse("[world"), Err(ConfigError::Syntax(_))));
        let cfg = AppConfig::parse("[world]\nhalf_extent = 64.0").expect("parse");
        assert_eq!(cfg.world_bounds().max(), DVec3::splat(64.0));
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [world]
            half_extent = 4096.0

            [[definitions]]
            name = "monster_army"
            kind = "point"
            mins = [-16.0, -16.0, -24.0]
            maxs = [16.0, 16.0, 40.0]
            description = "Grunt"

            [[definitions]]
            name = "func_plat"
            kind = "brush"
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.world_bounds().min(), DVec3::splat(-4096.0));
        assert_eq!(cfg.definitions.len(), 2);
        assert_eq!(cfg.definitions[1].kind, DefinitionKindConfig::Brush);

        let catalog = cfg.catalog().expect("build catalog");
        let army = catalog.definition("monster_army").expect("configured definition");
        assert_eq!(army.description(), Some("Grunt"));
        assert_eq!(
            army.point_bounds().map(|bounds| bounds.max()),
            Some(DVec3::new(16.0, 16.0, 40.0))
        );
        assert!(catalog.definition("func_plat").unwrap().is_brush_entity());
        assert!(catalog.contains("light"));
    }

    #[test]
    fn point_definition_without_bounds_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [[definitions]]
            name = "info_broken"
            kind = "point"
            "#
        )
        .unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDefinition { ref name, .. } if name == "info_broken"));
    }

    #[test]
    fn invalid_world_and_syntax_errors_are_reported() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[world]\nhalf_extent = -1.0").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::InvalidWorld(_))
        ));

        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[logging\nlevel = ").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let missing = AppConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
