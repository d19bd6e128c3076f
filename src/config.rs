use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::engine::DirTemplateLoader;
use crate::substitute::DEFAULT_DELIMITER;
use crate::vocabulary::{ProviderIdentity, SlotCounts};

pub const CONFIG_FILE_NAME: &str = "sow-composer.toml";
pub const CONFIG_ENV_VAR: &str = "SOW_COMPOSER_CONFIG";

const DEFAULT_SOW_TEMPLATE: &str = "templates/SOW_Template.docx";
const DEFAULT_MSA_TEMPLATE: &str = "templates/MSA_Template.docx";
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub templates: TemplatesSection,
    #[serde(default)]
    pub substitution: SubstitutionSection,
    #[serde(default)]
    pub provider: ProviderIdentity,
    #[serde(default)]
    pub vocabulary: VocabularySection,
    #[serde(default)]
    pub snapshots: SnapshotsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TemplatesSection {
    /// Relative paths resolve against the config file directory.
    #[serde(default)]
    pub sow: Option<PathBuf>,
    #[serde(default)]
    pub msa: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct SubstitutionSection {
    #[serde(default)]
    pub delimiter: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct VocabularySection {
    #[serde(default)]
    pub slots: SlotCounts,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct SnapshotsSection {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Configuration with every path made absolute and every default filled in.
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    /// `None` when running on defaults.
    pub config_path: Option<PathBuf>,
    pub sow_template: PathBuf,
    pub msa_template: PathBuf,
    pub delimiter: String,
    pub provider: ProviderIdentity,
    pub slots: SlotCounts,
    pub snapshot_dir: PathBuf,
}

impl ResolvedConfig {
    pub fn template_loader(&self) -> DirTemplateLoader {
        DirTemplateLoader::new(&self.sow_template, &self.msa_template)
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(start_dir: &Path) -> Option<PathBuf> {
    if let Some(p) = find_file_upwards(start_dir, CONFIG_FILE_NAME, 8) {
        return Some(p);
    }
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(CONFIG_FILE_NAME);
    candidate.is_file().then_some(candidate)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text)
        .with_context(|| format!("parse config toml: {}", path.display()))?;
    Ok(cfg)
}

/// Lookup order: explicit path, `SOW_COMPOSER_CONFIG`, upwards from `workdir`,
/// next to the executable. An explicit path must exist; otherwise a missing
/// file means defaults.
pub fn resolve_config(explicit: Option<&Path>, workdir: &Path) -> anyhow::Result<ResolvedConfig> {
    let from_env = std::env::var_os(CONFIG_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    let cfg_path = match (explicit, from_env) {
        (Some(p), _) => {
            if !p.is_file() {
                return Err(anyhow!("config not found: {}", p.display()));
            }
            Some(p.to_path_buf())
        }
        (None, Some(p)) => {
            if !p.is_file() {
                return Err(anyhow!("{CONFIG_ENV_VAR} points at a missing file: {}", p.display()));
            }
            Some(p)
        }
        (None, None) => find_default_config(workdir),
    };

    match cfg_path {
        Some(p) => {
            let cfg = load_config(&p)?;
            let base = p
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| workdir.to_path_buf());
            resolve_with_base(cfg, Some(p), &base)
        }
        None => resolve_with_base(AppConfig::default(), None, workdir),
    }
}

pub fn resolve_with_base(
    cfg: AppConfig,
    config_path: Option<PathBuf>,
    base: &Path,
) -> anyhow::Result<ResolvedConfig> {
    let resolve = |p: Option<PathBuf>, default: &str| {
        let p = p.unwrap_or_else(|| PathBuf::from(default));
        if p.is_relative() {
            base.join(p)
        } else {
            p
        }
    };

    let delimiter = cfg
        .substitution
        .delimiter
        .unwrap_or_else(|| DEFAULT_DELIMITER.to_string());
    if delimiter.is_empty() {
        return Err(anyhow!("[substitution] delimiter must not be empty"));
    }

    Ok(ResolvedConfig {
        config_path,
        sow_template: resolve(cfg.templates.sow, DEFAULT_SOW_TEMPLATE),
        msa_template: resolve(cfg.templates.msa, DEFAULT_MSA_TEMPLATE),
        delimiter,
        provider: cfg.provider,
        slots: cfg.vocabulary.slots,
        snapshot_dir: resolve(cfg.snapshots.dir, DEFAULT_SNAPSHOT_DIR),
    })
}

pub const DEFAULT_CONFIG_TOML: &str = r#"# sow-composer configuration

[templates]
# Relative to this file.
sow = "templates/SOW_Template.docx"
msa = "templates/MSA_Template.docx"

[substitution]
# Tokens look like %%KEY%%.
delimiter = "%%"

[provider]
name = "KashTech"
contact_name = "Provider Contact"
contact_email = "contact@example.com"
contact_phone = "000-000-0000"
consultant_name = "Lead Consultant"
# Filled into RATEPLACEHOLDER1..N in order.
rates = ["$120/hr", "$100/hr", "$130/hr", "$90/hr"]

# Numbered copies each template carries, e.g. CLIENTNAME1..CLIENTNAME6.
[vocabulary.slots]
CLIENTNAME = 6
KASHTECHNAME = 9
KASHCONTACTNAME = 2
TECHSTACK = 5

[snapshots]
dir = "snapshots"
"#;

/// Writes `sow-composer.toml` into `dir`. Refuses to overwrite an existing
/// file unless `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Err(anyhow!(
            "config already exists: {} (use --force to overwrite)",
            cfg_path.display()
        ));
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;

    let templates_dir = dir.join("templates");
    std::fs::create_dir_all(&templates_dir)
        .with_context(|| format!("create templates dir: {}", templates_dir.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_parses_to_defaults() {
        let cfg: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).expect("parse");
        assert_eq!(cfg.vocabulary.slots, SlotCounts::default());
        assert_eq!(cfg.provider, ProviderIdentity::default());
        assert_eq!(cfg.substitution.delimiter.as_deref(), Some(DEFAULT_DELIMITER));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[templates]\nsow = \"t/sow.docx\"\nmsa = \"/abs/msa.docx\"\n[vocabulary.slots]\nCLIENTNAME = 2\n",
        )
        .expect("write");

        let resolved = resolve_config(Some(&path), Path::new("/elsewhere")).expect("resolve");
        assert_eq!(resolved.sow_template, dir.path().join("t/sow.docx"));
        assert_eq!(resolved.msa_template, PathBuf::from("/abs/msa.docx"));
        assert_eq!(resolved.snapshot_dir, dir.path().join("snapshots"));
        assert_eq!(resolved.slots.client_name, 2);
        assert_eq!(resolved.slots.provider_name, 9);
        assert_eq!(resolved.delimiter, "%%");
    }

    #[test]
    fn upward_search_finds_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "").expect("write");
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        assert_eq!(
            find_file_upwards(&nested, CONFIG_FILE_NAME, 8),
            Some(dir.path().join(CONFIG_FILE_NAME))
        );
        assert_eq!(find_file_upwards(&nested, CONFIG_FILE_NAME, 1), None);
    }

    #[test]
    fn empty_delimiter_is_rejected() {
        let cfg: AppConfig = toml::from_str("[substitution]\ndelimiter = \"\"\n").expect("parse");
        assert!(resolve_with_base(cfg, None, Path::new(".")).is_err());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(resolve_config(Some(&dir.path().join("nope.toml")), dir.path()).is_err());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = init_default_config(dir.path(), false).expect("init");
        assert!(p.is_file());
        assert!(dir.path().join("templates").is_dir());
        assert!(init_default_config(dir.path(), false).is_err());
        std::fs::write(&p, "junk").expect("write");
        init_default_config(dir.path(), true).expect("force");
        assert_eq!(std::fs::read_to_string(&p).expect("read"), DEFAULT_CONFIG_TOML);
    }
}
