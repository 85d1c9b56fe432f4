use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use uuid::Uuid;

use crate::{errors::ComposeRunnerError, lifecycle::cleanup::should_preserve};

const PROJECT_PREFIX: &str = "compose";
const PROJECT_ID_LEN: usize = 12;

/// Where a project is in its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectPhase {
    /// Constructed, setup not completed.
    Unset,
    /// Setup completed, teardown not called yet.
    Active,
    /// Teardown completed.
    Terminated,
}

impl fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unset => "not started",
            Self::Active => "active",
            Self::Terminated => "torn down",
        };
        f.write_str(label)
    }
}

/// Identity of one compose project: name, file, env overlay, teardown mode.
///
/// Immutable once built; owned by the environment that manages it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposeProject {
    name: String,
    compose_file: PathBuf,
    env: BTreeMap<String, String>,
    force_kill: bool,
    preserve: bool,
}

impl ComposeProject {
    pub fn builder(compose_file: impl Into<PathBuf>) -> ComposeProjectBuilder {
        ComposeProjectBuilder::new(compose_file)
    }

    /// Project with default options for the given compose file.
    pub fn new(compose_file: impl Into<PathBuf>) -> Result<Self, ComposeRunnerError> {
        Self::builder(compose_file).build()
    }

    /// Docker compose project name (`-p`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    /// Directory compose commands run from.
    pub fn root(&self) -> &Path {
        self.compose_file.parent().unwrap_or_else(|| Path::new("/"))
    }

    /// Extra variables forwarded to every container of this project.
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub const fn force_kill(&self) -> bool {
        self.force_kill
    }

    /// Leave the stack running instead of tearing it down.
    pub const fn preserve(&self) -> bool {
        self.preserve
    }
}

/// Builder for [`ComposeProject`].
#[derive(Debug)]
pub struct ComposeProjectBuilder {
    compose_file: PathBuf,
    env: BTreeMap<String, String>,
    force_kill: bool,
    preserve: Option<bool>,
    name: Option<String>,
}

impl ComposeProjectBuilder {
    fn new(compose_file: impl Into<PathBuf>) -> Self {
        Self {
            compose_file: compose_file.into(),
            env: BTreeMap::new(),
            force_kill: false,
            preserve: None,
            name: None,
        }
    }

    #[must_use]
    /// Forward one environment variable into every container.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    /// Kill containers instead of stopping them gracefully on teardown.
    pub const fn force_kill(mut self, enabled: bool) -> Self {
        self.force_kill = enabled;
        self
    }

    #[must_use]
    /// Skip teardown so the stack can be inspected afterwards. Defaults to
    /// whether `COMPOSE_RUNNER_PRESERVE` is set when the project is built.
    pub const fn preserve(mut self, enabled: bool) -> Self {
        self.preserve = Some(enabled);
        self
    }

    #[must_use]
    /// Use an explicit project name instead of deriving one from the path.
    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Resolve the compose path and settle the project name.
    pub fn build(self) -> Result<ComposeProject, ComposeRunnerError> {
        if self.compose_file.as_os_str().is_empty() {
            return Err(ComposeRunnerError::Project {
                path: self.compose_file,
                reason: "compose file path is empty".to_owned(),
            });
        }

        let compose_file =
            std::path::absolute(&self.compose_file).map_err(|err| ComposeRunnerError::Project {
                path: self.compose_file.clone(),
                reason: err.to_string(),
            })?;

        let name = match self.name {
            Some(name) => validate_project_name(&compose_file, name)?,
            None => derive_project_name(&compose_file),
        };

        Ok(ComposeProject {
            name,
            compose_file,
            env: self.env,
            force_kill: self.force_kill,
            preserve: self.preserve.unwrap_or_else(should_preserve),
        })
    }
}

/// `compose-<slug>-<id>`: the slug keeps names readable in `docker ps`, the id
/// is a name-based UUID of the absolute path so equal paths map to equal names
/// and different files never collide.
pub fn derive_project_name(compose_file: &Path) -> String {
    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        compose_file.to_string_lossy().as_bytes(),
    )
    .simple()
    .to_string();

    let parent = compose_file
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned());
    let stem = compose_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned());
    let slug = slugify(
        &[parent, stem]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("-"),
    );

    if slug.is_empty() {
        format!("{PROJECT_PREFIX}-{}", &id[..PROJECT_ID_LEN])
    } else {
        format!("{PROJECT_PREFIX}-{slug}-{}", &id[..PROJECT_ID_LEN])
    }
}

fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() || ch == '_' {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_owned()
}

fn validate_project_name(path: &Path, name: String) -> Result<String, ComposeRunnerError> {
    let valid_chars = name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_');
    let valid_start = name
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit());

    if valid_chars && valid_start {
        Ok(name)
    } else {
        Err(ComposeRunnerError::Project {
            path: path.to_path_buf(),
            reason: format!(
                "project name '{name}' must start with a lowercase letter or digit and contain only [a-z0-9_-]"
            ),
        })
    }
}
