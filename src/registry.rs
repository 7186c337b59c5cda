use log::{debug, error, info, warn};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::BuildError;
use crate::generator::{ArtifactGenerator, ArtifactParams};
use crate::paths::{PageRoute, PathMapper, TemplatePaths, API_ROUTE_EXT, TEMPLATE_EXT};
use crate::scanner;

/// File name of the registry manifest written next to the wrappers.
pub const MANIFEST_FILE: &str = "registry.json";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Preview layout component imported by every wrapper.
    pub layout: PathBuf,
    pub site_url: String,
    pub dry_run: bool,
    pub manifest: bool,
    pub filter: IdFilter,
}

impl BuildOptions {
    pub fn new(layout: impl Into<PathBuf>, site_url: impl Into<String>) -> Self {
        Self {
            layout: layout.into(),
            site_url: site_url.into(),
            dry_run: false,
            manifest: false,
            filter: IdFilter::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub id: String,
    pub route: PageRoute,
    pub api_route: PathBuf,
    pub has_data_store: bool,
}

#[derive(Debug)]
pub struct BuildFailure {
    pub template: PathBuf,
    pub error: BuildError,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub entries: Vec<RegistryEntry>,
    pub failures: Vec<BuildFailure>,
    /// Artifacts deleted because their template no longer exists.
    pub removed: Vec<PathBuf>,
}

impl BuildReport {
    /// Logical identifiers in discovery order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn routes(&self) -> Vec<&PageRoute> {
        self.entries.iter().map(|e| &e.route).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Written,
    Unchanged,
    DryRun,
}

pub struct RegistryBuilder {
    mapper: PathMapper,
    generator: ArtifactGenerator,
    options: BuildOptions,
}

impl RegistryBuilder {
    pub fn new(mapper: PathMapper, generator: ArtifactGenerator, options: BuildOptions) -> Self {
        Self {
            mapper,
            generator,
            options,
        }
    }

    pub fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    /// Scans the template root and (re)generates every template's artifacts.
    ///
    /// A template that fails is recorded in the report and left out of the
    /// registry; the others are still processed. Afterwards, wrappers and API
    /// routes whose template is gone are deleted.
    pub fn build(&self) -> BuildReport {
        let mut report = BuildReport::default();
        let mut seen = HashSet::new();
        // Artifacts of every template still on disk, filtered or failed ones
        // included.
        let mut live = HashSet::new();

        if self.options.dry_run {
            info!("=== DRY RUN MODE ===");
        }

        for template in scanner::scan(self.mapper.template_root()) {
            let outcome = self.mapper.map(&template).map_err(BuildError::from).and_then(|paths| {
                live.insert(paths.wrapper.clone());
                live.insert(paths.api_route.clone());
                self.build_one(paths)
            });
            match outcome {
                Ok(Some(entry)) => {
                    if seen.insert(entry.id.clone()) {
                        report.entries.push(entry);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to generate artifacts for {:?}: {}", template, e);
                    report.failures.push(BuildFailure { template, error: e });
                }
            }
        }

        self.prune_stale(&live, &mut report);

        if self.options.manifest {
            if let Err(e) = self.write_manifest(&report) {
                error!("Failed to write registry manifest: {}", e);
                report.failures.push(BuildFailure {
                    template: self.mapper.wrapper_root().join(MANIFEST_FILE),
                    error: e,
                });
            }
        }

        info!(
            "Registry built: {} template(s), {} failure(s), {} removed",
            report.entries.len(),
            report.failures.len(),
            report.removed.len()
        );
        report
    }

    fn build_one(&self, paths: TemplatePaths) -> Result<Option<RegistryEntry>, BuildError> {
        if self.options.filter.rejects(&paths.id) {
            info!("Skipping template: {}", paths.id);
            return Ok(None);
        }

        let has_data_store = paths.data_store.is_file();
        let params = ArtifactParams::new(
            &paths,
            &self.options.layout,
            &self.options.site_url,
            has_data_store,
        );
        let artifacts = self.generator.generate(&params)?;

        self.write_artifact(&paths.wrapper, &artifacts.wrapper)?;
        self.write_artifact(&paths.api_route, &artifacts.api_handler)?;

        Ok(Some(RegistryEntry {
            id: paths.id,
            route: paths.route,
            api_route: paths.api_route,
            has_data_store,
        }))
    }

    /// Deletes generated files under the wrapper and API roots that no live
    /// template maps to.
    fn prune_stale(&self, live: &HashSet<PathBuf>, report: &mut BuildReport) {
        let roots = [
            (self.mapper.wrapper_root(), TEMPLATE_EXT),
            (self.mapper.api_root(), API_ROUTE_EXT),
        ];
        for (root, ext) in roots {
            let stale: Vec<PathBuf> = WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .map(walkdir::DirEntry::into_path)
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.ends_with(ext))
                })
                .filter(|path| !live.contains(path))
                .collect();

            for path in stale {
                if self.options.dry_run {
                    info!("[DRY RUN] Would remove: {:?}", path);
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) => {
                        info!("Removed stale artifact {:?}", path);
                        report.removed.push(path);
                    }
                    Err(source) => {
                        error!("Failed to remove stale artifact {:?}: {}", path, source);
                        report.failures.push(BuildFailure {
                            template: path.clone(),
                            error: BuildError::Filesystem { path, source },
                        });
                    }
                }
            }
        }
    }

    fn write_manifest(&self, report: &BuildReport) -> Result<(), BuildError> {
        let path = self.mapper.wrapper_root().join(MANIFEST_FILE);
        let mut content = serde_json::to_string_pretty(&report.routes())
            .map_err(|e| BuildError::Render(format!("registry manifest: {e}")))?;
        content.push('\n');
        self.write_artifact(&path, &content).map(|_| ())
    }

    /// Writes `content` unless the file already holds exactly that.
    fn write_artifact(&self, path: &Path, content: &str) -> Result<WriteOutcome, BuildError> {
        if self.options.dry_run {
            info!("[DRY RUN] Would write: {:?}", path);
            return Ok(WriteOutcome::DryRun);
        }

        if let Ok(existing) = fs::read_to_string(path) {
            if existing == content {
                debug!("Unchanged: {:?}", path);
                return Ok(WriteOutcome::Unchanged);
            }
        }

        if let Some(parent) = path.parent() {
            ensure_dir_exists(parent)?;
        }
        fs::write(path, content).map_err(|source| BuildError::Filesystem {
            path: path.to_path_buf(),
            source,
        })?;
        info!("{:?}", path);
        Ok(WriteOutcome::Written)
    }
}

/// Ensures that the specified directory exists, creating it if necessary.
fn ensure_dir_exists(path: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(path).map_err(|source| BuildError::Filesystem {
        path: path.to_path_buf(),
        source,
    })
}

/// Include/exclude patterns over logical identifiers.
///
/// A pattern is `regex:<expr>`, a single-`*` glob, or a literal id.
#[derive(Debug, Clone, Default)]
pub struct IdFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

#[derive(Debug, Clone)]
enum Pattern {
    Regex(Regex),
    Glob(String, String),
    Literal(String),
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        if let Some(regex_pattern) = pattern.strip_prefix("regex:") {
            match Regex::new(regex_pattern) {
                Ok(re) => return Pattern::Regex(re),
                Err(e) => warn!("Invalid regex pattern '{}': {}", regex_pattern, e),
            }
        }
        if let Some((prefix, suffix)) = pattern.split_once('*') {
            if !suffix.contains('*') {
                return Pattern::Glob(prefix.to_string(), suffix.to_string());
            }
        }
        Pattern::Literal(pattern.to_string())
    }

    fn matches(&self, id: &str) -> bool {
        match self {
            Pattern::Regex(re) => re.is_match(id),
            Pattern::Glob(prefix, suffix) => {
                id.len() >= prefix.len() + suffix.len()
                    && id.starts_with(prefix.as_str())
                    && id.ends_with(suffix.as_str())
            }
            Pattern::Literal(literal) => id == literal,
        }
    }
}

impl IdFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: include.iter().map(|p| Pattern::parse(p)).collect(),
            exclude: exclude.iter().map(|p| Pattern::parse(p)).collect(),
        }
    }

    /// True when `id` should be skipped.
    pub fn rejects(&self, id: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(id)) {
            return true;
        }
        self.exclude.iter().any(|p| p.matches(id))
    }
}
