//! Mapping from template files to logical identifiers and derived artifact
//! locations. Nothing in here touches the filesystem.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Extension of template component files.
pub const TEMPLATE_EXT: &str = ".vue";

/// Suffix of the data-store file paired with a template.
pub const DATA_STORE_EXT: &str = ".data.ts";

/// Suffix of generated API handler files; the `.post` marks the request method.
pub const API_ROUTE_EXT: &str = ".post.ts";

/// Prefix of the page names registered with the host router.
const PAGE_NAME_PREFIX: &str = "email";

/// A page the host router should register for a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRoute {
    pub name: String,
    pub path: String,
    pub file: PathBuf,
}

/// Everything derived from a single template file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePaths {
    pub id: String,
    /// Last segment of `id`.
    pub name: String,
    pub template: PathBuf,
    pub data_store: PathBuf,
    pub wrapper: PathBuf,
    pub api_route: PathBuf,
    pub route: PageRoute,
}

#[derive(Debug, Clone)]
pub struct PathMapper {
    template_root: PathBuf,
    wrapper_root: PathBuf,
    api_root: PathBuf,
    route_prefix: String,
}

impl PathMapper {
    pub fn new(
        template_root: impl Into<PathBuf>,
        wrapper_root: impl Into<PathBuf>,
        api_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            template_root: template_root.into(),
            wrapper_root: wrapper_root.into(),
            api_root: api_root.into(),
            route_prefix: "/__emails".to_string(),
        }
    }

    pub fn with_route_prefix(mut self, prefix: &str) -> Self {
        self.route_prefix = format!("/{}", prefix.trim_matches('/'));
        self
    }

    pub fn template_root(&self) -> &Path {
        &self.template_root
    }

    pub fn wrapper_root(&self) -> &Path {
        &self.wrapper_root
    }

    pub fn api_root(&self) -> &Path {
        &self.api_root
    }

    pub fn route_prefix(&self) -> &str {
        &self.route_prefix
    }

    /// Logical identifier of `template`: the path relative to the template
    /// root, `/`-separated, without the template extension.
    pub fn logical_id(&self, template: &Path) -> Result<String, PathError> {
        let relative =
            template
                .strip_prefix(&self.template_root)
                .map_err(|_| PathError::OutsideRoot {
                    path: template.to_path_buf(),
                    root: self.template_root.clone(),
                })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(
                    part.to_str()
                        .ok_or_else(|| PathError::NonUtf8(template.to_path_buf()))?,
                ),
                Component::CurDir => {}
                _ => {
                    return Err(PathError::OutsideRoot {
                        path: template.to_path_buf(),
                        root: self.template_root.clone(),
                    })
                }
            }
        }

        let joined = segments.join("/");
        match joined.strip_suffix(TEMPLATE_EXT) {
            Some(id) if !id.is_empty() && !id.ends_with('/') => Ok(id.to_string()),
            _ => Err(PathError::NotTemplate(template.to_path_buf())),
        }
    }

    /// The data-store sibling of `template`, whether or not it exists.
    pub fn data_store_path(template: &Path) -> Option<PathBuf> {
        let file_name = template.file_name()?.to_str()?;
        let stem = file_name.strip_suffix(TEMPLATE_EXT)?;
        Some(template.with_file_name(format!("{stem}{DATA_STORE_EXT}")))
    }

    pub fn wrapper_path(&self, id: &str) -> PathBuf {
        join_id(&self.wrapper_root, id, TEMPLATE_EXT)
    }

    pub fn api_route_path(&self, id: &str) -> PathBuf {
        join_id(&self.api_root, id, API_ROUTE_EXT)
    }

    /// The template file an identifier would map back to.
    pub fn template_path(&self, id: &str) -> PathBuf {
        join_id(&self.template_root, id, TEMPLATE_EXT)
    }

    pub fn route_path(&self, id: &str) -> String {
        format!("{}/{}", self.route_prefix.trim_end_matches('/'), id)
    }

    pub fn page_route(&self, id: &str) -> PageRoute {
        PageRoute {
            name: format!("{PAGE_NAME_PREFIX}-{}", id.replace('/', "-")),
            path: self.route_path(id),
            file: self.wrapper_path(id),
        }
    }

    pub fn map(&self, template: &Path) -> Result<TemplatePaths, PathError> {
        let id = self.logical_id(template)?;
        let data_store = Self::data_store_path(template)
            .ok_or_else(|| PathError::NotTemplate(template.to_path_buf()))?;
        let name = id.rsplit('/').next().unwrap_or(&id).to_string();
        Ok(TemplatePaths {
            name,
            template: template.to_path_buf(),
            data_store,
            wrapper: self.wrapper_path(&id),
            api_route: self.api_route_path(&id),
            route: self.page_route(&id),
            id,
        })
    }
}

fn join_id(root: &Path, id: &str, ext: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    let mut segments = id.split('/').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_some() {
            path.push(segment);
        } else {
            path.push(format!("{segment}{ext}"));
        }
    }
    path
}

/// Renders a path with forward slashes for embedding in generated code.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
