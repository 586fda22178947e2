//! Route loading.
//!
//! Route units are listed in a [`RouteRegistry`], the static stand-in for a
//! directory of route modules. [`load_routes`] builds every unit in
//! discovery order (lexicographic by unit name), wraps units that declare an
//! `{id}` parameter with the id validator and merges them into one router
//! that the server nests under [`API_PREFIX`].
//!
//! Any unit that fails to build or is malformed aborts loading. A
//! (method, path) pair registered twice keeps its first handler; the later
//! one is skipped with a warning.

use std::collections::{HashMap, HashSet};
use std::fmt;

use axum::{
    handler::Handler,
    http::Method,
    middleware,
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::state::AppState;
use crate::api::validate::{validate_id_param, IdValidator, ID_PARAM};
use crate::config::API_PREFIX;

#[derive(Debug, Error)]
pub enum RouteLoadError {
    #[error("route unit '{name}' failed to load: {source:#}")]
    UnitFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("route unit registered with an empty name")]
    EmptyName,

    #[error("route unit '{0}' is registered more than once")]
    DuplicateUnit(String),

    #[error("route unit '{0}' exposes no handlers")]
    EmptyUnit(String),

    #[error("route unit '{unit}' has invalid path {path:?}: {reason}")]
    InvalidPath {
        unit: String,
        path: String,
        reason: &'static str,
    },

    #[error("route unit '{unit}' path {path:?} conflicts with mounted {existing:?}: capture names differ")]
    ConflictingPath {
        unit: String,
        path: String,
        existing: String,
    },
}

/// One method + path + handler triple.
pub struct RouteBinding {
    method: Method,
    path: String,
    handler: MethodRouter<AppState>,
}

impl RouteBinding {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn declares_id(&self) -> bool {
        path_declares_id(&self.path)
    }
}

impl fmt::Debug for RouteBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBinding")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// The ordered handler set of one route unit.
#[derive(Debug, Default)]
pub struct RouteUnit {
    bindings: Vec<RouteBinding>,
}

impl RouteUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.on(Method::GET, MethodFilter::GET, path, handler)
    }

    pub fn post<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.on(Method::POST, MethodFilter::POST, path, handler)
    }

    pub fn put<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.on(Method::PUT, MethodFilter::PUT, path, handler)
    }

    pub fn patch<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.on(Method::PATCH, MethodFilter::PATCH, path, handler)
    }

    pub fn delete<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.on(Method::DELETE, MethodFilter::DELETE, path, handler)
    }

    fn on<H, T>(mut self, method: Method, filter: MethodFilter, path: &str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.bindings.push(RouteBinding {
            method,
            path: path.to_string(),
            handler: on(filter, handler),
        });
        self
    }

    pub fn declares_id_param(&self) -> bool {
        self.bindings.iter().any(RouteBinding::declares_id)
    }
}

fn path_declares_id(path: &str) -> bool {
    path.split('/')
        .any(|segment| segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) == Some(ID_PARAM))
}

/// Reject paths axum would panic on instead of failing boot cleanly.
fn check_path(path: &str) -> Result<(), &'static str> {
    if !path.starts_with('/') {
        return Err("must start with '/'");
    }
    for segment in path.split('/').skip(1) {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err("use '{name}' / '{*name}' captures");
        }
        let opens = segment.matches('{').count();
        let closes = segment.matches('}').count();
        if opens != closes || opens > 1 {
            return Err("unbalanced or repeated capture braces");
        }
        if opens == 1 && !(segment.starts_with('{') && segment.ends_with('}')) {
            return Err("a capture must span the whole segment");
        }
        if segment == "{}" || segment == "{*}" {
            return Err("capture without a name");
        }
    }
    Ok(())
}

/// Path with capture names erased: `/toys/{id}` and `/toys/{toy_id}` share
/// the shape `/toys/{}`, which the router refuses to hold twice.
fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with("{*") && segment.ends_with('}') {
                "{*}"
            } else if segment.starts_with('{') && segment.ends_with('}') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Builds one route unit. The name comes from the registry, not the unit.
pub type UnitConstructor = fn() -> anyhow::Result<RouteUnit>;

#[derive(Debug, Clone, Copy)]
pub struct RouteEntry {
    pub name: &'static str,
    pub build: UnitConstructor,
}

/// The set of available route units.
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    entries: Vec<RouteEntry>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &'static str, build: UnitConstructor) -> Self {
        self.entries.push(RouteEntry { name, build });
        self
    }

    /// Entries in discovery order: sorted by name, ties kept in registration order.
    pub fn discover(&self) -> Vec<RouteEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| a.name.cmp(b.name));
        entries
    }
}

/// One mounted (method, path) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub unit: String,
    pub method: Method,
    /// Full path including [`API_PREFIX`].
    pub path: String,
    pub validates_id: bool,
}

/// Everything that ended up mounted, in mount order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(
                f,
                "{:<7} {:<40} {:<12} {}",
                entry.method.as_str(),
                entry.path,
                entry.unit,
                if entry.validates_id { "id-checked" } else { "" }
            )?;
        }
        Ok(())
    }
}

/// Route units merged into one router, relative to [`API_PREFIX`].
pub struct LoadedRoutes {
    pub router: Router<AppState>,
    pub table: MountTable,
}

impl fmt::Debug for LoadedRoutes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedRoutes")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Build and merge every registered unit. Fails on the first bad unit.
pub fn load_routes(
    registry: &RouteRegistry,
    validator: &IdValidator,
) -> Result<LoadedRoutes, RouteLoadError> {
    let mut router = Router::new();
    let mut table = MountTable::default();
    let mut unit_names = HashSet::new();
    let mut mounted: HashSet<(Method, String)> = HashSet::new();
    let mut shapes: HashMap<String, String> = HashMap::new();

    for entry in registry.discover() {
        let name = entry.name;
        if name.trim().is_empty() {
            return Err(RouteLoadError::EmptyName);
        }
        if !unit_names.insert(name) {
            return Err(RouteLoadError::DuplicateUnit(name.to_string()));
        }

        let unit = (entry.build)().map_err(|source| RouteLoadError::UnitFailed {
            name: name.to_string(),
            source,
        })?;
        if unit.bindings.is_empty() {
            return Err(RouteLoadError::EmptyUnit(name.to_string()));
        }
        for binding in &unit.bindings {
            check_path(&binding.path).map_err(|reason| RouteLoadError::InvalidPath {
                unit: name.to_string(),
                path: binding.path.clone(),
                reason,
            })?;
            let shape = path_shape(&binding.path);
            match shapes.get(&shape) {
                Some(existing) if *existing != binding.path => {
                    return Err(RouteLoadError::ConflictingPath {
                        unit: name.to_string(),
                        path: binding.path.clone(),
                        existing: existing.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    shapes.insert(shape, binding.path.clone());
                }
            }
        }

        let declares_id = unit.declares_id_param();
        let mut unit_router = Router::new();
        let mut added = 0usize;
        for binding in unit.bindings {
            let key = (binding.method.clone(), binding.path.clone());
            if mounted.contains(&key) {
                warn!(
                    unit = name,
                    method = %binding.method,
                    path = %binding.path,
                    "route already registered by an earlier unit, skipping"
                );
                continue;
            }
            table.entries.push(MountEntry {
                unit: name.to_string(),
                method: binding.method.clone(),
                path: format!("{API_PREFIX}{}", binding.path),
                validates_id: declares_id,
            });
            unit_router = unit_router.route(&binding.path, binding.handler);
            mounted.insert(key);
            added += 1;
        }

        if added > 0 && declares_id {
            unit_router = unit_router.route_layer(middleware::from_fn_with_state(
                validator.clone(),
                validate_id_param,
            ));
        }
        router = router.merge(unit_router);
        debug!(unit = name, routes = added, id_checked = declares_id, "route unit mounted");
    }

    info!(
        units = unit_names.len(),
        routes = table.len(),
        prefix = API_PREFIX,
        "routes loaded"
    );
    Ok(LoadedRoutes { router, table })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdFormatKind;

    fn validator() -> IdValidator {
        IdValidator::for_kind(IdFormatKind::ObjectId)
    }

    fn alpha() -> anyhow::Result<RouteUnit> {
        Ok(RouteUnit::new()
            .get("/alpha", || async { "alpha" })
            .get("/shared", || async { "from alpha" }))
    }

    fn beta() -> anyhow::Result<RouteUnit> {
        Ok(RouteUnit::new()
            .get("/beta/{id}", || async { "beta" })
            .get("/shared", || async { "from beta" })
            .post("/shared", || async { "posted" }))
    }

    fn broken() -> anyhow::Result<RouteUnit> {
        anyhow::bail!("handler set missing")
    }

    fn empty() -> anyhow::Result<RouteUnit> {
        Ok(RouteUnit::new())
    }

    fn old_syntax() -> anyhow::Result<RouteUnit> {
        Ok(RouteUnit::new().get("/toys/:id", || async { "x" }))
    }

    #[test]
    fn test_path_declares_id() {
        assert!(path_declares_id("/toys/{id}"));
        assert!(path_declares_id("/toys/{id}/photos"));
        assert!(!path_declares_id("/toys/{toy_id}"));
        assert!(!path_declares_id("/toys/id"));
        assert!(!path_declares_id("/toys"));
    }

    #[test]
    fn test_path_shape() {
        assert_eq!(path_shape("/toys/{id}"), "/toys/{}");
        assert_eq!(path_shape("/toys/{toy_id}/photos"), "/toys/{}/photos");
        assert_eq!(path_shape("/files/{*rest}"), "/files/{*}");
        assert_eq!(path_shape("/toys"), "/toys");
    }

    #[test]
    fn test_check_path() {
        assert!(check_path("/toys/{id}").is_ok());
        assert!(check_path("/files/{*rest}").is_ok());
        assert!(check_path("toys").is_err());
        assert!(check_path("/toys/:id").is_err());
        assert!(check_path("/toys/{id").is_err());
        assert!(check_path("/toys/x{id}").is_err());
        assert!(check_path("/toys/{}").is_err());
    }

    #[test]
    fn test_discovery_is_lexicographic() {
        let registry = RouteRegistry::new().register("beta", beta).register("alpha", alpha);
        let names: Vec<_> = registry.discover().iter().map(|e| e.name).collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = RouteRegistry::new().register("beta", beta).register("alpha", alpha);
        let loaded = load_routes(&registry, &validator()).unwrap();
        let rows: Vec<_> = loaded
            .table
            .entries()
            .iter()
            .map(|e| (e.unit.as_str(), e.method.as_str(), e.path.as_str()))
            .collect();
        assert_eq!(
            rows,
            [
                ("alpha", "GET", "/api/v1.0/alpha"),
                ("alpha", "GET", "/api/v1.0/shared"),
                ("beta", "GET", "/api/v1.0/beta/{id}"),
                ("beta", "POST", "/api/v1.0/shared"),
            ]
        );
    }

    #[test]
    fn test_id_flag_follows_unit() {
        let registry = RouteRegistry::new().register("alpha", alpha).register("beta", beta);
        let loaded = load_routes(&registry, &validator()).unwrap();
        for entry in loaded.table.entries() {
            assert_eq!(entry.validates_id, entry.unit == "beta", "{entry:?}");
        }
    }

    #[test]
    fn test_mount_table_is_reproducible() {
        let registry = RouteRegistry::new().register("beta", beta).register("alpha", alpha);
        let first = load_routes(&registry, &validator()).unwrap().table;
        let second = load_routes(&registry, &validator()).unwrap().table;
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_failing_unit_aborts() {
        let registry = RouteRegistry::new().register("alpha", alpha).register("broken", broken);
        let err = load_routes(&registry, &validator()).unwrap_err();
        assert!(matches!(err, RouteLoadError::UnitFailed { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_empty_unit_aborts() {
        let registry = RouteRegistry::new().register("empty", empty);
        assert!(matches!(
            load_routes(&registry, &validator()),
            Err(RouteLoadError::EmptyUnit(_))
        ));
    }

    #[test]
    fn test_invalid_path_aborts() {
        let registry = RouteRegistry::new().register("old", old_syntax);
        assert!(matches!(
            load_routes(&registry, &validator()),
            Err(RouteLoadError::InvalidPath { .. })
        ));
    }

    fn toys_by_id() -> anyhow::Result<RouteUnit> {
        Ok(RouteUnit::new().get("/toys/{id}", || async { "by id" }))
    }

    fn toys_by_toy_id() -> anyhow::Result<RouteUnit> {
        Ok(RouteUnit::new().delete("/toys/{toy_id}", || async { "deleted" }))
    }

    #[test]
    fn test_capture_name_conflict_aborts() {
        let registry = RouteRegistry::new()
            .register("a", toys_by_id)
            .register("b", toys_by_toy_id);
        let err = load_routes(&registry, &validator()).unwrap_err();
        match err {
            RouteLoadError::ConflictingPath {
                unit,
                path,
                existing,
            } => {
                assert_eq!(unit, "b");
                assert_eq!(path, "/toys/{toy_id}");
                assert_eq!(existing, "/toys/{id}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_capture_different_methods_share_path() {
        fn deleter() -> anyhow::Result<RouteUnit> {
            Ok(RouteUnit::new().delete("/toys/{id}", || async { "deleted" }))
        }
        let registry = RouteRegistry::new()
            .register("a", toys_by_id)
            .register("b", deleter);
        let loaded = load_routes(&registry, &validator()).unwrap();
        assert_eq!(loaded.table.len(), 2);
    }

    #[test]
    fn test_duplicate_unit_name_aborts() {
        let registry = RouteRegistry::new().register("alpha", alpha).register("alpha", alpha);
        assert!(matches!(
            load_routes(&registry, &validator()),
            Err(RouteLoadError::DuplicateUnit(_))
        ));
    }

    #[test]
    fn test_empty_name_aborts() {
        let registry = RouteRegistry::new().register(" ", alpha);
        assert!(matches!(
            load_routes(&registry, &validator()),
            Err(RouteLoadError::EmptyName)
        ));
    }
}
