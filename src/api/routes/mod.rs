//! Route units available to the loader. Add a unit here to mount it under
//! `/api/v1.0`; the loader orders units by name.

pub mod health;
pub mod toys;

use super::loader::RouteRegistry;

pub fn registry() -> RouteRegistry {
    RouteRegistry::new()
        .register("health", health::unit)
        .register("toys", toys::unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::loader::load_routes;
    use crate::api::validate::IdValidator;
    use crate::config::IdFormatKind;

    #[test]
    fn test_registry_loads() {
        let loaded = load_routes(&registry(), &IdValidator::for_kind(IdFormatKind::ObjectId)).unwrap();
        let paths: Vec<_> = loaded
            .table
            .entries()
            .iter()
            .map(|e| format!("{} {}", e.method, e.path))
            .collect();
        assert_eq!(
            paths,
            [
                "GET /api/v1.0/health",
                "GET /api/v1.0/toys",
                "GET /api/v1.0/toys/{id}",
                "DELETE /api/v1.0/toys/{id}",
            ]
        );
    }
}
