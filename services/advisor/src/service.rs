//! Service-identifier derivation.
//!
//! Workload names follow `servicename[-suffix]*` (replica hashes, ordinals).
//! The catalog maps a workload name back to the logical service identifier
//! used as the key of the service→gang index.

use std::collections::HashSet;

/// Demonstration service dictionary, matching the built-in coordination
/// groups. Overridable via configuration.
pub const DEFAULT_KNOWN_SERVICES: &[&str] = &[
    "cartservice",
    "paymentservice",
    "checkoutservice",
    "currencyservice",
    "frontend",
    "productcatalogservice",
    "recommendationservice",
    "emailservice",
    "shippingservice",
    "adservice",
    "redis-cart",
    "loadgenerator",
];

#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    known: HashSet<String>,
}

impl ServiceCatalog {
    pub fn new(known: impl IntoIterator<Item = String>) -> Self {
        Self {
            known: known.into_iter().collect(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_KNOWN_SERVICES.iter().map(|s| s.to_string()))
    }

    /// Derive the service identifier from a workload name.
    ///
    /// The longest left prefix matching the dictionary wins (so hyphenated
    /// service names like `redis-cart` survive suffix stripping); otherwise
    /// the first hyphen-delimited component.
    pub fn service_id(&self, workload_name: &str) -> String {
        let parts: Vec<&str> = workload_name.split('-').collect();
        for end in (1..=parts.len()).rev() {
            let candidate = parts[..end].join("-");
            if self.known.contains(&candidate) {
                return candidate;
            }
        }
        parts
            .first()
            .map(|part| part.to_string())
            .unwrap_or_else(|| workload_name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_replica_suffixes() {
        let catalog = ServiceCatalog::with_defaults();
        assert_eq!(catalog.service_id("cartservice-5f8d9c-x2vq1"), "cartservice");
        assert_eq!(catalog.service_id("frontend-abc"), "frontend");
    }

    #[test]
    fn longest_known_prefix_wins() {
        let catalog = ServiceCatalog::with_defaults();
        assert_eq!(catalog.service_id("redis-cart-7b9f-1"), "redis-cart");
    }

    #[test]
    fn unknown_names_fall_back_to_first_component() {
        let catalog = ServiceCatalog::with_defaults();
        assert_eq!(catalog.service_id("mysvc-abc-def"), "mysvc");
        assert_eq!(catalog.service_id("solo"), "solo");
    }

    #[test]
    fn exact_name_matches_itself() {
        let catalog = ServiceCatalog::with_defaults();
        assert_eq!(catalog.service_id("paymentservice"), "paymentservice");
    }

    #[test]
    fn empty_catalog_uses_first_component() {
        let catalog = ServiceCatalog::new(Vec::new());
        assert_eq!(catalog.service_id("redis-cart-7b9f"), "redis");
    }
}
