use std::sync::Arc;

use crate::provider::WeatherProvider;

/// Providers in the order they are tried: ascending priority, input order on ties.
///
/// The order is fixed at construction; there is no way to add, remove or
/// re-sort providers afterwards.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Arc<[Arc<dyn WeatherProvider>]>,
}

impl ProviderRegistry {
    pub fn new(mut providers: Vec<Arc<dyn WeatherProvider>>) -> Self {
        // `sort_by_key` is stable, which is what keeps ties in input order.
        providers.sort_by_key(|p| p.priority());
        Self {
            providers: providers.into(),
        }
    }

    pub fn providers(&self) -> &[Arc<dyn WeatherProvider>] {
        &self.providers
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn WeatherProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FromIterator<Arc<dyn WeatherProvider>> for ProviderRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn WeatherProvider>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ClassifiedError, model::WeatherObservation};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Named(&'static str, i32);

    #[async_trait]
    impl WeatherProvider for Named {
        async fn fetch(&self, _city: &str) -> Result<WeatherObservation, ClassifiedError> {
            Ok(WeatherObservation::new(0.0, 0.0))
        }

        fn name(&self) -> &str {
            self.0
        }

        fn priority(&self) -> i32 {
            self.1
        }
    }

    fn names(registry: &ProviderRegistry) -> Vec<&str> {
        registry.iter().map(|p| p.name()).collect()
    }

    fn arc(name: &'static str, priority: i32) -> Arc<dyn WeatherProvider> {
        Arc::new(Named(name, priority))
    }

    #[test]
    fn sorts_ascending_by_priority() {
        let registry = ProviderRegistry::new(vec![arc("c", 3), arc("a", 1), arc("b", 2)]);
        assert_eq!(names(&registry), ["a", "b", "c"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let ab = ProviderRegistry::new(vec![arc("a", 1), arc("b", 1)]);
        let ba = ProviderRegistry::new(vec![arc("b", 1), arc("a", 1)]);

        assert_eq!(names(&ab), ["a", "b"]);
        assert_eq!(names(&ba), ["b", "a"]);
    }

    #[test]
    fn mixed_ties_and_priorities() {
        let registry: ProviderRegistry = [
            arc("x", 2),
            arc("a", 1),
            arc("y", 2),
            arc("b", 1),
            arc("z", -1),
        ]
        .into_iter()
        .collect();
        assert_eq!(names(&registry), ["z", "a", "b", "x", "y"]);
    }

    #[test]
    fn empty_input_is_valid() {
        let registry = ProviderRegistry::new(Vec::new());
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}
