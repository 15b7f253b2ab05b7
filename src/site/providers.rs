//! Third-party SEO metadata providers
//!
//! Several SEO plugins can be active at once, each keeping titles,
//! descriptions and focus keywords under its own meta keys. Providers are
//! registered explicitly from configuration.

use super::ContentStore;
use crate::error::{validation_error, Result};
use serde::Serialize;

/// Current values a provider holds for one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderValues {
    pub provider: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub focus_keyword: Option<String>,
}

/// Capability interface of a metadata provider
pub trait MetadataProvider {
    /// Registry name (e.g. `yoast`)
    fn name(&self) -> &str;

    /// Meta key prefix owned by this provider
    fn meta_prefix(&self) -> &str;

    /// Site option holding the provider's own settings, if any
    fn settings_option(&self) -> Option<&str>;

    fn set_title(&self, store: &dyn ContentStore, id: i64, value: &str) -> Result<()>;

    fn set_description(&self, store: &dyn ContentStore, id: i64, value: &str) -> Result<()>;

    fn set_focus_keyword(&self, store: &dyn ContentStore, id: i64, value: &str) -> Result<()>;

    fn current_values(&self, store: &dyn ContentStore, id: i64) -> Result<ProviderValues>;
}

/// Provider whose fields are plain meta keys
#[derive(Debug, Clone)]
pub struct MetaKeyProvider {
    name: &'static str,
    prefix: &'static str,
    title_key: &'static str,
    description_key: &'static str,
    keyword_key: &'static str,
    settings_option: Option<&'static str>,
}

impl MetaKeyProvider {
    /// Yoast SEO
    pub fn yoast() -> Self {
        Self {
            name: "yoast",
            prefix: "_yoast_",
            title_key: "_yoast_wpseo_title",
            description_key: "_yoast_wpseo_metadesc",
            keyword_key: "_yoast_wpseo_focuskw",
            settings_option: Some("wpseo_titles"),
        }
    }

    /// Rank Math
    pub fn rank_math() -> Self {
        Self {
            name: "rank_math",
            prefix: "rank_math_",
            title_key: "rank_math_title",
            description_key: "rank_math_description",
            keyword_key: "rank_math_focus_keyword",
            settings_option: Some("rank_math_options"),
        }
    }

    /// All in One SEO
    pub fn aioseo() -> Self {
        Self {
            name: "aioseo",
            prefix: "_aioseo_",
            title_key: "_aioseo_title",
            description_key: "_aioseo_description",
            keyword_key: "_aioseo_keywords",
            settings_option: Some("aioseo_options"),
        }
    }

    /// Look up a built-in provider by registry name
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "yoast" => Some(Self::yoast()),
            "rank_math" | "rankmath" => Some(Self::rank_math()),
            "aioseo" => Some(Self::aioseo()),
            _ => None,
        }
    }
}

impl MetadataProvider for MetaKeyProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn meta_prefix(&self) -> &str {
        self.prefix
    }

    fn settings_option(&self) -> Option<&str> {
        self.settings_option
    }

    fn set_title(&self, store: &dyn ContentStore, id: i64, value: &str) -> Result<()> {
        store.set_meta(id, self.title_key, value)
    }

    fn set_description(&self, store: &dyn ContentStore, id: i64, value: &str) -> Result<()> {
        store.set_meta(id, self.description_key, value)
    }

    fn set_focus_keyword(&self, store: &dyn ContentStore, id: i64, value: &str) -> Result<()> {
        store.set_meta(id, self.keyword_key, value)
    }

    fn current_values(&self, store: &dyn ContentStore, id: i64) -> Result<ProviderValues> {
        Ok(ProviderValues {
            provider: self.name.to_string(),
            title: store.get_meta(id, self.title_key)?,
            description: store.get_meta(id, self.description_key)?,
            focus_keyword: store.get_meta(id, self.keyword_key)?,
        })
    }
}

/// Ordered set of active providers
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn MetadataProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured provider names
    pub fn from_names(names: &[String]) -> Result<Self> {
        let mut registry = Self::new();
        for name in names {
            let provider = MetaKeyProvider::by_name(name)
                .ok_or_else(|| validation_error(format!("unknown metadata provider '{}'", name)))?;
            registry.register(Box::new(provider));
        }
        Ok(registry)
    }

    /// Add a provider; a second registration under the same name is ignored
    pub fn register(&mut self, provider: Box<dyn MetadataProvider>) {
        if self.providers.iter().any(|p| p.name() == provider.name()) {
            return;
        }
        self.providers.push(provider);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn MetadataProvider> {
        self.providers.iter().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Meta prefixes of every registered provider
    pub fn meta_prefixes(&self) -> Vec<String> {
        self.iter().map(|p| p.meta_prefix().to_string()).collect()
    }

    /// Settings options of every registered provider
    pub fn settings_options(&self) -> Vec<String> {
        self.iter()
            .filter_map(|p| p.settings_option().map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SqliteContentStore;
    use crate::storage::Database;

    #[test]
    fn test_registry_from_names() {
        let registry =
            ProviderRegistry::from_names(&["yoast".to_string(), "rank_math".to_string()]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.meta_prefixes(), vec!["_yoast_", "rank_math_"]);

        assert!(ProviderRegistry::from_names(&["seo-magic".to_string()]).is_err());
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(MetaKeyProvider::yoast()));
        registry.register(Box::new(MetaKeyProvider::yoast()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_providers_write_own_namespace() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteContentStore::new(&db);

        let yoast = MetaKeyProvider::yoast();
        let aioseo = MetaKeyProvider::aioseo();
        yoast.set_description(&store, 5, "from yoast").unwrap();
        aioseo.set_description(&store, 5, "from aioseo").unwrap();

        assert_eq!(
            yoast.current_values(&store, 5).unwrap().description.as_deref(),
            Some("from yoast")
        );
        assert_eq!(
            aioseo.current_values(&store, 5).unwrap().description.as_deref(),
            Some("from aioseo")
        );
    }
}
