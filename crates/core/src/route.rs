//! Request classification.
//!
//! Every request maps to exactly one [`RoutingClass`]. Rules are evaluated in
//! priority order and the first match wins:
//!
//! 1. `Bypass`: the path ends with an opaque large-binary extension
//! 2. `Navigation`: the request mode is `navigate`
//! 3. `StaticAsset`: same-origin and the path is under a static prefix or is
//!    one of the static paths (manifest, worker script)
//! 4. `Default`: everything else
//!
//! Bypass is checked before anything else so large payloads never reach the
//! cache store, even when they are navigations or live under a static prefix.

use serde::{Deserialize, Serialize};
use url::Origin;

use crate::http::{Request, RequestMode};

/// Extensions of opaque large-binary payloads (streaming, mesh, texture).
pub const DEFAULT_BYPASS_EXTENSIONS: &[&str] = &[".slpk", ".glb", ".gltf", ".bin", ".3tz", ".ktx2", ".jsonz", ".geopkg"];

pub const DEFAULT_STATIC_PREFIXES: &[&str] = &["/assets/icons/"];

/// Manifest and worker script.
pub const DEFAULT_STATIC_PATHS: &[&str] = &["/manifest.webmanifest", "/sw.js"];

/// Routing class assigned to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingClass {
    Bypass,
    Navigation,
    StaticAsset,
    Default,
}

impl RoutingClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bypass => "bypass",
            Self::Navigation => "navigation",
            Self::StaticAsset => "static_asset",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for RoutingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule lists driving classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRules {
    /// Lowercase extensions including the leading dot.
    bypass_extensions: Vec<String>,
    static_prefixes: Vec<String>,
    static_paths: Vec<String>,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self::new(
            DEFAULT_BYPASS_EXTENSIONS.iter().copied(),
            DEFAULT_STATIC_PREFIXES.iter().copied(),
            DEFAULT_STATIC_PATHS.iter().copied(),
        )
    }
}

impl RouteRules {
    pub fn new<E, P, S>(
        bypass_extensions: impl IntoIterator<Item = E>, static_prefixes: impl IntoIterator<Item = P>,
        static_paths: impl IntoIterator<Item = S>,
    ) -> Self
    where
        E: AsRef<str>,
        P: Into<String>,
        S: Into<String>,
    {
        Self {
            bypass_extensions: bypass_extensions
                .into_iter()
                .map(|e| e.as_ref().to_ascii_lowercase())
                .collect(),
            static_prefixes: static_prefixes.into_iter().map(Into::into).collect(),
            static_paths: static_paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn bypass_extensions(&self) -> &[String] {
        &self.bypass_extensions
    }

    /// Assign a routing class. Pure; depends only on origin, path and mode.
    pub fn classify(&self, request: &Request, origin: &Origin) -> RoutingClass {
        let path = request.url.path();

        if self.is_bypass(path) {
            return RoutingClass::Bypass;
        }

        if request.mode == RequestMode::Navigate {
            return RoutingClass::Navigation;
        }

        if request.is_same_origin(origin) && self.is_static(path) {
            return RoutingClass::StaticAsset;
        }

        RoutingClass::Default
    }

    fn is_bypass(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.bypass_extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }

    fn is_static(&self, path: &str) -> bool {
        self.static_prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.static_paths.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Destination;
    use url::Url;

    fn origin() -> Origin {
        Url::parse("https://twin.example.com").unwrap().origin()
    }

    fn get(url: &str) -> Request {
        Request::parse_get(url).unwrap()
    }

    #[test]
    fn test_every_bypass_extension() {
        let rules = RouteRules::default();
        for ext in DEFAULT_BYPASS_EXTENSIONS {
            let req = get(&format!("https://twin.example.com/scene/model{ext}"));
            assert_eq!(rules.classify(&req, &origin()), RoutingClass::Bypass, "{ext}");
        }
    }

    #[test]
    fn test_bypass_extension_case_insensitive() {
        let rules = RouteRules::default();
        let req = get("https://twin.example.com/scene/MODEL.GLB");
        assert_eq!(rules.classify(&req, &origin()), RoutingClass::Bypass);
    }

    #[test]
    fn test_bypass_wins_over_navigation_and_static() {
        let rules = RouteRules::default();
        let nav = get("https://twin.example.com/tiles/layer.slpk").with_mode(RequestMode::Navigate);
        assert_eq!(rules.classify(&nav, &origin()), RoutingClass::Bypass);

        let icon = get("https://twin.example.com/assets/icons/atlas.ktx2");
        assert_eq!(rules.classify(&icon, &origin()), RoutingClass::Bypass);
    }

    #[test]
    fn test_bypass_applies_cross_origin() {
        let rules = RouteRules::default();
        let req = get("https://cdn.other.net/city.3tz");
        assert_eq!(rules.classify(&req, &origin()), RoutingClass::Bypass);
    }

    #[test]
    fn test_extension_must_end_path() {
        let rules = RouteRules::default();
        let req = get("https://twin.example.com/api/model.glb/meta");
        assert_eq!(rules.classify(&req, &origin()), RoutingClass::Default);
    }

    #[test]
    fn test_query_does_not_affect_extension() {
        let rules = RouteRules::default();
        let req = get("https://twin.example.com/data?file=x.glb");
        assert_eq!(rules.classify(&req, &origin()), RoutingClass::Default);
    }

    #[test]
    fn test_navigation() {
        let rules = RouteRules::default();
        let req = get("https://twin.example.com/dashboard").with_mode(RequestMode::Navigate);
        assert_eq!(rules.classify(&req, &origin()), RoutingClass::Navigation);

        let cross = get("https://other.example.com/").with_mode(RequestMode::Navigate);
        assert_eq!(rules.classify(&cross, &origin()), RoutingClass::Navigation);
    }

    #[test]
    fn test_static_assets() {
        let rules = RouteRules::default();
        for path in ["/assets/icons/icon-192.png", "/manifest.webmanifest", "/sw.js"] {
            let req = get(&format!("https://twin.example.com{path}")).with_destination(Destination::Image);
            assert_eq!(rules.classify(&req, &origin()), RoutingClass::StaticAsset, "{path}");
        }
    }

    #[test]
    fn test_static_requires_same_origin() {
        let rules = RouteRules::default();
        let req = get("https://cdn.example.com/assets/icons/icon-192.png");
        assert_eq!(rules.classify(&req, &origin()), RoutingClass::Default);
    }

    #[test]
    fn test_static_path_exact_match() {
        let rules = RouteRules::default();
        let req = get("https://twin.example.com/sw.js.map");
        assert_eq!(rules.classify(&req, &origin()), RoutingClass::Default);
    }

    #[test]
    fn test_custom_rules() {
        let rules = RouteRules::new([".PMTILES"], ["/static/"], ["/app.webmanifest"]);
        assert_eq!(rules.bypass_extensions(), &[".pmtiles".to_string()]);
        assert_eq!(
            rules.classify(&get("https://twin.example.com/world.pmtiles"), &origin()),
            RoutingClass::Bypass
        );
        assert_eq!(
            rules.classify(&get("https://twin.example.com/static/app.css"), &origin()),
            RoutingClass::StaticAsset
        );
        assert_eq!(
            rules.classify(&get("https://twin.example.com/model.glb"), &origin()),
            RoutingClass::Default
        );
    }
}
