use crate::backend::Backend;
use crate::config::Maps;
use crate::render::Background;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::sync::Arc;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

/// Makes a server-echoed map name safe to place in a URL or file path:
/// NFKC-folds it, drops control and path/URL metacharacters, removes `..`
/// runs, and caps the length. `None` when nothing usable remains.
pub fn sanitize_map_name(raw: &str, max_len: usize) -> Option<String> {
    let folded: String = raw.trim().nfkc().collect();
    let mut name: String = folded
        .chars()
        .filter(|&c| !c.is_control() && !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();
    while name.contains("..") {
        name = name.replace("..", "");
    }
    let name: String = name.trim().chars().take(max_len).collect();
    let name = name.trim();
    if name.is_empty() || name == "." {
        None
    } else {
        Some(name.to_string())
    }
}

/// Local asset URLs to try, directories outer and extensions inner.
pub fn fallback_candidates(maps: &Maps, name: &str) -> Vec<String> {
    let encoded = encode_component(name);
    maps.fallback_dirs
        .iter()
        .flat_map(|dir| {
            let dir = dir.trim_end_matches('/');
            let encoded = &encoded;
            maps.extensions
                .iter()
                .map(move |ext| format!("{dir}/{encoded}.{}", ext.trim_start_matches('.')))
        })
        .collect()
}

/// Unreserved characters of a URI component; everything else is escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

/// Outcome of one background resolution, tagged with the name it was for.
#[derive(Debug, Clone)]
pub struct ResolvedMap {
    pub name: String,
    pub background: Option<Arc<Background>>,
}

/// What the caller must do after asking for a map.
#[derive(Debug)]
pub enum MapRequest {
    /// Same name as before; reuse whatever is known (possibly still loading).
    Current(Option<Arc<Background>>),
    /// New name; start a load for it.
    Load(String),
    /// Name sanitized to nothing; background cleared.
    Invalid,
}

#[derive(Debug)]
enum Slot {
    Loading,
    Loaded(Option<Arc<Background>>),
}

/// Tracks the desired map and caches its resolved image.
#[derive(Debug)]
pub struct MapResolver {
    maps: Maps,
    entry: Option<(String, Slot)>,
}

impl MapResolver {
    pub fn new(maps: &Maps) -> Self {
        Self {
            maps: maps.clone(),
            entry: None,
        }
    }

    pub fn maps(&self) -> &Maps {
        &self.maps
    }

    pub fn desired(&self) -> Option<&str> {
        self.entry.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn background(&self) -> Option<Arc<Background>> {
        match &self.entry {
            Some((_, Slot::Loaded(bg))) => bg.clone(),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    pub fn request(&mut self, raw: &str) -> MapRequest {
        let Some(name) = sanitize_map_name(raw, self.maps.max_name_len) else {
            debug!("map name {raw:?} sanitized to nothing");
            self.entry = None;
            return MapRequest::Invalid;
        };
        if let Some((current, slot)) = &self.entry {
            if *current == name {
                return MapRequest::Current(match slot {
                    Slot::Loaded(bg) => bg.clone(),
                    Slot::Loading => None,
                });
            }
        }
        self.entry = Some((name.clone(), Slot::Loading));
        MapRequest::Load(name)
    }

    /// Stores a finished load unless a different map has been requested
    /// since. Returns whether it was applied.
    pub fn apply(&mut self, resolved: ResolvedMap) -> bool {
        match &mut self.entry {
            Some((name, slot)) if *name == resolved.name => {
                *slot = Slot::Loaded(resolved.background);
                true
            }
            _ => {
                debug!("discarding stale map load for {}", resolved.name);
                false
            }
        }
    }

    /// Request, load and apply in one step.
    pub async fn resolve<B: Backend>(&mut self, backend: &B, raw: &str) -> Option<Arc<Background>> {
        match self.request(raw) {
            MapRequest::Current(bg) => bg,
            MapRequest::Invalid => None,
            MapRequest::Load(name) => {
                let resolved = load(backend, &self.maps, name).await;
                self.apply(resolved);
                self.background()
            }
        }
    }
}

/// Server URL first, then each local fallback in order. A map that cannot
/// be found resolves to no background; this never fails.
pub async fn load<B: Backend>(backend: &B, maps: &Maps, name: String) -> ResolvedMap {
    match backend.map_url(&name).await {
        Ok(Some(url)) => {
            if let Some(bg) = fetch_image(backend, &url).await {
                info!("map {name} resolved from server url {url}");
                return ResolvedMap {
                    name,
                    background: Some(Arc::new(bg)),
                };
            }
        }
        Ok(None) => debug!("server has no url for map {name}"),
        Err(err) => debug!("map lookup for {name} failed: {err}"),
    }

    for url in fallback_candidates(maps, &name) {
        if let Some(bg) = fetch_image(backend, &url).await {
            info!("map {name} resolved from {url}");
            return ResolvedMap {
                name,
                background: Some(Arc::new(bg)),
            };
        }
    }

    warn!("map image not found for {name}");
    ResolvedMap {
        name,
        background: None,
    }
}

async fn fetch_image<B: Backend>(backend: &B, url: &str) -> Option<Background> {
    let bytes = match backend.fetch_asset(url).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("map candidate {url}: {err}");
            return None;
        }
    };
    match Background::decode(url, &bytes) {
        Ok(bg) => Some(bg),
        Err(err) => {
            debug!("map candidate {url} not decodable: {err}");
            None
        }
    }
}
