use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use crate::core::{
    ArtworkCandidate, AssetKind, CatalogMatch, GameArtwork, GameDescription, GameRecord, ProviderKind,
};
use crate::providers::GameProvider;
use crate::ranking::{RankedCandidate, Ranker};

/// How a game's identification went.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Confident matches, at most one per provider
    Matched(Vec<CatalogMatch>),
    /// No confident match; best-ranked candidates for the user
    Unmatched(Vec<CatalogMatch>),
}

/// What the providers returned for a matched game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub description: GameDescription,
    pub artwork: GameArtwork,
    /// Official-store id learned from the matches
    pub platform_id: Option<String>,
}

/// Queries every provider for one game and folds the answers together.
pub struct GameResolver {
    providers: Vec<Arc<dyn GameProvider>>,
    ranker: Ranker,
    top_candidates: usize,
}

impl GameResolver {
    pub fn new(providers: Vec<Arc<dyn GameProvider>>, top_candidates: usize) -> Self {
        Self {
            providers,
            ranker: Ranker::new(),
            top_candidates,
        }
    }

    pub fn providers(&self) -> &[Arc<dyn GameProvider>] {
        &self.providers
    }

    /// Forget per-run catalog caches so a new run sees fresh data.
    pub fn clear_caches(&self) {
        for provider in &self.providers {
            provider.clear_cache();
        }
    }

    fn provider(&self, source: &str) -> Option<&Arc<dyn GameProvider>> {
        self.providers.iter().find(|p| p.name() == source)
    }

    /// Search every provider concurrently and rank the union.
    ///
    /// A failing provider contributes nothing.
    pub async fn search_all(
        &self,
        title: &str,
        platform_hint: Option<&str>,
    ) -> Vec<RankedCandidate<CatalogMatch>> {
        let searches = self.providers.iter().map(|provider| async move {
            match provider.search(title, platform_hint).await {
                Ok(matches) => {
                    tracing::debug!("{}: {} results for '{}'", provider.name(), matches.len(), title);
                    matches
                }
                Err(e) => {
                    tracing::warn!("Provider {} failed for '{}': {}", provider.name(), title, e);
                    Vec::new()
                }
            }
        });

        let candidates: Vec<CatalogMatch> = join_all(searches).await.into_iter().flatten().collect();
        self.ranker.rank_matches(title, candidates)
    }

    /// Matches keyed straight on a stable official-store id.
    async fn lookup_all(&self, platform_id: &str, title: &str) -> Vec<CatalogMatch> {
        let lookups = self
            .providers
            .iter()
            .map(|provider| provider.lookup_match(platform_id, title));
        join_all(lookups).await.into_iter().flatten().collect()
    }

    /// Identify `record`.
    ///
    /// A record with a stable platform id skips search and ranking.
    /// Otherwise a confident match is a ranked candidate whose normalized
    /// title equals the record's; the first such candidate per provider is
    /// kept.
    pub async fn resolve(&self, record: &GameRecord) -> MatchOutcome {
        if let Some(platform_id) = record.stable_platform_id() {
            let matches = self.lookup_all(platform_id, &record.title).await;
            if !matches.is_empty() {
                tracing::debug!(
                    "{}: direct lookup by platform id {} ({} providers)",
                    record.title,
                    platform_id,
                    matches.len()
                );
                return MatchOutcome::Matched(matches);
            }
        }

        let ranked = self
            .search_all(&record.title, record.stable_platform_id())
            .await;

        let mut seen_sources = HashSet::new();
        let confident: Vec<CatalogMatch> = ranked
            .iter()
            .filter(|r| r.exact)
            .filter(|r| seen_sources.insert(r.candidate.source.clone()))
            .map(|r| r.candidate.clone())
            .collect();

        if confident.is_empty() {
            let top = ranked
                .into_iter()
                .take(self.top_candidates)
                .map(RankedCandidate::into_inner)
                .collect();
            MatchOutcome::Unmatched(top)
        } else {
            MatchOutcome::Matched(confident)
        }
    }

    /// A user-chosen match plus whatever other providers can key on its
    /// platform id.
    pub async fn expand_choice(&self, chosen: CatalogMatch, title: &str) -> Vec<CatalogMatch> {
        let mut matches = vec![chosen];
        if let Some(platform_id) = matches[0].platform_hint_id.clone() {
            let source = matches[0].source.clone();
            matches.extend(
                self.lookup_all(&platform_id, title)
                    .await
                    .into_iter()
                    .filter(|m| m.source != source),
            );
        }
        matches
    }

    fn platform_hint<'a>(record: &'a GameRecord, matches: &'a [CatalogMatch]) -> Option<&'a str> {
        record.stable_platform_id().or_else(|| {
            matches
                .iter()
                .filter_map(|m| m.platform_hint_id.as_deref())
                .find(|id| !id.trim().is_empty())
        })
    }

    /// Fetch description and artwork for every match concurrently.
    ///
    /// Descriptions merge field by field in provider-priority order. Each
    /// artwork slot takes the best-ranked image offered for it.
    pub async fn fetch(&self, record: &GameRecord, matches: &[CatalogMatch]) -> Enrichment {
        let hint = Self::platform_hint(record, matches);

        let fetches = matches.iter().filter_map(|m| {
            let provider = self.provider(&m.source)?;
            Some(async move {
                let (description, artwork) =
                    tokio::join!(provider.get_description(m), provider.get_artwork(m, hint));
                (provider.kind(), provider.name().to_string(), m, description, artwork)
            })
        });
        let results = join_all(fetches).await;

        let mut descriptions = Vec::new();
        let mut images = Vec::new();
        for (kind, name, m, description, artwork) in results {
            if let Some(description) = description {
                descriptions.push((kind, description));
            }
            if let Some(artwork) = artwork {
                images.extend(ArtworkCandidate::from_artwork(&artwork, &name, kind, &m.title));
            }
        }

        let platform_id = hint.map(str::to_string).or_else(|| {
            matches
                .iter()
                .find(|m| m.kind == ProviderKind::OfficialStore)
                .map(|m| m.external_id.clone())
        });

        Enrichment {
            description: GameDescription::merge(descriptions),
            artwork: self.pick_artwork(&record.title, images),
            platform_id,
        }
    }

    fn pick_artwork(&self, title: &str, images: Vec<ArtworkCandidate>) -> GameArtwork {
        let ranked = self.ranker.rank_images(title, images);

        let mut artwork = GameArtwork::none();
        for kind in AssetKind::ALL {
            if let Some(best) = ranked.iter().find(|r| r.candidate.kind == kind) {
                artwork.set(kind, &best.candidate.url, best.candidate.hint);
            }
        }
        artwork
    }

    /// Ranked image offers for `record` across every provider.
    pub async fn artwork_candidates(&self, record: &GameRecord) -> Vec<ArtworkCandidate> {
        let matches = match self.resolve(record).await {
            MatchOutcome::Matched(matches) => matches,
            MatchOutcome::Unmatched(candidates) => candidates,
        };
        let hint = Self::platform_hint(record, &matches);

        let lookups = matches.iter().filter_map(|m| {
            let provider = self.provider(&m.source)?;
            Some(provider.artwork_candidates(m, hint))
        });
        let images: Vec<ArtworkCandidate> = join_all(lookups).await.into_iter().flatten().collect();

        // Same URL offered twice (e.g. banner and hero): keep the first
        let mut seen = HashSet::new();
        let unique: Vec<ArtworkCandidate> = images
            .into_iter()
            .filter(|c| seen.insert((c.kind, c.url.clone())))
            .collect();

        self.ranker
            .rank_images(&record.title, unique)
            .into_iter()
            .map(RankedCandidate::into_inner)
            .collect()
    }
}
