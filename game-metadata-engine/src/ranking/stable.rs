use std::cmp::Ordering;

use crate::core::{ArtworkCandidate, CatalogMatch};
use crate::ranking::{normalize_title, Rankable, RankedCandidate};

/// Deterministic ranker.
///
/// Order, by priority:
/// 1. normalized exact title match first
/// 2. images only: official-store source before community sources
/// 3. higher provider score first (missing scores last)
/// 4. newer release date first (missing dates last)
/// 5. input order
///
/// The last key makes the order total, so identical input always yields
/// identical output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker;

impl Ranker {
    pub fn new() -> Self {
        Self
    }

    /// Get ranker name for logging
    pub fn name(&self) -> &str {
        "stable"
    }

    pub fn rank_matches(
        &self,
        query: &str,
        candidates: Vec<CatalogMatch>,
    ) -> Vec<RankedCandidate<CatalogMatch>> {
        self.rank(query, candidates, false)
    }

    pub fn rank_images(
        &self,
        query: &str,
        candidates: Vec<ArtworkCandidate>,
    ) -> Vec<RankedCandidate<ArtworkCandidate>> {
        self.rank(query, candidates, true)
    }

    pub fn rank<T: Rankable>(
        &self,
        query: &str,
        candidates: Vec<T>,
        prefer_official: bool,
    ) -> Vec<RankedCandidate<T>> {
        let query = normalize_title(query);

        let mut ranked: Vec<RankedCandidate<T>> = candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| {
                let exact = !query.is_empty() && normalize_title(candidate.rank_title()) == query;
                RankedCandidate::new(candidate, exact, index)
            })
            .collect();

        ranked.sort_by(|a, b| compare(a, b, prefer_official));
        ranked
    }
}

fn compare<T: Rankable>(
    a: &RankedCandidate<T>,
    b: &RankedCandidate<T>,
    prefer_official: bool,
) -> Ordering {
    b.exact
        .cmp(&a.exact)
        .then_with(|| {
            if prefer_official {
                b.candidate.is_official().cmp(&a.candidate.is_official())
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| compare_scores(a.candidate.rank_score(), b.candidate.rank_score()))
        // None < Some, so reversing puts undated candidates last
        .then_with(|| {
            b.candidate
                .rank_release_date()
                .cmp(&a.candidate.rank_release_date())
        })
        .then_with(|| a.input_index.cmp(&b.input_index))
}

/// Descending, scored before unscored.
fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::core::{AssetKind, ProviderKind};

    fn store_match(id: &str, title: &str) -> CatalogMatch {
        CatalogMatch::new(ProviderKind::OfficialStore, "steam", id, title)
    }

    fn grid(url: &str, score: f64) -> ArtworkCandidate {
        ArtworkCandidate::new(
            AssetKind::BoxArt,
            url,
            "steamgriddb",
            ProviderKind::CommunityArtwork,
            "Some Other Game",
        )
        .with_score(Some(score))
    }

    #[test]
    fn test_exact_store_match_first() {
        let ranker = Ranker::new();
        let candidates = vec![
            store_match("380", "Half-Life 2: Episode One").with_score(Some(96.0)),
            store_match("220", "Half-Life 2").with_score(Some(50.0)),
            store_match("420", "Half-Life 2: Episode Two"),
        ];

        let ranked = ranker.rank_matches("Half-Life 2", candidates);

        assert_eq!(ranked[0].candidate.external_id, "220");
        assert!(ranked[0].exact);
        assert!(!ranked[1].exact);
    }

    #[test]
    fn test_community_images_by_score() {
        let ranker = Ranker::new();
        let ranked = ranker.rank_images(
            "Half-Life 2",
            vec![grid("https://a/900.png", 900.0), grid("https://a/1200.png", 1200.0)],
        );

        let scores: Vec<f64> = ranked.iter().filter_map(|r| r.candidate.score).collect();
        assert_eq!(scores, vec![1200.0, 900.0]);
    }

    #[test]
    fn test_official_images_before_community() {
        let ranker = Ranker::new();
        let official = ArtworkCandidate::new(
            AssetKind::BoxArt,
            "https://steam/box.jpg",
            "steam",
            ProviderKind::OfficialStore,
            "Some Other Game",
        );

        let ranked = ranker.rank_images("Portal", vec![grid("https://a/1.png", 5000.0), official]);
        assert_eq!(ranked[0].candidate.source, "steam");
    }

    #[test]
    fn test_exact_title_beats_official_source() {
        let ranker = Ranker::new();
        let official = ArtworkCandidate::new(
            AssetKind::BoxArt,
            "https://steam/box.jpg",
            "steam",
            ProviderKind::OfficialStore,
            "Portal 2",
        );
        let mut community = grid("https://a/1.png", 1.0);
        community.title = "Portal".into();

        let ranked = ranker.rank_images("portal", vec![official, community]);
        assert_eq!(ranked[0].candidate.source, "steamgriddb");
    }

    #[test]
    fn test_match_ranking_ignores_source() {
        let ranker = Ranker::new();
        let community = CatalogMatch::new(ProviderKind::CommunityArtwork, "steamgriddb", "game/1", "X")
            .with_score(Some(10.0));
        let store = store_match("1", "Y").with_score(Some(5.0));

        let ranked = ranker.rank_matches("Z", vec![store, community]);
        assert_eq!(ranked[0].candidate.source, "steamgriddb");
    }

    #[test]
    fn test_ties_by_release_date_then_input_order() {
        let ranker = Ranker::new();
        let old = store_match("1", "A").with_release_date(NaiveDate::from_ymd_opt(2001, 1, 1));
        let new = store_match("2", "B").with_release_date(NaiveDate::from_ymd_opt(2020, 1, 1));
        let undated_first = store_match("3", "C");
        let undated_second = store_match("4", "D");

        let ranked = ranker.rank_matches("query", vec![undated_first, old, undated_second, new]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.candidate.external_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "3", "4"]);
    }

    #[test]
    fn test_scored_before_unscored() {
        let ranker = Ranker::new();
        let ranked = ranker.rank_matches(
            "q",
            vec![store_match("1", "A"), store_match("2", "B").with_score(Some(0.0))],
        );
        assert_eq!(ranked[0].candidate.external_id, "2");
    }

    #[test]
    fn test_deterministic_across_runs() {
        let ranker = Ranker::new();
        let candidates = vec![
            store_match("1", "Doom").with_score(Some(80.0)),
            store_match("2", "DOOM").with_score(Some(70.0)),
            store_match("3", "Doom 3").with_score(Some(f64::NAN)),
            store_match("4", "Doom II"),
            store_match("5", "doom "),
        ];

        let first = ranker.rank_matches("doom", candidates.clone());
        for _ in 0..10 {
            let again = ranker.rank_matches("doom", candidates.clone());
            let a: Vec<&str> = first.iter().map(|r| r.candidate.id.as_str()).collect();
            let b: Vec<&str> = again.iter().map(|r| r.candidate.id.as_str()).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_exact_never_below_non_exact() {
        let ranker = Ranker::new();
        let candidates = vec![
            store_match("1", "Celeste Classic").with_score(Some(100.0)),
            store_match("2", "celeste"),
            store_match("3", "Celeste 64").with_score(Some(99.0)),
            store_match("4", "CELESTE™"),
        ];

        let ranked = ranker.rank_matches("Celeste", candidates);
        let first_inexact = ranked.iter().position(|r| !r.exact).unwrap();
        assert!(ranked[first_inexact..].iter().all(|r| !r.exact));
        assert_eq!(first_inexact, 2);
    }

    #[test]
    fn test_empty_query_has_no_exact_matches() {
        let ranked = Ranker::new().rank_matches("   ", vec![store_match("1", "")]);
        assert!(!ranked[0].exact);
    }
}
