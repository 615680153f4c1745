//! Merging keyword and semantic rankings into one list.
//!
//! Every candidate carries a normalised relevance in `[0, 1]` that is
//! independent of the fusion policy: cosine similarity for semantic hits and
//! `score / best_score` for keyword hits. Thresholding uses that value, so a
//! chunk that clears the threshold in a single-mode search clears it in a
//! hybrid search too.

use std::cmp::Ordering;
use std::collections::HashMap;

use knowdb_core::config::{FusionPolicy, FusionSettings};
use knowdb_core::types::{SearchHit, SourceKind};

#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub ingested_at: i64,
    pub keyword_score: Option<f32>,
    pub semantic_score: Option<f32>,
    pub relevance: f32,
    pub score: f32,
}

impl Candidate {
    fn from_hit(hit: &SearchHit) -> Self {
        Self {
            id: hit.id.clone(),
            document_id: hit.document_id.clone(),
            text: hit.text.clone(),
            ingested_at: hit.ingested_at,
            keyword_score: None,
            semantic_score: None,
            relevance: 0.0,
            score: 0.0,
        }
    }
}

fn semantic_relevance(score: f32) -> f32 {
    score.clamp(0.0, 1.0)
}

fn best_score(hits: &[SearchHit]) -> f32 {
    hits.iter().map(|h| h.score).fold(0.0, f32::max)
}

fn keyword_relevance(score: f32, best: f32) -> f32 {
    if best > 0.0 {
        (score / best).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Higher score first, then newer document, then chunk id.
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.ingested_at.cmp(&a.ingested_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Ranks the hits of a single branch; the score is the branch's own score.
pub fn single(hits: &[SearchHit]) -> Vec<Candidate> {
    let best = best_score(hits);
    let mut out: Vec<Candidate> = hits
        .iter()
        .map(|h| {
            let mut c = Candidate::from_hit(h);
            c.score = h.score;
            match h.source {
                SourceKind::Text => {
                    c.keyword_score = Some(h.score);
                    c.relevance = keyword_relevance(h.score, best);
                }
                SourceKind::Vector => {
                    c.semantic_score = Some(h.score);
                    c.relevance = semantic_relevance(h.score);
                }
            }
            c
        })
        .collect();
    out.sort_by(rank_order);
    out
}

/// De-duplicates both rankings by chunk id and scores them with `settings.policy`.
pub fn fuse(keyword: &[SearchHit], semantic: &[SearchHit], settings: &FusionSettings) -> Vec<Candidate> {
    let mut by_id: HashMap<String, Candidate> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut entry = |hit: &SearchHit| -> String {
        if !by_id.contains_key(&hit.id) {
            order.push(hit.id.clone());
            by_id.insert(hit.id.clone(), Candidate::from_hit(hit));
        }
        hit.id.clone()
    };

    let kw_best = best_score(keyword);
    let (kw_min, kw_max) = keyword
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| (lo.min(h.score), hi.max(h.score)));
    let kw_minmax = |s: f32| if kw_max > kw_min { (s - kw_min) / (kw_max - kw_min) } else { 1.0 };
    let rrf = |rank: usize| 1.0 / (settings.rrf_k as f32 + rank as f32);

    let mut keyword_ids = Vec::with_capacity(keyword.len());
    for h in keyword {
        keyword_ids.push(entry(h));
    }
    let mut semantic_ids = Vec::with_capacity(semantic.len());
    for h in semantic {
        semantic_ids.push(entry(h));
    }

    for (rank, (id, h)) in keyword_ids.iter().zip(keyword).enumerate() {
        if let Some(c) = by_id.get_mut(id) {
            c.keyword_score = Some(h.score);
            c.relevance = c.relevance.max(keyword_relevance(h.score, kw_best));
            c.score += match settings.policy {
                FusionPolicy::Rrf => rrf(rank + 1),
                FusionPolicy::Weighted => settings.keyword_weight * kw_minmax(h.score),
            };
        }
    }
    for (rank, (id, h)) in semantic_ids.iter().zip(semantic).enumerate() {
        if let Some(c) = by_id.get_mut(id) {
            c.semantic_score = Some(h.score);
            c.relevance = c.relevance.max(semantic_relevance(h.score));
            c.score += match settings.policy {
                FusionPolicy::Rrf => rrf(rank + 1),
                FusionPolicy::Weighted => settings.semantic_weight * semantic_relevance(h.score),
            };
        }
    }

    let mut out: Vec<Candidate> = order.into_iter().filter_map(|id| by_id.remove(&id)).collect();
    out.sort_by(rank_order);
    out
}
