#[cfg(test)]
mod tests;

use hnsw_rs::hnsw::{Hnsw, Neighbour};
use hnsw_rs::prelude::*;
use tracing::debug;
use uuid::Uuid;

use super::DistanceMetric;
use crate::{Result, WebvecError};

/// A single ANN candidate: chunk identity plus the graph's distance estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnHit {
    pub chunk_id: Uuid,
    pub distance: f32,
}

enum AnnGraph {
    Cosine(Hnsw<'static, f32, DistCosine>),
    L2(Hnsw<'static, f32, DistL2>),
}

/// Navigable-small-world index over the full chunk corpus.
///
/// Derived entirely from the canonical chunk table and rebuilt from it on
/// demand; it carries no tenant information, so callers must filter hits
/// against a canonical candidate set before using them.
pub struct AnnIndex {
    graph: AnnGraph,
    ids: Vec<Uuid>,
    dimension: usize,
    metric: DistanceMetric,
}

impl AnnIndex {
    /// Build an index for `metric` over `entries`. Every embedding must have
    /// exactly `dimension` finite components.
    #[inline]
    pub fn build(
        metric: DistanceMetric,
        dimension: usize,
        entries: Vec<(Uuid, Vec<f32>)>,
    ) -> Result<Self> {
        for (chunk_id, embedding) in &entries {
            if embedding.len() != dimension {
                return Err(WebvecError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(WebvecError::InvalidArgument(format!(
                    "embedding for chunk {} contains non-finite values",
                    chunk_id
                )));
            }
        }

        let max_nb_connection = 16;
        let ef_construction = 64;
        let nb_layer = if entries.len() > 1 {
            ((entries.len() as f32).log2().ceil() as usize).clamp(4, 16)
        } else {
            4
        };
        let capacity = entries.len().max(1);

        let mut ids = Vec::with_capacity(entries.len());

        let graph = match metric {
            DistanceMetric::Cosine => {
                let mut hnsw: Hnsw<'static, f32, DistCosine> = Hnsw::new(
                    max_nb_connection,
                    capacity,
                    nb_layer,
                    ef_construction,
                    DistCosine,
                );
                for (internal_id, (chunk_id, embedding)) in entries.into_iter().enumerate() {
                    let normalized = normalize(&embedding);
                    hnsw.insert((&normalized, internal_id));
                    ids.push(chunk_id);
                }
                hnsw.set_searching_mode(true);
                AnnGraph::Cosine(hnsw)
            }
            DistanceMetric::L2 => {
                let mut hnsw: Hnsw<'static, f32, DistL2> = Hnsw::new(
                    max_nb_connection,
                    capacity,
                    nb_layer,
                    ef_construction,
                    DistL2,
                );
                for (internal_id, (chunk_id, embedding)) in entries.into_iter().enumerate() {
                    hnsw.insert((&embedding, internal_id));
                    ids.push(chunk_id);
                }
                hnsw.set_searching_mode(true);
                AnnGraph::L2(hnsw)
            }
        };

        debug!(
            "Built {} ANN index over {} vectors ({} dims)",
            metric,
            ids.len(),
            dimension
        );

        Ok(Self {
            graph,
            ids,
            dimension,
            metric,
        })
    }

    /// K-nearest candidates for `query`. Distances are the graph's estimates;
    /// callers re-rank with exact arithmetic.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<AnnHit>> {
        if query.len() != self.dimension {
            return Err(WebvecError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(WebvecError::InvalidArgument(
                "query vector contains non-finite values".to_string(),
            ));
        }
        if self.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let ef = ef_search.max(k);
        let neighbours: Vec<Neighbour> = match &self.graph {
            AnnGraph::Cosine(hnsw) => {
                let normalized = normalize(query);
                hnsw.search(&normalized, k, ef)
            }
            AnnGraph::L2(hnsw) => hnsw.search(query, k, ef),
        };

        Ok(neighbours
            .into_iter()
            .filter_map(|neighbour| {
                self.ids.get(neighbour.d_id).map(|chunk_id| AnnHit {
                    chunk_id: *chunk_id,
                    distance: neighbour.distance,
                })
            })
            .collect())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

/// Unit-normalize for cosine insertion and queries. Zero vectors pass through
/// unchanged rather than dividing by zero.
fn normalize(vector: &[f32]) -> Vec<f32> {
    let magnitude: f32 = vector.iter().map(|&x| x * x).sum::<f32>().sqrt();

    if magnitude == 0.0 || !magnitude.is_finite() {
        return vector.to_vec();
    }

    vector.iter().map(|&x| x / magnitude).collect()
}
