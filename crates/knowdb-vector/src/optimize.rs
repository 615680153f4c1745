//! IVF_PQ index building for the `chunks` table.
//!
//! Small tables are searched exhaustively; once enough rows exist an IVF_PQ
//! cosine index is (re)built with parameters derived from row count and
//! dimensionality, and the build is recorded in `meta`.
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::DistanceType;

use knowdb_core::{Error, Result};

use crate::schema::{CHUNKS, META};
use crate::storage::Storage;
use crate::table::{now_millis, set_meta};

/// PQ training needs a full codebook's worth of samples (2^8 for 8-bit codes).
pub const MIN_ROWS_FOR_INDEX: usize = 256;
pub const INDEX_NAME: &str = "chunks_vector_ivfpq";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub num_partitions: u32,
    pub num_sub_vectors: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizeOutcome {
    Skipped { rows: usize, required: usize },
    Built { rows: usize, params: IvfPqParams },
}

pub fn compute_ivfpq_params(rows: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (rows as f64).sqrt() as usize;
    let mut partitions = sqrt_n.max(2);
    if rows > 1 {
        partitions = partitions.min(rows - 1);
    }
    let mut m = if dim > 1000 { (dim / 100).clamp(4, 96) } else { (dim / 8).max(4) };
    m = m.min(dim.max(1));
    // sub-vectors must evenly divide the dimensionality
    while m > 1 && dim % m != 0 {
        m -= 1;
    }
    IvfPqParams { num_partitions: partitions as u32, num_sub_vectors: m.max(1) as u32 }
}

pub async fn optimize(storage: &Storage) -> Result<OptimizeOutcome> {
    let table = storage.table(CHUNKS).await?;
    let rows = table.count_rows(None).await.map_err(Error::unavailable)?;
    if rows < MIN_ROWS_FOR_INDEX {
        tracing::info!(rows, required = MIN_ROWS_FOR_INDEX, "too few chunks for an ANN index; using exhaustive search");
        return Ok(OptimizeOutcome::Skipped { rows, required: MIN_ROWS_FOR_INDEX });
    }
    let params = compute_ivfpq_params(rows, storage.dim());
    table
        .create_index(
            &["vector"],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(params.num_partitions)
                    .num_sub_vectors(params.num_sub_vectors),
            ),
        )
        .name(INDEX_NAME.to_string())
        .execute()
        .await
        .map_err(Error::operation)?;
    set_meta(storage.connection(), META, "vector_index_built_at", &now_millis().to_string()).await?;
    tracing::info!(rows, partitions = params.num_partitions, sub_vectors = params.num_sub_vectors, "built IVF_PQ index");
    Ok(OptimizeOutcome::Built { rows, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_for_large_dimensions() {
        let p = compute_ivfpq_params(10_000, 3072);
        assert_eq!(p.num_partitions, 100);
        // 3072 / 100 = 30, reduced to the nearest divisor of 3072
        assert_eq!(p.num_sub_vectors, 24);
        assert_eq!(3072 % p.num_sub_vectors, 0);
    }

    #[test]
    fn params_for_small_dimensions() {
        let p = compute_ivfpq_params(300, 64);
        assert_eq!(p.num_partitions, 17);
        assert_eq!(p.num_sub_vectors, 8);
    }

    #[test]
    fn partitions_never_reach_row_count() {
        let p = compute_ivfpq_params(3, 16);
        assert_eq!(p.num_partitions, 2);
    }
}
