pub mod hybrid;

pub use hybrid::{
    cosine_similarity, hybrid_rank, rank_dense, rank_sparse, reciprocal_rank_fusion, HybridSearchParams,
    HybridSource,
};
