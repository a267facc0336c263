mod rag_pipeline;
mod rag_ranking;
