//! Process configuration, loaded once from the environment at startup.
//!
//! Mirrors this codebase's historical `utils/config.rs::Config::from_env`
//! pattern: a flat typed struct, grouped by concern, populated from
//! `std::env::var` with sane local-mode defaults. No other module reads
//! environment variables directly.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// `DATABASE_URL`. Unset selects the local embedded store under
    /// `./local_storage/`.
    pub database_url: Option<String>,

    /// `MINIO_ENDPOINT`/`MINIO_ACCESS_KEY`/`MINIO_SECRET_KEY`/`MINIO_BUCKET_RAW`.
    /// Unset selects the local filesystem raw-storage adapter.
    pub minio: Option<MinioConfig>,

    /// `QDRANT_URL` or `QDRANT_HOST`+`QDRANT_PORT`. Unset selects the local
    /// JSON-file brute-force vector store.
    pub qdrant: Option<QdrantConfig>,

    pub embedding_model: String,

    /// `LLM_URL`/`LLM_MODEL`. Unset selects the deterministic stub client.
    pub llm: Option<LlmConfig>,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_upload_bytes: usize,
    pub rag_top_k_default: usize,
    pub rag_history_n: usize,

    pub local_storage_root: String,
}

#[derive(Debug, Clone)]
pub struct MinioConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub vector_size: usize,
    pub distance: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub url: String,
    pub model: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let local_storage_root =
            env::var("LOCAL_STORAGE_ROOT").unwrap_or_else(|_| "./local_storage".to_string());

        let minio = env::var("MINIO_ENDPOINT").ok().map(|endpoint| MinioConfig {
            endpoint,
            access_key: env::var("MINIO_ACCESS_KEY").unwrap_or_default(),
            secret_key: env::var("MINIO_SECRET_KEY").unwrap_or_default(),
            bucket: env::var("MINIO_BUCKET_RAW").unwrap_or_else(|_| "documents".to_string()),
        });

        let qdrant_url = env::var("QDRANT_URL").ok().or_else(|| {
            let host = env::var("QDRANT_HOST").ok()?;
            let port = env::var("QDRANT_PORT").unwrap_or_else(|_| "6334".to_string());
            Some(format!("http://{host}:{port}"))
        });
        let qdrant = qdrant_url.map(|url| QdrantConfig {
            url,
            api_key: env::var("QDRANT_API_KEY").ok(),
            collection: env::var("QDRANT_COLLECTION").unwrap_or_else(|_| "documents".to_string()),
            vector_size: env::var("QDRANT_VECTOR_SIZE")
                .unwrap_or_else(|_| "384".to_string())
                .parse()
                .unwrap_or(384),
            distance: env::var("QDRANT_DISTANCE").unwrap_or_else(|_| "cosine".to_string()),
        });

        let llm = env::var("LLM_URL").ok().map(|url| LlmConfig {
            url,
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
        });

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL").ok(),
            minio,
            qdrant,
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "BAAI/bge-small-en-v1.5".to_string()),
            llm,
            chunk_size: env::var("CHUNK_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            chunk_overlap: env::var("CHUNK_OVERLAP")
                .unwrap_or_else(|_| "150".to_string())
                .parse()?,
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| "52428800".to_string())
                .parse()?,
            rag_top_k_default: env::var("RAG_TOP_K_DEFAULT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            rag_history_n: env::var("RAG_HISTORY_N")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
            local_storage_root,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_url: None,
            minio: None,
            qdrant: None,
            embedding_model: "BAAI/bge-small-en-v1.5".to_string(),
            llm: None,
            chunk_size: 1000,
            chunk_overlap: 150,
            max_upload_bytes: 50 * 1024 * 1024,
            rag_top_k_default: 3,
            rag_history_n: 4,
            local_storage_root: "./local_storage".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_external_adapters() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert!(config.minio.is_none());
        assert!(config.qdrant.is_none());
        assert!(config.llm.is_none());
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 150);
    }
}
