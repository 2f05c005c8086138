use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub project_id: String,
    pub storage_bucket: String,
    pub local_store_path: PathBuf,
}

impl Config {
    /// Reads from the environment (or a .env file), with the demo
    /// deployment as the fallback.
    pub fn from_env() -> Self {
        Self {
            project_id: dotenv::var("EMBERCHAT_PROJECT_ID")
                .unwrap_or_else(|_| "emberchat-demo".to_string()),
            storage_bucket: dotenv::var("EMBERCHAT_STORAGE_BUCKET")
                .unwrap_or_else(|_| "emberchat-demo.blobs.local".to_string()),
            local_store_path: dotenv::var("EMBERCHAT_STORE")
                .unwrap_or_else(|_| ".emberchat.json".to_string())
                .into(),
        }
    }
}
