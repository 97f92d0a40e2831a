use anyhow::{bail, Context};
use clap::Args;
use reqwest::Url;

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Realtime Database root, e.g. https://<project>.firebaseio.com
    #[arg(long, env = "FIREBASE_DATABASE_URL", global = true)]
    pub database_url: Option<String>,
    /// Database secret or ID token appended as `auth=`
    #[arg(long, env = "FIREBASE_AUTH", hide_env_values = true, global = true)]
    pub auth_token: Option<String>,
    #[arg(long, default_value = "student-details", global = true)]
    pub collection: String,
    /// Field the student ID is matched against
    #[arg(long, default_value = "SID", global = true)]
    pub id_field: String,
    #[arg(long, default_value_t = 10, global = true)]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: Url,
    pub auth_token: Option<String>,
    pub collection: String,
    pub id_field: String,
    pub connect_timeout_secs: u64,
}

impl StoreConfig {
    pub fn from_args(args: &StoreArgs) -> anyhow::Result<Self> {
        let raw = args
            .database_url
            .as_deref()
            .context("FIREBASE_DATABASE_URL must be set to the Realtime Database URL")?;
        let database_url = Url::parse(raw)
            .with_context(|| format!("FIREBASE_DATABASE_URL is not a valid URL: {raw}"))?;

        if !matches!(database_url.scheme(), "http" | "https") {
            bail!(
                "FIREBASE_DATABASE_URL must use http or https, got {}",
                database_url.scheme()
            );
        }
        if args.collection.trim_matches('/').is_empty() {
            bail!("--collection must not be empty");
        }

        Ok(Self {
            database_url,
            auth_token: args.auth_token.clone().filter(|token| !token.is_empty()),
            collection: args.collection.clone(),
            id_field: args.id_field.clone(),
            connect_timeout_secs: args.connect_timeout_secs.max(1),
        })
    }
}
