use std::sync::Arc;

use basket_storage::{Store, StoreError};
use basket_store_postgres::PostgresStore;
use basket_store_sqlite::SqliteStore;

/// Open the store matching the URL scheme. Anything not `postgres:` is treated as SQLite.
pub async fn open(database_url: &str) -> Result<Arc<dyn Store>, StoreError> {
    if database_url.starts_with("postgres:") || database_url.starts_with("postgresql:") {
        let store = PostgresStore::open(database_url).await?;
        Ok(Arc::new(store))
    } else {
        let store = SqliteStore::open(database_url).await?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basket_storage::CreateProfileParams;

    #[tokio::test]
    async fn sqlite_urls_open_a_working_store() {
        let store = open("sqlite::memory:").await.unwrap();
        let profile = store
            .create_profile(&CreateProfileParams {
                email: "alice@example.com".into(),
                name: "Alice".into(),
            })
            .await
            .unwrap();
        let fetched = store.get_profile(&profile.id).await.unwrap();
        assert_eq!(fetched.email, "alice@example.com");
    }
}
