//! CredentialStore implementation for LibSqlBackend.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{LibSqlBackend, text};
use crate::credentials::GatewayCredentials;
use crate::db::CredentialStore;
use crate::error::DatabaseError;

#[async_trait]
impl CredentialStore for LibSqlBackend {
    async fn get_gateway_credentials(
        &self,
        owner_id: &str,
    ) -> Result<Option<GatewayCredentials>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT base_url, api_key FROM gateway_credentials WHERE owner_id = ?1",
                libsql::params![owner_id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(GatewayCredentials {
            base_url: text(&row, 0)?,
            api_key: SecretString::from(text(&row, 1)?),
        }))
    }

    async fn put_gateway_credentials(
        &self,
        owner_id: &str,
        credentials: &GatewayCredentials,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO gateway_credentials (owner_id, base_url, api_key, updated_at)
            VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            ON CONFLICT (owner_id) DO UPDATE SET
                base_url = excluded.base_url,
                api_key = excluded.api_key,
                updated_at = excluded.updated_at
            "#,
            libsql::params![
                owner_id,
                credentials.base_url.as_str(),
                credentials.api_key.expose_secret(),
            ],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::{ExposeSecret, SecretString};

    use crate::credentials::GatewayCredentials;
    use crate::db::libsql::LibSqlBackend;
    use crate::db::{CredentialStore, Database};

    #[tokio::test]
    async fn credentials_are_replaced_per_owner() {
        let dir = tempfile::tempdir().unwrap();
        let db = LibSqlBackend::new_local(&dir.path().join("creds.db"))
            .await
            .unwrap();
        db.run_migrations().await.unwrap();

        assert!(db.get_gateway_credentials("pool").await.unwrap().is_none());

        for key in ["first-key", "second-key"] {
            db.put_gateway_credentials(
                "pool",
                &GatewayCredentials {
                    base_url: "https://waha.internal".into(),
                    api_key: SecretString::from(key.to_string()),
                },
            )
            .await
            .unwrap();
        }

        let stored = db.get_gateway_credentials("pool").await.unwrap().unwrap();
        assert_eq!(stored.base_url, "https://waha.internal");
        assert_eq!(stored.api_key.expose_secret(), "second-key");
    }
}
