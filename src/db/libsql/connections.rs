//! ConnectionStore implementation for LibSqlBackend.

use async_trait::async_trait;

use super::{LibSqlBackend, fmt_ts, nullable, nullable_text, text, timestamp};
use crate::db::{
    ConnectionRecord, ConnectionStatus, ConnectionStore, IdentityMapping, SessionRecord,
};
use crate::error::DatabaseError;

fn row_to_connection(row: &libsql::Row) -> Result<ConnectionRecord, DatabaseError> {
    let raw_status = text(row, 2)?;
    let status = ConnectionStatus::parse(&raw_status).ok_or_else(|| {
        DatabaseError::Serialization(format!("unknown connection status '{raw_status}'"))
    })?;
    Ok(ConnectionRecord {
        user_id: text(row, 0)?,
        session_name: text(row, 1)?,
        status,
        phone_number: nullable_text(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

fn row_to_session(row: &libsql::Row) -> Result<SessionRecord, DatabaseError> {
    Ok(SessionRecord {
        user_id: text(row, 0)?,
        session_name: text(row, 1)?,
        status: text(row, 2)?,
        gateway_session_id: text(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

fn row_to_identity(row: &libsql::Row) -> Result<IdentityMapping, DatabaseError> {
    Ok(IdentityMapping {
        identity: text(row, 0)?,
        user_id: text(row, 1)?,
        franchise_id: nullable_text(row, 2)?,
        display_name: nullable_text(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

#[async_trait]
impl ConnectionStore for LibSqlBackend {
    async fn upsert_connection(&self, record: &ConnectionRecord) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        // A missing phone number never erases one captured earlier.
        conn.execute(
            r#"
            INSERT INTO whatsapp_connections (user_id, session_name, status, phone_number, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (user_id) DO UPDATE SET
                session_name = excluded.session_name,
                status = excluded.status,
                phone_number = COALESCE(excluded.phone_number, whatsapp_connections.phone_number),
                updated_at = excluded.updated_at
            "#,
            libsql::params![
                record.user_id.as_str(),
                record.session_name.as_str(),
                record.status.as_str(),
                nullable(record.phone_number.as_deref()),
                fmt_ts(&record.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_connection(
        &self,
        user_id: &str,
    ) -> Result<Option<ConnectionRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT user_id, session_name, status, phone_number, updated_at \
                 FROM whatsapp_connections WHERE user_id = ?1",
                libsql::params![user_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_connection(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_session_record(&self, record: &SessionRecord) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO whatsapp_sessions (user_id, session_name, status, gateway_session_id, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (user_id, session_name) DO UPDATE SET
                status = excluded.status,
                gateway_session_id = excluded.gateway_session_id,
                updated_at = excluded.updated_at
            "#,
            libsql::params![
                record.user_id.as_str(),
                record.session_name.as_str(),
                record.status.as_str(),
                record.gateway_session_id.as_str(),
                fmt_ts(&record.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_session_records(
        &self,
        user_id: &str,
    ) -> Result<Vec<SessionRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT user_id, session_name, status, gateway_session_id, updated_at \
                 FROM whatsapp_sessions WHERE user_id = ?1 ORDER BY session_name",
                libsql::params![user_id],
            )
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_session(&row)?);
        }
        Ok(records)
    }

    async fn upsert_identity_mapping(
        &self,
        mapping: &IdentityMapping,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO whatsapp_identities (identity, user_id, franchise_id, display_name, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (identity, user_id) DO UPDATE SET
                franchise_id = COALESCE(excluded.franchise_id, whatsapp_identities.franchise_id),
                display_name = COALESCE(excluded.display_name, whatsapp_identities.display_name),
                updated_at = excluded.updated_at
            "#,
            libsql::params![
                mapping.identity.as_str(),
                mapping.user_id.as_str(),
                nullable(mapping.franchise_id.as_deref()),
                nullable(mapping.display_name.as_deref()),
                fmt_ts(&mapping.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_identity_mappings(
        &self,
        user_id: &str,
    ) -> Result<Vec<IdentityMapping>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT identity, user_id, franchise_id, display_name, updated_at \
                 FROM whatsapp_identities WHERE user_id = ?1 ORDER BY identity",
                libsql::params![user_id],
            )
            .await?;
        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push(row_to_identity(&row)?);
        }
        Ok(mappings)
    }

    async fn franchise_for_user(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT franchise_id FROM franchise_members WHERE user_id = ?1",
                libsql::params![user_id],
            )
            .await?;
        Ok(match rows.next().await? {
            Some(row) => nullable_text(&row, 0)?,
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    use crate::db::libsql::LibSqlBackend;
    use crate::db::{
        ConnectionRecord, ConnectionStatus, ConnectionStore, Database, IdentityMapping,
        SessionRecord,
    };

    async fn backend(dir: &tempfile::TempDir) -> LibSqlBackend {
        let backend = LibSqlBackend::new_local(&dir.path().join("store.db"))
            .await
            .unwrap();
        backend.run_migrations().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn connection_upsert_keeps_one_row_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let db = backend(&dir).await;
        let first = Utc::now() - Duration::minutes(5);

        db.upsert_connection(&ConnectionRecord {
            user_id: "user-1".into(),
            session_name: "user-1".into(),
            status: ConnectionStatus::Connecting,
            phone_number: Some("5511987654321".into()),
            updated_at: first,
        })
        .await
        .unwrap();

        let later = Utc::now();
        db.upsert_connection(&ConnectionRecord {
            user_id: "user-1".into(),
            session_name: "user-1".into(),
            status: ConnectionStatus::Connected,
            phone_number: None,
            updated_at: later,
        })
        .await
        .unwrap();

        let stored = db.get_connection("user-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Connected);
        assert_eq!(stored.phone_number.as_deref(), Some("5511987654321"));
        assert_eq!(stored.updated_at.timestamp_millis(), later.timestamp_millis());
        assert!(db.get_connection("user-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_records_are_keyed_by_user_and_session() {
        let dir = tempfile::tempdir().unwrap();
        let db = backend(&dir).await;

        for status in ["STARTING", "SCAN_QR_CODE", "SCAN_QR_CODE"] {
            db.upsert_session_record(&SessionRecord {
                user_id: "user-1".into(),
                session_name: "user-1".into(),
                status: status.into(),
                gateway_session_id: "user-1".into(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        db.upsert_session_record(&SessionRecord {
            user_id: "user-1".into(),
            session_name: "backup".into(),
            status: "WORKING".into(),
            gateway_session_id: "backup".into(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

        let records = db.list_session_records("user-1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].session_name, "backup");
        assert_eq!(records[1].status, "SCAN_QR_CODE");
    }

    #[tokio::test]
    async fn identity_upsert_is_idempotent_and_keeps_known_fields() {
        let dir = tempfile::tempdir().unwrap();
        let db = backend(&dir).await;

        let conn = db.connect().await.unwrap();
        conn.execute(
            "INSERT INTO franchise_members (user_id, franchise_id) VALUES (?1, ?2)",
            libsql::params!["user-1", "franchise-9"],
        )
        .await
        .unwrap();
        let franchise = db.franchise_for_user("user-1").await.unwrap();
        assert_eq!(franchise.as_deref(), Some("franchise-9"));
        assert_eq!(db.franchise_for_user("user-2").await.unwrap(), None);

        let mapping = IdentityMapping {
            identity: "5511987654321@c.us".into(),
            user_id: "user-1".into(),
            franchise_id: franchise,
            display_name: Some("Loja Centro".into()),
            updated_at: Utc::now(),
        };
        db.upsert_identity_mapping(&mapping).await.unwrap();
        db.upsert_identity_mapping(&IdentityMapping {
            display_name: None,
            ..mapping.clone()
        })
        .await
        .unwrap();

        let stored = db.list_identity_mappings("user-1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].display_name.as_deref(), Some("Loja Centro"));
        assert_eq!(stored[0].franchise_id.as_deref(), Some("franchise-9"));
    }
}
