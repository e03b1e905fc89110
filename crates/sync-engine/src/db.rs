use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Object, deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    scoped_futures::ScopedFutureExt,
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use shared_types::{Account, MeetingFields, MeetingOrigin, MeetingRecord, NewMeetingRecord};
use uuid::Uuid;

use crate::models::{AccountRow, MeetingFieldsChangeset, MeetingRow, NewMeetingRow};
use crate::schema::{accounts, meeting_records};
use crate::store::Store;

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    // Drive the connection on its own task
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "database connection error");
        }
    });

    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool(database_url: &str) -> Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config)
        .build()
        .context("Failed to build database pool")?;

    Ok(pool)
}

/// Postgres-backed `Store`.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>> {
        self.pool.get().await.context("Failed to get DB connection")
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_syncable_accounts(&self) -> Result<Vec<Account>> {
        let mut conn = self.conn().await?;

        let rows = accounts::table
            .filter(accounts::calendar_connected.eq(true))
            .filter(accounts::refresh_token.is_not_null())
            .order_by(accounts::created_at.asc())
            .select(AccountRow::as_select())
            .load(&mut *conn)
            .await
            .context("Failed to list syncable accounts")?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>> {
        let mut conn = self.conn().await?;

        let row = accounts::table
            .find(account_id)
            .select(AccountRow::as_select())
            .first(&mut *conn)
            .await
            .optional()
            .context("Failed to load account")?;

        Ok(row.map(Account::from))
    }

    async fn update_credentials(
        &self,
        account_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;

        diesel::update(accounts::table.find(account_id))
            .set((
                accounts::access_token.eq(Some(access_token)),
                accounts::token_expires_at.eq(Some(expires_at)),
                accounts::updated_at.eq(Utc::now()),
            ))
            .execute(&mut *conn)
            .await
            .context("Failed to update credentials")?;

        Ok(())
    }

    async fn deauthorize(&self, account_id: Uuid) -> Result<()> {
        let mut conn = self.conn().await?;

        diesel::update(accounts::table.find(account_id))
            .set((
                accounts::calendar_connected.eq(false),
                accounts::access_token.eq(None::<String>),
                accounts::token_expires_at.eq(None::<DateTime<Utc>>),
                accounts::updated_at.eq(Utc::now()),
            ))
            .execute(&mut *conn)
            .await
            .context("Failed to deauthorize account")?;

        Ok(())
    }

    async fn find_meeting_by_external_id(
        &self,
        account_id: Uuid,
        external_event_id: &str,
    ) -> Result<Option<MeetingRecord>> {
        let mut conn = self.conn().await?;

        let row = meeting_records::table
            .filter(meeting_records::account_id.eq(account_id))
            .filter(meeting_records::external_event_id.eq(external_event_id))
            .select(MeetingRow::as_select())
            .first(&mut *conn)
            .await
            .optional()
            .context("Failed to look up meeting by external id")?;

        Ok(row.map(MeetingRecord::from))
    }

    async fn create_meeting(&self, new: NewMeetingRecord) -> Result<MeetingRecord> {
        let mut conn = self.conn().await?;

        let row = diesel::insert_into(meeting_records::table)
            .values(NewMeetingRow::from(new))
            .returning(MeetingRow::as_returning())
            .get_result(&mut *conn)
            .await
            .context("Failed to create meeting record")?;

        Ok(row.into())
    }

    async fn update_meeting_fields(&self, meeting_id: Uuid, fields: MeetingFields) -> Result<()> {
        let mut conn = self.conn().await?;

        diesel::update(meeting_records::table.find(meeting_id))
            .set(MeetingFieldsChangeset::from(fields))
            .execute(&mut *conn)
            .await
            .context("Failed to update meeting record")?;

        Ok(())
    }

    async fn delete_meeting(&self, meeting_id: Uuid) -> Result<()> {
        let mut conn = self.conn().await?;

        diesel::delete(meeting_records::table.find(meeting_id))
            .execute(&mut *conn)
            .await
            .context("Failed to delete meeting record")?;

        Ok(())
    }

    async fn list_calendar_meetings(
        &self,
        account_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MeetingRecord>> {
        let mut conn = self.conn().await?;

        let rows = meeting_records::table
            .filter(meeting_records::account_id.eq(account_id))
            .filter(meeting_records::origin.eq(MeetingOrigin::Calendar.as_str()))
            .filter(meeting_records::start_time.ge(from))
            .filter(meeting_records::start_time.le(to))
            .select(MeetingRow::as_select())
            .load(&mut *conn)
            .await
            .context("Failed to list calendar meetings")?;

        Ok(rows.into_iter().map(MeetingRecord::from).collect())
    }

    async fn list_due_meetings(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MeetingRecord>> {
        let mut conn = self.conn().await?;

        let rows = meeting_records::table
            .filter(meeting_records::bot_scheduled.eq(true))
            .filter(meeting_records::bot_sent.eq(false))
            .filter(meeting_records::join_url.is_not_null())
            .filter(meeting_records::start_time.ge(from))
            .filter(meeting_records::start_time.le(to))
            .order_by(meeting_records::start_time.asc())
            .select(MeetingRow::as_select())
            .load(&mut *conn)
            .await
            .context("Failed to list due meetings")?;

        Ok(rows.into_iter().map(MeetingRecord::from).collect())
    }

    async fn mark_bot_skipped(&self, meeting_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn().await?;

        diesel::update(meeting_records::table.find(meeting_id))
            .set((
                meeting_records::bot_sent.eq(true),
                meeting_records::bot_joined_at.eq(Some(at)),
                meeting_records::updated_at.eq(Utc::now()),
            ))
            .execute(&mut *conn)
            .await
            .context("Failed to mark meeting skipped")?;

        Ok(())
    }

    async fn record_dispatch(
        &self,
        meeting_id: Uuid,
        account_id: Uuid,
        bot_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let bot_id = bot_id.to_string();

        let marked = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    // Only an unsent record may be marked, so usage is counted once.
                    let marked = diesel::update(
                        meeting_records::table
                            .find(meeting_id)
                            .filter(meeting_records::bot_sent.eq(false)),
                    )
                    .set((
                        meeting_records::bot_sent.eq(true),
                        meeting_records::bot_id.eq(Some(bot_id)),
                        meeting_records::bot_joined_at.eq(Some(at)),
                        meeting_records::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                    if marked == 1 {
                        diesel::update(accounts::table.find(account_id))
                            .set((
                                accounts::monthly_bot_usage.eq(accounts::monthly_bot_usage + 1),
                                accounts::updated_at.eq(Utc::now()),
                            ))
                            .execute(conn)
                            .await?;
                    }

                    Ok(marked)
                }
                .scope_boxed()
            })
            .await
            .context("Failed to record dispatch")?;

        if marked == 0 {
            tracing::warn!(%meeting_id, "dispatch already recorded, usage not incremented");
        }

        Ok(())
    }
}
