//! PostgreSQL vocabulary store
//!
//! Backs the surrogate key catalog with six tables:
//! `resource_type`, `search_param`, `claim_type`, `compartment_type`,
//! `coding_system` and `quantity_code`.

use super::traits::{StatusUpdate, StoredVocabularies, VocabularyStore};
use crate::catalog::{normalize_value, UnboundedVocabulary, Vocabulary};
use crate::metrics;
use crate::vocabulary::{SearchParameterStatus, VocabularySnapshot};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PostgresVocabularyStore {
    pool: PgPool,
    max_create_retries: u32,
}

impl PostgresVocabularyStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_create_retries: 5,
        }
    }

    pub fn with_max_create_retries(mut self, retries: u32) -> Self {
        self.max_create_retries = retries;
        self
    }

    async fn insert_missing(
        tx: &mut Transaction<'_, Postgres>,
        vocabulary: Vocabulary,
        desired: &[String],
    ) -> Result<u64> {
        if desired.is_empty() {
            return Ok(0);
        }

        let table = vocabulary.table_name();
        let column = vocabulary.key_column();

        // Exclusive mode still admits plain readers but serializes every
        // writer, including other processes running the same reconcile.
        sqlx::query(&format!("LOCK TABLE {table} IN EXCLUSIVE MODE"))
            .execute(&mut **tx)
            .await
            .map_err(Error::StoreUnavailable)?;

        let inserted = sqlx::query(&format!(
            "INSERT INTO {table} ({column})
             SELECT {column} FROM UNNEST($1::text[]) AS desired({column})
             EXCEPT
             SELECT {column} FROM {table}"
        ))
        .bind(desired)
        .execute(&mut **tx)
        .await
        .map_err(Error::StoreUnavailable)?
        .rows_affected();

        if inserted > 0 {
            tracing::info!(table, inserted, "Registered new vocabulary members");
        }
        Ok(inserted)
    }

    async fn load_rows<I>(
        tx: &mut Transaction<'_, Postgres>,
        vocabulary: Vocabulary,
    ) -> Result<Vec<(I, String)>>
    where
        I: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres> + Send + Unpin,
    {
        sqlx::query_as::<_, (I, String)>(&format!(
            "SELECT {id}, {key} FROM {table} ORDER BY {id}",
            id = vocabulary.id_column(),
            key = vocabulary.key_column(),
            table = vocabulary.table_name(),
        ))
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::StoreUnavailable)
    }

    async fn get_or_create_once(&self, vocabulary: UnboundedVocabulary, value: &str) -> Result<i32> {
        let table = vocabulary.table_name();
        let id_column = vocabulary.id_column();

        let mut tx = self.pool.begin().await.map_err(Error::StoreUnavailable)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(Error::StoreUnavailable)?;

        let normalized = normalize_value(value);
        let existing = sqlx::query_scalar::<_, i32>(&format!(
            "SELECT {id_column} FROM {table} WHERE value_normalized = $1 FOR UPDATE"
        ))
        .bind(&normalized)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::StoreUnavailable)?;

        let id = match existing {
            Some(id) => id,
            None => sqlx::query_scalar::<_, i32>(&format!(
                "INSERT INTO {table} (value, value_normalized) VALUES ($1, $2) RETURNING {id_column}"
            ))
            .bind(value)
            .bind(&normalized)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::StoreUnavailable)?,
        };

        tx.commit().await.map_err(Error::StoreUnavailable)?;
        Ok(id)
    }
}

/// Conflicts a concurrent registration of the same value can raise; the
/// transaction can simply be repeated and will then see the winner's row.
fn is_registration_conflict(err: &Error) -> bool {
    matches!(
        err.sqlstate().as_deref(),
        Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | UNIQUE_VIOLATION)
    )
}

fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(5 * u64::from(attempt.min(10)))
}

#[async_trait]
impl VocabularyStore for PostgresVocabularyStore {
    async fn reconcile(&self, desired: &VocabularySnapshot) -> Result<StoredVocabularies> {
        let mut tx = self.pool.begin().await.map_err(Error::StoreUnavailable)?;

        // Fixed lock order across processes.
        Self::insert_missing(&mut tx, Vocabulary::ResourceType, &desired.resource_types).await?;
        Self::insert_missing(
            &mut tx,
            Vocabulary::SearchParam,
            &desired.search_parameter_uris(),
        )
        .await?;
        Self::insert_missing(&mut tx, Vocabulary::ClaimType, &desired.claim_types).await?;
        Self::insert_missing(
            &mut tx,
            Vocabulary::CompartmentType,
            &desired.compartment_types,
        )
        .await?;

        let resource_types = Self::load_rows::<i16>(&mut tx, Vocabulary::ResourceType).await?;
        let search_params = Self::load_rows::<i16>(&mut tx, Vocabulary::SearchParam).await?;
        let claim_types = narrow_ids(
            Vocabulary::ClaimType,
            Self::load_rows::<i16>(&mut tx, Vocabulary::ClaimType).await?,
        )?;
        let compartment_types = narrow_ids(
            Vocabulary::CompartmentType,
            Self::load_rows::<i16>(&mut tx, Vocabulary::CompartmentType).await?,
        )?;
        let systems = Self::load_rows::<i32>(&mut tx, Vocabulary::System).await?;
        let quantity_codes = Self::load_rows::<i32>(&mut tx, Vocabulary::QuantityCode).await?;

        tx.commit().await.map_err(Error::StoreUnavailable)?;

        Ok(StoredVocabularies {
            resource_types,
            search_params,
            claim_types,
            compartment_types,
            systems,
            quantity_codes,
        })
    }

    async fn get_or_create(&self, vocabulary: UnboundedVocabulary, value: &str) -> Result<i32> {
        let mut attempt = 0;
        loop {
            match self.get_or_create_once(vocabulary, value).await {
                Ok(id) => return Ok(id),
                Err(e) if is_registration_conflict(&e) && attempt < self.max_create_retries => {
                    attempt += 1;
                    metrics::CATALOG_CREATE_RETRIES_TOTAL
                        .with_label_values(&[vocabulary.vocabulary().as_str()])
                        .inc();
                    tracing::debug!(
                        table = vocabulary.table_name(),
                        attempt,
                        sqlstate = ?e.sqlstate(),
                        "Retrying get-or-create after concurrent registration"
                    );
                    tokio::time::sleep(retry_backoff(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn sync_search_parameter_statuses(
        &self,
        statuses: &[SearchParameterStatus],
    ) -> Result<StatusUpdate> {
        let mut tx = self.pool.begin().await.map_err(Error::StoreUnavailable)?;

        let synced_at = sqlx::query_scalar::<_, DateTime<Utc>>("SELECT now()")
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::StoreUnavailable)?;

        let mut uris = Vec::with_capacity(statuses.len());
        let mut kinds = Vec::with_capacity(statuses.len());
        let mut partial = Vec::with_capacity(statuses.len());
        for status in statuses {
            uris.push(status.uri.to_string());
            kinds.push(status.status.as_str().to_string());
            partial.push(status.is_partially_supported);
        }

        let updated = if uris.is_empty() {
            0
        } else {
            sqlx::query(
                "UPDATE search_param AS sp
                 SET status = s.status,
                     last_updated = $4,
                     is_partially_supported = s.is_partially_supported
                 FROM UNNEST($1::text[], $2::text[], $3::bool[])
                      AS s(uri, status, is_partially_supported)
                 WHERE sp.uri = s.uri",
            )
            .bind(&uris)
            .bind(&kinds)
            .bind(&partial)
            .bind(synced_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::StoreUnavailable)?
            .rows_affected()
        };

        tx.commit().await.map_err(Error::StoreUnavailable)?;

        Ok(StatusUpdate { updated, synced_at })
    }
}

/// Claim and compartment ids are stored as SMALLINT but bounded to one byte.
fn narrow_ids(vocabulary: Vocabulary, rows: Vec<(i16, String)>) -> Result<Vec<(u8, String)>> {
    rows.into_iter()
        .map(|(id, key)| match u8::try_from(id) {
            Ok(narrowed) => Ok((narrowed, key)),
            Err(_) => Err(Error::InvalidVocabulary(format!(
                "{} '{}' has id {} outside 0..=255",
                vocabulary, key, id
            ))),
        })
        .collect()
}
