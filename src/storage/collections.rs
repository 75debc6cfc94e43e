//! Collection persistence: named groups of (test, browser, urlDomain)
//! tuples, the fan-out source for bulk run submission.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::model::{CollectionDetail, CollectionInput, CollectionSummary, CollectionTestRow};
use crate::storage::runs::status_from_str;
use crate::storage::Pool;

#[derive(Clone)]
pub struct CollectionStore {
    pool: Pool,
}

impl CollectionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// All collections of an organization with tuple counts, ordered by
    /// name.
    pub fn list(&self, organization: i64) -> Result<Vec<CollectionSummary>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT c.uid, c.name, c.description,
                    (SELECT COUNT(*) FROM collections_tests ct WHERE ct.collection = c.id) AS test_count
             FROM collections c
             WHERE c.organization = ?1
             ORDER BY c.name ASC",
        )?;
        let rows = stmt.query_map([organization], |row| {
            Ok(CollectionSummary {
                uid: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                test_count: row.get(3)?,
            })
        })?;

        let mut collections = Vec::new();
        for row in rows {
            collections.push(row?);
        }
        Ok(collections)
    }

    /// One collection with its tuples, each joined with the latest run
    /// for that exact (test, browser, urlDomain) combination.
    pub fn get(&self, organization: i64, uid: &str) -> Result<Option<CollectionDetail>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, uid, name, description FROM collections
                 WHERE uid = ?1 AND organization = ?2",
                params![uid, organization],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((collection_id, uid, name, description)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT ct.test, ct.browser, ct.url_domain,
                    (SELECT r.uid FROM runs r
                     WHERE r.organization = ?1 AND r.test = ct.test
                       AND r.browser = ct.browser AND r.url_domain = ct.url_domain
                     ORDER BY r.created DESC, r.id DESC LIMIT 1) AS run_uid,
                    (SELECT r.status FROM runs r
                     WHERE r.organization = ?1 AND r.test = ct.test
                       AND r.browser = ct.browser AND r.url_domain = ct.url_domain
                     ORDER BY r.created DESC, r.id DESC LIMIT 1) AS run_status
             FROM collections_tests ct
             WHERE ct.collection = ?2
             ORDER BY ct.id ASC",
        )?;
        let rows = stmt.query_map(params![organization, collection_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut tests = Vec::new();
        for row in rows {
            let (test, browser, url_domain, run_uid, run_status) = row?;
            tests.push(CollectionTestRow {
                test,
                browser,
                url_domain,
                run_uid,
                run_status: run_status.as_deref().map(status_from_str).transpose()?,
            });
        }

        Ok(Some(CollectionDetail {
            uid,
            name,
            description,
            tests,
        }))
    }

    /// Insert a collection and its tuples in one transaction.
    pub fn create(&self, organization: i64, input: &CollectionInput) -> Result<CollectionDetail> {
        let uid = Uuid::new_v4().to_string();
        {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO collections (uid, organization, name, description)
                 VALUES (?1, ?2, ?3, ?4)",
                params![uid, organization, input.name, input.description],
            )?;
            let collection_id = tx.last_insert_rowid();
            insert_tuples(&tx, collection_id, input)?;
            tx.commit()?;
        }
        self.get(organization, &uid)?
            .ok_or_else(|| anyhow::anyhow!("collection vanished after insert: {uid}"))
    }

    /// Replace a collection's fields and tuples. Returns `None` when the
    /// uid does not resolve within the organization.
    pub fn update(
        &self,
        organization: i64,
        uid: &str,
        input: &CollectionInput,
    ) -> Result<Option<CollectionDetail>> {
        {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;
            let collection_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM collections WHERE uid = ?1 AND organization = ?2",
                    params![uid, organization],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(collection_id) = collection_id else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE collections SET name = ?2, description = ?3 WHERE id = ?1",
                params![collection_id, input.name, input.description],
            )?;
            tx.execute(
                "DELETE FROM collections_tests WHERE collection = ?1",
                [collection_id],
            )?;
            insert_tuples(&tx, collection_id, input)?;
            tx.commit()?;
        }
        self.get(organization, uid)
    }

    /// Delete a collection (tuples cascade). Returns the number of
    /// deleted rows.
    pub fn delete(&self, organization: i64, uid: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM collections WHERE uid = ?1 AND organization = ?2",
            params![uid, organization],
        )?;
        Ok(deleted)
    }

    /// The (test, browser, urlDomain) tuples of a collection, for bulk
    /// run fan-out. `None` when the collection does not resolve.
    pub fn tuples(
        &self,
        organization: i64,
        uid: &str,
    ) -> Result<Option<Vec<(String, String, String)>>> {
        let conn = self.pool.get()?;
        let collection_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM collections WHERE uid = ?1 AND organization = ?2",
                params![uid, organization],
                |row| row.get(0),
            )
            .optional()?;
        let Some(collection_id) = collection_id else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT test, browser, url_domain FROM collections_tests
             WHERE collection = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([collection_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        let mut tuples = Vec::new();
        for row in rows {
            tuples.push(row?);
        }
        Ok(Some(tuples))
    }
}

fn insert_tuples(
    tx: &rusqlite::Transaction<'_>,
    collection_id: i64,
    input: &CollectionInput,
) -> Result<()> {
    for tuple in &input.tests {
        tx.execute(
            "INSERT INTO collections_tests (collection, test, browser, url_domain)
             VALUES (?1, ?2, ?3, ?4)",
            params![collection_id, tuple.test, tuple.browser, tuple.url_domain],
        )?;
    }
    Ok(())
}
