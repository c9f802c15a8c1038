//! Versioning of forms and collections.
//!
//! Before a versioned record changes, its current state is written to the
//! backup table. Changes then ripple outward: a record that becomes restricted
//! restricts what contains it, and a collection whose contents change (or
//! whose referenced form or collection disappears) is re-unpacked, along with
//! every collection that embeds it.

pub mod references;

use std::collections::{HashMap, HashSet, VecDeque};

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::db::{
    existing_ids, load_collection, load_file, load_form, replace_links, restricted_tag,
};
use crate::errors::AppError;
use crate::models::{time, Collection, Form, UserMini, RESTRICTED_TAG};

use references::{
    collection_ids, collection_reference_pattern, form_ids, form_reference_pattern, strip_collection,
    strip_form, unpack,
};

/// Write the current state of `form` to `form_backups`.
pub(crate) async fn backup_form(
    conn: &mut SqliteConnection,
    form: &Form,
    backuper: &UserMini,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO form_backups (form_id, uuid, datetime_modified, backuper, snapshot) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(form.id)
    .bind(&form.uuid)
    .bind(&form.snapshot.datetime_modified)
    .bind(serde_json::to_string(backuper)?)
    .bind(serde_json::to_string(&form.snapshot)?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Write the current state of `collection` to `collection_backups`.
pub(crate) async fn backup_collection(
    conn: &mut SqliteConnection,
    collection: &Collection,
    backuper: &UserMini,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO collection_backups (collection_id, uuid, datetime_modified, backuper, snapshot) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(collection.id)
    .bind(&collection.uuid)
    .bind(&collection.snapshot.datetime_modified)
    .bind(serde_json::to_string(backuper)?)
    .bind(serde_json::to_string(&collection.snapshot)?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Does any record among `ids` carry the restricted tag?
///
/// `link_table` and `owner_column` name the tag link of the records' model.
pub(crate) async fn any_restricted(
    conn: &mut SqliteConnection,
    link_table: &str,
    owner_column: &str,
    ids: &[i64],
) -> Result<bool, AppError> {
    if ids.is_empty() {
        return Ok(false);
    }
    let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "SELECT COUNT(*) FROM {link} l JOIN tags t ON t.id = l.tag_id WHERE t.name = ",
        link = link_table
    ));
    builder.push_bind(RESTRICTED_TAG);
    builder.push(format!(" AND l.{} IN (", owner_column));
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let count: i64 = builder.build_query_scalar().fetch_one(&mut *conn).await?;
    Ok(count > 0)
}

/// Restriction checks fail closed: an error counts as restricted.
pub(crate) fn restricted_or_closed(result: Result<bool, AppError>, what: &str) -> bool {
    match result {
        Ok(restricted) => restricted,
        Err(e) => {
            tracing::warn!("Could not determine restriction of {}: {}", what, e);
            true
        }
    }
}

/// A collection reachable through textual references.
#[derive(Debug, Clone)]
pub(crate) struct ReferencedCollection {
    pub contents: String,
    pub enterer_id: Option<i64>,
    pub restricted: bool,
}

/// Load every collection reachable from `contents` by following references.
///
/// Missing collections are left out of the map; `unpack` reports them.
pub(crate) async fn reference_graph(
    conn: &mut SqliteConnection,
    contents: &str,
) -> Result<HashMap<i64, ReferencedCollection>, AppError> {
    let mut graph = HashMap::new();
    let mut seen = HashSet::new();
    let mut queue: VecDeque<i64> = collection_ids(contents).into();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let row: Option<(String, Option<i64>)> =
            sqlx::query_as("SELECT contents, enterer_id FROM collections WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        let Some((contents, enterer_id)) = row else {
            continue;
        };
        let restricted = restricted_or_closed(
            any_restricted(conn, "collection_tags", "collection_id", &[id]).await,
            "a referenced collection",
        );
        queue.extend(collection_ids(&contents));
        graph.insert(
            id,
            ReferencedCollection {
                contents,
                enterer_id,
                restricted,
            },
        );
    }
    Ok(graph)
}

/// Raw contents by id, the shape `unpack` consumes.
pub(crate) fn contents_lookup(graph: &HashMap<i64, ReferencedCollection>) -> HashMap<i64, String> {
    graph
        .iter()
        .map(|(id, node)| (*id, node.contents.clone()))
        .collect()
}

/// A record that restriction can spread to or from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Dependent {
    File(i64),
    Form(i64),
    Collection(i64),
}

/// Records that contain `record` and so inherit its restriction.
async fn dependents(
    conn: &mut SqliteConnection,
    record: Dependent,
) -> Result<Vec<Dependent>, AppError> {
    let mut found = Vec::new();
    match record {
        Dependent::File(id) => {
            let children: Vec<i64> =
                sqlx::query_scalar("SELECT id FROM files WHERE parent_file_id = ? ORDER BY id")
                    .bind(id)
                    .fetch_all(&mut *conn)
                    .await?;
            found.extend(children.into_iter().map(Dependent::File));

            let forms: Vec<i64> =
                sqlx::query_scalar("SELECT form_id FROM form_files WHERE file_id = ? ORDER BY form_id")
                    .bind(id)
                    .fetch_all(&mut *conn)
                    .await?;
            found.extend(forms.into_iter().map(Dependent::Form));

            let collections: Vec<i64> = sqlx::query_scalar(
                "SELECT collection_id FROM collection_files WHERE file_id = ? ORDER BY collection_id",
            )
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
            found.extend(collections.into_iter().map(Dependent::Collection));
        }
        Dependent::Form(id) => {
            let collections: Vec<i64> = sqlx::query_scalar(
                "SELECT collection_id FROM collection_forms WHERE form_id = ? ORDER BY collection_id",
            )
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
            found.extend(collections.into_iter().map(Dependent::Collection));
        }
        Dependent::Collection(id) => {
            found.extend(
                referencing_collections(conn, id)
                    .await?
                    .into_iter()
                    .map(Dependent::Collection),
            );
        }
    }
    Ok(found)
}

/// Collections whose contents reference collection `id` directly.
pub(crate) async fn referencing_collections(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar(
        "SELECT id FROM collections WHERE contents REGEXP ? AND id <> ? ORDER BY id",
    )
    .bind(collection_reference_pattern(id))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Collections whose contents reference form `id` directly.
async fn collections_referencing_form(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar("SELECT id FROM collections WHERE contents REGEXP ? ORDER BY id")
        .bind(form_reference_pattern(id))
        .fetch_all(&mut *conn)
        .await?;
    Ok(ids)
}

/// Tag every record that (transitively) contains `origin` as restricted.
///
/// Each versioned record is backed up before it gains the tag. A record that
/// is already restricted ends its branch. Returns how many records changed.
pub(crate) async fn propagate_restriction(
    conn: &mut SqliteConnection,
    origin: Dependent,
    backuper: &UserMini,
) -> Result<usize, AppError> {
    let tag = restricted_tag(conn).await?;
    let mut seen = HashSet::from([origin]);
    let mut queue: VecDeque<Dependent> = dependents(conn, origin).await?.into();
    let mut changed = 0;

    while let Some(record) = queue.pop_front() {
        if !seen.insert(record) {
            continue;
        }
        if restrict(conn, record, tag.id, backuper).await? {
            changed += 1;
            queue.extend(dependents(conn, record).await?);
        }
    }

    if changed > 0 {
        tracing::info!("Restriction of {:?} spread to {} records", origin, changed);
    }
    Ok(changed)
}

async fn restrict(
    conn: &mut SqliteConnection,
    record: Dependent,
    tag_id: i64,
    backuper: &UserMini,
) -> Result<bool, AppError> {
    match record {
        Dependent::Form(id) => {
            let Some(form) = load_form(conn, id).await? else {
                return Ok(false);
            };
            if form.snapshot.is_restricted() {
                return Ok(false);
            }
            backup_form(conn, &form, backuper).await?;
            sqlx::query("INSERT OR IGNORE INTO form_tags (form_id, tag_id) VALUES (?, ?)")
                .bind(id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
            sqlx::query("UPDATE forms SET datetime_modified = ? WHERE id = ?")
                .bind(time::next_modified(&form.snapshot.datetime_modified))
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
        Dependent::Collection(id) => {
            let Some(collection) = load_collection(conn, id).await? else {
                return Ok(false);
            };
            if collection.snapshot.is_restricted() {
                return Ok(false);
            }
            backup_collection(conn, &collection, backuper).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO collection_tags (collection_id, tag_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
            sqlx::query("UPDATE collections SET datetime_modified = ? WHERE id = ?")
                .bind(time::next_modified(&collection.snapshot.datetime_modified))
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
        Dependent::File(id) => {
            let Some(file) = load_file(conn, id).await? else {
                return Ok(false);
            };
            if file.is_restricted() {
                return Ok(false);
            }
            sqlx::query("INSERT OR IGNORE INTO file_tags (file_id, tag_id) VALUES (?, ?)")
                .bind(id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
            sqlx::query("UPDATE files SET datetime_modified = ? WHERE id = ?")
                .bind(time::next_modified(&file.datetime_modified))
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(true)
}

/// A reference to remove while re-unpacking a collection.
#[derive(Debug, Clone, Copy)]
enum Strip {
    Form(i64),
    Collection(i64),
}

/// Re-derive a collection's unpacked contents and form list, optionally
/// removing a reference first. The collection is backed up only when
/// something actually changes.
///
/// Returns whether the collection changed and whether it became restricted.
async fn recompute_collection(
    conn: &mut SqliteConnection,
    id: i64,
    strip: Option<Strip>,
    backuper: &UserMini,
) -> Result<(bool, bool), AppError> {
    let Some(collection) = load_collection(conn, id).await? else {
        return Ok((false, false));
    };
    let old = &collection.snapshot;
    let contents = match strip {
        Some(Strip::Form(form_id)) => strip_form(&old.contents, form_id),
        Some(Strip::Collection(collection_id)) => strip_collection(&old.contents, collection_id),
        None => old.contents.clone(),
    };

    let graph = reference_graph(conn, &contents).await?;
    let unpacked = match unpack(&contents, Some(id), &contents_lookup(&graph)) {
        Ok(unpacked) => unpacked,
        Err(e) => {
            tracing::warn!("Collection {} could not be re-unpacked: {}", id, e);
            return Ok((false, false));
        }
    };
    let form_ids = existing_ids(conn, "forms", &form_ids(&unpacked)).await?;
    let old_form_ids: Vec<i64> = old.forms.iter().map(|f| f.id).collect();

    let mut sorted_ids = form_ids.clone();
    sorted_ids.sort_unstable();
    if contents == old.contents && unpacked == old.contents_unpacked && sorted_ids == old_form_ids
    {
        return Ok((false, false));
    }

    backup_collection(conn, &collection, backuper).await?;
    sqlx::query(
        "UPDATE collections SET contents = ?, contents_unpacked = ?, datetime_modified = ? WHERE id = ?",
    )
    .bind(&contents)
    .bind(&unpacked)
    .bind(time::next_modified(&old.datetime_modified))
    .bind(id)
    .execute(&mut *conn)
    .await?;
    replace_links(conn, "collection_forms", "collection_id", "form_id", id, &form_ids).await?;

    let mut became_restricted = false;
    if !old.is_restricted() {
        let inherited = graph.values().any(|node| node.restricted)
            || restricted_or_closed(
                any_restricted(conn, "form_tags", "form_id", &form_ids).await,
                "the forms of a collection",
            );
        if inherited {
            let tag = restricted_tag(conn).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO collection_tags (collection_id, tag_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(tag.id)
            .execute(&mut *conn)
            .await?;
            became_restricted = true;
        }
    }
    Ok((true, became_restricted))
}

/// Recomputations allowed per collection in one refresh. Reference cycles
/// are rejected on write, so a refresh settles well before this.
const MAX_REFRESH_PASSES: usize = 64;

/// Re-unpack every collection that (transitively) embeds collection `changed`.
pub(crate) async fn refresh_referencing(
    conn: &mut SqliteConnection,
    changed: i64,
    backuper: &UserMini,
) -> Result<(), AppError> {
    let skip = HashSet::from([changed]);
    let queue: VecDeque<i64> = referencing_collections(conn, changed).await?.into();
    refresh_queue(conn, queue, &skip, None, backuper).await
}

/// Recompute the queued collections until nothing changes. A collection is
/// queued again whenever a collection it embeds changes, even if it was
/// already recomputed.
async fn refresh_queue(
    conn: &mut SqliteConnection,
    mut queue: VecDeque<i64>,
    skip: &HashSet<i64>,
    strip: Option<Strip>,
    backuper: &UserMini,
) -> Result<(), AppError> {
    let mut restricted = Vec::new();
    let mut passes: HashMap<i64, usize> = HashMap::new();
    let mut pending: HashSet<i64> = queue.iter().copied().collect();
    // Only the first hop removes the deleted reference.
    let mut direct: HashSet<i64> = queue.iter().copied().collect();

    while let Some(id) = queue.pop_front() {
        pending.remove(&id);
        if skip.contains(&id) {
            continue;
        }
        let count = passes.entry(id).or_default();
        *count += 1;
        if *count > MAX_REFRESH_PASSES {
            tracing::warn!("Collection {} did not settle while refreshing references", id);
            continue;
        }

        let strip_here = if direct.remove(&id) { strip } else { None };
        let (changed, became_restricted) =
            recompute_collection(conn, id, strip_here, backuper).await?;
        if became_restricted {
            restricted.push(id);
        }
        if changed {
            for referencer in referencing_collections(conn, id).await? {
                if pending.insert(referencer) {
                    queue.push_back(referencer);
                }
            }
        }
    }

    for id in restricted {
        propagate_restriction(conn, Dependent::Collection(id), backuper).await?;
    }
    Ok(())
}

/// Remove references to a form that is being deleted.
pub(crate) async fn detach_form(
    conn: &mut SqliteConnection,
    form_id: i64,
    backuper: &UserMini,
) -> Result<(), AppError> {
    let queue: VecDeque<i64> = collections_referencing_form(conn, form_id).await?.into();
    refresh_queue(conn, queue, &HashSet::new(), Some(Strip::Form(form_id)), backuper).await?;

    sqlx::query("DELETE FROM collection_forms WHERE form_id = ?")
        .bind(form_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Unlink a file that is being deleted from the forms and collections that
/// use it. Each of them is backed up and gets a new modification time.
pub(crate) async fn detach_file(
    conn: &mut SqliteConnection,
    file_id: i64,
    backuper: &UserMini,
) -> Result<(), AppError> {
    let form_ids: Vec<i64> =
        sqlx::query_scalar("SELECT form_id FROM form_files WHERE file_id = ? ORDER BY form_id")
            .bind(file_id)
            .fetch_all(&mut *conn)
            .await?;
    for id in form_ids {
        let Some(form) = load_form(conn, id).await? else {
            continue;
        };
        backup_form(conn, &form, backuper).await?;
        sqlx::query("DELETE FROM form_files WHERE form_id = ? AND file_id = ?")
            .bind(id)
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("UPDATE forms SET datetime_modified = ? WHERE id = ?")
            .bind(time::next_modified(&form.snapshot.datetime_modified))
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    let collection_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT collection_id FROM collection_files WHERE file_id = ? ORDER BY collection_id",
    )
    .bind(file_id)
    .fetch_all(&mut *conn)
    .await?;
    for id in collection_ids {
        let Some(collection) = load_collection(conn, id).await? else {
            continue;
        };
        backup_collection(conn, &collection, backuper).await?;
        sqlx::query("DELETE FROM collection_files WHERE collection_id = ? AND file_id = ?")
            .bind(id)
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("UPDATE collections SET datetime_modified = ? WHERE id = ?")
            .bind(time::next_modified(&collection.snapshot.datetime_modified))
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Remove references to a collection that is being deleted.
pub(crate) async fn detach_collection(
    conn: &mut SqliteConnection,
    collection_id: i64,
    backuper: &UserMini,
) -> Result<(), AppError> {
    let queue: VecDeque<i64> = referencing_collections(conn, collection_id).await?.into();
    let skip = HashSet::from([collection_id]);
    refresh_queue(
        conn,
        queue,
        &skip,
        Some(Strip::Collection(collection_id)),
        backuper,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    async fn pool() -> (TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    async fn insert_collection(pool: &SqlitePool, contents: &str) -> i64 {
        let now = time::now();
        sqlx::query(
            "INSERT INTO collections (uuid, title, contents, contents_unpacked, datetime_entered, datetime_modified) VALUES (?, 't', ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(contents)
        .bind(contents)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    fn backuper() -> UserMini {
        UserMini {
            id: 1,
            first_name: "Ada".into(),
            last_name: "L".into(),
            role: "administrator".into(),
        }
    }

    #[tokio::test]
    async fn test_reference_graph_follows_nested_references() {
        let (_dir, pool) = pool().await;
        let c = insert_collection(&pool, "leaf").await;
        let b = insert_collection(&pool, &format!("mid collection[{}]", c)).await;
        let mut conn = pool.acquire().await.unwrap();

        let graph = reference_graph(&mut conn, &format!("top collection({}) collection[999]", b))
            .await
            .unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.contains_key(&b) && graph.contains_key(&c));
        assert!(!graph[&c].restricted);
    }

    #[tokio::test]
    async fn test_any_restricted() {
        let (_dir, pool) = pool().await;
        let c = insert_collection(&pool, "").await;
        let mut conn = pool.acquire().await.unwrap();
        assert!(!any_restricted(&mut conn, "collection_tags", "collection_id", &[c])
            .await
            .unwrap());

        let tag = restricted_tag(&mut conn).await.unwrap();
        sqlx::query("INSERT INTO collection_tags (collection_id, tag_id) VALUES (?, ?)")
            .bind(c)
            .bind(tag.id)
            .execute(&mut *conn)
            .await
            .unwrap();
        assert!(any_restricted(&mut conn, "collection_tags", "collection_id", &[c, 42])
            .await
            .unwrap());
        assert!(!any_restricted(&mut conn, "collection_tags", "collection_id", &[])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_detach_collection_strips_and_backs_up_referencers() {
        let (_dir, pool) = pool().await;
        let child = insert_collection(&pool, "child").await;
        let parent = insert_collection(&pool, &format!("p collection[{}]", child)).await;
        let mut conn = pool.acquire().await.unwrap();

        detach_collection(&mut conn, child, &backuper()).await.unwrap();

        let parent = load_collection(&mut conn, parent).await.unwrap().unwrap();
        assert_eq!(parent.snapshot.contents, "p ");
        let backups: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM collection_backups WHERE collection_id = ?")
                .bind(parent.id)
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(backups, 1);
    }

    #[tokio::test]
    async fn test_detach_form_rechecks_collections_after_what_they_embed_changes() {
        let (_dir, pool) = pool().await;
        let outer = insert_collection(&pool, "form[1]").await;
        let inner = insert_collection(&pool, "form[1]").await;
        sqlx::query("UPDATE collections SET contents = ?, contents_unpacked = ? WHERE id = ?")
            .bind(format!("form[1] collection[{}]", inner))
            .bind("form[1] form[1]")
            .bind(outer)
            .execute(&pool)
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();

        detach_form(&mut conn, 1, &backuper()).await.unwrap();

        let outer = load_collection(&mut conn, outer).await.unwrap().unwrap();
        assert_eq!(outer.snapshot.contents, format!(" collection[{}]", inner));
        assert!(!outer.snapshot.contents_unpacked.contains("form[1]"));
        assert!(outer.snapshot.forms.is_empty());

        let inner = load_collection(&mut conn, inner).await.unwrap().unwrap();
        assert_eq!(inner.snapshot.contents, "");
        assert_eq!(inner.snapshot.contents_unpacked, "");
    }

    #[tokio::test]
    async fn test_propagation_stops_at_restricted_records() {
        let (_dir, pool) = pool().await;
        let inner = insert_collection(&pool, "").await;
        let outer = insert_collection(&pool, &format!("collection[{}]", inner)).await;
        let mut conn = pool.acquire().await.unwrap();

        let changed = propagate_restriction(&mut conn, Dependent::Collection(inner), &backuper())
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let outer_record = load_collection(&mut conn, outer).await.unwrap().unwrap();
        assert!(outer_record.snapshot.is_restricted());

        let changed = propagate_restriction(&mut conn, Dependent::Collection(inner), &backuper())
            .await
            .unwrap();
        assert_eq!(changed, 0);
    }
}
