//! Execution of compiled searches.
//!
//! The compiled filter is conjoined with the requester's visibility filter
//! here, so no search path can skip it. Matching ids are selected first and
//! the records hydrated afterwards.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::records::{
    load_collection, load_collection_backup, load_file, load_form, load_form_backup,
    load_form_search,
};
use super::Repository;
use crate::access::{visibility_filter, Requester};
use crate::errors::AppError;
use crate::models::{Collection, CollectionBackup, File, Form, FormBackup, FormSearch};
use crate::query::{Listing, PageInfo, Paginator, Predicate, SearchQuery};

const ROOT: &str = "root";

fn push_where(
    builder: &mut QueryBuilder<'_, Sqlite>,
    filter: Option<&Predicate>,
    visibility: Option<&Predicate>,
) {
    builder.push(" WHERE 1 = 1");
    for predicate in [filter, visibility].into_iter().flatten() {
        builder.push(" AND ");
        predicate.push_sql(builder, ROOT);
    }
}

/// The SELECT for one page (or all) of matching ids.
fn select_ids<'a>(
    query: &SearchQuery,
    visibility: Option<&Predicate>,
    paginator: Option<&Paginator>,
) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {root}.id FROM {table} AS {root}",
        root = ROOT,
        table = query.model.table()
    ));
    push_where(&mut builder, query.filter.as_ref(), visibility);
    query.order_by.push_sql(&mut builder, ROOT);
    if let Some(paginator) = paginator {
        builder.push(" LIMIT ");
        builder.push_bind(paginator.items_per_page);
        builder.push(" OFFSET ");
        builder.push_bind(paginator.offset());
    }
    builder
}

fn count_matches<'a>(query: &SearchQuery, visibility: Option<&Predicate>) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT COUNT(*) FROM {table} AS {root}",
        root = ROOT,
        table = query.model.table()
    ));
    push_where(&mut builder, query.filter.as_ref(), visibility);
    builder
}

/// Ids of the records matching `query` that `requester` may see, with page
/// information when paginated. A client-supplied count is echoed back.
async fn matching_ids(
    conn: &mut SqliteConnection,
    query: &SearchQuery,
    requester: &Requester,
    paginator: Option<&Paginator>,
) -> Result<(Vec<i64>, Option<PageInfo>), AppError> {
    let visibility = visibility_filter(query.model, requester);

    let mut select = select_ids(query, visibility.as_ref(), paginator);
    tracing::debug!("Search on {}: {}", query.model, select.sql());
    let ids: Vec<i64> = select.build_query_scalar().fetch_all(&mut *conn).await?;

    let page = match paginator {
        None => None,
        Some(paginator) => {
            let count = match paginator.count {
                Some(count) => count,
                None => {
                    let mut builder = count_matches(query, visibility.as_ref());
                    builder
                        .build_query_scalar::<i64>()
                        .fetch_one(&mut *conn)
                        .await?
                }
            };
            Some(paginator.info(count))
        }
    };
    Ok((ids, page))
}

fn listing<T>(items: Vec<T>, page: Option<PageInfo>) -> Listing<T> {
    match page {
        Some(paginator) => Listing::Page { items, paginator },
        None => Listing::All(items),
    }
}

impl Repository {
    pub async fn search_forms(
        &self,
        query: &SearchQuery,
        requester: &Requester,
        paginator: Option<&Paginator>,
    ) -> Result<Listing<Form>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let (ids, page) = matching_ids(&mut conn, query, requester, paginator).await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.extend(load_form(&mut conn, id).await?);
        }
        Ok(listing(items, page))
    }

    pub async fn search_collections(
        &self,
        query: &SearchQuery,
        requester: &Requester,
        paginator: Option<&Paginator>,
    ) -> Result<Listing<Collection>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let (ids, page) = matching_ids(&mut conn, query, requester, paginator).await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.extend(load_collection(&mut conn, id).await?);
        }
        Ok(listing(items, page))
    }

    pub async fn search_files(
        &self,
        query: &SearchQuery,
        requester: &Requester,
        paginator: Option<&Paginator>,
    ) -> Result<Listing<File>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let (ids, page) = matching_ids(&mut conn, query, requester, paginator).await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.extend(load_file(&mut conn, id).await?);
        }
        Ok(listing(items, page))
    }

    pub async fn search_form_backups(
        &self,
        query: &SearchQuery,
        requester: &Requester,
        paginator: Option<&Paginator>,
    ) -> Result<Listing<FormBackup>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let (ids, page) = matching_ids(&mut conn, query, requester, paginator).await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.extend(load_form_backup(&mut conn, id).await?);
        }
        Ok(listing(items, page))
    }

    pub async fn search_collection_backups(
        &self,
        query: &SearchQuery,
        requester: &Requester,
        paginator: Option<&Paginator>,
    ) -> Result<Listing<CollectionBackup>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let (ids, page) = matching_ids(&mut conn, query, requester, paginator).await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.extend(load_collection_backup(&mut conn, id).await?);
        }
        Ok(listing(items, page))
    }

    pub async fn search_form_searches(
        &self,
        query: &SearchQuery,
        requester: &Requester,
        paginator: Option<&Paginator>,
    ) -> Result<Listing<FormSearch>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let (ids, page) = matching_ids(&mut conn, query, requester, paginator).await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.extend(load_form_search(&mut conn, id).await?);
        }
        Ok(listing(items, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessSettings;
    use crate::models::{Role, User};
    use crate::query::OrderBy;
    use crate::schema::ModelName;
    use serde_json::json;

    fn requester(role: Role) -> Requester {
        Requester::new(
            User {
                id: 3,
                first_name: "V".into(),
                last_name: "W".into(),
                email: String::new(),
                affiliation: String::new(),
                role,
                datetime_modified: String::new(),
            },
            &AccessSettings::default(),
        )
    }

    #[test]
    fn test_visibility_is_conjoined_with_filter() {
        let query = SearchQuery::compile(
            ModelName::Form,
            &json!({"filter": ["Form", "transcription", "like", "%cat%"]}),
        )
        .unwrap();
        let visibility = visibility_filter(ModelName::Form, &requester(Role::Viewer));
        let builder = select_ids(&query, visibility.as_ref(), None);
        let sql = builder.sql();

        assert!(sql.starts_with("SELECT root.id FROM forms AS root WHERE 1 = 1 AND root.transcription LIKE ?"));
        assert!(sql.contains(" AND (root.enterer_id = ? OR NOT (EXISTS (SELECT 1 FROM form_tags"));
        assert!(sql.ends_with(" ORDER BY root.id ASC"));
    }

    #[test]
    fn test_administrators_get_no_visibility_clause() {
        let query = SearchQuery::listing(ModelName::Collection, OrderBy::primary_key());
        let visibility = visibility_filter(ModelName::Collection, &requester(Role::Administrator));
        let paginator = Paginator {
            page: 2,
            items_per_page: 10,
            count: None,
        };
        let builder = select_ids(&query, visibility.as_ref(), Some(&paginator));
        assert_eq!(
            builder.sql(),
            "SELECT root.id FROM collections AS root WHERE 1 = 1 ORDER BY root.id ASC LIMIT ? OFFSET ?"
        );

        let count = count_matches(&query, visibility.as_ref());
        assert_eq!(count.sql(), "SELECT COUNT(*) FROM collections AS root WHERE 1 = 1");
    }
}
