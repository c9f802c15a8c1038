//! Visibility of restricted records.
//!
//! A record is restricted when it carries the reserved `restricted` tag.
//! Administrators, unrestricted users and the record's enterer see it anyway;
//! everyone else gets it filtered out, both in memory ([`visible`]) and in SQL
//! ([`visibility_filter`]).

use crate::models::{
    has_restricted_tag, Collection, CollectionBackup, File, Form, FormBackup, Role, TagMini, User,
    RESTRICTED_TAG,
};
use crate::query::{Comparison, Predicate, SqlValue};
use crate::schema::{Column, ModelName};

pub const UNAUTHORIZED_MESSAGE: &str = "You are not authorized to access this resource.";

/// Settings that affect visibility, loaded per request.
#[derive(Debug, Clone, Default)]
pub struct AccessSettings {
    pub unrestricted_users: Vec<i64>,
}

/// The authenticated user making a request.
#[derive(Debug, Clone)]
pub struct Requester {
    pub user: User,
    pub unrestricted: bool,
}

impl Requester {
    pub fn new(user: User, settings: &AccessSettings) -> Self {
        let unrestricted = settings.unrestricted_users.contains(&user.id);
        Self { user, unrestricted }
    }

    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn is_administrator(&self) -> bool {
        self.user.role == Role::Administrator
    }

    /// Administrators and unrestricted users see every record.
    pub fn sees_everything(&self) -> bool {
        self.is_administrator() || self.unrestricted
    }

    /// Viewers are read-only.
    pub fn can_write(&self) -> bool {
        matches!(self.user.role, Role::Administrator | Role::Contributor)
    }

    /// Only administrators and the enterer may delete a record.
    pub fn can_delete(&self, enterer: Option<i64>) -> bool {
        self.is_administrator() || enterer == Some(self.id())
    }
}

/// Something whose visibility depends on the restricted tag.
pub trait Restrictable {
    fn enterer_id(&self) -> Option<i64>;
    fn tags(&self) -> &[TagMini];

    fn is_restricted(&self) -> bool {
        has_restricted_tag(self.tags())
    }
}

macro_rules! restrictable_snapshot {
    ($($ty:ty),+) => {
        $(
            impl Restrictable for $ty {
                fn enterer_id(&self) -> Option<i64> {
                    self.snapshot.enterer.as_ref().map(|u| u.id)
                }

                fn tags(&self) -> &[TagMini] {
                    &self.snapshot.tags
                }
            }
        )+
    };
}

restrictable_snapshot!(Form, Collection, FormBackup, CollectionBackup);

impl Restrictable for File {
    fn enterer_id(&self) -> Option<i64> {
        self.enterer.as_ref().map(|u| u.id)
    }

    fn tags(&self) -> &[TagMini] {
        &self.tags
    }
}

/// May `requester` see `record`?
pub fn visible<R: Restrictable>(record: &R, requester: &Requester) -> bool {
    requester.sees_everything()
        || record.enterer_id() == Some(requester.id())
        || !record.is_restricted()
}

/// SQL counterpart of [`visible`] for a search over `model`.
///
/// `None` means no filtering is needed.
pub fn visibility_filter(model: ModelName, requester: &Requester) -> Option<Predicate> {
    if requester.sees_everything() {
        return None;
    }
    let own = |column: Column| {
        Predicate::compare(
            column,
            Comparison::Binary("=", SqlValue::Integer(requester.id())),
        )
    };

    match model {
        ModelName::Form | ModelName::File | ModelName::Collection => {
            let Some(tags) = model.field("tags") else {
                tracing::warn!("{} has no tags relation; showing only own records", model);
                return Some(own(Column::Plain("enterer_id")));
            };
            let restricted = Predicate::related(
                tags,
                Some(Predicate::compare(
                    Column::Plain("name"),
                    Comparison::Binary("=", SqlValue::Text(RESTRICTED_TAG.to_string())),
                )),
            );
            Some(Predicate::Or(vec![
                own(Column::Plain("enterer_id")),
                Predicate::Not(Box::new(restricted)),
            ]))
        }
        ModelName::FormBackup | ModelName::CollectionBackup => {
            // A missing tags array yields NULL, which hides the backup.
            let restricted = Predicate::compare(
                Column::Json("$.tags"),
                Comparison::Like(format!("%\"name\":\"{}\"%", RESTRICTED_TAG)),
            );
            Some(Predicate::Or(vec![
                own(Column::Json("$.enterer.id")),
                Predicate::Not(Box::new(restricted)),
            ]))
        }
        ModelName::Tag
        | ModelName::Translation
        | ModelName::User
        | ModelName::Speaker
        | ModelName::Source
        | ModelName::FormSearch => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FormSnapshot, UserMini};

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            first_name: "A".into(),
            last_name: "B".into(),
            email: String::new(),
            affiliation: String::new(),
            role,
            datetime_modified: String::new(),
        }
    }

    fn form(enterer: i64, restricted: bool) -> Form {
        let mut snapshot: FormSnapshot = serde_json::from_str("{}").unwrap();
        snapshot.enterer = Some(UserMini {
            id: enterer,
            first_name: String::new(),
            last_name: String::new(),
            role: "contributor".into(),
        });
        if restricted {
            snapshot.tags.push(TagMini {
                id: 1,
                name: RESTRICTED_TAG.into(),
            });
        }
        Form {
            id: 1,
            uuid: "u".into(),
            snapshot,
        }
    }

    #[test]
    fn test_unrestricted_records_are_visible_to_all() {
        let viewer = Requester::new(user(5, Role::Viewer), &AccessSettings::default());
        assert!(visible(&form(1, false), &viewer));
    }

    #[test]
    fn test_restricted_records() {
        let settings = AccessSettings {
            unrestricted_users: vec![7],
        };
        let restricted = form(1, true);

        let stranger = Requester::new(user(5, Role::Contributor), &settings);
        assert!(!visible(&restricted, &stranger));

        let enterer = Requester::new(user(1, Role::Viewer), &settings);
        assert!(visible(&restricted, &enterer));

        let admin = Requester::new(user(2, Role::Administrator), &settings);
        assert!(visible(&restricted, &admin));

        let allowed = Requester::new(user(7, Role::Viewer), &settings);
        assert!(visible(&restricted, &allowed));
    }

    #[test]
    fn test_filter_skipped_for_privileged_requesters() {
        let admin = Requester::new(user(2, Role::Administrator), &AccessSettings::default());
        assert!(visibility_filter(ModelName::Form, &admin).is_none());

        let viewer = Requester::new(user(3, Role::Viewer), &AccessSettings::default());
        assert!(visibility_filter(ModelName::Form, &viewer).is_some());
        assert!(visibility_filter(ModelName::CollectionBackup, &viewer).is_some());
        assert!(visibility_filter(ModelName::Tag, &viewer).is_none());
    }

    #[test]
    fn test_permissions() {
        let viewer = Requester::new(user(3, Role::Viewer), &AccessSettings::default());
        assert!(!viewer.can_write());
        assert!(viewer.can_delete(Some(3)));
        assert!(!viewer.can_delete(Some(4)));

        let contributor = Requester::new(user(4, Role::Contributor), &AccessSettings::default());
        assert!(contributor.can_write());
        assert!(!contributor.can_delete(None));
    }
}
