use rusqlite::types::Value;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::error::RepoResult;
use crate::db::repository::Repository;
use crate::db::traits::{
    get_reference, get_ts, get_uuid, reference_value, ts_value, uuid_value, Entity, Referenced,
};
use crate::models::{
    AcceptanceCriteria, AcceptanceCriteriaDetail, Comment, EntityType, Include, Includes,
    ReferencePrefix, Requirement, User,
};

impl Entity for AcceptanceCriteria {
    const TABLE: &'static str = "acceptance_criteria";
    const NAME: &'static str = "acceptance criteria";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "reference_id",
        "user_story_id",
        "description",
        "author_id",
        "created_at",
        "updated_at",
    ];
    const FILTER_COLUMNS: &'static [&'static str] = &["user_story_id", "author_id"];
    const ORDER_COLUMNS: &'static [&'static str] = &["created_at", "updated_at", "reference_id"];
    const IMMUTABLE_COLUMNS: &'static [&'static str] =
        &["id", "reference_id", "author_id", "created_at"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: get_uuid(row, 0)?,
            reference_id: get_reference(row, 1)?,
            user_story_id: get_uuid(row, 2)?,
            description: row.get(3)?,
            author_id: get_uuid(row, 4)?,
            created_at: get_ts(row, 5)?,
            updated_at: get_ts(row, 6)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            reference_value(&self.reference_id),
            uuid_value(self.user_story_id),
            Value::Text(self.description.clone()),
            uuid_value(self.author_id),
            ts_value(&self.created_at),
            ts_value(&self.updated_at),
        ]
    }
}

impl Referenced for AcceptanceCriteria {
    const PREFIX: ReferencePrefix = ReferencePrefix::AcceptanceCriteria;

    fn reference_id(&self) -> &str {
        &self.reference_id
    }

    fn set_reference_id(&mut self, reference_id: String) {
        self.reference_id = reference_id;
    }
}

impl<'c> Repository<'c, AcceptanceCriteria> {
    pub fn list_by_user_story(&self, user_story_id: Uuid) -> RepoResult<Vec<AcceptanceCriteria>> {
        self.select(
            "WHERE user_story_id = ?1 ORDER BY created_at ASC, rowid ASC",
            params![uuid_value(user_story_id)],
        )
    }

    pub fn list_by_author(&self, author_id: Uuid) -> RepoResult<Vec<AcceptanceCriteria>> {
        self.select(
            "WHERE author_id = ?1 ORDER BY created_at ASC, rowid ASC",
            params![uuid_value(author_id)],
        )
    }

    pub fn get_with_includes(
        &self,
        id: Uuid,
        includes: &Includes,
    ) -> RepoResult<AcceptanceCriteriaDetail> {
        let acceptance_criteria = self.get_by_id(id)?;
        let author = if includes.contains(Include::Creator) {
            self.sibling::<User>().find_by_id(acceptance_criteria.author_id)?
        } else {
            None
        };
        let requirements = if includes.contains(Include::Requirements) {
            Some(
                self.sibling::<Requirement>()
                    .list_by_acceptance_criteria(acceptance_criteria.id)?,
            )
        } else {
            None
        };
        let comments = if includes.contains(Include::Comments) {
            Some(
                self.sibling::<Comment>()
                    .list_for_entity(EntityType::AcceptanceCriteria, acceptance_criteria.id)?,
            )
        } else {
            None
        };
        Ok(AcceptanceCriteriaDetail {
            acceptance_criteria,
            author,
            requirements,
            comments,
        })
    }
}
