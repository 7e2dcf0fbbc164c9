use rusqlite::types::Value;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{get_priority, get_workflow_status};
use crate::db::error::RepoResult;
use crate::db::repository::Repository;
use crate::db::traits::{
    get_opt_uuid, get_reference, get_ts, get_uuid, opt_text_value, opt_uuid_value, reference_value,
    ts_value, uuid_value, Entity, ListOptions, Referenced,
};
use crate::models::{
    AcceptanceCriteria, Comment, EntityType, Epic, Include, Includes, ReferencePrefix, Requirement,
    User, UserStory, UserStoryDetail,
};

impl Entity for UserStory {
    const TABLE: &'static str = "user_stories";
    const NAME: &'static str = "user story";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "reference_id",
        "epic_id",
        "title",
        "description",
        "priority",
        "status",
        "creator_id",
        "assignee_id",
        "created_at",
        "updated_at",
    ];
    const FILTER_COLUMNS: &'static [&'static str] =
        &["epic_id", "status", "priority", "creator_id", "assignee_id"];
    const ORDER_COLUMNS: &'static [&'static str] =
        &["created_at", "updated_at", "priority", "title", "reference_id"];
    const IMMUTABLE_COLUMNS: &'static [&'static str] =
        &["id", "reference_id", "creator_id", "created_at"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: get_uuid(row, 0)?,
            reference_id: get_reference(row, 1)?,
            epic_id: get_uuid(row, 2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            priority: get_priority(row, 5)?,
            status: get_workflow_status(row, 6)?,
            creator_id: get_uuid(row, 7)?,
            assignee_id: get_opt_uuid(row, 8)?,
            created_at: get_ts(row, 9)?,
            updated_at: get_ts(row, 10)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            reference_value(&self.reference_id),
            uuid_value(self.epic_id),
            Value::Text(self.title.clone()),
            opt_text_value(&self.description),
            Value::Integer(self.priority.as_i64()),
            Value::Text(self.status.as_str().to_string()),
            uuid_value(self.creator_id),
            opt_uuid_value(self.assignee_id),
            ts_value(&self.created_at),
            ts_value(&self.updated_at),
        ]
    }
}

impl Referenced for UserStory {
    const PREFIX: ReferencePrefix = ReferencePrefix::UserStory;

    fn reference_id(&self) -> &str {
        &self.reference_id
    }

    fn set_reference_id(&mut self, reference_id: String) {
        self.reference_id = reference_id;
    }
}

impl<'c> Repository<'c, UserStory> {
    /// Stories of an epic, oldest first
    pub fn list_by_epic(&self, epic_id: Uuid) -> RepoResult<Vec<UserStory>> {
        self.select(
            "WHERE epic_id = ?1 ORDER BY created_at ASC, rowid ASC",
            params![uuid_value(epic_id)],
        )
    }

    pub fn ids_by_epic(&self, epic_id: Uuid) -> RepoResult<Vec<Uuid>> {
        Ok(self.list_by_epic(epic_id)?.into_iter().map(|s| s.id).collect())
    }

    pub fn get_with_includes(&self, id: Uuid, includes: &Includes) -> RepoResult<UserStoryDetail> {
        let story = self.get_by_id(id)?;
        self.load_detail(story, includes)
    }

    pub fn list_with_includes(
        &self,
        options: &ListOptions,
        includes: &Includes,
    ) -> RepoResult<Vec<UserStoryDetail>> {
        self.list(options)?
            .into_iter()
            .map(|story| self.load_detail(story, includes))
            .collect()
    }

    fn load_detail(&self, user_story: UserStory, includes: &Includes) -> RepoResult<UserStoryDetail> {
        let users = self.sibling::<User>();
        let creator = if includes.contains(Include::Creator) {
            users.find_by_id(user_story.creator_id)?
        } else {
            None
        };
        let assignee = match user_story.assignee_id {
            Some(id) if includes.contains(Include::Assignee) => users.find_by_id(id)?,
            _ => None,
        };
        let epic = if includes.contains(Include::Epic) {
            self.sibling::<Epic>().find_by_id(user_story.epic_id)?
        } else {
            None
        };
        let acceptance_criteria = if includes.contains(Include::AcceptanceCriteria) {
            Some(self.sibling::<AcceptanceCriteria>().list_by_user_story(user_story.id)?)
        } else {
            None
        };
        let requirements = if includes.contains(Include::Requirements) {
            Some(self.sibling::<Requirement>().list_by_user_story(user_story.id)?)
        } else {
            None
        };
        let comments = if includes.contains(Include::Comments) {
            Some(
                self.sibling::<Comment>()
                    .list_for_entity(EntityType::UserStory, user_story.id)?,
            )
        } else {
            None
        };
        Ok(UserStoryDetail {
            user_story,
            creator,
            assignee,
            epic,
            acceptance_criteria,
            requirements,
            comments,
        })
    }
}
