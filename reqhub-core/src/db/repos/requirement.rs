use rusqlite::types::Value;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{get_priority, get_requirement_status};
use crate::db::error::{RepoError, RepoResult};
use crate::db::repository::Repository;
use crate::db::traits::{
    get_opt_uuid, get_reference, get_ts, get_uuid, opt_text_value, opt_uuid_value, reference_value,
    ts_value, uuid_value, Entity, ListOptions, Referenced,
};
use crate::models::{
    AcceptanceCriteria, Comment, EntityType, Include, Includes, ReferencePrefix, Requirement,
    RequirementDetail, RequirementType, RequirementWithType, User,
};

impl Entity for Requirement {
    const TABLE: &'static str = "requirements";
    const NAME: &'static str = "requirement";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "reference_id",
        "user_story_id",
        "acceptance_criteria_id",
        "type_id",
        "title",
        "description",
        "priority",
        "status",
        "creator_id",
        "assignee_id",
        "created_at",
        "updated_at",
    ];
    const FILTER_COLUMNS: &'static [&'static str] = &[
        "user_story_id",
        "acceptance_criteria_id",
        "type_id",
        "status",
        "priority",
        "creator_id",
        "assignee_id",
    ];
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
            user_story_id: get_uuid(row, 2)?,
            acceptance_criteria_id: get_opt_uuid(row, 3)?,
            type_id: get_uuid(row, 4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            priority: get_priority(row, 7)?,
            status: get_requirement_status(row, 8)?,
            creator_id: get_uuid(row, 9)?,
            assignee_id: get_opt_uuid(row, 10)?,
            created_at: get_ts(row, 11)?,
            updated_at: get_ts(row, 12)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            reference_value(&self.reference_id),
            uuid_value(self.user_story_id),
            opt_uuid_value(self.acceptance_criteria_id),
            uuid_value(self.type_id),
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

impl Referenced for Requirement {
    const PREFIX: ReferencePrefix = ReferencePrefix::Requirement;

    fn reference_id(&self) -> &str {
        &self.reference_id
    }

    fn set_reference_id(&mut self, reference_id: String) {
        self.reference_id = reference_id;
    }
}

impl<'c> Repository<'c, Requirement> {
    pub fn list_by_user_story(&self, user_story_id: Uuid) -> RepoResult<Vec<Requirement>> {
        self.select(
            "WHERE user_story_id = ?1 ORDER BY created_at ASC, rowid ASC",
            params![uuid_value(user_story_id)],
        )
    }

    pub fn list_by_acceptance_criteria(&self, ac_id: Uuid) -> RepoResult<Vec<Requirement>> {
        self.select(
            "WHERE acceptance_criteria_id = ?1 ORDER BY created_at ASC, rowid ASC",
            params![uuid_value(ac_id)],
        )
    }

    pub fn list_by_type(&self, type_id: Uuid) -> RepoResult<Vec<Requirement>> {
        self.select(
            "WHERE type_id = ?1 ORDER BY created_at ASC, rowid ASC",
            params![uuid_value(type_id)],
        )
    }

    /// Requirements of a story, each with its type loaded
    pub fn list_with_type_by_story(&self, user_story_id: Uuid) -> RepoResult<Vec<RequirementWithType>> {
        let types = self.sibling::<RequirementType>();
        self.list_by_user_story(user_story_id)?
            .into_iter()
            .map(|requirement| {
                let requirement_type = types.get_by_id(requirement.type_id)?;
                Ok(RequirementWithType {
                    requirement,
                    requirement_type,
                })
            })
            .collect()
    }

    pub fn get_with_includes(&self, id: Uuid, includes: &Includes) -> RepoResult<RequirementDetail> {
        let requirement = self.get_by_id(id)?;
        self.load_detail(requirement, includes)
    }

    pub fn list_with_includes(
        &self,
        options: &ListOptions,
        includes: &Includes,
    ) -> RepoResult<Vec<RequirementDetail>> {
        self.list(options)?
            .into_iter()
            .map(|requirement| self.load_detail(requirement, includes))
            .collect()
    }

    fn load_detail(&self, requirement: Requirement, includes: &Includes) -> RepoResult<RequirementDetail> {
        let users = self.sibling::<User>();
        let creator = if includes.contains(Include::Creator) {
            users.find_by_id(requirement.creator_id)?
        } else {
            None
        };
        let assignee = match requirement.assignee_id {
            Some(id) if includes.contains(Include::Assignee) => users.find_by_id(id)?,
            _ => None,
        };
        let requirement_type = if includes.contains(Include::Type) {
            self.sibling::<RequirementType>().find_by_id(requirement.type_id)?
        } else {
            None
        };
        let acceptance_criteria = match requirement.acceptance_criteria_id {
            Some(id) if includes.contains(Include::AcceptanceCriteria) => {
                self.sibling::<AcceptanceCriteria>().find_by_id(id)?
            }
            _ => None,
        };
        let comments = if includes.contains(Include::Comments) {
            Some(
                self.sibling::<Comment>()
                    .list_for_entity(EntityType::Requirement, requirement.id)?,
            )
        } else {
            None
        };
        Ok(RequirementDetail {
            requirement,
            creator,
            assignee,
            requirement_type,
            acceptance_criteria,
            comments,
        })
    }

    /// Ids of every requirement under the given stories
    pub fn ids_by_user_stories(&self, story_ids: &[Uuid]) -> RepoResult<Vec<Uuid>> {
        let mut ids = Vec::new();
        for story_id in story_ids {
            ids.extend(self.list_by_user_story(*story_id)?.into_iter().map(|r| r.id));
        }
        Ok(ids)
    }

    /// Verifies `ac_id` belongs to `user_story_id`
    pub fn check_acceptance_criteria_parent(&self, ac_id: Uuid, user_story_id: Uuid) -> RepoResult<bool> {
        let ac = self
            .sibling::<AcceptanceCriteria>()
            .find_by_id(ac_id)?
            .ok_or_else(|| RepoError::not_found(AcceptanceCriteria::NAME, ac_id))?;
        Ok(ac.user_story_id == user_story_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Cancellation;
    use crate::db::test_support::{test_db, test_db_with};
    use crate::db::{ReferenceIdStrategy, RepoError, Repos};
    use crate::models::{
        AcceptanceCriteria, Epic, Priority, Requirement, Role, User, UserStory,
    };

    struct Fixture {
        story: UserStory,
        type_id: uuid::Uuid,
        user: User,
    }

    fn fixture(repos: &Repos<'_>) -> Fixture {
        let user = repos
            .users()
            .create(&User::new("u".into(), "u@x".into(), "h".into(), Role::User))
            .unwrap();
        crate::db::seed::seed_requirement_types(repos).unwrap();
        let epic = repos
            .epics()
            .create_with_reference(&Epic::new("E".into(), Priority::High, user.id))
            .unwrap();
        let story = repos
            .user_stories()
            .create_with_reference(&UserStory::new(epic.id, "S".into(), Priority::High, user.id))
            .unwrap();
        let type_id = repos.requirement_types().find_by_name("Functional").unwrap().unwrap().id;
        Fixture { story, type_id, user }
    }

    #[test]
    fn test_ac_delete_nullifies_requirement_link() {
        let t = test_db();
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let f = fixture(repos);
            let ac = repos.acceptance_criteria().create_with_reference(&AcceptanceCriteria::new(
                f.story.id,
                "WHEN x THEN y".into(),
                f.user.id,
            ))?;
            let mut req = Requirement::new(f.story.id, f.type_id, "R".into(), Priority::Low, f.user.id);
            req.acceptance_criteria_id = Some(ac.id);
            let req = repos.requirements().create_with_reference(&req)?;
            assert_eq!(req.reference_id, "REQ-1");

            repos.acceptance_criteria().delete(ac.id)?;
            let reloaded = repos.requirements().get_by_id(req.id)?;
            assert_eq!(reloaded.acceptance_criteria_id, None);
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_application_strategy_allocates_distinct_references() {
        let t = test_db_with(ReferenceIdStrategy::Application);
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let f = fixture(repos);
            let mut refs = Vec::new();
            for i in 0..5 {
                let req = Requirement::new(f.story.id, f.type_id, format!("R{i}"), Priority::Low, f.user.id);
                refs.push(repos.requirements().create_with_reference(&req)?.reference_id);
            }
            assert_eq!(refs, ["REQ-1", "REQ-2", "REQ-3", "REQ-4", "REQ-5"]);
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_hierarchy_loads_types_in_creation_order() {
        let t = test_db();
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let f = fixture(repos);
            for title in ["first", "second"] {
                let req = Requirement::new(f.story.id, f.type_id, title.into(), Priority::Low, f.user.id);
                repos.requirements().create_with_reference(&req)?;
            }
            let hierarchy = repos.epics().complete_hierarchy(f.story.epic_id)?;
            assert_eq!(hierarchy.user_stories.len(), 1);
            let reqs = &hierarchy.user_stories[0].requirements;
            assert_eq!(reqs[0].requirement.title, "first");
            assert_eq!(reqs[1].requirement.title, "second");
            assert_eq!(reqs[0].requirement_type.name, "Functional");
            Ok(())
        });
        result.unwrap();
    }
}
