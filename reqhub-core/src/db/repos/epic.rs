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
    AcceptanceCriteria, Comment, Epic, EpicDetail, EpicHierarchy, EntityType, Include, Includes,
    ReferencePrefix, RequirementWithType, SteeringDocument, User, UserStory, UserStoryHierarchy,
};

impl Entity for Epic {
    const TABLE: &'static str = "epics";
    const NAME: &'static str = "epic";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "reference_id",
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
        &["status", "priority", "creator_id", "assignee_id"];
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
            title: row.get(2)?,
            description: row.get(3)?,
            priority: get_priority(row, 4)?,
            status: get_workflow_status(row, 5)?,
            creator_id: get_uuid(row, 6)?,
            assignee_id: get_opt_uuid(row, 7)?,
            created_at: get_ts(row, 8)?,
            updated_at: get_ts(row, 9)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            reference_value(&self.reference_id),
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

impl Referenced for Epic {
    const PREFIX: ReferencePrefix = ReferencePrefix::Epic;

    fn reference_id(&self) -> &str {
        &self.reference_id
    }

    fn set_reference_id(&mut self, reference_id: String) {
        self.reference_id = reference_id;
    }
}

impl<'c> Repository<'c, Epic> {
    pub fn get_with_includes(&self, id: Uuid, includes: &Includes) -> RepoResult<EpicDetail> {
        let epic = self.get_by_id(id)?;
        self.load_detail(epic, includes)
    }

    pub fn list_with_includes(
        &self,
        options: &ListOptions,
        includes: &Includes,
    ) -> RepoResult<Vec<EpicDetail>> {
        self.list(options)?
            .into_iter()
            .map(|epic| self.load_detail(epic, includes))
            .collect()
    }

    fn load_detail(&self, epic: Epic, includes: &Includes) -> RepoResult<EpicDetail> {
        let users = self.sibling::<User>();
        let creator = if includes.contains(Include::Creator) {
            users.find_by_id(epic.creator_id)?
        } else {
            None
        };
        let assignee = match epic.assignee_id {
            Some(id) if includes.contains(Include::Assignee) => users.find_by_id(id)?,
            _ => None,
        };
        let user_stories = if includes.contains(Include::UserStories) {
            Some(self.sibling::<UserStory>().list_by_epic(epic.id)?)
        } else {
            None
        };
        let comments = if includes.contains(Include::Comments) {
            Some(self.sibling::<Comment>().list_for_entity(EntityType::Epic, epic.id)?)
        } else {
            None
        };
        Ok(EpicDetail {
            epic,
            creator,
            assignee,
            user_stories,
            comments,
        })
    }

    /// Loads the fixed-shape hierarchy below an epic
    ///
    /// Steering documents and user stories, each story with its
    /// requirements (type loaded) and acceptance criteria, all ordered by
    /// creation time.
    pub fn complete_hierarchy(&self, id: Uuid) -> RepoResult<EpicHierarchy> {
        let epic = self.get_by_id(id)?;
        let steering_documents = self.sibling::<SteeringDocument>().list_for_epic(epic.id)?;
        let stories = self.sibling::<UserStory>().list_by_epic(epic.id)?;

        let requirements = self.sibling::<crate::models::Requirement>();
        let criteria = self.sibling::<AcceptanceCriteria>();
        let mut user_stories = Vec::with_capacity(stories.len());
        for story in stories {
            let reqs: Vec<RequirementWithType> = requirements.list_with_type_by_story(story.id)?;
            let acs = criteria.list_by_user_story(story.id)?;
            user_stories.push(UserStoryHierarchy {
                user_story: story,
                requirements: reqs,
                acceptance_criteria: acs,
            });
        }

        Ok(EpicHierarchy {
            epic,
            steering_documents,
            user_stories,
        })
    }

    /// Sets or clears the assignee without touching other columns
    pub fn set_assignee(&self, id: Uuid, assignee_id: Option<Uuid>) -> RepoResult<Epic> {
        let mut epic = self.get_by_id(id)?;
        epic.assignee_id = assignee_id;
        epic.updated_at = crate::models::now();
        self.update(&epic)?;
        Ok(epic)
    }

    pub fn list_by_steering_document(&self, document_id: Uuid) -> RepoResult<Vec<Epic>> {
        self.select(
            "WHERE id IN (SELECT epic_id FROM epic_steering_documents WHERE steering_document_id = ?1)
             ORDER BY created_at ASC, rowid ASC",
            params![uuid_value(document_id)],
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Cancellation;
    use crate::db::test_support::{test_db, test_db_with};
    use crate::db::{Filter, ListOptions, OrderBy, ReferenceIdStrategy, RepoError};
    use crate::models::{Epic, Include, Includes, Priority, Role, User, WorkflowStatus};

    fn admin(repos: &crate::db::Repos<'_>) -> User {
        let user = User::new("admin".into(), "admin@localhost".into(), "h".into(), Role::Administrator);
        repos.users().create(&user).unwrap()
    }

    #[test]
    fn test_trigger_allocates_sequential_references() {
        let t = test_db();
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let user = admin(repos);
            let epics = repos.epics();
            let first = epics.create_with_reference(&Epic::new("Auth".into(), Priority::High, user.id))?;
            let second =
                epics.create_with_reference(&Epic::new("Billing".into(), Priority::Low, user.id))?;
            assert_eq!(first.reference_id, "EP-1");
            assert_eq!(second.reference_id, "EP-2");

            assert_eq!(epics.get_by_reference_id("EP-2")?.id, second.id);
            assert_eq!(epics.get_by_reference_id_case_insensitive("ep-2")?.id, second.id);
            assert!(epics.get_by_reference_id("ep-2").unwrap_err().is_not_found());
            assert!(epics.exists_by_reference_id("EP-1")?);
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_application_strategy_continues_after_trigger_numbers() {
        let t = test_db_with(ReferenceIdStrategy::Application);
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let user = admin(repos);
            let epics = repos.epics();
            let mut manual = Epic::new("Imported".into(), Priority::Medium, user.id);
            manual.reference_id = "EP-7".into();
            epics.create_with_reference(&manual)?;

            let next = epics.create_with_reference(&Epic::new("Next".into(), Priority::Medium, user.id))?;
            assert_eq!(next.reference_id, "EP-8");
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_list_filters_and_orders() {
        let t = test_db();
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let user = admin(repos);
            let epics = repos.epics();
            for (title, priority) in [("b", Priority::Low), ("a", Priority::Critical), ("c", Priority::Low)] {
                epics.create_with_reference(&Epic::new(title.into(), priority, user.id))?;
            }
            let low = epics.list(
                &ListOptions::new()
                    .filter(Filter::eq("priority", Priority::Low.as_i64()))
                    .order_by(OrderBy::desc("title")),
            )?;
            let titles: Vec<_> = low.iter().map(|e| e.title.as_str()).collect();
            assert_eq!(titles, ["c", "b"]);
            assert_eq!(epics.count(&[Filter::eq("status", WorkflowStatus::Backlog.as_str().to_string())])?, 3);

            let page = epics.list(&ListOptions::new().page(1, 1))?;
            assert_eq!(page.len(), 1);
            assert_eq!(page[0].title, "a");

            let bad = epics.list(&ListOptions::new().filter(Filter::eq("password_hash", "x".to_string())));
            assert!(matches!(bad, Err(RepoError::InvalidQuery(_))));
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_includes_load_creator_only_when_asked() {
        let t = test_db();
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let user = admin(repos);
            let epic = repos
                .epics()
                .create_with_reference(&Epic::new("Auth".into(), Priority::High, user.id))?;
            let bare = repos.epics().get_with_includes(epic.id, &Includes::none())?;
            assert!(bare.creator.is_none());
            assert!(bare.user_stories.is_none());

            let full = repos
                .epics()
                .get_with_includes(epic.id, &Includes::of(&[Include::Creator, Include::UserStories]))?;
            assert_eq!(full.creator.unwrap().id, user.id);
            assert_eq!(full.user_stories.unwrap().len(), 0);
            Ok(())
        });
        result.unwrap();
    }
}
