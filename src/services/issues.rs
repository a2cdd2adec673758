use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::issue::{self, IssueStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Contact-form submissions: open for anyone, triaged by admins.
#[derive(Clone)]
pub struct IssueService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl IssueService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    #[instrument(skip(self, message))]
    pub async fn submit_issue(
        &self,
        name: String,
        email: String,
        subject: String,
        message: String,
    ) -> Result<issue::Model, ServiceError> {
        let created = issue::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            email: Set(email),
            subject: Set(subject),
            message: Set(message),
            status: Set(IssueStatus::Open),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await?;

        self.events
            .send_or_log(Event::IssueSubmitted(created.id))
            .await;
        Ok(created)
    }

    /// Newest-first paginated list for the back office.
    #[instrument(skip(self))]
    pub async fn list_issues(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<issue::Model>, u64), ServiceError> {
        let paginator = issue::Entity::find()
            .order_by_desc(issue::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let issues = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((issues, total))
    }

    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        id: Uuid,
        status: IssueStatus,
    ) -> Result<issue::Model, ServiceError> {
        let existing = issue::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Issue {id} not found")))?;

        let mut active: issue::ActiveModel = existing.into();
        active.status = Set(status);
        let updated = active.update(self.db.as_ref()).await?;

        if status == IssueStatus::Resolved {
            self.events.send_or_log(Event::IssueResolved(id)).await;
        }
        Ok(updated)
    }
}
