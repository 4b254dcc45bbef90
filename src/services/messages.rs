use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{message, MessageStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitMessageRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 200, message = "Subject is required"))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000, message = "Message is required"))]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReplyRequest {
    #[validate(length(min = 1, max = 5000, message = "Reply cannot be empty"))]
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: MessageStatus,
    pub reply: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<message::Model> for MessageView {
    fn from(m: message::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            email: m.email,
            subject: m.subject,
            message: m.message,
            status: m.status,
            reply: m.reply,
            replied_at: m.replied_at,
            created_at: m.created_at,
        }
    }
}

/// Contact form inbox.
#[derive(Clone)]
pub struct MessageService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl MessageService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(subject = %request.subject))]
    pub async fn submit(&self, request: SubmitMessageRequest) -> Result<MessageView, ServiceError> {
        request.validate()?;

        let created = message::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            email: Set(request.email.trim().to_lowercase()),
            subject: Set(request.subject.trim().to_string()),
            message: Set(request.message),
            status: Set(MessageStatus::Unread),
            reply: Set(None),
            replied_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        self.event_sender
            .send_or_log(Event::MessageReceived {
                message_id: created.id,
                subject: created.subject.clone(),
            })
            .await;
        Ok(created.into())
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<MessageView>, ServiceError> {
        Ok(message::Entity::find()
            .order_by_desc(message::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .map(MessageView::from)
            .collect())
    }

    /// Replied messages stay replied.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, message_id: Uuid) -> Result<MessageView, ServiceError> {
        let existing = self.find(message_id).await?;
        if existing.status != MessageStatus::Unread {
            return Ok(existing.into());
        }

        let mut active: message::ActiveModel = existing.into();
        active.status = Set(MessageStatus::Read);
        Ok(active.update(&*self.db_pool).await?.into())
    }

    #[instrument(skip(self, request))]
    pub async fn reply(
        &self,
        message_id: Uuid,
        request: ReplyRequest,
    ) -> Result<MessageView, ServiceError> {
        request.validate()?;
        let existing = self.find(message_id).await?;

        let mut active: message::ActiveModel = existing.into();
        active.status = Set(MessageStatus::Replied);
        active.reply = Set(Some(request.reply));
        active.replied_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db_pool).await?;

        info!(%message_id, "Reply recorded");
        self.event_sender
            .send_or_log(Event::MessageReplied {
                message_id,
                email: updated.email.clone(),
            })
            .await;
        Ok(updated.into())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, message_id: Uuid) -> Result<(), ServiceError> {
        let result = message::Entity::delete_by_id(message_id)
            .exec(&*self.db_pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(not_found(message_id));
        }
        Ok(())
    }

    async fn find(&self, message_id: Uuid) -> Result<message::Model, ServiceError> {
        message::Entity::find_by_id(message_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| not_found(message_id))
    }
}

fn not_found(message_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Message {message_id} not found"))
}
