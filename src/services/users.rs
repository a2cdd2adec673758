use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Fields for registering an account. Passwords arrive plaintext and are
/// hashed here; the hash is the only thing that ever reaches the database.
#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Profile fields a user may edit about themselves.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
}

/// Account management: registration, login verification, profiles.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    /// Registers an account. Email addresses are unique, compared
    /// case-insensitively by storing them lowercased.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterUser) -> Result<user::Model, ServiceError> {
        let email = request.email.trim().to_lowercase();
        let taken = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .count(self.db.as_ref())
            .await?;
        if taken > 0 {
            return Err(ServiceError::Conflict(
                "An account with this email already exists".into(),
            ));
        }

        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            name: Set(request.name),
            password_hash: Set(hash_password(&request.password)?),
            role: Set(request.role),
            phone: Set(request.phone),
            address: Set(request.address),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        self.events
            .send_or_log(Event::UserRegistered(created.id))
            .await;
        Ok(created)
    }

    /// Verifies credentials for login. An unknown email and a wrong
    /// password produce the same error so accounts cannot be enumerated.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<user::Model, ServiceError> {
        let email = email.trim().to_lowercase();
        let account = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(self.db.as_ref())
            .await?;
        let Some(account) = account else {
            return Err(ServiceError::AuthError("Invalid email or password".into()));
        };
        if !verify_password(password, &account.password_hash)? {
            return Err(ServiceError::AuthError("Invalid email or password".into()));
        }
        Ok(account)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {id} not found")))
    }

    /// Applies a profile edit; absent fields are left untouched.
    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<user::Model, ServiceError> {
        let existing = self.get_user(id).await?;
        let mut active: user::ActiveModel = existing.into();
        if let Some(name) = update.name {
            active.name = Set(name);
        }
        if let Some(phone) = update.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(address) = update.address {
            active.address = Set(Some(address));
        }
        if let Some(password) = update.password {
            active.password_hash = Set(hash_password(&password)?);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        self.events
            .send_or_log(Event::UserProfileUpdated(id))
            .await;
        Ok(updated)
    }

    /// Paginated account list for the back office.
    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<user::Model>, u64), ServiceError> {
        let paginator = user::Entity::find()
            .order_by_desc(user::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let users = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((users, total))
    }
}
