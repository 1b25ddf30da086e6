//! Registration and identity lookup.

use serde::Deserialize;
use std::sync::Arc;

use crate::db::{NewUser, Role, User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::validation::Validator;

const SELF_ASSIGNABLE_ROLES: [&str; 2] = ["researcher", "reviewer"];

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub institution: String,
    pub role: Option<String>,
}

#[derive(Clone)]
pub struct Accounts {
    users: Arc<dyn UserRepository>,
}

impl Accounts {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    pub async fn register(&self, registration: Registration) -> AppResult<User> {
        let email = registration.email.trim().to_lowercase();
        let name = registration.name.trim().to_string();
        let role = registration.role.as_deref().unwrap_or("researcher");

        let mut v = Validator::new();
        v.required("email", &email)
            .email("email", &email)
            .length("name", &name, 2, 100)
            .one_of("role", role, &SELF_ASSIGNABLE_ROLES);
        v.finish()?;

        if self.users.user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(
                "A user with this email already exists".to_string(),
            ));
        }

        let role = role.parse::<Role>().map_err(AppError::BadRequest)?;
        let user = self
            .users
            .create_user(NewUser {
                email,
                name,
                role,
                institution: registration.institution.trim().to_string(),
            })
            .await?;
        tracing::info!("User {} registered as {}", user.id, user.role.as_str());
        Ok(user)
    }

    pub async fn lookup(&self, user_id: i64) -> AppResult<User> {
        self.users
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }
}
