//! User domain: account CRUD with two-sided favorites maintenance.

use crate::cache::{entity, EntityCache};
use crate::error::{RealtimeError, Result};
use crate::lock::LockManager;
use crate::store::{StockStore, UserStore};
use std::sync::Arc;
use tickflow_types::{Response, User, UserRequest};
use uuid::Uuid;

pub struct UserService {
    users: Arc<dyn UserStore>,
    stocks: Arc<dyn StockStore>,
    locks: Arc<LockManager>,
    cache: Arc<dyn EntityCache>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserStore>,
        stocks: Arc<dyn StockStore>,
        locks: Arc<LockManager>,
        cache: Arc<dyn EntityCache>,
    ) -> Self {
        Self {
            users,
            stocks,
            locks,
            cache,
        }
    }

    pub async fn create(&self, request: &UserRequest) -> Result<Response> {
        if self.username_or_email_taken(request) {
            return Err(RealtimeError::NotFound(
                "Username or Email already exists".to_string(),
            ));
        }

        let user_id = Uuid::new_v4().to_string();
        let _guard = self.locks.acquire(&user_id).await;

        let mut user = User::new(&user_id);
        user.username = request.username.clone();
        user.email = request.email.clone();
        user.password = request.password.clone();
        user.phone_number = request.phone_number.clone();
        self.persist(user).await;
        Ok(Response::ok())
    }

    pub async fn update(&self, request: &UserRequest) -> Result<Response> {
        let user_id = required_id(request)?;
        let _guard = self.locks.acquire(&user_id).await;

        let mut user = self.get_or_not_found(&user_id)?;
        if self.username_or_email_taken(request) {
            return Err(RealtimeError::NotFound(
                "Username or Email already exists".to_string(),
            ));
        }
        if let Some(username) = &request.username {
            user.username = Some(username.clone());
        }
        if let Some(email) = &request.email {
            user.email = Some(email.clone());
        }
        if let Some(phone) = &request.phone_number {
            user.phone_number = Some(phone.clone());
        }
        self.persist(user).await;
        Ok(Response::ok())
    }

    /// Delete the user and clear the mirror entries on every favored stock.
    pub async fn delete(&self, request: &UserRequest) -> Result<Response> {
        let user_id = required_id(request)?;
        let _guard = self.locks.acquire(&user_id).await;

        let user = self.get_or_not_found(&user_id)?;
        for stock_id in &user.favorite_stocks {
            if let Some(mut stock) = self.stocks.get(stock_id) {
                stock.favored_by.remove(&user_id);
                self.stocks.save(stock);
            }
        }
        self.users.delete(&user_id);
        self.cache.delete(entity::USER, &user_id).await;
        Ok(Response::ok())
    }

    pub async fn update_password(&self, request: &UserRequest) -> Result<Response> {
        let user_id = required_id(request)?;
        let password = request
            .password
            .clone()
            .ok_or_else(|| RealtimeError::BadRequest("password is required".to_string()))?;

        let _guard = self.locks.acquire(&user_id).await;
        let mut user = self.get_or_not_found(&user_id)?;
        user.password = Some(password);
        self.persist(user).await;
        Ok(Response::ok())
    }

    fn username_or_email_taken(&self, request: &UserRequest) -> bool {
        let username_taken = request
            .username
            .as_deref()
            .is_some_and(|name| self.users.exists_by_username(name));
        let email_taken = request
            .email
            .as_deref()
            .is_some_and(|email| self.users.exists_by_email(email));
        username_taken || email_taken
    }

    fn get_or_not_found(&self, user_id: &str) -> Result<User> {
        self.users
            .get(user_id)
            .ok_or_else(|| RealtimeError::NotFound(format!("User not found: {user_id}")))
    }

    async fn persist(&self, user: User) {
        let user_id = user.user_id.clone();
        // Password never enters the cache.
        let summary = serde_json::json!({
            "userId": user.user_id,
            "username": user.username,
            "email": user.email,
            "phoneNumber": user.phone_number,
        });
        self.users.save(user);
        self.cache.put(entity::USER, &user_id, &summary).await;
    }
}

fn required_id(request: &UserRequest) -> Result<String> {
    request
        .user_id
        .clone()
        .ok_or_else(|| RealtimeError::BadRequest("userId is required".to_string()))
}
