//! Subscription domain CRUD.

use crate::cache::{entity, EntityCache};
use crate::error::{RealtimeError, Result};
use crate::lock::LockManager;
use crate::store::SubscriptionStore;
use std::sync::Arc;
use tickflow_types::{Response, Subscription, SubscriptionRequest};
use uuid::Uuid;

pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionStore>,
    locks: Arc<LockManager>,
    cache: Arc<dyn EntityCache>,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        locks: Arc<LockManager>,
        cache: Arc<dyn EntityCache>,
    ) -> Self {
        Self {
            subscriptions,
            locks,
            cache,
        }
    }

    pub async fn create(&self, request: &SubscriptionRequest) -> Result<Response> {
        let subscription_id = request
            .subscription_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let _guard = self.locks.acquire(&subscription_id).await;

        let subscription = Subscription {
            subscription_id: subscription_id.clone(),
            user_id: request.user_id.clone(),
            subscription_plan_id: request.subscription_plan_id,
            start_date: request.start_date,
            end_date: request.end_date,
            status: request.status.unwrap_or_default(),
        };
        self.persist(subscription).await;
        Ok(Response::ok())
    }

    pub async fn update(&self, request: &SubscriptionRequest) -> Result<Response> {
        let subscription_id = required_id(request)?;
        let _guard = self.locks.acquire(&subscription_id).await;

        let mut subscription = self.get_or_not_found(&subscription_id)?;
        if let Some(plan) = request.subscription_plan_id {
            subscription.subscription_plan_id = Some(plan);
        }
        if let Some(start) = request.start_date {
            subscription.start_date = Some(start);
        }
        if let Some(end) = request.end_date {
            subscription.end_date = Some(end);
        }
        if let Some(status) = request.status {
            subscription.status = status;
        }
        self.persist(subscription).await;
        Ok(Response::ok())
    }

    pub async fn delete(&self, request: &SubscriptionRequest) -> Result<Response> {
        let subscription_id = required_id(request)?;
        let _guard = self.locks.acquire(&subscription_id).await;

        if !self.subscriptions.delete(&subscription_id) {
            return Err(RealtimeError::NotFound(format!(
                "Subscription not found: {subscription_id}"
            )));
        }
        self.cache
            .delete(entity::SUBSCRIPTION, &subscription_id)
            .await;
        Ok(Response::ok())
    }

    fn get_or_not_found(&self, subscription_id: &str) -> Result<Subscription> {
        self.subscriptions.get(subscription_id).ok_or_else(|| {
            RealtimeError::NotFound(format!("Subscription not found: {subscription_id}"))
        })
    }

    async fn persist(&self, subscription: Subscription) {
        let subscription_id = subscription.subscription_id.clone();
        if let Ok(value) = serde_json::to_value(&subscription) {
            self.subscriptions.save(subscription);
            self.cache
                .put(entity::SUBSCRIPTION, &subscription_id, &value)
                .await;
        } else {
            self.subscriptions.save(subscription);
        }
    }
}

fn required_id(request: &SubscriptionRequest) -> Result<String> {
    request
        .subscription_id
        .clone()
        .ok_or_else(|| RealtimeError::BadRequest("subscriptionId is required".to_string()))
}
