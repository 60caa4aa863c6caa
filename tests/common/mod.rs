#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use backend_invest_platform::core::CoreService;
use backend_invest_platform::db::mem::MemStore;
use backend_invest_platform::db::models::User;
use backend_invest_platform::db::store::Store;

pub fn mem_store() -> Arc<dyn Store> {
    Arc::new(MemStore::new())
}

pub fn service() -> CoreService {
    CoreService::new(mem_store())
}

pub fn service_on(store: Arc<dyn Store>) -> CoreService {
    CoreService::new(store)
}

pub async fn seed_user(core: &CoreService, name: &str) -> Uuid {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{name}@example.com"),
        username: name.to_string(),
        country: "US".to_string(),
        password_hash: "argon2-hash".to_string(),
        is_admin: false,
        reset_token: None,
        created_at: now,
        updated_at: now,
    };
    core.store().insert_user(&user).await.unwrap();
    user.id
}
