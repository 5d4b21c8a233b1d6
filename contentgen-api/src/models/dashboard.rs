use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDashboardInfo {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: String,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub user: UserDashboardInfo,
    pub total_posts: i64,
    pub user_posts: i64,
    pub user_drafts: i64,
    pub popular_tags: Vec<TagCount>,
    pub tag_distribution: Vec<TagCount>,
}
