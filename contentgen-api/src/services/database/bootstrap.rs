use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::DatabaseService;
use crate::config::SuperuserConfig;
use crate::models::content::TiptapDoc;
use crate::models::post::PostCreate;
use crate::models::user::{User, UserCreate, UserUpdate};
use crate::models::ApiResult;
use crate::services::auth_service::AuthService;

fn paragraph(text: &str) -> Value {
    json!({
        "type": "paragraph",
        "attrs": {"textAlign": "left"},
        "content": [{"type": "text", "text": text}],
    })
}

fn heading(level: u8, text: &str) -> Value {
    json!({
        "type": "heading",
        "attrs": {"textAlign": "left", "level": level},
        "content": [{"type": "text", "text": text}],
    })
}

fn sample_post(title: &str, tags: &[&str], published: bool, blocks: Vec<Value>) -> PostCreate {
    let content = json!({"type": "doc", "content": blocks});
    let excerpt = TiptapDoc::from_value(content.clone())
        .ok()
        .and_then(|doc| doc.excerpt(200));

    PostCreate {
        title: title.to_string(),
        slug: None,
        content,
        excerpt,
        feature_image_url: None,
        is_published: published,
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn sample_posts() -> Vec<PostCreate> {
    vec![
        sample_post(
            "Welcome to ContentGen",
            &["announcements"],
            true,
            vec![
                heading(1, "Welcome to ContentGen"),
                paragraph("ContentGen pairs a rich-text editor with AI-assisted drafting."),
                paragraph("Generate a draft, refine it, add an image and publish."),
            ],
        ),
        sample_post(
            "Writing better prompts",
            &["ai", "writing"],
            true,
            vec![
                heading(1, "Writing better prompts"),
                heading(2, "Be specific"),
                paragraph("Name the audience, the tone and the length you want."),
                json!({
                    "type": "bulletList",
                    "content": [
                        {"type": "listItem", "content": [paragraph("State the goal of the post")]},
                        {"type": "listItem", "content": [paragraph("List the points to cover")]},
                    ],
                }),
            ],
        ),
        sample_post(
            "Image generation tips",
            &["ai", "images"],
            false,
            vec![
                heading(1, "Image generation tips"),
                paragraph("Describe the subject first, then lighting, style and composition."),
            ],
        ),
    ]
}

impl DatabaseService {
    /// Create the first superuser, or backfill its profile fields
    pub async fn init_db(
        &self,
        superuser: &SuperuserConfig,
        public_url: &str,
        auth: &AuthService,
    ) -> ApiResult<User> {
        let image_url = format!("{}/uploads/superuser_profile.jpg", public_url.trim_end_matches('/'));

        match self.get_user_by_email(&superuser.email).await? {
            None => {
                let input = UserCreate {
                    email: superuser.email.clone(),
                    password: superuser.password.clone(),
                    full_name: Some(superuser.full_name.clone()),
                    image_url: Some(image_url),
                    is_active: true,
                    is_superuser: true,
                    email_verified: true,
                };
                let hashed = auth.hash_password(&input.password)?;
                let user = self.create_user(&input, &hashed).await?;
                info!(email = %user.email, "Created first superuser");
                Ok(user)
            }
            Some(user) if user.full_name.is_none() || user.image_url.is_none() => {
                let update = UserUpdate {
                    full_name: user
                        .full_name
                        .is_none()
                        .then(|| superuser.full_name.clone()),
                    image_url: user.image_url.is_none().then_some(image_url),
                    ..Default::default()
                };
                self.update_user(user.id, &update, None).await
            }
            Some(user) => Ok(user),
        }
    }

    /// Insert a few example posts when the posts table is empty
    pub async fn seed_sample_posts(&self, author_id: Uuid) -> ApiResult<usize> {
        if self.count_posts().await? > 0 {
            return Ok(0);
        }

        let posts = sample_posts();
        for post in &posts {
            self.create_post(author_id, post).await?;
        }
        info!(count = posts.len(), "Seeded sample posts");
        Ok(posts.len())
    }
}
