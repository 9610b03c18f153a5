use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

/// A post as served by the fake WordPress.com API.
#[derive(Debug, Clone)]
pub struct FakePost {
    pub site_id: i64,
    pub id: i64,
    pub title: String,
    pub excerpt: String,
    pub date: DateTime<Utc>,
    pub like_count: i64,
    pub i_like: bool,
}

impl FakePost {
    /// Posts with a higher id are newer.
    pub fn new(site_id: i64, id: i64) -> Self {
        Self {
            site_id,
            id,
            title: format!("Post {}", id),
            excerpt: format!("<p>Excerpt of <strong>post {}</strong></p>", id),
            date: base_time() + Duration::minutes(id),
            like_count: 4,
            i_like: false,
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "ID": self.id,
            "site_ID": self.site_id,
            "title": self.title,
            "excerpt": self.excerpt,
            "URL": format!("https://site{}.example.com/{}", self.site_id, self.id),
            "author": { "name": "Test Author" },
            "date": self.date.to_rfc3339(),
            "like_count": self.like_count,
            "i_like": self.i_like,
        })
    }
}

fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}
