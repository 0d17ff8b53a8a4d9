use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::refs::RecordRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Breakfast,
    Lunch,
    Dinner,
    Dessert,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Breakfast => "Breakfast",
            Category::Lunch => "Lunch",
            Category::Dinner => "Dinner",
            Category::Dessert => "Dessert",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Breakfast" => Some(Category::Breakfast),
            "Lunch" => Some(Category::Lunch),
            "Dinner" => Some(Category::Dinner),
            "Dessert" => Some(Category::Dessert),
            _ => None,
        }
    }
}

/// Moderation state of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Approved,
    Rejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
        }
    }

    /// Strict parse for moderator input: exactly one of the three lowercase names.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Status::Pending),
            "approved" => Some(Status::Approved),
            "rejected" => Some(Status::Rejected),
            _ => None,
        }
    }

    /// Lenient parse for stored rows, which may carry legacy casing.
    pub fn from_stored(value: &str) -> Option<Self> {
        Self::parse(&value.trim().to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RecipeRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub category: String,
    pub image: Option<String>,
    pub ingredients: Vec<String>,
    pub steps: String,
    pub difficulty: i32,
    pub cooking_time: String,
    pub chef_name: String,
    pub status: String,
    pub is_premium: bool,
    pub price: f64,
    pub likes: Vec<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: Uuid,
    pub title: String,
    pub category: Category,
    pub image: Option<String>,
    pub ingredients: Vec<String>,
    pub steps: String,
    pub difficulty: i32,
    pub cooking_time: String,
    pub owner: RecordRef,
    pub chef_name: String,
    pub status: Status,
    pub is_premium: bool,
    pub price: f64,
    pub likes: Vec<RecordRef>,
    pub likes_count: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Recipe {
    pub fn owner_id(&self) -> Uuid {
        self.owner.id()
    }
}

impl TryFrom<RecipeRow> for Recipe {
    type Error = anyhow::Error;

    fn try_from(r: RecipeRow) -> Result<Self, Self::Error> {
        let category = Category::parse(&r.category)
            .ok_or_else(|| anyhow!("unknown category {:?} on recipe {}", r.category, r.id))?;
        let status = Status::from_stored(&r.status)
            .ok_or_else(|| anyhow!("unknown status {:?} on recipe {}", r.status, r.id))?;
        let likes: Vec<RecordRef> = r.likes.into_iter().map(RecordRef::from).collect();
        Ok(Self {
            id: r.id,
            title: r.title,
            category,
            image: r.image,
            ingredients: r.ingredients,
            steps: r.steps,
            difficulty: r.difficulty,
            cooking_time: r.cooking_time,
            owner: RecordRef::from(r.owner_id),
            chef_name: r.chef_name,
            status,
            is_premium: r.is_premium,
            price: r.price,
            likes_count: likes.len(),
            likes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub text: String,
    pub created_at: OffsetDateTime,
}

/// A comment; `author_name` is the author's name when it was last synced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub author: RecordRef,
    pub author_name: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Self {
        Self {
            id: r.id,
            author: RecordRef::from(r.author_id),
            author_name: r.author_name,
            text: r.text,
            created_at: r.created_at,
        }
    }
}

/// Validated content of a recipe to insert.
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub owner_id: Uuid,
    pub chef_name: String,
    pub title: String,
    pub category: Category,
    pub image: Option<String>,
    pub ingredients: Vec<String>,
    pub steps: String,
    pub difficulty: i32,
    pub cooking_time: String,
    pub is_premium: bool,
    pub price: f64,
}

/// Merge-style edit; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub category: Option<Category>,
    pub image: Option<String>,
    pub ingredients: Option<Vec<String>>,
    pub steps: Option<String>,
    pub difficulty: Option<i32>,
    pub cooking_time: Option<String>,
    pub is_premium: Option<bool>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub author_id: Uuid,
    pub author_name: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFilter {
    Approved,
    OwnedBy(Uuid),
    SavedBy(Uuid),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub is_liked: bool,
    pub likes_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: Uuid,
    pub title: String,
    pub chef_name: String,
    pub likes_count: i64,
    pub category: String,
}
