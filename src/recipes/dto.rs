use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{Category, Comment, LeaderboardEntry, NewRecipe, Recipe, RecipeChanges};
use crate::error::{AppError, AppResult};

/// `ingredients` as sent by clients: a list, a JSON-encoded list, or "a, b, c".
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IngredientsInput {
    List(Vec<String>),
    Text(String),
}

impl IngredientsInput {
    pub fn into_list(self) -> Vec<String> {
        let raw = match self {
            IngredientsInput::List(items) => items,
            IngredientsInput::Text(text) => match serde_json::from_str::<Vec<String>>(&text) {
                Ok(items) => items,
                Err(_) => text.split(',').map(str::to_string).collect(),
            },
        };
        raw.into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlexBool {
    Bool(bool),
    Text(String),
}

impl FlexBool {
    pub fn value(&self) -> bool {
        match self {
            FlexBool::Bool(b) => *b,
            FlexBool::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlexNumber {
    Number(f64),
    Text(String),
}

impl FlexNumber {
    /// `Ok(None)` for a blank string.
    fn parse(&self, field: &str) -> AppResult<Option<f64>> {
        match self {
            FlexNumber::Number(n) => Ok(Some(*n)),
            FlexNumber::Text(s) if s.trim().is_empty() => Ok(None),
            FlexNumber::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| AppError::Validation(format!("{field} must be a number"))),
        }
    }
}

/// Body of `POST /recipes` and `PUT /recipes/:id`, from JSON or multipart text fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipePayload {
    pub title: Option<String>,
    pub category: Option<String>,
    pub ingredients: Option<IngredientsInput>,
    pub steps: Option<String>,
    pub difficulty: Option<FlexNumber>,
    pub cooking_time: Option<String>,
    pub is_premium: Option<FlexBool>,
    pub price: Option<FlexNumber>,
    pub image: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_category(value: &str) -> AppResult<Category> {
    Category::parse(value).ok_or_else(|| {
        AppError::Validation("Category must be one of Breakfast, Lunch, Dinner, Dessert".into())
    })
}

fn parse_difficulty(value: &FlexNumber) -> AppResult<Option<i32>> {
    match value.parse("Difficulty")? {
        None => Ok(None),
        Some(d) if d.fract() == 0.0 && (1.0..=5.0).contains(&d) => Ok(Some(d as i32)),
        Some(_) => Err(AppError::Validation(
            "Difficulty must be a whole number from 1 to 5".into(),
        )),
    }
}

fn parse_price(value: &FlexNumber) -> AppResult<Option<f64>> {
    match value.parse("Price")? {
        Some(p) if !p.is_finite() || p < 0.0 => {
            Err(AppError::Validation("Price cannot be negative".into()))
        }
        other => Ok(other),
    }
}

impl RecipePayload {
    /// Validates a full recipe. Status and chef name are never taken from the payload.
    pub fn into_new_recipe(self, owner_id: Uuid, chef_name: &str) -> AppResult<NewRecipe> {
        let missing = |field: &str| AppError::Validation(format!("{field} is required"));

        let title = non_blank(self.title).ok_or_else(|| missing("Title"))?;
        let steps = non_blank(self.steps).ok_or_else(|| missing("Steps"))?;
        let cooking_time = non_blank(self.cooking_time).ok_or_else(|| missing("Cooking time"))?;
        let category = parse_category(&non_blank(self.category).ok_or_else(|| missing("Category"))?)?;

        let ingredients = self.ingredients.map(IngredientsInput::into_list).unwrap_or_default();
        if ingredients.is_empty() {
            return Err(AppError::Validation("At least one ingredient is required".into()));
        }

        let difficulty = match &self.difficulty {
            Some(d) => parse_difficulty(d)?,
            None => None,
        }
        .ok_or_else(|| missing("Difficulty"))?;

        let price = match &self.price {
            Some(p) => parse_price(p)?,
            None => None,
        }
        .unwrap_or(0.0);

        Ok(NewRecipe {
            owner_id,
            chef_name: chef_name.to_string(),
            title,
            category,
            image: non_blank(self.image),
            ingredients,
            steps,
            difficulty,
            cooking_time,
            is_premium: self.is_premium.map(|b| b.value()).unwrap_or(false),
            price,
        })
    }

    /// Merge-style edit: absent and blank fields keep their stored values.
    pub fn into_changes(self) -> AppResult<RecipeChanges> {
        let category = match non_blank(self.category) {
            Some(c) => Some(parse_category(&c)?),
            None => None,
        };
        let ingredients = self
            .ingredients
            .map(IngredientsInput::into_list)
            .filter(|list| !list.is_empty());
        let difficulty = match &self.difficulty {
            Some(d) => parse_difficulty(d)?,
            None => None,
        };
        let price = match &self.price {
            Some(p) => parse_price(p)?,
            None => None,
        };

        Ok(RecipeChanges {
            title: non_blank(self.title),
            category,
            image: non_blank(self.image),
            ingredients,
            steps: non_blank(self.steps),
            difficulty,
            cooking_time: non_blank(self.cooking_time),
            is_premium: self.is_premium.map(|b| b.value()),
            price,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct RecipeEnvelope<T: Serialize> {
    pub recipe: T,
}

#[derive(Debug, Serialize)]
pub struct RecipeList {
    pub count: usize,
    pub recipes: Vec<Recipe>,
}

#[derive(Debug, Serialize)]
pub struct Recipes {
    pub recipes: Vec<Recipe>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecipes {
    pub saved_recipes: Vec<Recipe>,
    pub recipes: Vec<Recipe>,
}

/// A recipe together with its comment thread.
#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
pub struct Comments {
    pub comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveState {
    pub is_saved: bool,
}

#[derive(Debug, Serialize)]
pub struct Leaderboard {
    pub leaderboard: Vec<LeaderboardEntry>,
}
