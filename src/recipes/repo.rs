use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::db::PgStore;
use crate::recipes::repo_types::{
    Comment, CommentRow, LeaderboardEntry, LikeState, NewComment, NewRecipe, Recipe,
    RecipeChanges, RecipeFilter, RecipeRow, Status,
};

/// Persistence for recipes, their likes and their comments.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Inserts with status `pending`.
    async fn insert_recipe(&self, new: NewRecipe) -> anyhow::Result<Recipe>;

    async fn find_recipe(&self, id: Uuid) -> anyhow::Result<Option<Recipe>>;

    async fn recipe_comments(&self, id: Uuid) -> anyhow::Result<Vec<Comment>>;

    async fn list_recipes(&self, filter: RecipeFilter) -> anyhow::Result<Vec<Recipe>>;

    /// Applies `changes` and puts the recipe back to `pending` in the same write.
    async fn update_recipe(&self, id: Uuid, changes: &RecipeChanges)
        -> anyhow::Result<Option<Recipe>>;

    async fn set_status(&self, id: Uuid, status: Status) -> anyhow::Result<Option<Recipe>>;

    async fn delete_recipe(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Flips `user_id` in the likes set. `None` when the recipe does not exist.
    async fn toggle_like(&self, recipe_id: Uuid, user_id: Uuid)
        -> anyhow::Result<Option<LikeState>>;

    /// Appends a comment and returns the full list. `None` when the recipe does not exist.
    async fn add_comment(&self, recipe_id: Uuid, comment: NewComment)
        -> anyhow::Result<Option<Vec<Comment>>>;

    /// Approved recipes (case-insensitive) by likes, then newest first.
    async fn leaderboard(&self, limit: i64) -> anyhow::Result<Vec<LeaderboardEntry>>;

    /// Sets `chef_name` on every recipe owned by `owner_id`.
    async fn rename_chef(&self, owner_id: Uuid, name: &str) -> anyhow::Result<u64>;

    /// Sets `author_name` on every comment written by `author_id`, on any recipe.
    async fn rename_comment_author(&self, author_id: Uuid, name: &str) -> anyhow::Result<u64>;
}

const RECIPE_SELECT: &str = r#"
    SELECT r.id, r.owner_id, r.title, r.category, r.image, r.ingredients, r.steps,
           r.difficulty, r.cooking_time, r.chef_name, r.status, r.is_premium, r.price,
           ARRAY(SELECT l.user_id FROM recipe_likes l
                  WHERE l.recipe_id = r.id
                  ORDER BY l.created_at, l.user_id) AS likes,
           r.created_at, r.updated_at
      FROM recipes r
"#;

fn into_recipes(rows: Vec<RecipeRow>) -> anyhow::Result<Vec<Recipe>> {
    rows.into_iter().map(Recipe::try_from).collect()
}

impl PgStore {
    async fn recipe_exists(&self, id: Uuid) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM recipes WHERE id = $1)")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .context("check recipe exists")?;
        Ok(exists)
    }
}

#[async_trait]
impl RecipeStore for PgStore {
    async fn insert_recipe(&self, new: NewRecipe) -> anyhow::Result<Recipe> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO recipes (id, owner_id, title, category, image, ingredients, steps,
                                 difficulty, cooking_time, chef_name, status, is_premium, price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11, $12)
            "#,
        )
        .bind(id)
        .bind(new.owner_id)
        .bind(&new.title)
        .bind(new.category.as_str())
        .bind(new.image.as_deref())
        .bind(&new.ingredients)
        .bind(&new.steps)
        .bind(new.difficulty)
        .bind(&new.cooking_time)
        .bind(&new.chef_name)
        .bind(new.is_premium)
        .bind(new.price)
        .execute(self.pool())
        .await
        .context("insert recipe")?;

        self.find_recipe(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("recipe {id} vanished after insert"))
    }

    async fn find_recipe(&self, id: Uuid) -> anyhow::Result<Option<Recipe>> {
        let sql = format!("{RECIPE_SELECT} WHERE r.id = $1");
        let row = sqlx::query_as::<_, RecipeRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .context("find recipe")?;
        row.map(Recipe::try_from).transpose()
    }

    async fn recipe_comments(&self, id: Uuid) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, author_id, author_name, text, created_at
              FROM recipe_comments
             WHERE recipe_id = $1
             ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(id)
        .fetch_all(self.pool())
        .await
        .context("list comments")?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn list_recipes(&self, filter: RecipeFilter) -> anyhow::Result<Vec<Recipe>> {
        let rows = match filter {
            RecipeFilter::Approved => {
                let sql = format!(
                    "{RECIPE_SELECT} WHERE lower(r.status) = 'approved' ORDER BY r.created_at DESC"
                );
                sqlx::query_as::<_, RecipeRow>(&sql).fetch_all(self.pool()).await
            }
            RecipeFilter::OwnedBy(owner_id) => {
                let sql = format!("{RECIPE_SELECT} WHERE r.owner_id = $1 ORDER BY r.created_at DESC");
                sqlx::query_as::<_, RecipeRow>(&sql)
                    .bind(owner_id)
                    .fetch_all(self.pool())
                    .await
            }
            RecipeFilter::SavedBy(user_id) => {
                let sql = format!(
                    "{RECIPE_SELECT} JOIN user_saved_recipes s ON s.recipe_id = r.id \
                     WHERE s.user_id = $1 ORDER BY s.saved_at ASC, r.id ASC"
                );
                sqlx::query_as::<_, RecipeRow>(&sql)
                    .bind(user_id)
                    .fetch_all(self.pool())
                    .await
            }
            RecipeFilter::All => {
                let sql = format!("{RECIPE_SELECT} ORDER BY r.created_at DESC");
                sqlx::query_as::<_, RecipeRow>(&sql).fetch_all(self.pool()).await
            }
        }
        .with_context(|| format!("list recipes ({filter:?})"))?;
        into_recipes(rows)
    }

    async fn update_recipe(
        &self,
        id: Uuid,
        changes: &RecipeChanges,
    ) -> anyhow::Result<Option<Recipe>> {
        let updated = sqlx::query(
            r#"
            UPDATE recipes
               SET title        = COALESCE($2, title),
                   category     = COALESCE($3, category),
                   image        = COALESCE($4, image),
                   ingredients  = COALESCE($5, ingredients),
                   steps        = COALESCE($6, steps),
                   difficulty   = COALESCE($7, difficulty),
                   cooking_time = COALESCE($8, cooking_time),
                   is_premium   = COALESCE($9, is_premium),
                   price        = COALESCE($10, price),
                   status       = 'pending',
                   updated_at   = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.title.as_deref())
        .bind(changes.category.map(|c| c.as_str()))
        .bind(changes.image.as_deref())
        .bind(changes.ingredients.clone())
        .bind(changes.steps.as_deref())
        .bind(changes.difficulty)
        .bind(changes.cooking_time.as_deref())
        .bind(changes.is_premium)
        .bind(changes.price)
        .execute(self.pool())
        .await
        .context("update recipe")?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        self.find_recipe(id).await
    }

    async fn set_status(&self, id: Uuid, status: Status) -> anyhow::Result<Option<Recipe>> {
        let updated = sqlx::query("UPDATE recipes SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(self.pool())
            .await
            .context("set recipe status")?
            .rows_affected();
        if updated == 0 {
            return Ok(None);
        }
        self.find_recipe(id).await
    }

    async fn delete_recipe(&self, id: Uuid) -> anyhow::Result<bool> {
        let deleted = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .context("delete recipe")?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn toggle_like(
        &self,
        recipe_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<LikeState>> {
        if !self.recipe_exists(recipe_id).await? {
            return Ok(None);
        }

        let mut tx = self.pool().begin().await.context("begin tx")?;
        let removed = sqlx::query("DELETE FROM recipe_likes WHERE recipe_id = $1 AND user_id = $2")
            .bind(recipe_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("unlike recipe")?
            .rows_affected();

        if removed == 0 {
            sqlx::query(
                r#"
                INSERT INTO recipe_likes (recipe_id, user_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(recipe_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("like recipe")?;
        }

        let likes_count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipe_likes WHERE recipe_id = $1")
                .bind(recipe_id)
                .fetch_one(&mut *tx)
                .await
                .context("count likes")?;
        tx.commit().await.context("commit tx")?;

        Ok(Some(LikeState {
            is_liked: removed == 0,
            likes_count,
        }))
    }

    async fn add_comment(
        &self,
        recipe_id: Uuid,
        comment: NewComment,
    ) -> anyhow::Result<Option<Vec<Comment>>> {
        if !self.recipe_exists(recipe_id).await? {
            return Ok(None);
        }
        sqlx::query(
            r#"
            INSERT INTO recipe_comments (id, recipe_id, author_id, author_name, text, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(recipe_id)
        .bind(comment.author_id)
        .bind(&comment.author_name)
        .bind(&comment.text)
        .execute(self.pool())
        .await
        .context("insert comment")?;

        self.recipe_comments(recipe_id).await.map(Some)
    }

    async fn leaderboard(&self, limit: i64) -> anyhow::Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT r.id, r.title, r.chef_name, r.category,
                   COUNT(l.user_id) AS likes_count
              FROM recipes r
              LEFT JOIN recipe_likes l ON l.recipe_id = r.id
             WHERE lower(r.status) = 'approved'
             GROUP BY r.id
             ORDER BY likes_count DESC, r.created_at DESC
             LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .context("leaderboard")?;
        Ok(rows)
    }

    async fn rename_chef(&self, owner_id: Uuid, name: &str) -> anyhow::Result<u64> {
        let n = sqlx::query("UPDATE recipes SET chef_name = $2 WHERE owner_id = $1 AND chef_name <> $2")
            .bind(owner_id)
            .bind(name)
            .execute(self.pool())
            .await
            .context("rename chef")?
            .rows_affected();
        Ok(n)
    }

    async fn rename_comment_author(&self, author_id: Uuid, name: &str) -> anyhow::Result<u64> {
        let n = sqlx::query(
            "UPDATE recipe_comments SET author_name = $2 WHERE author_id = $1 AND author_name <> $2",
        )
        .bind(author_id)
        .bind(name)
        .execute(self.pool())
        .await
        .context("rename comment author")?
        .rows_affected();
        Ok(n)
    }
}
