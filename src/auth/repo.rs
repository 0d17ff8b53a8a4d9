use anyhow::Context;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, PendingOtp, ProfileChanges, User, UserRelations, UserRow};
use crate::db::PgStore;
use crate::refs::RecordRef;

/// Persistence for users and the relation sets they own.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Returns `None` when the email is already taken.
    async fn insert_user(&self, new: NewUser) -> anyhow::Result<Option<User>>;

    /// Replaces any pending code on the user in one write.
    async fn set_otp(&self, user_id: Uuid, otp: &PendingOtp) -> anyhow::Result<()>;

    /// Marks the user verified and clears the code, but only when `code`
    /// matches and has not expired at `now`. Returns the verified user id.
    async fn consume_otp(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Uuid>>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: &ProfileChanges,
    ) -> anyhow::Result<Option<User>>;

    async fn relations(&self, user_id: Uuid) -> anyhow::Result<UserRelations>;

    /// Flips membership of `recipe_id` in the saved set. Returns the new state.
    async fn toggle_saved(&self, user_id: Uuid, recipe_id: Uuid) -> anyhow::Result<bool>;

    /// Adds `recipe_id` to the purchased set. Returns false if it was already there.
    async fn add_purchase(&self, user_id: Uuid, recipe_id: Uuid) -> anyhow::Result<bool>;

    async fn list_users(&self) -> anyhow::Result<Vec<User>>;

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, bio, profile_picture, \
                            is_verified, otp, otp_expires_at, created_at, updated_at";

fn to_refs(ids: Vec<Uuid>) -> Vec<RecordRef> {
    ids.into_iter().map(RecordRef::from).collect()
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(self.pool())
            .await
            .context("find user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .context("find user by id")?;
        row.map(User::try_from).transpose()
    }

    async fn insert_user(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );
        let res = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .fetch_one(self.pool())
            .await;
        match res {
            Ok(row) => Ok(Some(User::try_from(row)?)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context("insert user")),
        }
    }

    async fn set_otp(&self, user_id: Uuid, otp: &PendingOtp) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET otp = $2, otp_expires_at = $3, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&otp.code)
        .bind(otp.expires_at)
        .execute(self.pool())
        .await
        .context("store otp")?;
        Ok(())
    }

    async fn consume_otp(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
               SET is_verified = TRUE, otp = NULL, otp_expires_at = NULL, updated_at = now()
             WHERE email = $1 AND otp = $2 AND otp_expires_at > $3
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .context("consume otp")?;
        Ok(id)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: &ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   bio = COALESCE($3, bio),
                   profile_picture = COALESCE($4, profile_picture),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .bind(changes.name.as_deref())
            .bind(changes.bio.as_deref())
            .bind(changes.profile_picture.as_deref())
            .fetch_optional(self.pool())
            .await
            .context("update profile")?;
        row.map(User::try_from).transpose()
    }

    async fn relations(&self, user_id: Uuid) -> anyhow::Result<UserRelations> {
        let (saved, purchased, favorites, following, followers) =
            sqlx::query_as::<_, (Vec<Uuid>, Vec<Uuid>, Vec<Uuid>, Vec<Uuid>, Vec<Uuid>)>(
                r#"
                SELECT
                  ARRAY(SELECT recipe_id FROM user_saved_recipes
                         WHERE user_id = $1 ORDER BY saved_at, recipe_id),
                  ARRAY(SELECT recipe_id FROM user_purchased_recipes
                         WHERE user_id = $1 ORDER BY purchased_at, recipe_id),
                  ARRAY(SELECT recipe_id FROM user_favorites
                         WHERE user_id = $1 ORDER BY created_at, recipe_id),
                  ARRAY(SELECT followee_id FROM user_follows
                         WHERE follower_id = $1 ORDER BY created_at, followee_id),
                  ARRAY(SELECT follower_id FROM user_follows
                         WHERE followee_id = $1 ORDER BY created_at, follower_id)
                "#,
            )
            .bind(user_id)
            .fetch_one(self.pool())
            .await
            .context("load user relations")?;
        Ok(UserRelations {
            saved_recipes: to_refs(saved),
            purchased_recipes: to_refs(purchased),
            favorites: to_refs(favorites),
            following: to_refs(following),
            followers: to_refs(followers),
        })
    }

    async fn toggle_saved(&self, user_id: Uuid, recipe_id: Uuid) -> anyhow::Result<bool> {
        let mut tx = self.pool().begin().await.context("begin tx")?;
        let removed = sqlx::query(
            "DELETE FROM user_saved_recipes WHERE user_id = $1 AND recipe_id = $2",
        )
        .bind(user_id)
        .bind(recipe_id)
        .execute(&mut *tx)
        .await
        .context("unsave recipe")?
        .rows_affected();

        if removed == 0 {
            sqlx::query(
                r#"
                INSERT INTO user_saved_recipes (user_id, recipe_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(recipe_id)
            .execute(&mut *tx)
            .await
            .context("save recipe")?;
        }
        tx.commit().await.context("commit tx")?;
        Ok(removed == 0)
    }

    async fn add_purchase(&self, user_id: Uuid, recipe_id: Uuid) -> anyhow::Result<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO user_purchased_recipes (user_id, recipe_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(recipe_id)
        .execute(self.pool())
        .await
        .context("purchase recipe")?
        .rows_affected();
        Ok(inserted > 0)
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(self.pool())
            .await
            .context("list users")?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .context("delete user")?
            .rows_affected();
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;
    use time::Duration;

    use super::*;
    use crate::auth::otp;
    use crate::auth::repo_types::Role;
    use crate::recipes::repo::RecipeStore;
    use crate::recipes::repo_types::{Category, NewRecipe};
    use crate::refs;

    fn bob() -> NewUser {
        NewUser {
            name: "Bob".into(),
            email: "bob@x.com".into(),
            password_hash: "unused".into(),
            role: Role::User,
        }
    }

    async fn seed_recipe(store: &PgStore, owner_id: Uuid) -> Uuid {
        store
            .insert_recipe(NewRecipe {
                owner_id,
                chef_name: "Bob".into(),
                title: "Soup".into(),
                category: Category::Lunch,
                image: None,
                ingredients: vec!["water".into()],
                steps: "Boil".into(),
                difficulty: 1,
                cooking_time: "10 min".into(),
                is_premium: true,
                price: 3.0,
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn email_is_unique_ignoring_case(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        assert!(store.insert_user(bob()).await.unwrap().is_some());
        let shouting = NewUser { email: "BOB@x.com".into(), ..bob() };
        assert!(store.insert_user(shouting).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn otp_is_consumed_once(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        let user = store.insert_user(bob()).await.unwrap().unwrap();
        let now = OffsetDateTime::now_utc();
        let pending = otp::issue_at(now);
        store.set_otp(user.id, &pending).await.unwrap();

        assert!(store.consume_otp("bob@x.com", "000000x", now).await.unwrap().is_none());
        assert_eq!(
            store.consume_otp("bob@x.com", &pending.code, now).await.unwrap(),
            Some(user.id)
        );
        assert!(store.consume_otp("bob@x.com", &pending.code, now).await.unwrap().is_none());

        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert!(stored.is_verified);
        assert!(stored.pending_otp.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn expired_otp_is_rejected(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        let user = store.insert_user(bob()).await.unwrap().unwrap();
        let issued = OffsetDateTime::now_utc() - otp::OTP_TTL - Duration::seconds(1);
        let pending = otp::issue_at(issued);
        store.set_otp(user.id, &pending).await.unwrap();

        let now = OffsetDateTime::now_utc();
        assert!(store.consume_otp("bob@x.com", &pending.code, now).await.unwrap().is_none());
        assert!(!store.find_user(user.id).await.unwrap().unwrap().is_verified);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn saved_toggle_and_purchase_round_trip(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        let user = store.insert_user(bob()).await.unwrap().unwrap();
        let recipe = seed_recipe(&store, user.id).await;

        assert!(store.toggle_saved(user.id, recipe).await.unwrap());
        let relations = store.relations(user.id).await.unwrap();
        assert!(refs::contains(&relations.saved_recipes, recipe));
        assert!(!store.toggle_saved(user.id, recipe).await.unwrap());
        assert!(store.relations(user.id).await.unwrap().saved_recipes.is_empty());

        assert!(store.add_purchase(user.id, recipe).await.unwrap());
        assert!(!store.add_purchase(user.id, recipe).await.unwrap());
        assert_eq!(store.relations(user.id).await.unwrap().purchased_recipes.len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn deleting_a_user_removes_their_recipes(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        let user = store.insert_user(bob()).await.unwrap().unwrap();
        let recipe = seed_recipe(&store, user.id).await;

        assert!(store.delete_user(user.id).await.unwrap());
        assert!(store.find_recipe(recipe).await.unwrap().is_none());
        assert!(!store.delete_user(user.id).await.unwrap());
    }
}
